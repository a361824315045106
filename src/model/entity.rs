use crate::core::{DbError, Result};
use crate::model::field::{EntityRef, FieldDesc, FieldRole};

pub const RESERVED_ID_MAX: u32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Table,
    View,
}

/// Immutable description of one entity type, built once at registration
/// and shared process-wide.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    pub kind: EntityKind,
    pub name: String,
    pub id: u32,
    pub version: u32,
    pub use_cache: bool,
    pub log_changes: bool,
    pub master_type: Option<EntityRef>,
    /// View query; may contain the literal token `#FIELDS#`.
    pub query_template: Option<String>,
    fields: Vec<FieldDesc>,
    pub(crate) builtin: bool,
}

impl TypeDesc {
    pub fn table(name: impl Into<String>, id: u32, version: u32) -> TypeDescBuilder {
        TypeDescBuilder::new(EntityKind::Table, name, id, version)
    }

    pub fn view(name: impl Into<String>, id: u32, version: u32) -> TypeDescBuilder {
        TypeDescBuilder::new(EntityKind::View, name, id, version)
    }

    pub fn is_view(&self) -> bool {
        self.kind == EntityKind::View
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Case-insensitive field lookup, declaration order preserved.
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn role_field(&self, role: FieldRole) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.role == role)
    }

    pub fn key_field(&self) -> Option<&FieldDesc> {
        self.role_field(FieldRole::PrimaryKey)
    }

    pub fn created_field(&self) -> Option<&FieldDesc> {
        self.role_field(FieldRole::TimestampCreated)
    }

    pub fn changed_field(&self) -> Option<&FieldDesc> {
        self.role_field(FieldRole::TimestampChanged)
    }

    pub fn archived_field(&self) -> Option<&FieldDesc> {
        self.role_field(FieldRole::ArchiveFlag)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::Structural("entity name must not be empty".into()));
        }
        if self.id == 0 {
            return Err(DbError::Structural(format!("entity {}: id must be >= 1", self.name)));
        }
        if !self.builtin && self.id <= RESERVED_ID_MAX {
            return Err(DbError::Structural(format!(
                "entity {}: ids 1..={} are reserved for built-in entities",
                self.name, RESERVED_ID_MAX
            )));
        }
        if self.version == 0 {
            return Err(DbError::Structural(format!("entity {}: version must be >= 1", self.name)));
        }

        for role in [
            FieldRole::PrimaryKey,
            FieldRole::TimestampCreated,
            FieldRole::TimestampChanged,
            FieldRole::ArchiveFlag,
        ] {
            let count = self.fields.iter().filter(|f| f.role == role).count();
            if count > 1 {
                return Err(DbError::Structural(format!(
                    "entity {}: role {:?} declared {} times",
                    self.name, role, count
                )));
            }
        }

        for field in &self.fields {
            let dups = self
                .fields
                .iter()
                .filter(|f| f.name.eq_ignore_ascii_case(&field.name))
                .count();
            if dups > 1 {
                return Err(DbError::Structural(format!(
                    "entity {}: duplicate field {}",
                    self.name, field.name
                )));
            }
        }

        match self.kind {
            EntityKind::Table => {
                for (role, what) in [
                    (FieldRole::PrimaryKey, "key field"),
                    (FieldRole::TimestampCreated, "created timestamp field"),
                    (FieldRole::TimestampChanged, "changed timestamp field"),
                ] {
                    if self.role_field(role).is_none() {
                        return Err(DbError::Structural(format!(
                            "table {} must declare a {}",
                            self.name, what
                        )));
                    }
                }
            }
            EntityKind::View => {
                if self.query_template.as_deref().map_or(true, |q| q.trim().is_empty()) {
                    return Err(DbError::Structural(format!(
                        "view {} must declare a query template",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Accumulates a `TypeDesc`; finalized and validated by the registry.
#[derive(Debug, Clone)]
pub struct TypeDescBuilder {
    desc: TypeDesc,
}

impl TypeDescBuilder {
    fn new(kind: EntityKind, name: impl Into<String>, id: u32, version: u32) -> Self {
        Self {
            desc: TypeDesc {
                kind,
                name: name.into(),
                id,
                version,
                use_cache: false,
                log_changes: false,
                master_type: None,
                query_template: None,
                fields: Vec::new(),
                builtin: false,
            },
        }
    }

    pub fn use_cache(mut self) -> Self {
        self.desc.use_cache = true;
        self
    }

    pub fn log_changes(mut self) -> Self {
        self.desc.log_changes = true;
        self
    }

    pub fn master_type(mut self, master: EntityRef) -> Self {
        self.desc.master_type = Some(master);
        self
    }

    pub fn query_template(mut self, query: impl Into<String>) -> Self {
        self.desc.query_template = Some(query.into());
        self
    }

    pub fn field(mut self, field: FieldDesc) -> Self {
        self.desc.fields.push(field);
        self
    }

    pub(crate) fn builtin(mut self) -> Self {
        self.desc.builtin = true;
        self
    }

    pub(crate) fn finish(self) -> Result<TypeDesc> {
        self.desc.validate()?;
        Ok(self.desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::HostType;

    fn person_fields(b: TypeDescBuilder) -> TypeDescBuilder {
        b.field(FieldDesc::new("SYS_ID", HostType::Guid).role(FieldRole::PrimaryKey))
            .field(FieldDesc::new("SYS_CREATED", HostType::DateTime).role(FieldRole::TimestampCreated))
            .field(FieldDesc::new("SYS_CHANGED", HostType::DateTime).role(FieldRole::TimestampChanged))
            .field(FieldDesc::new("NAME", HostType::Text))
    }

    #[test]
    fn test_table_requires_system_roles() {
        let missing = TypeDesc::table("PERSON", 200, 1)
            .field(FieldDesc::new("NAME", HostType::Text))
            .finish();
        assert!(matches!(missing, Err(DbError::Structural(_))));

        let ok = person_fields(TypeDesc::table("PERSON", 200, 1)).finish();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_view_requires_query() {
        let missing = TypeDesc::view("V_PERSON", 201, 1).finish();
        assert!(matches!(missing, Err(DbError::Structural(_))));

        let ok = TypeDesc::view("V_PERSON", 201, 1)
            .query_template("SELECT #FIELDS# FROM PERSON")
            .finish();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_reserved_ids_rejected() {
        let reserved = person_fields(TypeDesc::table("PERSON", 7, 1)).finish();
        assert!(matches!(reserved, Err(DbError::Structural(_))));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let dup = person_fields(TypeDesc::table("PERSON", 200, 1))
            .field(FieldDesc::new("OTHER_ID", HostType::Guid).role(FieldRole::PrimaryKey))
            .finish();
        assert!(matches!(dup, Err(DbError::Structural(_))));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let desc = person_fields(TypeDesc::table("PERSON", 200, 1)).finish().unwrap();
        assert!(desc.field("name").is_some());
        assert!(desc.field("Name").is_some());
        assert_eq!(desc.key_field().unwrap().name, "SYS_ID");
    }
}
