use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::core::Result;
use crate::model::entity::TypeDesc;
use crate::model::instance::Persistent;
use crate::model::registry::Registry;

/// Host-side type of a persistent field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Bool,
    Text,
    Bytes,
    /// PNG-encoded pixel bitmap.
    Image,
    Guid,
    DateTime,
    /// Fully-qualified type name, stored as text.
    TypeName,
    /// Stored as a 32-bit integer.
    Enum,
    /// Serializable object, stored as JSON bytes.
    Object,
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Marks a field as one of the system roles. Each non-`None` role appears
/// at most once per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    None,
    PrimaryKey,
    TimestampCreated,
    TimestampChanged,
    ArchiveFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintAction {
    NoAction,
    Cascade,
    SetDefault,
    SetNull,
}

impl ConstraintAction {
    pub fn sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetDefault => "SET DEFAULT",
            Self::SetNull => "SET NULL",
        }
    }
}

/// A by-type handle to another registered entity, used for foreign-key
/// constraints and view master types. Carries the monomorphized describe
/// function so the schema engine can resolve the target lazily.
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_id: fn() -> TypeId,
    describe: fn() -> Result<Arc<TypeDesc>>,
}

impl EntityRef {
    pub fn of<T: Persistent>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            describe: Registry::describe::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn describe(&self) -> Result<Arc<TypeDesc>> {
        (self.describe)()
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef").field("type_id", &self.type_id()).finish()
    }
}

/// Immutable description of one persistent field.
///
/// Built through chained setters; defaults follow the declared metadata
/// conventions (length 100, blob block size 512).
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub host_type: HostType,
    pub role: FieldRole,
    /// -1 means unbounded ("memo").
    pub max_length: i32,
    pub blob_block_size: u32,
    pub compress: bool,
    pub indexed: bool,
    pub index_definition: Option<String>,
    pub index_descending: bool,
    pub unique: bool,
    pub delayed: bool,
    pub searchable: bool,
    pub use_soundex: bool,
    pub log_changes: bool,
    /// View-only mapping onto a master-table column.
    pub source_field: Option<String>,
    pub constraint_type: Option<EntityRef>,
    pub constraint_on_update: ConstraintAction,
    pub constraint_on_delete: ConstraintAction,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, host_type: HostType) -> Self {
        Self {
            name: name.into(),
            host_type,
            role: FieldRole::None,
            max_length: 100,
            blob_block_size: 512,
            compress: false,
            indexed: false,
            index_definition: None,
            index_descending: false,
            unique: false,
            delayed: false,
            searchable: false,
            use_soundex: false,
            log_changes: true,
            source_field: None,
            constraint_type: None,
            constraint_on_update: ConstraintAction::NoAction,
            constraint_on_delete: ConstraintAction::NoAction,
        }
    }

    pub fn role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }

    pub fn max_length(mut self, len: i32) -> Self {
        self.max_length = len;
        self
    }

    /// Unbounded text or blob storage.
    pub fn memo(mut self) -> Self {
        self.max_length = -1;
        self
    }

    pub fn blob_block_size(mut self, size: u32) -> Self {
        self.blob_block_size = size;
        self
    }

    pub fn compress(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn index_definition(mut self, expr: impl Into<String>) -> Self {
        self.indexed = true;
        self.index_definition = Some(expr.into());
        self
    }

    pub fn index_descending(mut self) -> Self {
        self.index_descending = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.indexed = true;
        self
    }

    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn use_soundex(mut self) -> Self {
        self.use_soundex = true;
        self
    }

    pub fn skip_change_log(mut self) -> Self {
        self.log_changes = false;
        self
    }

    pub fn source_field(mut self, source: impl Into<String>) -> Self {
        self.source_field = Some(source.into());
        self
    }

    pub fn references<T: Persistent>(mut self) -> Self {
        self.constraint_type = Some(EntityRef::of::<T>());
        self
    }

    pub fn on_update(mut self, action: ConstraintAction) -> Self {
        self.constraint_on_update = action;
        self
    }

    pub fn on_delete(mut self, action: ConstraintAction) -> Self {
        self.constraint_on_delete = action;
        self
    }

    pub fn is_system(&self) -> bool {
        self.role != FieldRole::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_defaults() {
        let f = FieldDesc::new("NAME", HostType::Text);
        assert_eq!(f.max_length, 100);
        assert_eq!(f.blob_block_size, 512);
        assert_eq!(f.role, FieldRole::None);
        assert!(f.log_changes);
        assert!(!f.indexed);
    }

    #[test]
    fn test_unique_implies_indexed() {
        let f = FieldDesc::new("CODE", HostType::Text).unique();
        assert!(f.indexed);
        assert!(f.unique);
    }

    #[test]
    fn test_memo_length() {
        let f = FieldDesc::new("NOTES", HostType::Text).memo();
        assert_eq!(f.max_length, -1);
    }
}
