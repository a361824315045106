use crate::core::{DbError, Result, Value};
use crate::model::{EntityCore, FieldDesc, FieldRole, HostType, Persistent, TypeDesc, TypeDescBuilder};

/// Built-in bookkeeping row, one per managed entity. The schema engine
/// reads the stored version from here to gate re-alignment, and writes
/// it back after a successful pass. The maintenance flag is stored but
/// not acted on.
#[derive(Debug, Default, Clone)]
pub struct SystemInformation {
    core: EntityCore,
    pub name: String,
    pub entity_id: i32,
    pub version: i32,
    pub maintenance: bool,
}

impl SystemInformation {
    pub const ENTITY_ID: u32 = 1;

    pub fn set_name(&mut self, name: impl Into<String>) {
        let next = name.into();
        if self.core.track("NAME", &self.name.clone().into(), &next.clone().into()) {
            self.name = next;
        }
    }

    pub fn set_entity_id(&mut self, id: i32) {
        if self.core.track("ENTITYID", &self.entity_id.into(), &id.into()) {
            self.entity_id = id;
        }
    }

    pub fn set_version(&mut self, version: i32) {
        if self.core.track("VERSION", &self.version.into(), &version.into()) {
            self.version = version;
        }
    }

    pub fn set_maintenance(&mut self, maintenance: bool) {
        if self.core.track("MAINTENANCE", &self.maintenance.into(), &maintenance.into()) {
            self.maintenance = maintenance;
        }
    }
}

impl Persistent for SystemInformation {
    fn describe() -> TypeDescBuilder {
        TypeDesc::table("SYSTEMINFO", Self::ENTITY_ID, 1)
            .builtin()
            .field(FieldDesc::new("SYS_ID", HostType::Guid).role(FieldRole::PrimaryKey))
            .field(FieldDesc::new("SYS_CREATED", HostType::DateTime).role(FieldRole::TimestampCreated))
            .field(FieldDesc::new("SYS_CHANGED", HostType::DateTime).role(FieldRole::TimestampChanged))
            .field(FieldDesc::new("NAME", HostType::Text).max_length(200).unique())
            .field(FieldDesc::new("ENTITYID", HostType::Int32).unique())
            .field(FieldDesc::new("VERSION", HostType::Int32))
            .field(FieldDesc::new("MAINTENANCE", HostType::Bool))
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn get(&self, field: &str) -> Result<Value> {
        match field {
            "NAME" => Ok(self.name.clone().into()),
            "ENTITYID" => Ok(self.entity_id.into()),
            "VERSION" => Ok(self.version.into()),
            "MAINTENANCE" => Ok(self.maintenance.into()),
            other => Err(DbError::Structural(format!("SYSTEMINFO: unknown field {}", other))),
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "NAME" => self.set_name(value.into_string().unwrap_or_default()),
            "ENTITYID" => self.set_entity_id(value.as_i64().unwrap_or(0) as i32),
            "VERSION" => self.set_version(value.as_i64().unwrap_or(0) as i32),
            "MAINTENANCE" => self.set_maintenance(value.as_bool().unwrap_or(false)),
            other => {
                return Err(DbError::Structural(format!(
                    "SYSTEMINFO: unknown field {}",
                    other
                )))
            }
        }
        Ok(())
    }
}
