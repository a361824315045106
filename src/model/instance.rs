use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::{DbError, Result, Value};
use crate::database::Database;
use crate::model::entity::{TypeDesc, TypeDescBuilder};
use crate::model::registry::Registry;
use crate::model::tracking::ChangeBuffer;

/// Per-instance persistence state embedded by every entity: identity,
/// system timestamps, the change buffer, the attached database, and the
/// delayed-field load markers.
pub struct EntityCore {
    key: Uuid,
    created: DateTime<Utc>,
    changed: DateTime<Utc>,
    archived: bool,
    buffer: ChangeBuffer,
    database: Option<Arc<Database>>,
    delayed_loaded: Vec<String>,
    listener: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl Default for EntityCore {
    fn default() -> Self {
        Self {
            key: Uuid::nil(),
            created: DateTime::<Utc>::MIN_UTC,
            changed: DateTime::<Utc>::MIN_UTC,
            archived: false,
            buffer: ChangeBuffer::default(),
            database: None,
            delayed_loaded: Vec::new(),
            listener: None,
        }
    }
}

impl Clone for EntityCore {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            created: self.created,
            changed: self.changed,
            archived: self.archived,
            buffer: self.buffer.clone(),
            database: self.database.clone(),
            delayed_loaded: self.delayed_loaded.clone(),
            // Notification wiring is per-instance.
            listener: None,
        }
    }
}

impl fmt::Debug for EntityCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCore")
            .field("key", &self.key)
            .field("created", &self.created)
            .field("changed", &self.changed)
            .field("archived", &self.archived)
            .field("dirty", &self.buffer.is_dirty())
            .finish()
    }
}

impl EntityCore {
    /// Nil means "not yet persisted".
    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn set_key(&mut self, key: Uuid) {
        self.key = key;
    }

    pub fn is_persisted(&self) -> bool {
        !self.key.is_nil()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn set_created(&mut self, at: DateTime<Utc>) {
        self.created = at;
    }

    pub fn changed(&self) -> DateTime<Utc> {
        self.changed
    }

    pub fn set_changed(&mut self, at: DateTime<Utc>) {
        self.changed = at;
    }

    pub fn archived(&self) -> bool {
        self.archived
    }

    pub fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    pub fn database(&self) -> Option<&Arc<Database>> {
        self.database.as_ref()
    }

    pub fn attach_database(&mut self, database: Arc<Database>) {
        self.database = Some(database);
    }

    pub fn detach_database(&mut self) {
        self.database = None;
    }

    pub fn buffer(&self) -> &ChangeBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ChangeBuffer {
        &mut self.buffer
    }

    /// Tracked-mutation gate used by entity setters; fires the
    /// property-changed notification for each accepted mutation.
    pub fn track(&mut self, name: &str, old: &Value, new: &Value) -> bool {
        let assign = self.buffer.track(name, old, new);
        if assign {
            if let Some(listener) = &self.listener {
                listener(name);
            }
        }
        assign
    }

    pub fn set_change_listener(&mut self, listener: Box<dyn Fn(&str) + Send + Sync>) {
        self.listener = Some(listener);
    }

    pub fn is_delayed_loaded(&self, field: &str) -> bool {
        self.delayed_loaded.iter().any(|f| f.eq_ignore_ascii_case(field))
    }

    pub fn mark_delayed_loaded(&mut self, field: &str) {
        if !self.is_delayed_loaded(field) {
            self.delayed_loaded.push(field.to_string());
        }
    }

    pub fn reset_delayed(&mut self) {
        self.delayed_loaded.clear();
    }
}

/// The capability set every persistent entity implements.
///
/// `describe` is consulted exactly once per process by the registry;
/// `get`/`set_value` provide dynamic access to the entity's payload
/// fields (system-role fields are routed through `EntityCore` by the
/// connection). Setters are expected to consult
/// `EntityCore::track` before assigning.
pub trait Persistent: Default + Clone + Send + Sync + 'static {
    fn describe() -> TypeDescBuilder;

    fn core(&self) -> &EntityCore;

    fn core_mut(&mut self) -> &mut EntityCore;

    fn get(&self, field: &str) -> Result<Value>;

    fn set_value(&mut self, field: &str, value: Value) -> Result<()>;

    fn before_save(&mut self) {}

    fn after_load(&mut self) {}

    /// Invoked once with the freshly built description so downstream
    /// libraries can attach extensions.
    fn after_register(_desc: &TypeDesc) {}

    fn type_desc() -> Result<Arc<TypeDesc>> {
        Registry::describe::<Self>()
    }

    fn is_dirty(&self) -> bool {
        self.core().buffer().is_dirty()
    }

    fn changed_properties(&self) -> Vec<String> {
        self.core().buffer().changed_properties()
    }

    /// Clear the change buffer, accepting the current values.
    fn commit_changes(&mut self) {
        self.core_mut().buffer_mut().commit();
    }

    /// Re-apply every buffered pre-change value through the setters,
    /// suppressing tracking of the inverse writes.
    fn rollback_changes(&mut self) -> Result<()> {
        let entries = self.core_mut().buffer_mut().begin_rollback();
        let mut outcome = Ok(());
        for (name, old) in entries {
            if let Err(err) = self.set_value(&name, old) {
                outcome = Err(err);
                break;
            }
        }
        self.core_mut().buffer_mut().end_rollback();
        outcome
    }

    /// Read a delayed field, fetching it on demand through the attached
    /// database the first time. Subsequent reads on the same instance
    /// perform no SQL.
    fn delayed_value(&mut self, field: &str) -> Result<Value> {
        let desc = Self::type_desc()?;
        let fd = desc
            .field(field)
            .ok_or_else(|| DbError::Structural(format!("{}: unknown field {}", desc.name, field)))?;
        if !fd.delayed {
            return self.get(field);
        }

        if self.core().is_delayed_loaded(field) || !self.core().is_persisted() {
            return self.get(field);
        }
        let database = match self.core().database() {
            Some(db) => Arc::clone(db),
            None => return self.get(field),
        };

        let key = self.core().key();
        let mut conn = database.open_connection()?;
        let value = conn.load_field_value::<Self>(key, field)?;

        self.core_mut().buffer_mut().set_untracked();
        let applied = self.set_value(field, value);
        self.core_mut().buffer_mut().set_tracked();
        applied?;
        self.core_mut().mark_delayed_loaded(field);
        self.get(field)
    }

    /// Assign a delayed field directly; the instance then counts it as
    /// loaded.
    fn set_delayed(&mut self, field: &str, value: Value) -> Result<()> {
        self.set_value(field, value)?;
        self.core_mut().mark_delayed_loaded(field);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::TypeDesc;
    use crate::model::field::{FieldDesc, FieldRole, HostType};

    #[derive(Default, Clone)]
    struct Note {
        core: EntityCore,
        title: String,
        body: String,
    }

    impl Persistent for Note {
        fn describe() -> TypeDescBuilder {
            TypeDesc::table("TRACK_NOTE", 910, 1)
                .field(FieldDesc::new("SYS_ID", HostType::Guid).role(FieldRole::PrimaryKey))
                .field(FieldDesc::new("SYS_CREATED", HostType::DateTime).role(FieldRole::TimestampCreated))
                .field(FieldDesc::new("SYS_CHANGED", HostType::DateTime).role(FieldRole::TimestampChanged))
                .field(FieldDesc::new("TITLE", HostType::Text))
                .field(FieldDesc::new("BODY", HostType::Text).memo())
        }

        fn core(&self) -> &EntityCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut EntityCore {
            &mut self.core
        }

        fn get(&self, field: &str) -> Result<Value> {
            match field {
                "TITLE" => Ok(self.title.clone().into()),
                "BODY" => Ok(self.body.clone().into()),
                other => Err(DbError::Structural(format!("unknown field {}", other))),
            }
        }

        fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "TITLE" => {
                    let next = value.into_string().unwrap_or_default();
                    if self.core.track("TITLE", &self.title.clone().into(), &next.clone().into()) {
                        self.title = next;
                    }
                    Ok(())
                }
                "BODY" => {
                    let next = value.into_string().unwrap_or_default();
                    if self.core.track("BODY", &self.body.clone().into(), &next.clone().into()) {
                        self.body = next;
                    }
                    Ok(())
                }
                other => Err(DbError::Structural(format!("unknown field {}", other))),
            }
        }
    }

    #[test]
    fn test_dirty_and_commit() {
        let mut note = Note::default();
        assert!(!note.is_dirty());
        note.set_value("TITLE", "draft".into()).unwrap();
        assert!(note.is_dirty());
        assert_eq!(note.changed_properties(), vec!["TITLE".to_string()]);
        note.commit_changes();
        assert!(!note.is_dirty());
    }

    #[test]
    fn test_rollback_restores_pre_sequence_values() {
        let mut note = Note::default();
        note.set_value("TITLE", "one".into()).unwrap();
        note.set_value("BODY", "text".into()).unwrap();
        note.set_value("TITLE", "two".into()).unwrap();

        note.rollback_changes().unwrap();
        assert_eq!(note.title, "");
        assert_eq!(note.body, "");
        assert!(!note.is_dirty());
        // The inverse writes were not themselves tracked.
        assert!(note.changed_properties().is_empty());
    }

    #[test]
    fn test_listener_fires_on_accepted_mutation() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc as StdArc;

        let hits = StdArc::new(AtomicUsize::new(0));
        let seen = StdArc::clone(&hits);
        let mut note = Note::default();
        note.core_mut()
            .set_change_listener(Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }));

        note.set_value("TITLE", "x".into()).unwrap();
        // Equal value: no-op, no notification.
        note.set_value("TITLE", "x".into()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delayed_markers() {
        let mut core = EntityCore::default();
        assert!(!core.is_delayed_loaded("PHOTO"));
        core.mark_delayed_loaded("PHOTO");
        assert!(core.is_delayed_loaded("photo"));
        core.reset_delayed();
        assert!(!core.is_delayed_loaded("PHOTO"));
    }
}
