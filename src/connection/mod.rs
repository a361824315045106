mod options;
mod reader;

pub use options::{OrderMode, ReadOptions, RowSet};
pub use reader::EntityReader;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use crate::changelog::ChangeLog;
use crate::core::{DbError, Result, Value};
use crate::database::Database;
use crate::dialect::{fill, CommandKind};
use crate::driver::{DriverConnection, DriverRows};
use crate::events::{self, ChangeKind, EventMessage};
use crate::model::{FieldDesc, FieldRole, HostType, Persistent, TypeDesc};
use crate::query::QueryBuilder;

/// Transaction-scoped executor bound to one driver connection.
///
/// At most one transaction is live at a time; pending change events are
/// buffered in the outbox while it lasts and flushed in enqueue order on
/// commit. The driver handle is released on every exit path: `close`
/// rolls back any live transaction, and dropping the connection closes
/// it.
pub struct Connection {
    database: Arc<Database>,
    driver: Option<Box<dyn DriverConnection>>,
    in_transaction: bool,
    outbox: Mutex<Vec<EventMessage>>,
    logger: Option<Box<dyn ChangeLog>>,
}

impl Connection {
    pub(crate) fn new(
        database: Arc<Database>,
        driver: Box<dyn DriverConnection>,
        logger: Option<Box<dyn ChangeLog>>,
    ) -> Self {
        Self {
            database,
            driver: Some(driver),
            in_transaction: false,
            outbox: Mutex::new(Vec::new()),
            logger,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn driver(&mut self) -> Result<&mut Box<dyn DriverConnection>> {
        self.driver
            .as_mut()
            .ok_or_else(|| DbError::Connection("connection is closed".into()))
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub fn begin(&mut self) -> Result<()> {
        if self.driver.is_none() {
            return Err(DbError::Connection("connection is closed".into()));
        }
        if self.in_transaction {
            return Err(DbError::Connection("transaction already active".into()));
        }
        self.driver()?.begin()?;
        self.in_transaction = true;
        if let Some(logger) = self.logger.as_mut() {
            logger.begin();
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(DbError::Connection("no active transaction".into()));
        }
        self.driver()?
            .commit()
            .map_err(|e| DbError::Transaction(format!("commit failed: {}", e)))?;
        self.in_transaction = false;

        // Events are delivered only after the driver commit succeeded,
        // in enqueue order.
        let pending: Vec<EventMessage> = {
            let mut outbox = self.outbox.lock()?;
            outbox.drain(..).collect()
        };
        for message in &pending {
            events::publish(message);
        }
        if let Some(logger) = self.logger.as_mut() {
            logger.commit();
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(DbError::Connection("no active transaction".into()));
        }
        self.in_transaction = false;
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.clear();
        }
        if let Some(logger) = self.logger.as_mut() {
            logger.rollback();
        }
        self.driver()?
            .rollback()
            .map_err(|e| DbError::Transaction(format!("rollback failed: {}", e)))
    }

    /// Release the driver handle; any live transaction rolls back first.
    pub fn close(&mut self) {
        if self.in_transaction {
            let _ = self.rollback();
        }
        self.driver = None;
    }

    // ------------------------------------------------------------------
    // Raw execution
    // ------------------------------------------------------------------

    /// Execute arbitrary SQL with positional `?` arguments; returns the
    /// affected-row count.
    pub fn execute(&mut self, sql: &str, args: Vec<Value>) -> Result<u64> {
        let sql = self.database.translator().rewrite(sql);
        let (sql, params) = self.bind_positional(&sql, args)?;
        self.traced_execute(&sql, &params)
    }

    /// Execute arbitrary SQL returning an untyped row set.
    pub fn rows(&mut self, sql: &str, args: Vec<Value>) -> Result<RowSet> {
        let sql = self.database.translator().rewrite(sql);
        let (sql, params) = self.bind_positional(&sql, args)?;
        let mut cursor = self.traced_query(&sql, &params)?;
        let columns = cursor.columns().to_vec();
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row()? {
            rows.push(row);
        }
        Ok(RowSet { columns, rows })
    }

    pub fn scalar(&mut self, sql: &str, args: Vec<Value>) -> Result<Value> {
        let sql = self.database.translator().rewrite(sql);
        let (sql, params) = self.bind_positional(&sql, args)?;
        self.traced_scalar(&sql, &params)
    }

    /// Rewrite positional `?` placeholders to `@p0, @p1, ...` and bind
    /// the marshalled arguments. An argument that is itself a JSON array
    /// is flattened once.
    fn bind_positional(&self, sql: &str, args: Vec<Value>) -> Result<(String, Vec<(String, Value)>)> {
        let translator = self.database.translator();
        let mut flat = Vec::new();
        for arg in args {
            match arg {
                Value::Json(serde_json::Value::Array(items)) => {
                    for item in items {
                        flat.push(json_scalar(item));
                    }
                }
                other => flat.push(other),
            }
        }

        let mut out = String::with_capacity(sql.len() + flat.len() * 3);
        let mut params = Vec::with_capacity(flat.len());
        let mut next = 0usize;
        let mut in_string = false;
        for ch in sql.chars() {
            match ch {
                '\'' => {
                    in_string = !in_string;
                    out.push(ch);
                }
                '?' if !in_string => {
                    let arg = flat.get(next).ok_or_else(|| {
                        DbError::Query(format!("placeholder {} has no argument", next))
                    })?;
                    let name = format!("p{}", next);
                    out.push('@');
                    out.push_str(&name);
                    params.push((name, translator.to_db_auto(arg)?));
                    next += 1;
                }
                _ => out.push(ch),
            }
        }
        if next != flat.len() {
            return Err(DbError::Query(format!(
                "{} arguments supplied but {} placeholders found",
                flat.len(),
                next
            )));
        }
        Ok((out, params))
    }

    fn traced_execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<u64> {
        self.database.trace_before(sql, params);
        let started = Instant::now();
        let result = self.driver()?.execute(sql, params);
        self.database.trace_after(sql, params, started.elapsed());
        debug!(sql, ok = result.is_ok(), "execute");
        result
    }

    fn traced_query(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Box<dyn DriverRows>> {
        self.database.trace_before(sql, params);
        let started = Instant::now();
        let result = self.driver()?.query(sql, params);
        self.database.trace_after(sql, params, started.elapsed());
        result
    }

    fn traced_scalar(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Value> {
        self.database.trace_before(sql, params);
        let started = Instant::now();
        let result = self.driver()?.scalar(sql, params);
        self.database.trace_after(sql, params, started.elapsed());
        result
    }

    // ------------------------------------------------------------------
    // Save / delete
    // ------------------------------------------------------------------

    pub fn save<T: Persistent>(&mut self, entity: &mut T) -> Result<()> {
        self.save_with(entity, &ReadOptions::default())
    }

    pub fn save_with<T: Persistent>(&mut self, entity: &mut T, options: &ReadOptions<T>) -> Result<()> {
        let desc = T::type_desc()?;
        if desc.is_view() {
            return Err(DbError::Query(format!("{} is a view and is read-only", desc.name)));
        }
        entity.before_save();

        let key_field = desc
            .key_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no key field", desc.name)))?
            .clone();

        let mut is_insert = options.force_create || !entity.core().is_persisted();
        if !is_insert {
            is_insert = !self.exist_key(&desc, &key_field, entity.core().key())?;
        }

        let started = Instant::now();
        let sql = if is_insert {
            self.save_insert(entity, &desc, &key_field, options)?
        } else {
            match self.save_update(entity, &desc, &key_field, options)? {
                Some(sql) => sql,
                // Nothing changed: succeed without touching the driver.
                None => return Ok(()),
            }
        };

        if desc.log_changes {
            if let Some(logger) = self.logger.as_mut() {
                let key = entity.core().key();
                for (name, old) in entity.core().buffer().entries().to_vec() {
                    let logged = desc.field(&name).map_or(false, |f| f.log_changes);
                    if logged {
                        let new = entity.get(&name)?;
                        logger.entry(&desc.name, key, &name, &old, &new);
                    }
                }
            }
        }

        entity.commit_changes();
        entity.core_mut().attach_database(Arc::clone(&self.database));

        let kind = if is_insert { ChangeKind::Added } else { ChangeKind::Changed };
        self.emit_entity_event(entity, &desc, kind);
        self.database.emit_after_save(&sql, started.elapsed());
        Ok(())
    }

    fn writable_value<T: Persistent>(entity: &T, field: &FieldDesc) -> Result<Value> {
        match field.role {
            FieldRole::PrimaryKey => Ok(entity.core().key().into()),
            FieldRole::TimestampCreated => Ok(entity.core().created().into()),
            FieldRole::TimestampChanged => Ok(entity.core().changed().into()),
            FieldRole::ArchiveFlag => Ok(entity.core().archived().into()),
            FieldRole::None => entity.get(&field.name),
        }
    }

    fn save_insert<T: Persistent>(
        &mut self,
        entity: &mut T,
        desc: &TypeDesc,
        key_field: &FieldDesc,
        options: &ReadOptions<T>,
    ) -> Result<String> {
        if !entity.core().is_persisted() {
            entity.core_mut().set_key(Uuid::new_v4());
        }

        let translator = self.database.translator().clone();
        let mut names = vec![key_field.name.clone()];
        let mut params = vec![(
            "v0".to_string(),
            translator.to_db(&entity.core().key().into(), HostType::Guid, false)?,
        )];

        for field in desc.fields() {
            if field.role == FieldRole::PrimaryKey {
                continue;
            }
            let timestamp_role = matches!(
                field.role,
                FieldRole::TimestampCreated | FieldRole::TimestampChanged
            );
            if timestamp_role && !options.force_create {
                continue;
            }
            if field.delayed && !entity.core().is_delayed_loaded(&field.name) {
                continue;
            }
            let value = Self::writable_value(entity, field)?;
            let name = format!("v{}", params.len());
            params.push((name, translator.to_db(&value, field.host_type, field.compress)?));
            names.push(field.name.clone());
        }

        let placeholders: Vec<String> = (0..params.len()).map(|i| format!("@v{}", i)).collect();
        let sql = fill(
            self.database.translator().command(CommandKind::Insert),
            &[
                ("TABLENAME", &desc.name),
                ("FIELDS", &names.join(", ")),
                ("VALUES", &placeholders.join(", ")),
            ],
        );
        self.traced_execute(&sql, &params)?;
        Ok(sql)
    }

    fn save_update<T: Persistent>(
        &mut self,
        entity: &mut T,
        desc: &TypeDesc,
        key_field: &FieldDesc,
        options: &ReadOptions<T>,
    ) -> Result<Option<String>> {
        use crate::config::ConflictMode;

        if self.database.config().conflict_mode == ConflictMode::FirstWins {
            if let Some(changed_field) = desc.changed_field() {
                let stored = self.load_key_field_value(desc, changed_field, entity.core().key())?;
                if let Value::DateTime(stored_at) = stored {
                    if stored_at > entity.core().changed() {
                        return Err(DbError::Conflict(format!(
                            "{} {} was changed by another writer",
                            desc.name,
                            entity.core().key()
                        )));
                    }
                }
            }
        }

        let mut field_names: Vec<String> = if !options.fields.is_empty() {
            options.fields.clone()
        } else if options.write_all_fields {
            desc.fields()
                .iter()
                .filter(|f| f.role == FieldRole::None)
                .map(|f| f.name.clone())
                .collect()
        } else {
            entity.changed_properties()
        };
        field_names.retain(|name| {
            desc.field(name).map_or(false, |f| {
                let timestamp_role = matches!(
                    f.role,
                    FieldRole::TimestampCreated | FieldRole::TimestampChanged
                );
                let unloaded_delayed = f.delayed && !entity.core().is_delayed_loaded(&f.name);
                f.role != FieldRole::PrimaryKey && !timestamp_role && !unloaded_delayed
            })
        });
        if field_names.is_empty() {
            return Ok(None);
        }

        let translator = self.database.translator().clone();
        let mut params = vec![(
            "v0".to_string(),
            translator.to_db(&entity.core().key().into(), HostType::Guid, false)?,
        )];
        let mut pairs = Vec::new();
        for name in &field_names {
            let field = desc
                .field(name)
                .ok_or_else(|| DbError::Structural(format!("{}: unknown field {}", desc.name, name)))?;
            let value = Self::writable_value(entity, field)?;
            let param = format!("v{}", params.len());
            pairs.push(format!("{} = @{}", field.name, param));
            params.push((param, translator.to_db(&value, field.host_type, field.compress)?));
        }

        let sql = fill(
            self.database.translator().command(CommandKind::Update),
            &[
                ("TABLENAME", &desc.name),
                ("PAIRS", &pairs.join(", ")),
                ("FIELDNAMEKEY", &key_field.name),
            ],
        );
        self.traced_execute(&sql, &params)?;
        Ok(Some(sql))
    }

    pub fn delete<T: Persistent>(&mut self, entity: &mut T) -> Result<()> {
        let desc = T::type_desc()?;
        if desc.is_view() {
            return Err(DbError::Query(format!("{} is a view and is read-only", desc.name)));
        }
        if !entity.core().is_persisted() {
            return Err(DbError::Execution(format!("{} instance was never persisted", desc.name)));
        }
        let key_field = desc
            .key_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no key field", desc.name)))?;

        let translator = self.database.translator();
        let params = vec![(
            "v0".to_string(),
            translator.to_db(&entity.core().key().into(), HostType::Guid, false)?,
        )];
        let sql = fill(
            translator.command(CommandKind::Delete),
            &[("TABLENAME", &desc.name), ("FIELDNAMEKEY", &key_field.name)],
        );

        let started = Instant::now();
        let affected = self.traced_execute(&sql, &params)?;
        if affected != 1 {
            return Err(DbError::Execution(format!(
                "delete of {} {} affected {} rows",
                desc.name,
                entity.core().key(),
                affected
            )));
        }

        self.database.emit_after_delete(&sql, started.elapsed());
        self.emit_entity_event(entity, &desc, ChangeKind::Deleted);
        Ok(())
    }

    /// Keyed delete without a loaded instance.
    pub fn delete_by_key<T: Persistent>(&mut self, key: Uuid) -> Result<()> {
        let mut stub = T::default();
        stub.core_mut().set_key(key);
        self.delete(&mut stub)
    }

    /// Set the archive-role flag and persist exactly that column.
    pub fn archive<T: Persistent>(&mut self, entity: &mut T) -> Result<()> {
        let desc = T::type_desc()?;
        let archived = desc
            .archived_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no archive flag field", desc.name)))?
            .name
            .clone();
        entity.core_mut().set_archived(true);
        let options = ReadOptions::new().fields(&[archived.as_str()]);
        self.save_with(entity, &options)
    }

    fn emit_entity_event<T: Persistent>(&self, entity: &T, desc: &TypeDesc, kind: ChangeKind) {
        if self.database.is_silent() {
            return;
        }
        let message = EventMessage::new(entity.clone(), desc.id, kind);
        if self.in_transaction {
            if let Ok(mut outbox) = self.outbox.lock() {
                outbox.push(message);
            }
        } else {
            events::publish(&message);
        }
    }

    // ------------------------------------------------------------------
    // Select family
    // ------------------------------------------------------------------

    fn projection<T>(&self, desc: &TypeDesc, options: &ReadOptions<T>) -> Vec<String> {
        if !options.fields.is_empty() {
            return options.fields.clone();
        }
        desc.fields()
            .iter()
            .filter(|f| options.ignore_delayed || !f.delayed)
            .map(|f| f.name.clone())
            .collect()
    }

    fn compose_select<T: Persistent, F>(
        &self,
        desc: &Arc<TypeDesc>,
        options: &ReadOptions<T>,
        build: F,
    ) -> Result<(String, Vec<Value>)>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let projection = self.projection(desc, options);
        let projection_refs: Vec<&str> = projection.iter().map(String::as_str).collect();

        let mut query = QueryBuilder::new(Arc::clone(desc), None);
        query.select(&projection_refs)?;
        build(&mut query)?;
        if let Some(order_field) = &options.order_by {
            match options.order_mode {
                OrderMode::Descending => query.order_desc_by(order_field)?,
                _ => query.order_by(order_field)?,
            };
        }
        if let Some(group_field) = &options.group_on {
            query.group_by(group_field)?;
        }
        if options.max_records > 0 {
            query.top(options.max_records)?;
        }
        query.build(self.database.translator())
    }

    /// Fetch the full, unfiltered set.
    pub fn select_all<T: Persistent>(&mut self, options: &ReadOptions<T>) -> Result<Vec<T>> {
        self.select_where(options, |_| Ok(()))
    }

    /// Fetch with caller-supplied WHERE/JOIN composition.
    pub fn select_where<T: Persistent, F>(&mut self, options: &ReadOptions<T>, build: F) -> Result<Vec<T>>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let desc = T::type_desc()?;
        let (sql, args) = self.compose_select(&desc, options, build)?;
        let (sql, params) = self.bind_positional(&sql, args)?;
        let mut cursor = self.traced_query(&sql, &params)?;
        let columns = cursor.columns().to_vec();

        let mut result = Vec::new();
        while let Some(row) = cursor.next_row()? {
            let entity: T = materialize_row(&self.database, &desc, &columns, row)?;
            if !options.accepts(&entity) {
                continue;
            }
            result.push(entity);
            if options.max_records > 0 && result.len() as u64 >= options.max_records {
                break;
            }
        }
        Ok(result)
    }

    /// Fetch at most one row.
    pub fn select_one<T: Persistent, F>(&mut self, options: ReadOptions<T>, build: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let options = options.max_records(1);
        Ok(self.select_where(&options, build)?.into_iter().next())
    }

    /// Load by primary key.
    pub fn load<T: Persistent>(&mut self, key: Uuid) -> Result<Option<T>> {
        let desc = T::type_desc()?;
        let key_name = desc
            .key_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no key field", desc.name)))?
            .name
            .clone();
        let options = ReadOptions::new();
        self.select_one(options, |q| {
            q.where_eq(&key_name, key)?;
            Ok(())
        })
    }

    /// Load by key, or hand back a fresh instance carrying the key.
    pub fn load_or_new<T: Persistent>(&mut self, key: Uuid) -> Result<T> {
        if let Some(found) = self.load::<T>(key)? {
            return Ok(found);
        }
        let mut fresh = T::default();
        fresh.core_mut().buffer_mut().set_untracked();
        fresh.core_mut().set_key(key);
        fresh.core_mut().buffer_mut().set_tracked();
        fresh.core_mut().attach_database(Arc::clone(&self.database));
        Ok(fresh)
    }

    /// Streaming reader; its lifetime cannot exceed the connection's.
    pub fn reader<'c, T: Persistent, F>(
        &'c mut self,
        options: &ReadOptions<T>,
        build: F,
    ) -> Result<EntityReader<'c, T>>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let desc = T::type_desc()?;
        let (sql, args) = self.compose_select(&desc, options, build)?;
        let (sql, params) = self.bind_positional(&sql, args)?;
        let cursor = self.traced_query(&sql, &params)?;
        Ok(EntityReader::new(Arc::clone(&self.database), desc, cursor))
    }

    pub fn count<T: Persistent>(&mut self, field: &str) -> Result<i64> {
        let desc = T::type_desc()?;
        let sql = fill(
            self.database.translator().command(CommandKind::SelectCount),
            &[("NAME", field), ("TABLENAME", &desc.name)],
        );
        let value = self.traced_scalar(&sql, &[])?;
        value
            .as_i64()
            .ok_or_else(|| DbError::conversion(value.type_name(), "COUNT"))
    }

    pub fn sum<T: Persistent>(&mut self, field: &str) -> Result<Value> {
        let desc = T::type_desc()?;
        let sql = fill(
            self.database.translator().command(CommandKind::SelectSum),
            &[("NAME", field), ("TABLENAME", &desc.name)],
        );
        self.traced_scalar(&sql, &[])
    }

    pub fn exist_by_key<T: Persistent>(&mut self, key: Uuid) -> Result<bool> {
        let desc = T::type_desc()?;
        let key_field = desc
            .key_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no key field", desc.name)))?
            .clone();
        self.exist_key(&desc, &key_field, key)
    }

    fn exist_key(&mut self, desc: &TypeDesc, key_field: &FieldDesc, key: Uuid) -> Result<bool> {
        let translator = self.database.translator();
        let params = vec![(
            "v0".to_string(),
            translator.to_db(&key.into(), HostType::Guid, false)?,
        )];
        let sql = fill(
            translator.command(CommandKind::ExistByKey),
            &[("TABLENAME", &desc.name), ("FIELDNAMEKEY", &key_field.name)],
        );
        let count = self.traced_scalar(&sql, &params)?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    /// True when no other row carries the same value in `field`.
    pub fn is_unique<T: Persistent>(&mut self, key: Uuid, field: &str, value: &Value) -> Result<bool> {
        let desc = T::type_desc()?;
        let key_name = &desc
            .key_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no key field", desc.name)))?
            .name;
        let field_desc = desc
            .field(field)
            .ok_or_else(|| DbError::Structural(format!("{}: unknown field {}", desc.name, field)))?;

        let translator = self.database.translator();
        let sql = format!(
            "SELECT {key} FROM {table} WHERE {key} <> @v0 AND {field} = @v1",
            key = key_name,
            table = desc.name,
            field = field_desc.name,
        );
        let params = vec![
            ("v0".to_string(), translator.to_db(&key.into(), HostType::Guid, false)?),
            (
                "v1".to_string(),
                translator.to_db(value, field_desc.host_type, field_desc.compress)?,
            ),
        ];
        let found = self.traced_scalar(&sql, &params)?;
        Ok(found.is_null())
    }

    /// Single-value fetch used by delayed-field loading.
    pub fn load_field_value<T: Persistent>(&mut self, key: Uuid, field: &str) -> Result<Value> {
        let desc = T::type_desc()?;
        let field_desc = desc
            .field(field)
            .ok_or_else(|| DbError::Structural(format!("{}: unknown field {}", desc.name, field)))?
            .clone();
        self.load_key_field_value(&desc, &field_desc, key)
    }

    fn load_key_field_value(&mut self, desc: &TypeDesc, field: &FieldDesc, key: Uuid) -> Result<Value> {
        let key_name = desc
            .key_field()
            .ok_or_else(|| DbError::Structural(format!("{} has no key field", desc.name)))?
            .name
            .clone();
        let translator = self.database.translator();
        let params = vec![(
            "v0".to_string(),
            translator.to_db(&key.into(), HostType::Guid, false)?,
        )];
        let sql = fill(
            translator.command(CommandKind::LoadFieldValue),
            &[
                ("NAME", &field.name),
                ("TABLENAME", &desc.name),
                ("FIELDNAMEKEY", &key_name),
            ],
        );
        let raw = self.traced_scalar(&sql, &params)?;
        self.database.translator().from_db(raw, field.host_type)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map one reader row onto a fresh entity: columns match fields by
/// case-insensitive name, system roles route into the entity core,
/// unknown columns are ignored. The tracking buffer is committed and
/// `after_load` fires once every column is assigned.
pub(crate) fn materialize_row<T: Persistent>(
    database: &Arc<Database>,
    desc: &TypeDesc,
    columns: &[String],
    row: Vec<Value>,
) -> Result<T> {
    let translator = database.translator();
    let mut entity = T::default();

    for (column, raw) in columns.iter().zip(row) {
        let Some(field) = desc.field(column) else {
            continue;
        };
        let value = translator.from_db(raw, field.host_type)?;
        match field.role {
            FieldRole::PrimaryKey => {
                entity
                    .core_mut()
                    .set_key(value.as_guid().unwrap_or_else(Uuid::nil));
            }
            FieldRole::TimestampCreated => {
                if let Some(at) = value.as_datetime() {
                    entity.core_mut().set_created(at);
                }
            }
            FieldRole::TimestampChanged => {
                if let Some(at) = value.as_datetime() {
                    entity.core_mut().set_changed(at);
                }
            }
            FieldRole::ArchiveFlag => {
                entity.core_mut().set_archived(value.as_bool().unwrap_or(false));
            }
            FieldRole::None => {
                entity.set_value(&field.name, value)?;
                if field.delayed {
                    entity.core_mut().mark_delayed_loaded(&field.name);
                }
            }
        }
    }

    entity.commit_changes();
    entity.core_mut().attach_database(Arc::clone(database));
    entity.after_load();
    Ok(entity)
}

fn json_scalar(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else {
                Value::Float64(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s),
        other => Value::Json(other),
    }
}
