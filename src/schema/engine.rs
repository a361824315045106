use std::sync::Arc;

use tracing::{debug, info};

use crate::connection::{Connection, ReadOptions};
use crate::core::{DbError, Result};
use crate::database::Database;
use crate::dialect::{fill, CommandKind, TriggerEvent};
use crate::model::{FieldDesc, HostType, Persistent, TypeDesc};
use crate::schema::SystemInformation;

/// Idempotent convergence of declared entity metadata to the live
/// database. A pass only runs when forced or when the stored version in
/// the SystemInformation row is behind the declared one; a second check
/// with the same version issues no DDL.
pub struct SchemaEngine {
    database: Arc<Database>,
}

impl SchemaEngine {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    pub fn check<T: Persistent>(&self, force: bool) -> Result<()> {
        self.check_desc(&*T::type_desc()?, force)
    }

    pub fn check_desc(&self, desc: &TypeDesc, force: bool) -> Result<()> {
        let mut conn = self.database.open_connection()?;
        let mut visiting = Vec::new();
        self.check_in(&mut conn, desc, force, &mut visiting)
    }

    fn check_in(
        &self,
        conn: &mut Connection,
        desc: &TypeDesc,
        force: bool,
        visiting: &mut Vec<u32>,
    ) -> Result<()> {
        if visiting.contains(&desc.id) {
            return Ok(());
        }
        visiting.push(desc.id);

        let sysinfo_desc = SystemInformation::type_desc()?;
        if desc.id != SystemInformation::ENTITY_ID {
            self.check_in(conn, &sysinfo_desc, false, visiting)?;
        } else if !self.exist_named(conn, CommandKind::ExistTable, &desc.name)? {
            // Bootstrap: the version row lives in this very table.
            self.create_table(conn, desc)?;
            self.field_pass(conn, desc, visiting)?;
        }

        let name = desc.name.clone();
        let existing: Option<SystemInformation> =
            conn.select_one(ReadOptions::new(), |q| {
                q.where_eq("NAME", name.as_str())?;
                Ok(())
            })?;
        let stored_version = existing.as_ref().map(|row| row.version).unwrap_or(0);

        if force || (stored_version as u32) < desc.version {
            info!(entity = %desc.name, from = stored_version, to = desc.version, "schema check");
            if desc.is_view() {
                self.check_view(conn, desc)?;
            } else {
                self.check_table(conn, desc, visiting)?;
            }

            let mut row = existing.unwrap_or_default();
            row.set_name(desc.name.clone());
            row.set_entity_id(desc.id as i32);
            row.set_version(desc.version as i32);
            conn.save(&mut row)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    fn check_table(&self, conn: &mut Connection, desc: &TypeDesc, visiting: &mut Vec<u32>) -> Result<()> {
        for (accessor, what) in [
            (desc.key_field(), "key field"),
            (desc.created_field(), "created timestamp field"),
            (desc.changed_field(), "changed timestamp field"),
        ] {
            if accessor.is_none() {
                return Err(DbError::Structural(format!(
                    "table {} must declare a {}",
                    desc.name, what
                )));
            }
        }

        if !self.exist_named(conn, CommandKind::ExistTable, &desc.name)? {
            self.create_table(conn, desc)?;
        }
        self.field_pass(conn, desc, visiting)?;

        if self.database.config().allow_drop_columns {
            self.drop_unmatched_columns(conn, desc)?;
        }
        Ok(())
    }

    /// Create the table with its system columns, key constraint, and
    /// both timestamp triggers, inside one transaction.
    fn create_table(&self, conn: &mut Connection, desc: &TypeDesc) -> Result<()> {
        let key = desc.key_field().cloned().ok_or_else(|| {
            DbError::Structural(format!("table {} must declare a key field", desc.name))
        })?;
        let created = desc.created_field().cloned().ok_or_else(|| {
            DbError::Structural(format!("table {} must declare a created timestamp field", desc.name))
        })?;
        let changed = desc.changed_field().cloned().ok_or_else(|| {
            DbError::Structural(format!("table {} must declare a changed timestamp field", desc.name))
        })?;

        conn.begin()?;
        let outcome = self.create_table_in(conn, desc, &key, &created, &changed);
        match outcome {
            Ok(()) => conn.commit(),
            Err(err) => {
                let _ = conn.rollback();
                Err(err)
            }
        }
    }

    fn create_table_in(
        &self,
        conn: &mut Connection,
        desc: &TypeDesc,
        key: &FieldDesc,
        created: &FieldDesc,
        changed: &FieldDesc,
    ) -> Result<()> {
        let columns = [key, created, changed]
            .iter()
            .map(|f| format!("{} {}", f.name, self.column_def(f)))
            .collect::<Vec<_>>()
            .join(", ");

        let translator = self.database.translator();
        let create = fill(
            translator.command(CommandKind::CreateTable),
            &[("TABLENAME", &desc.name), ("FIELDS", &columns)],
        );
        self.ddl(conn, &create)?;

        let key_constraint = fill(
            translator.command(CommandKind::CreateKeyField),
            &[("TABLENAME", &desc.name), ("FIELDNAMEKEY", &key.name)],
        );
        self.ddl(conn, &key_constraint)?;

        self.create_trigger(
            conn,
            desc,
            &format!("TR_BI_{}", desc.name),
            TriggerEvent::BeforeInsert,
            translator.trigger_insert_body(&desc.name, &key.name, &created.name, &changed.name),
        )?;
        self.create_trigger(
            conn,
            desc,
            &format!("TR_BU_{}", desc.name),
            TriggerEvent::BeforeUpdate,
            translator.trigger_update_body(&desc.name, &key.name, &changed.name),
        )?;
        Ok(())
    }

    fn create_trigger(
        &self,
        conn: &mut Connection,
        desc: &TypeDesc,
        name: &str,
        event: TriggerEvent,
        body: String,
    ) -> Result<()> {
        let translator = self.database.translator();
        let event_word = translator.trigger_event(event);

        // PostgreSQL routes the body through a trigger function; the
        // trigger statement then references the function by name.
        let is_postgres = matches!(translator.dialect(), crate::dialect::Dialect::PostgreSql);
        let code = if is_postgres {
            let function = format!("TRF_{}", name);
            let create_function = fill(
                translator.command(CommandKind::CreateProcedure),
                &[("NAME", function.as_str()), ("CODE", body.as_str())],
            );
            self.ddl(conn, &create_function)?;
            function
        } else {
            body
        };

        let create = fill(
            translator.command(CommandKind::CreateTrigger),
            &[
                ("NAME", name),
                ("TABLENAME", &desc.name),
                ("EVENT", event_word),
                ("CODE", &code),
            ],
        );
        self.ddl(conn, &create)
    }

    /// Per-field convergence: create missing columns, widen narrow
    /// strings, rebuild declared indexes, and install foreign keys.
    fn field_pass(&self, conn: &mut Connection, desc: &TypeDesc, visiting: &mut Vec<u32>) -> Result<()> {
        for field in desc.fields() {
            if !self.exist_field(conn, &desc.name, &field.name)? {
                let def = self.column_def(field);
                let create = fill(
                    self.database.translator().command(CommandKind::CreateField),
                    &[("TABLENAME", &desc.name), ("NAME", &field.name), ("CODE", &def)],
                );
                self.ddl(conn, &create)?;
            } else if field.host_type == HostType::Text && field.max_length > 0 {
                if let Some(live) = self.field_length(conn, &desc.name, &field.name)? {
                    if live < i64::from(field.max_length) {
                        let def = self.column_def(field);
                        let alter = fill(
                            self.database.translator().command(CommandKind::AlterFieldLength),
                            &[("TABLENAME", &desc.name), ("NAME", &field.name), ("CODE", &def)],
                        );
                        self.ddl(conn, &alter)?;
                    }
                }
            }

            if field.indexed {
                self.rebuild_index(conn, desc, field)?;
            }

            if let Some(target) = &field.constraint_type {
                let target_desc = target.describe()?;
                self.check_in(conn, &target_desc, false, visiting)?;
                self.ensure_foreign_key(conn, desc, field, &target_desc)?;
            }
        }
        Ok(())
    }

    fn index_name(&self, desc: &TypeDesc, field: &FieldDesc) -> String {
        // System-role indexes get the table id appended so the shared
        // field names cannot collide across tables.
        if field.is_system() {
            format!("IDX_{}_{}", field.name, desc.id)
        } else {
            format!("IDX_{}", field.name)
        }
    }

    fn rebuild_index(&self, conn: &mut Connection, desc: &TypeDesc, field: &FieldDesc) -> Result<()> {
        let translator = self.database.translator();
        let index = self.index_name(desc, field);
        if self.exist_named(conn, CommandKind::ExistIndex, &index)? {
            let drop = fill(
                translator.command(CommandKind::DropIndex),
                &[("NAME", index.as_str()), ("TABLENAME", desc.name.as_str())],
            );
            self.ddl(conn, &drop)?;
        }

        let mut options = String::new();
        if field.unique {
            options.push_str("UNIQUE ");
        }
        if field.index_descending && translator.dialect().is_firebird() {
            options.push_str("DESCENDING ");
        }
        let body = field
            .index_definition
            .clone()
            .unwrap_or_else(|| match (field.index_descending, translator.dialect().is_firebird()) {
                (true, false) => format!("{} DESC", field.name),
                _ => field.name.clone(),
            });

        let create = fill(
            translator.command(CommandKind::CreateIndex),
            &[
                ("FIELDOPTIONS", options.as_str()),
                ("NAME", index.as_str()),
                ("TABLENAME", desc.name.as_str()),
                ("FIELDS", body.as_str()),
            ],
        );
        self.ddl(conn, &create)
    }

    fn ensure_foreign_key(
        &self,
        conn: &mut Connection,
        desc: &TypeDesc,
        field: &FieldDesc,
        target: &TypeDesc,
    ) -> Result<()> {
        let constraint = format!("FKEY_{}", field.name);
        if self.exist_named(conn, CommandKind::ExistConstraint, &constraint)? {
            return Ok(());
        }
        let target_key = target.key_field().ok_or_else(|| {
            DbError::Structural(format!("referenced table {} has no key field", target.name))
        })?;
        let code = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
            field.name,
            target.name,
            target_key.name,
            field.constraint_on_update.sql(),
            field.constraint_on_delete.sql(),
        );
        let create = fill(
            self.database.translator().command(CommandKind::CreateConstraint),
            &[
                ("TABLENAME", desc.name.as_str()),
                ("NAME", constraint.as_str()),
                ("CODE", code.as_str()),
            ],
        );
        self.ddl(conn, &create)
    }

    fn drop_unmatched_columns(&self, conn: &mut Connection, desc: &TypeDesc) -> Result<()> {
        let translator = self.database.translator();
        let list = fill(
            translator.command(CommandKind::FieldList),
            &[("TABLENAME", &desc.name)],
        );
        let live = conn.rows(&list, Vec::new())?;
        for row in &live.rows {
            let Some(column) = row.first().and_then(|v| v.as_str()) else {
                continue;
            };
            if desc.field(column).is_some() {
                continue;
            }
            let index = format!("IDX_{}", column);
            if self.exist_named(conn, CommandKind::ExistIndex, &index)? {
                let drop_index = fill(
                    translator.command(CommandKind::DropIndex),
                    &[("NAME", index.as_str()), ("TABLENAME", desc.name.as_str())],
                );
                self.ddl(conn, &drop_index)?;
            }
            debug!(table = %desc.name, column, "dropping unmatched column");
            let drop = fill(
                translator.command(CommandKind::DropField),
                &[("TABLENAME", desc.name.as_str()), ("NAME", column)],
            );
            self.ddl(conn, &drop)?;
        }
        Ok(())
    }

    /// Switch the timestamp triggers of a table on or off, e.g. around a
    /// bulk import that carries its own timestamps.
    pub fn set_triggers_enabled(&self, desc: &TypeDesc, enabled: bool) -> Result<()> {
        if desc.is_view() {
            return Err(DbError::Structural(format!("{} is a view and has no triggers", desc.name)));
        }
        let mut conn = self.database.open_connection()?;
        let translator = self.database.translator();
        let kind = if enabled {
            CommandKind::EnableTrigger
        } else {
            CommandKind::DisableTrigger
        };
        for trigger in [format!("TR_BI_{}", desc.name), format!("TR_BU_{}", desc.name)] {
            if !self.exist_named(&mut conn, CommandKind::ExistTrigger, &trigger)? {
                continue;
            }
            let sql = fill(
                translator.command(kind),
                &[("NAME", trigger.as_str()), ("TABLENAME", desc.name.as_str())],
            );
            self.ddl(&mut conn, &sql)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Views are dropped and recreated wholesale; view-only columns come
    /// first, then the source-mapped ones aliased onto their view names.
    fn check_view(&self, conn: &mut Connection, desc: &TypeDesc) -> Result<()> {
        let translator = self.database.translator();
        if self.exist_named(conn, CommandKind::ExistView, &desc.name)? {
            let drop = fill(translator.command(CommandKind::DropView), &[("NAME", &desc.name)]);
            self.ddl(conn, &drop)?;
        }

        let template = desc.query_template.clone().ok_or_else(|| {
            DbError::Structural(format!("view {} must declare a query template", desc.name))
        })?;

        let mut columns: Vec<String> = Vec::new();
        for field in desc.fields().iter().filter(|f| f.source_field.is_none()) {
            columns.push(field.name.clone());
        }
        for field in desc.fields().iter().filter(|f| f.source_field.is_some()) {
            let source = field.source_field.as_deref().unwrap_or(&field.name);
            if source.eq_ignore_ascii_case(&field.name) {
                columns.push(field.name.clone());
            } else {
                columns.push(format!("{} AS {}", source, field.name));
            }
        }

        let query = template.replace("#FIELDS#", &columns.join(", "));
        let create = fill(
            translator.command(CommandKind::CreateView),
            &[("NAME", desc.name.as_str()), ("QUERY", query.as_str())],
        );
        self.ddl(conn, &create)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn column_def(&self, field: &FieldDesc) -> String {
        let translator = self.database.translator();
        let template = translator.field_def(field.host_type, field.max_length);
        fill(
            template,
            &[
                ("SIZE", &field.max_length.to_string()),
                ("BLOCKSIZE", &field.blob_block_size.to_string()),
            ],
        )
    }

    /// Execute one DDL statement wrapped by the dialect's schema gates.
    fn ddl(&self, conn: &mut Connection, sql: &str) -> Result<()> {
        let translator = self.database.translator();
        let before = translator.command(CommandKind::BeforeAlterSchema);
        let after = translator.command(CommandKind::AfterAlterSchema);

        if !before.is_empty() {
            conn.execute(before, Vec::new())
                .map_err(|e| DbError::schema(e.to_string(), before))?;
        }
        conn.execute(sql, Vec::new())
            .map_err(|e| DbError::schema(e.to_string(), sql))?;
        if !after.is_empty() {
            conn.execute(after, Vec::new())
                .map_err(|e| DbError::schema(e.to_string(), after))?;
        }
        Ok(())
    }

    fn exist_named(&self, conn: &mut Connection, kind: CommandKind, name: &str) -> Result<bool> {
        let sql = fill(self.database.translator().command(kind), &[("NAME", name)]);
        let count = conn.scalar(&sql, Vec::new())?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    fn exist_field(&self, conn: &mut Connection, table: &str, field: &str) -> Result<bool> {
        let sql = fill(
            self.database.translator().command(CommandKind::ExistField),
            &[("TABLENAME", table), ("NAME", field)],
        );
        let count = conn.scalar(&sql, Vec::new())?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    fn field_length(&self, conn: &mut Connection, table: &str, field: &str) -> Result<Option<i64>> {
        let sql = fill(
            self.database.translator().command(CommandKind::FieldLength),
            &[("TABLENAME", table), ("NAME", field)],
        );
        Ok(conn.scalar(&sql, Vec::new())?.as_i64())
    }
}
