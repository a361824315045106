use super::Dialect;
use crate::model::HostType;

/// Abstract commands the translator can render for any dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    DropTable,
    CreateTable,
    ExistTable,
    DropView,
    CreateView,
    ExistView,
    DropIndex,
    CreateIndex,
    ExistIndex,
    DropTrigger,
    CreateTrigger,
    ExistTrigger,
    EnableTrigger,
    DisableTrigger,
    DropProcedure,
    CreateProcedure,
    ExistProcedure,
    DropConstraint,
    CreateConstraint,
    ExistConstraint,
    DropField,
    CreateField,
    ExistField,
    AlterFieldLength,
    FieldList,
    FieldLength,
    CreateKeyField,
    Select,
    SelectTop,
    SelectByKey,
    SelectCount,
    SelectSum,
    ExistByKey,
    LoadFieldValue,
    Insert,
    Update,
    Delete,
    BeforeAlterSchema,
    AfterAlterSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    BeforeInsert,
    BeforeUpdate,
    BeforeDelete,
    AfterInsert,
    AfterUpdate,
    AfterDelete,
}

/// Substitute `#KEY#` placeholders in a template.
pub fn fill(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("#{}#", key), value);
    }
    out
}

/// Dialect-neutral base set; dialects override where they diverge.
fn base(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::DropTable => "DROP TABLE #TABLENAME#",
        CommandKind::CreateTable => "CREATE TABLE #TABLENAME# (#FIELDS#)",
        CommandKind::DropView => "DROP VIEW #NAME#",
        CommandKind::CreateView => "CREATE VIEW #NAME# AS #QUERY#",
        CommandKind::DropIndex => "DROP INDEX #NAME#",
        CommandKind::CreateIndex => "CREATE #FIELDOPTIONS#INDEX #NAME# ON #TABLENAME# (#FIELDS#)",
        CommandKind::DropTrigger => "DROP TRIGGER #NAME#",
        CommandKind::DropProcedure => "DROP PROCEDURE #NAME#",
        CommandKind::DropConstraint => "ALTER TABLE #TABLENAME# DROP CONSTRAINT #NAME#",
        CommandKind::CreateConstraint => "ALTER TABLE #TABLENAME# ADD CONSTRAINT #NAME# #CODE#",
        CommandKind::DropField => "ALTER TABLE #TABLENAME# DROP COLUMN #NAME#",
        CommandKind::CreateField => "ALTER TABLE #TABLENAME# ADD #NAME# #CODE#",
        CommandKind::CreateKeyField => {
            "ALTER TABLE #TABLENAME# ADD CONSTRAINT PK_#TABLENAME# PRIMARY KEY (#FIELDNAMEKEY#)"
        }
        CommandKind::Select => "SELECT #FIELDS# FROM #TABLENAME#",
        CommandKind::SelectTop => "SELECT #FIELDS# FROM #TABLENAME#",
        CommandKind::SelectByKey => "SELECT #FIELDS# FROM #TABLENAME# WHERE #FIELDNAMEKEY# = @v0",
        CommandKind::SelectCount => "SELECT COUNT(#NAME#) FROM #TABLENAME#",
        CommandKind::SelectSum => "SELECT SUM(#NAME#) FROM #TABLENAME#",
        CommandKind::ExistByKey => "SELECT COUNT(*) FROM #TABLENAME# WHERE #FIELDNAMEKEY# = @v0",
        CommandKind::LoadFieldValue => "SELECT #NAME# FROM #TABLENAME# WHERE #FIELDNAMEKEY# = @v0",
        CommandKind::Insert => "INSERT INTO #TABLENAME# (#FIELDS#) VALUES (#VALUES#)",
        CommandKind::Update => "UPDATE #TABLENAME# SET #PAIRS# WHERE #FIELDNAMEKEY# = @v0",
        CommandKind::Delete => "DELETE FROM #TABLENAME# WHERE #FIELDNAMEKEY# = @v0",
        CommandKind::BeforeAlterSchema | CommandKind::AfterAlterSchema => "",
        // Anything catalog-specific has no sensible neutral form.
        _ => "",
    }
}

fn mssql(kind: CommandKind) -> Option<&'static str> {
    Some(match kind {
        CommandKind::ExistTable => {
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = '#NAME#' AND TABLE_TYPE = 'BASE TABLE'"
        }
        CommandKind::ExistView => {
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_NAME = '#NAME#'"
        }
        CommandKind::ExistField => {
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = '#TABLENAME#' AND COLUMN_NAME = '#NAME#'"
        }
        CommandKind::FieldList => {
            "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = '#TABLENAME#' ORDER BY ORDINAL_POSITION"
        }
        CommandKind::FieldLength => {
            "SELECT CHARACTER_MAXIMUM_LENGTH FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = '#TABLENAME#' AND COLUMN_NAME = '#NAME#'"
        }
        CommandKind::ExistIndex => "SELECT COUNT(*) FROM sys.indexes WHERE name = '#NAME#'",
        CommandKind::ExistTrigger => "SELECT COUNT(*) FROM sys.triggers WHERE name = '#NAME#'",
        CommandKind::ExistProcedure => "SELECT COUNT(*) FROM sys.procedures WHERE name = '#NAME#'",
        CommandKind::ExistConstraint => {
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS WHERE CONSTRAINT_NAME = '#NAME#'"
        }
        CommandKind::DropIndex => "DROP INDEX #NAME# ON #TABLENAME#",
        CommandKind::SelectTop => "SELECT TOP #COUNT# #FIELDS# FROM #TABLENAME#",
        CommandKind::CreateTrigger => {
            "CREATE TRIGGER #NAME# ON #TABLENAME# #EVENT# AS BEGIN SET NOCOUNT ON; #CODE# END"
        }
        CommandKind::EnableTrigger => "ENABLE TRIGGER #NAME# ON #TABLENAME#",
        CommandKind::DisableTrigger => "DISABLE TRIGGER #NAME# ON #TABLENAME#",
        CommandKind::AlterFieldLength => "ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# #CODE#",
        _ => return None,
    })
}

fn postgres(kind: CommandKind) -> Option<&'static str> {
    Some(match kind {
        CommandKind::ExistTable => {
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = '#NAME#' AND table_schema = 'public' AND table_type = 'BASE TABLE'"
        }
        CommandKind::ExistView => {
            "SELECT COUNT(*) FROM information_schema.views WHERE table_name = '#NAME#' AND table_schema = 'public'"
        }
        CommandKind::ExistField => {
            "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = '#TABLENAME#' AND column_name = '#NAME#'"
        }
        CommandKind::FieldList => {
            "SELECT column_name FROM information_schema.columns WHERE table_name = '#TABLENAME#' ORDER BY ordinal_position"
        }
        CommandKind::FieldLength => {
            "SELECT character_maximum_length FROM information_schema.columns WHERE table_name = '#TABLENAME#' AND column_name = '#NAME#'"
        }
        CommandKind::ExistIndex => "SELECT COUNT(*) FROM pg_indexes WHERE indexname = '#NAME#'",
        CommandKind::ExistTrigger => {
            "SELECT COUNT(*) FROM information_schema.triggers WHERE trigger_name = '#NAME#'"
        }
        CommandKind::ExistProcedure => "SELECT COUNT(*) FROM pg_proc WHERE proname = '#NAME#'",
        CommandKind::ExistConstraint => {
            "SELECT COUNT(*) FROM information_schema.table_constraints WHERE constraint_name = '#NAME#'"
        }
        CommandKind::SelectTop => "SELECT #FIELDS# FROM #TABLENAME# LIMIT #COUNT#",
        CommandKind::CreateField => "ALTER TABLE #TABLENAME# ADD COLUMN #NAME# #CODE#",
        CommandKind::CreateProcedure => {
            "CREATE OR REPLACE FUNCTION #NAME#() RETURNS trigger AS $$ BEGIN #CODE# RETURN NEW; END; $$ LANGUAGE plpgsql"
        }
        CommandKind::CreateTrigger => {
            "CREATE TRIGGER #NAME# #EVENT# ON #TABLENAME# FOR EACH ROW EXECUTE FUNCTION #CODE#()"
        }
        CommandKind::DropTrigger => "DROP TRIGGER #NAME# ON #TABLENAME#",
        CommandKind::EnableTrigger => "ALTER TABLE #TABLENAME# ENABLE TRIGGER #NAME#",
        CommandKind::DisableTrigger => "ALTER TABLE #TABLENAME# DISABLE TRIGGER #NAME#",
        CommandKind::AlterFieldLength => "ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# TYPE #CODE#",
        _ => return None,
    })
}

fn firebird(kind: CommandKind) -> Option<&'static str> {
    Some(match kind {
        CommandKind::ExistTable => {
            "SELECT COUNT(*) FROM RDB$RELATIONS WHERE RDB$RELATION_NAME = '#NAME#' AND RDB$VIEW_BLR IS NULL"
        }
        CommandKind::ExistView => {
            "SELECT COUNT(*) FROM RDB$RELATIONS WHERE RDB$RELATION_NAME = '#NAME#' AND RDB$VIEW_BLR IS NOT NULL"
        }
        CommandKind::ExistField => {
            "SELECT COUNT(*) FROM RDB$RELATION_FIELDS WHERE RDB$RELATION_NAME = '#TABLENAME#' AND RDB$FIELD_NAME = '#NAME#'"
        }
        CommandKind::FieldList => {
            "SELECT TRIM(RDB$FIELD_NAME) FROM RDB$RELATION_FIELDS WHERE RDB$RELATION_NAME = '#TABLENAME#' ORDER BY RDB$FIELD_POSITION"
        }
        CommandKind::FieldLength => {
            "SELECT F.RDB$CHARACTER_LENGTH FROM RDB$RELATION_FIELDS RF JOIN RDB$FIELDS F ON F.RDB$FIELD_NAME = RF.RDB$FIELD_SOURCE WHERE RF.RDB$RELATION_NAME = '#TABLENAME#' AND RF.RDB$FIELD_NAME = '#NAME#'"
        }
        CommandKind::ExistIndex => {
            "SELECT COUNT(*) FROM RDB$INDICES WHERE RDB$INDEX_NAME = '#NAME#'"
        }
        CommandKind::ExistTrigger => {
            "SELECT COUNT(*) FROM RDB$TRIGGERS WHERE RDB$TRIGGER_NAME = '#NAME#'"
        }
        CommandKind::ExistProcedure => {
            "SELECT COUNT(*) FROM RDB$PROCEDURES WHERE RDB$PROCEDURE_NAME = '#NAME#'"
        }
        CommandKind::ExistConstraint => {
            "SELECT COUNT(*) FROM RDB$RELATION_CONSTRAINTS WHERE RDB$CONSTRAINT_NAME = '#NAME#'"
        }
        CommandKind::SelectTop => "SELECT FIRST #COUNT# #FIELDS# FROM #TABLENAME#",
        CommandKind::DropField => "ALTER TABLE #TABLENAME# DROP #NAME#",
        CommandKind::CreateTrigger => {
            "CREATE TRIGGER #NAME# FOR #TABLENAME# ACTIVE #EVENT# POSITION 0 AS BEGIN #CODE# END"
        }
        CommandKind::EnableTrigger => "ALTER TRIGGER #NAME# ACTIVE",
        CommandKind::DisableTrigger => "ALTER TRIGGER #NAME# INACTIVE",
        CommandKind::AlterFieldLength => "ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# TYPE #CODE#",
        _ => return None,
    })
}

pub(super) fn template(dialect: Dialect, kind: CommandKind) -> &'static str {
    let specific = match dialect {
        Dialect::MsSql | Dialect::AzureSql => mssql(kind),
        Dialect::PostgreSql => postgres(kind),
        Dialect::FirebirdServer | Dialect::FirebirdEmbedded => firebird(kind),
    };
    specific.unwrap_or_else(|| base(kind))
}

pub(super) fn trigger_event(dialect: Dialect, event: TriggerEvent) -> &'static str {
    // MS SQL has no BEFORE triggers; the before events install as AFTER
    // bodies that update the joined inserted rows.
    if dialect.is_mssql() {
        return match event {
            TriggerEvent::BeforeInsert | TriggerEvent::AfterInsert => "AFTER INSERT",
            TriggerEvent::BeforeUpdate | TriggerEvent::AfterUpdate => "AFTER UPDATE",
            TriggerEvent::BeforeDelete | TriggerEvent::AfterDelete => "AFTER DELETE",
        };
    }
    match event {
        TriggerEvent::BeforeInsert => "BEFORE INSERT",
        TriggerEvent::BeforeUpdate => "BEFORE UPDATE",
        TriggerEvent::BeforeDelete => "BEFORE DELETE",
        TriggerEvent::AfterInsert => "AFTER INSERT",
        TriggerEvent::AfterUpdate => "AFTER UPDATE",
        TriggerEvent::AfterDelete => "AFTER DELETE",
    }
}

pub(super) fn field_def(dialect: Dialect, host: HostType, max_length: i32) -> &'static str {
    let memo = max_length < 0;
    match dialect {
        Dialect::MsSql | Dialect::AzureSql => match host {
            HostType::Int8 | HostType::Int16 => "SMALLINT",
            HostType::Int32 | HostType::Enum => "INT",
            HostType::Int64 => "BIGINT",
            HostType::Float32 => "REAL",
            HostType::Float64 => "FLOAT",
            HostType::Decimal => "DECIMAL(18, 4)",
            HostType::Bool => "BIT",
            HostType::Text | HostType::TypeName => {
                if memo {
                    "NVARCHAR(MAX)"
                } else {
                    "NVARCHAR(#SIZE#)"
                }
            }
            HostType::Bytes | HostType::Image | HostType::Object => "VARBINARY(MAX)",
            HostType::Guid => "UNIQUEIDENTIFIER",
            HostType::DateTime => "DATETIME2",
        },
        Dialect::PostgreSql => match host {
            HostType::Int8 | HostType::Int16 => "SMALLINT",
            HostType::Int32 | HostType::Enum => "INTEGER",
            HostType::Int64 => "BIGINT",
            HostType::Float32 => "REAL",
            HostType::Float64 => "DOUBLE PRECISION",
            HostType::Decimal => "NUMERIC(18, 4)",
            HostType::Bool => "BOOLEAN",
            HostType::Text | HostType::TypeName => {
                if memo {
                    "TEXT"
                } else {
                    "VARCHAR(#SIZE#)"
                }
            }
            HostType::Bytes | HostType::Image | HostType::Object => "BYTEA",
            HostType::Guid => "UUID",
            HostType::DateTime => "TIMESTAMP",
        },
        Dialect::FirebirdServer | Dialect::FirebirdEmbedded => match host {
            HostType::Int8 | HostType::Int16 => "SMALLINT",
            HostType::Int32 | HostType::Enum => "INTEGER",
            HostType::Int64 => "BIGINT",
            HostType::Float32 => "FLOAT",
            HostType::Float64 => "DOUBLE PRECISION",
            HostType::Decimal => "DECIMAL(18, 4)",
            HostType::Bool => "BOOLEAN",
            HostType::Text | HostType::TypeName => {
                if memo {
                    "BLOB SUB_TYPE TEXT SEGMENT SIZE #BLOCKSIZE#"
                } else {
                    "VARCHAR(#SIZE#)"
                }
            }
            HostType::Bytes | HostType::Image | HostType::Object => {
                "BLOB SUB_TYPE BINARY SEGMENT SIZE #BLOCKSIZE#"
            }
            HostType::Guid => "CHAR(16) CHARACTER SET OCTETS",
            HostType::DateTime => "TIMESTAMP",
        },
    }
}

/// Complete trigger body assigning the created and changed timestamps on
/// insert. Field names are substituted here rather than carried as
/// template placeholders because each entity names its system columns.
pub(super) fn trigger_insert_body(
    dialect: Dialect,
    table: &str,
    key: &str,
    created: &str,
    changed: &str,
) -> String {
    match dialect {
        Dialect::MsSql | Dialect::AzureSql => format!(
            "UPDATE t SET t.{created} = SYSUTCDATETIME(), t.{changed} = SYSUTCDATETIME() \
             FROM {table} t INNER JOIN inserted i ON t.{key} = i.{key};"
        ),
        Dialect::PostgreSql => {
            format!("NEW.{created} := CURRENT_TIMESTAMP; NEW.{changed} := CURRENT_TIMESTAMP;")
        }
        Dialect::FirebirdServer | Dialect::FirebirdEmbedded => {
            format!("NEW.{created} = CURRENT_TIMESTAMP; NEW.{changed} = CURRENT_TIMESTAMP;")
        }
    }
}

pub(super) fn trigger_update_body(dialect: Dialect, table: &str, key: &str, changed: &str) -> String {
    match dialect {
        Dialect::MsSql | Dialect::AzureSql => format!(
            "UPDATE t SET t.{changed} = SYSUTCDATETIME() \
             FROM {table} t INNER JOIN inserted i ON t.{key} = i.{key};"
        ),
        Dialect::PostgreSql => format!("NEW.{changed} := CURRENT_TIMESTAMP;"),
        Dialect::FirebirdServer | Dialect::FirebirdEmbedded => {
            format!("NEW.{changed} = CURRENT_TIMESTAMP;")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_all_placeholders() {
        let sql = fill(
            "SELECT #FIELDS# FROM #TABLENAME# WHERE #FIELDNAMEKEY# = @v0",
            &[("FIELDS", "NAME"), ("TABLENAME", "PERSON"), ("FIELDNAMEKEY", "SYS_ID")],
        );
        assert_eq!(sql, "SELECT NAME FROM PERSON WHERE SYS_ID = @v0");
    }

    #[test]
    fn test_exist_table_uses_dialect_catalog() {
        assert!(template(Dialect::MsSql, CommandKind::ExistTable).contains("INFORMATION_SCHEMA"));
        assert!(template(Dialect::PostgreSql, CommandKind::ExistTable).contains("information_schema"));
        assert!(template(Dialect::FirebirdServer, CommandKind::ExistTable).contains("RDB$RELATIONS"));
    }

    #[test]
    fn test_mssql_maps_before_events_to_after() {
        assert_eq!(trigger_event(Dialect::MsSql, TriggerEvent::BeforeInsert), "AFTER INSERT");
        assert_eq!(trigger_event(Dialect::PostgreSql, TriggerEvent::BeforeInsert), "BEFORE INSERT");
        assert_eq!(trigger_event(Dialect::FirebirdServer, TriggerEvent::BeforeUpdate), "BEFORE UPDATE");
    }

    #[test]
    fn test_memo_text_defs() {
        assert_eq!(field_def(Dialect::MsSql, HostType::Text, -1), "NVARCHAR(MAX)");
        assert_eq!(field_def(Dialect::PostgreSql, HostType::Text, -1), "TEXT");
        assert!(field_def(Dialect::FirebirdServer, HostType::Text, -1).contains("#BLOCKSIZE#"));
        assert_eq!(field_def(Dialect::PostgreSql, HostType::Text, 80), "VARCHAR(#SIZE#)");
    }

    #[test]
    fn test_trigger_bodies_complete_per_dialect() {
        let fb = trigger_insert_body(Dialect::FirebirdServer, "PERSON", "SYS_ID", "SYS_CREATED", "SYS_CHANGED");
        assert!(fb.contains("NEW.SYS_CREATED = CURRENT_TIMESTAMP"));

        let pg = trigger_update_body(Dialect::PostgreSql, "PERSON", "SYS_ID", "SYS_CHANGED");
        assert!(pg.contains("NEW.SYS_CHANGED := CURRENT_TIMESTAMP"));

        let ms = trigger_insert_body(Dialect::MsSql, "PERSON", "SYS_ID", "SYS_CREATED", "SYS_CHANGED");
        assert!(ms.contains("INNER JOIN inserted"));
    }
}
