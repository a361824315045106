//! Translation from abstract commands and host values to one concrete
//! SQL dialect: command templates, trigger-event words, value
//! marshalling, and the portable function-snippet rewriter.

mod command;
mod marshal;
mod rewrite;

pub use command::{fill, CommandKind, TriggerEvent};
pub use rewrite::SnippetTable;

use crate::core::{Result, Value};
use crate::model::HostType;

/// The supported SQL variants. Drives both command templates and value
/// marshalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MsSql,
    AzureSql,
    PostgreSql,
    FirebirdServer,
    FirebirdEmbedded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCasing {
    Original,
    Lower,
    Upper,
}

impl Dialect {
    pub fn name_casing(self) -> NameCasing {
        match self {
            Self::MsSql | Self::AzureSql => NameCasing::Original,
            Self::PostgreSql => NameCasing::Lower,
            Self::FirebirdServer | Self::FirebirdEmbedded => NameCasing::Upper,
        }
    }

    pub fn is_firebird(self) -> bool {
        matches!(self, Self::FirebirdServer | Self::FirebirdEmbedded)
    }

    pub fn is_mssql(self) -> bool {
        matches!(self, Self::MsSql | Self::AzureSql)
    }
}

/// One translator per database; cheap to clone.
#[derive(Debug, Clone)]
pub struct Translator {
    dialect: Dialect,
    snippets: SnippetTable,
}

impl Translator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            snippets: SnippetTable::with_builtins(dialect),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Textual command template with `#...#` placeholders.
    pub fn command(&self, kind: CommandKind) -> &'static str {
        command::template(self.dialect, kind)
    }

    pub fn trigger_event(&self, event: TriggerEvent) -> &'static str {
        command::trigger_event(self.dialect, event)
    }

    /// Column-type definition for a host type; still carries `#SIZE#` /
    /// `#BLOCKSIZE#` for the caller to substitute.
    pub fn field_def(&self, host: HostType, max_length: i32) -> &'static str {
        command::field_def(self.dialect, host, max_length)
    }

    pub fn trigger_insert_body(&self, table: &str, key: &str, created: &str, changed: &str) -> String {
        command::trigger_insert_body(self.dialect, table, key, created, changed)
    }

    pub fn trigger_update_body(&self, table: &str, key: &str, changed: &str) -> String {
        command::trigger_update_body(self.dialect, table, key, changed)
    }

    pub fn to_db(&self, value: &Value, host: HostType, compress: bool) -> Result<Value> {
        marshal::to_db(self.dialect, value, host, compress)
    }

    /// Marshal a raw argument whose declared type is not known; the
    /// host type is inferred from the value itself.
    pub fn to_db_auto(&self, value: &Value) -> Result<Value> {
        marshal::to_db_auto(self.dialect, value)
    }

    pub fn from_db(&self, value: Value, host: HostType) -> Result<Value> {
        marshal::from_db(value, host)
    }

    /// Apply the function-snippet rewriter until fixpoint.
    pub fn rewrite(&self, sql: &str) -> String {
        self.snippets.rewrite(sql)
    }

    pub fn add_snippet(&mut self, name: impl Into<String>, replacement: impl Into<String>) {
        self.snippets.add(name, replacement);
    }

    /// Adjust an identifier to the dialect's casing convention.
    pub fn translate_name(&self, name: &str) -> String {
        match self.dialect.name_casing() {
            NameCasing::Original => name.to_string(),
            NameCasing::Lower => name.to_ascii_lowercase(),
            NameCasing::Upper => name.to_ascii_uppercase(),
        }
    }
}
