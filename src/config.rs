use std::sync::Arc;

use crate::driver::Driver;
use crate::dialect::Dialect;
use crate::model::EntityRef;

/// Write-conflict policy applied on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    /// Reject the save when the stored changed-timestamp is newer than
    /// the instance's.
    FirstWins,
    /// Last writer overwrites unconditionally.
    LastWins,
}

/// Database configuration.
///
/// Collects everything needed to stand up a [`crate::database::Database`]:
/// connection parameters, the dialect, convergence policy, the driver
/// factory, and the entity types the schema engine manages.
#[derive(Clone)]
pub struct DbConfig {
    pub database_name: String,
    pub connection_string: String,
    pub dialect: Dialect,
    pub conflict_mode: ConflictMode,
    pub allow_drop_columns: bool,
    pub base_table_types: Vec<EntityRef>,
    pub base_view_types: Vec<EntityRef>,
    /// Custom snippet registrations applied to the translator: portable
    /// `NAME(...)` functions or `#...#` placeholders mapped to dialect
    /// fragments.
    pub snippets: Vec<(String, String)>,
    pub driver: Arc<dyn Driver>,
}

impl DbConfig {
    pub fn new(
        database_name: impl Into<String>,
        connection_string: impl Into<String>,
        dialect: Dialect,
        driver: Arc<dyn Driver>,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            connection_string: connection_string.into(),
            dialect,
            conflict_mode: ConflictMode::FirstWins,
            allow_drop_columns: false,
            base_table_types: Vec::new(),
            base_view_types: Vec::new(),
            snippets: Vec::new(),
            driver,
        }
    }

    pub fn conflict_mode(mut self, mode: ConflictMode) -> Self {
        self.conflict_mode = mode;
        self
    }

    pub fn allow_drop_columns(mut self) -> Self {
        self.allow_drop_columns = true;
        self
    }

    pub fn table(mut self, entity: EntityRef) -> Self {
        self.base_table_types.push(entity);
        self
    }

    pub fn view(mut self, entity: EntityRef) -> Self {
        self.base_view_types.push(entity);
        self
    }

    pub fn snippet(mut self, name: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.snippets.push((name.into(), replacement.into()));
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database_name.trim().is_empty() {
            return Err("database_name must not be empty".into());
        }
        if self.connection_string.trim().is_empty() {
            return Err("connection_string must not be empty".into());
        }
        Ok(())
    }
}
