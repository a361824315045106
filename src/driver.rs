//! The opaque database driver boundary.
//!
//! The mapper never opens sockets itself; it hands parameterized SQL to
//! whatever implements these traits and consumes scalar or row results.
//! Concrete drivers (native clients, test doubles) live outside the
//! crate.

use crate::core::{Result, Value};

/// Server-level entry point supplied by the configuration factory.
pub trait Driver: Send + Sync {
    /// Open one connection. The mapper treats the handle as exclusively
    /// owned and releases it by dropping.
    fn connect(&self, connection_string: &str, user: &str, password: &str)
        -> Result<Box<dyn DriverConnection>>;

    fn database_exists(&self, connection_string: &str, user: &str, password: &str) -> Result<bool>;

    fn create_database(&self, connection_string: &str, user: &str, password: &str) -> Result<()>;
}

/// One open connection. Parameters arrive as `(name, value)` pairs whose
/// names match the `@p0`/`@v0` placeholders the mapper rewrites into the
/// SQL text.
pub trait DriverConnection: Send {
    /// Execute a statement; returns the affected-row count.
    fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<u64>;

    fn query(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Box<dyn DriverRows>>;

    /// First column of the first row; `Value::Null` when no row matched.
    fn scalar(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Value>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// Forward-only result cursor.
pub trait DriverRows: Send {
    fn columns(&self) -> &[String];

    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}
