// ============================================================================
// RustOrmDB Library
// ============================================================================
//
// Object-relational mapper for SQL databases. Entities are declared with
// a metadata builder, registered once in a process-wide registry, and
// stored, loaded, and queried through scoped connections that translate
// abstract commands into one of the supported dialects. The schema
// engine converges the live database to the declared metadata, gated by
// a per-entity version number.

pub mod changelog;
pub mod codec;
pub mod config;
pub mod connection;
pub mod core;
pub mod database;
pub mod dialect;
pub mod driver;
pub mod events;
pub mod model;
pub mod prelude;
pub mod query;
pub mod schema;

// Re-export main types for convenience
pub use crate::core::{DbError, Result, Value};
pub use changelog::{ChangeEntry, ChangeLog, MemoryChangeLog};
pub use config::{ConflictMode, DbConfig};
pub use connection::{Connection, EntityReader, OrderMode, ReadOptions, RowSet};
pub use database::{Database, TraceEvent};
pub use dialect::{CommandKind, Dialect, NameCasing, Translator, TriggerEvent};
pub use driver::{Driver, DriverConnection, DriverRows};
pub use events::{ChangeKind, EventMessage, SubscriptionToken};
pub use model::{
    ConstraintAction, EntityCore, EntityRef, FieldDesc, FieldRole, HostType, Persistent, Registry,
    TypeDesc, TypeDescBuilder,
};
pub use query::{JoinMode, JoinOn, QueryBuilder, QueryType};
pub use schema::{SchemaEngine, SystemInformation};
