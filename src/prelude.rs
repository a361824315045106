//! Recommended API entrypoints grouped by abstraction level.
//!
//! `orm` is the stable default for application code declaring and
//! persisting entities. `advanced` is an explicit escape hatch for the
//! translation and schema internals.

pub mod orm {
    //! Stable high-level surface for entity-first applications.
    //!
    //! Intended usage in app code: declare entities with the metadata
    //! builder, stand up a `Database` from a `DbConfig`, and work
    //! through scoped connections and the query builder.
    pub use crate::{
        ConflictMode, Database, DbConfig, DbError, Dialect, EntityCore, FieldDesc, FieldRole,
        HostType, JoinMode, JoinOn, OrderMode, Persistent, QueryBuilder, ReadOptions, Result,
        TypeDesc, TypeDescBuilder, Value,
    };
}

pub mod advanced {
    //! Escape hatch for translation and schema internals.
    //!
    //! App-level product code should normally stay on `prelude::orm`.
    pub use crate::dialect::{CommandKind, SnippetTable, Translator, TriggerEvent};
    pub use crate::driver::{Driver, DriverConnection, DriverRows};
    pub use crate::events::{publish, subscribe, subscribe_filtered, EventMessage};
    pub use crate::model::{EntityRef, Registry};
    pub use crate::schema::{SchemaEngine, SystemInformation};
}
