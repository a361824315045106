mod builder;

pub use builder::{JoinMode, JoinOn, QueryBuilder, QueryType};
