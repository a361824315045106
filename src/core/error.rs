use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Schema error: {message} (ddl: {ddl})")]
    Schema { message: String, ddl: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Conversion error: cannot convert {from} into {to}")]
    Conversion { from: String, to: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Conversion {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn schema(message: impl Into<String>, ddl: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            ddl: ddl.into(),
        }
    }

    /// True for errors the caller can meaningfully retry after reloading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
