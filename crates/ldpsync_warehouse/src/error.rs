//! Error types for warehouse operations.

use thiserror::Error;

/// Result type for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Errors that can occur while talking to the warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Could not connect to the named data source.
    #[error("failed to connect to database: {dsn}: {message}")]
    Connect {
        /// Data source name.
        dsn: String,
        /// Backend diagnostic.
        message: String,
    },

    /// A statement was rejected by the backend.
    #[error("error executing statement in database: {dsn}: {diagnostic}:\n{sql}")]
    Statement {
        /// Data source name.
        dsn: String,
        /// The offending statement text.
        sql: String,
        /// Backend diagnostic message.
        diagnostic: String,
        /// Backend diagnostic code, if the driver reports one.
        code: Option<i32>,
    },

    /// Reading a result row failed.
    #[error("error fetching data in database: {dsn}: {message}")]
    Fetch {
        /// Data source name.
        dsn: String,
        /// Backend diagnostic.
        message: String,
    },

    /// A query that must return a row returned none.
    #[error("no rows returned in database: {dsn}:\n{sql}")]
    NoRows {
        /// Data source name.
        dsn: String,
        /// The statement text.
        sql: String,
    },

    /// Commit or rollback failed.
    #[error("error {action} transaction in database: {dsn}: {message}")]
    Transaction {
        /// Data source name.
        dsn: String,
        /// "committing" or "rolling back".
        action: &'static str,
        /// Backend diagnostic.
        message: String,
    },

    /// Switching autocommit mode failed.
    #[error("error setting autocommit in database: {dsn}: {message}")]
    Autocommit {
        /// Data source name.
        dsn: String,
        /// Backend diagnostic.
        message: String,
    },

    /// The backend product is not one this crate knows how to address.
    #[error("unsupported database system: {0}")]
    UnsupportedDbms(String),
}

impl WarehouseError {
    /// Creates a statement error from a backend diagnostic.
    pub fn statement(
        dsn: impl Into<String>,
        sql: impl Into<String>,
        diagnostic: impl Into<String>,
        code: Option<i32>,
    ) -> Self {
        Self::Statement {
            dsn: dsn.into(),
            sql: sql.into(),
            diagnostic: diagnostic.into(),
            code,
        }
    }

    /// Returns the statement text for statement errors.
    pub fn sql(&self) -> Option<&str> {
        match self {
            WarehouseError::Statement { sql, .. } | WarehouseError::NoRows { sql, .. } => {
                Some(sql)
            }
            _ => None,
        }
    }
}
