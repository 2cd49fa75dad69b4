//! Error types for the ID mapping cache.

use std::io;
use thiserror::Error;

/// Result type for ID mapping operations.
pub type IdMapResult<T> = Result<T, IdMapError>;

/// Errors that can occur in the ID mapping cache.
#[derive(Debug, Error)]
pub enum IdMapError {
    /// The local store failed.
    #[error("idmap store error: {path}: {message}")]
    Store {
        /// Location of the store.
        path: String,
        /// Backend diagnostic.
        message: String,
    },

    /// I/O error while preparing the store location.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Warehouse error while synchronizing.
    #[error(transparent)]
    Warehouse(#[from] ldpsync_warehouse::WarehouseError),

    /// A warehouse row could not be interpreted.
    #[error("invalid idmap row in warehouse: {0}")]
    InvalidRow(String),

    /// The warehouse and the local store disagree about an identifier.
    #[error("idmap conflict for id {id}: local sk {local}, warehouse sk {warehouse}")]
    Conflict {
        /// Source-system identifier.
        id: String,
        /// Surrogate key in the local store.
        local: i64,
        /// Surrogate key in the warehouse.
        warehouse: i64,
    },

    /// Vacuum was requested while assignments were still uncommitted.
    #[error("cannot vacuum idmap with uncommitted assignments")]
    Uncommitted,
}

impl IdMapError {
    /// Creates a store error.
    pub fn store(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Store {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
