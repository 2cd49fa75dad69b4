//! Error types for synchronization runs.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for update operations.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Errors that can abort a synchronization run.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Warehouse connectivity or statement failure.
    #[error(transparent)]
    Warehouse(#[from] ldpsync_warehouse::WarehouseError),

    /// ID mapping cache failure.
    #[error(transparent)]
    IdMap(#[from] ldpsync_idmap::IdMapError),

    /// Logging in to the source API failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// HTTP request to the source API failed.
    #[error("HTTP error: {url}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Transport or status description.
        message: String,
    },

    /// Retrieving a table's data failed.
    #[error("extraction failed for table {table}: {message}")]
    Extraction {
        /// Table being extracted.
        table: String,
        /// Description of the failure.
        message: String,
    },

    /// Reading or writing the staging area failed.
    #[error("staging I/O error: {path}: {source}")]
    Staging {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A staged or retrieved document is not valid JSON.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Expected data was not present.
    #[error("missing data: {0}")]
    MissingData(String),
}

impl UpdateError {
    /// Creates a staging I/O error.
    pub fn staging(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Staging {
            path: path.into(),
            source,
        }
    }

    /// Creates an extraction error.
    pub fn extraction(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Returns the message to report when the run aborts: the display text
    /// with any trailing newline removed.
    pub fn report_message(&self) -> String {
        let mut s = self.to_string();
        if s.ends_with('\n') {
            s.pop();
        }
        s
    }
}
