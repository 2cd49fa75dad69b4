//! Temporary SQLite warehouses.

use ldpsync_core::{init_warehouse, Schema};
use ldpsync_warehouse::{Connection, SqliteConnection, SqliteDataSource};
use std::path::Path;
use tempfile::TempDir;

/// A SQLite warehouse in a temporary data directory.
///
/// The main database is `<datadir>/ldp.db`; the warehouse schemas are
/// attached sibling files.
pub struct TestWarehouse {
    source: SqliteDataSource,
    dir: TempDir,
}

impl TestWarehouse {
    /// Creates an empty warehouse.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let source = SqliteDataSource::new("ldp", dir.path().join("ldp.db"));
        Self { source, dir }
    }

    /// Creates a warehouse initialized for `schema`.
    pub fn initialized(schema: &Schema) -> Self {
        let wh = Self::new();
        let mut conn = wh.connect();
        init_warehouse(&mut conn, schema).expect("Failed to initialize warehouse");
        wh
    }

    /// Returns the data source.
    pub fn source(&self) -> &SqliteDataSource {
        &self.source
    }

    /// Returns the data directory.
    pub fn datadir(&self) -> &Path {
        self.dir.path()
    }

    /// Opens a connection.
    pub fn connect(&self) -> SqliteConnection {
        self.source.open().expect("Failed to open warehouse")
    }

    /// Executes a statement in autocommit mode.
    pub fn exec(&self, sql: &str) {
        self.connect()
            .exec(sql)
            .unwrap_or_else(|e| panic!("{sql}: {e}"));
    }

    /// Returns every row of a query.
    pub fn rows(&self, sql: &str) -> Vec<Vec<Option<String>>> {
        self.connect()
            .query(sql)
            .unwrap_or_else(|e| panic!("{sql}: {e}"))
    }

    /// Returns the first column of the first row of a query.
    pub fn scalar(&self, sql: &str) -> Option<String> {
        self.rows(sql).into_iter().next().and_then(|r| r.into_iter().next().flatten())
    }

    /// Counts the rows of a table.
    pub fn count(&self, table: &str) -> i64 {
        self.scalar(&format!("SELECT COUNT(*) FROM {table};"))
            .and_then(|v| v.parse().ok())
            .expect("Failed to count rows")
    }

    /// Returns true if the table exists.
    pub fn has_table(&self, table: &str) -> bool {
        let (schema, name) = table.split_once('.').unwrap_or(("main", table));
        self.scalar(&format!(
            "SELECT COUNT(*) FROM {schema}.sqlite_master WHERE type = 'table' AND name = '{name}';"
        ))
        .as_deref()
            == Some("1")
    }

    /// Overwrites the `ldpconfig.general` toggles.
    pub fn set_general(&self, detect: bool, force: bool, warnings: bool, disable_anonymization: bool) {
        let b = |v: bool| if v { "TRUE" } else { "FALSE" };
        self.exec(&format!(
            "UPDATE ldpconfig.general SET detect_foreign_keys = {}, \
             force_foreign_key_constraints = {}, enable_foreign_key_warnings = {}, \
             disable_anonymization = {};",
            b(detect),
            b(force),
            b(warnings),
            b(disable_anonymization)
        ));
    }

    /// Returns the rows of `ldpconfig.foreign_keys`, ordered.
    pub fn foreign_keys(&self) -> Vec<Vec<Option<String>>> {
        self.rows(
            "SELECT enable_constraint, referencing_table, referencing_column, \
             referenced_table, referenced_column FROM ldpconfig.foreign_keys \
             ORDER BY referencing_table, referencing_column, referenced_table;",
        )
    }
}

impl Default for TestWarehouse {
    fn default() -> Self {
        Self::new()
    }
}
