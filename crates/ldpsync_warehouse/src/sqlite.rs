//! SQLite warehouse backend.
//!
//! The warehouse lives in one main database file. Each warehouse schema
//! (`ldpsystem`, `ldpconfig`, `history`, ...) is a sibling database file
//! attached under the schema's name, so schema-qualified names such as
//! `history.circulation_loans` resolve the same way they do on a server.
//!
//! ```text
//! <dir>/
//! ├─ ldp.db              # live tables
//! ├─ ldp.ldpsystem.db    # catalog, idmap, constraint tracking
//! ├─ ldp.ldpconfig.db    # configuration, foreign-key candidates
//! └─ ldp.history.db      # history tables
//! ```

use crate::connection::{Completion, Connection, DataSource, Row};
use crate::dialect::escape_literal;
use crate::error::{WarehouseError, WarehouseResult};
use rusqlite::types::ValueRef;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Schemas attached to every warehouse connection.
pub const WAREHOUSE_SCHEMAS: [&str; 3] = ["ldpsystem", "ldpconfig", "history"];

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A SQLite-file data source.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    name: String,
    path: PathBuf,
    schemas: Vec<String>,
}

impl SqliteDataSource {
    /// Creates a data source for the main database file at `path`, attaching
    /// the standard warehouse schemas.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            schemas: WAREHOUSE_SCHEMAS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a data source attaching only the given schemas.
    pub fn with_schemas<I, S>(name: impl Into<String>, path: impl Into<PathBuf>, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            path: path.into(),
            schemas: schemas.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the main database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file backing an attached schema.
    pub fn schema_path(&self, schema: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone());
        let file = format!("{stem}.{schema}.db");
        match self.path.parent() {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }

    /// Opens a connection with the concrete type.
    pub fn open(&self) -> WarehouseResult<SqliteConnection> {
        let connect_err = |e: rusqlite::Error| WarehouseError::Connect {
            dsn: self.name.clone(),
            message: e.to_string(),
        };
        let conn = rusqlite::Connection::open(&self.path).map_err(connect_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(connect_err)?;
        // Replacing a table by rename must leave triggers on other tables alone.
        conn.pragma_update(None, "legacy_alter_table", "ON")
            .map_err(connect_err)?;
        conn.pragma_update(None, "read_uncommitted", "OFF")
            .map_err(connect_err)?;
        for schema in &self.schemas {
            let file = self.schema_path(schema);
            let sql = format!(
                "ATTACH DATABASE '{}' AS {schema};",
                escape_literal(&file.to_string_lossy())
            );
            conn.execute_batch(&sql).map_err(connect_err)?;
        }
        Ok(SqliteConnection {
            name: self.name.clone(),
            conn,
            autocommit: true,
        })
    }
}

impl DataSource for SqliteDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> WarehouseResult<Box<dyn Connection>> {
        Ok(Box::new(self.open()?))
    }
}

/// A connection to a SQLite warehouse.
///
/// SQLite transactions are always serializable. Write transactions are
/// opened with `BEGIN IMMEDIATE` so the write lock is taken up front.
pub struct SqliteConnection {
    name: String,
    conn: rusqlite::Connection,
    autocommit: bool,
}

impl SqliteConnection {
    fn statement_error(&self, sql: &str, e: rusqlite::Error) -> WarehouseError {
        let code = match &e {
            rusqlite::Error::SqliteFailure(err, _) => Some(err.extended_code),
            _ => None,
        };
        WarehouseError::statement(&self.name, sql, e.to_string(), code)
    }

    /// Starts the implicit transaction of manual-commit mode if none is open.
    fn ensure_transaction(&mut self) -> WarehouseResult<()> {
        if !self.autocommit && self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN IMMEDIATE;")
                .map_err(|e| self.statement_error("BEGIN IMMEDIATE;", e))?;
        }
        Ok(())
    }
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

impl Connection for SqliteConnection {
    fn data_source_name(&self) -> &str {
        &self.name
    }

    fn dbms_name(&mut self) -> WarehouseResult<String> {
        Ok("SQLite".to_string())
    }

    fn exec(&mut self, sql: &str) -> WarehouseResult<()> {
        self.ensure_transaction()?;
        self.conn
            .execute_batch(sql)
            .map_err(|e| self.statement_error(sql, e))
    }

    fn query(&mut self, sql: &str) -> WarehouseResult<Vec<Row>> {
        self.ensure_transaction()?;
        let mut stmt = match self.conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => return Err(self.statement_error(sql, e)),
        };
        let columns = stmt.column_count();
        let mut rows = match stmt.query([]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(WarehouseError::statement(
                    &self.name,
                    sql,
                    e.to_string(),
                    None,
                ))
            }
        };
        let mut out = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    return Err(WarehouseError::Fetch {
                        dsn: self.name.clone(),
                        message: e.to_string(),
                    })
                }
            };
            let mut cells = Vec::with_capacity(columns);
            for i in 0..columns {
                let value = row.get_ref(i).map_err(|e| WarehouseError::Fetch {
                    dsn: self.name.clone(),
                    message: e.to_string(),
                })?;
                cells.push(cell_text(value));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn set_autocommit(&mut self, autocommit: bool) -> WarehouseResult<()> {
        if autocommit && !self.conn.is_autocommit() {
            // Switching autocommit on commits whatever is still open.
            self.conn
                .execute_batch("COMMIT;")
                .map_err(|e| WarehouseError::Autocommit {
                    dsn: self.name.clone(),
                    message: e.to_string(),
                })?;
        }
        self.autocommit = autocommit;
        self.ensure_transaction()
    }

    fn end_transaction(&mut self, completion: Completion) -> WarehouseResult<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        let (sql, action) = match completion {
            Completion::Commit => ("COMMIT;", "committing"),
            Completion::Rollback => ("ROLLBACK;", "rolling back"),
        };
        self.conn
            .execute_batch(sql)
            .map_err(|e| WarehouseError::Transaction {
                dsn: self.name.clone(),
                action,
                message: e.to_string(),
            })
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            let _ = self.conn.execute_batch("ROLLBACK;");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::guard::TxGuard;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> SqliteDataSource {
        SqliteDataSource::new("ldp", dir.path().join("ldp.db"))
    }

    fn count(conn: &mut dyn Connection, table: &str) -> i64 {
        conn.query_scalar(&format!("SELECT COUNT(*) FROM {table};"))
            .unwrap()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn schema_files_sit_beside_main_file() {
        let ds = SqliteDataSource::new("ldp", "/data/ldp.db");
        assert_eq!(
            ds.schema_path("history"),
            PathBuf::from("/data/ldp.history.db")
        );
    }

    #[test]
    fn attached_schemas_are_addressable() {
        let dir = TempDir::new().unwrap();
        let mut conn = source(&dir).connect().unwrap();
        conn.exec("CREATE TABLE history.t (sk BIGINT);").unwrap();
        conn.exec("INSERT INTO history.t VALUES (1);").unwrap();
        assert_eq!(count(conn.as_mut(), "history.t"), 1);
        assert_eq!(conn.dbms_name().unwrap(), "SQLite");
    }

    #[test]
    fn query_renders_text_and_null() {
        let dir = TempDir::new().unwrap();
        let mut conn = source(&dir).connect().unwrap();
        let rows = conn
            .query("SELECT 42, 'abc', NULL, 1.5;")
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![
                Some("42".to_string()),
                Some("abc".to_string()),
                None,
                Some("1.5".to_string())
            ]]
        );
    }

    #[test]
    fn statement_error_keeps_sql() {
        let dir = TempDir::new().unwrap();
        let mut conn = source(&dir).connect().unwrap();
        let err = conn.exec("SELECT * FROM missing_table;").unwrap_err();
        assert_eq!(err.sql(), Some("SELECT * FROM missing_table;"));
        assert!(err.to_string().contains("missing_table"));
    }

    #[test]
    fn guard_commit_is_visible_to_other_connections() {
        let dir = TempDir::new().unwrap();
        let ds = source(&dir);
        let mut conn = ds.connect().unwrap();
        conn.exec("CREATE TABLE t (x BIGINT);").unwrap();
        {
            let mut tx = TxGuard::begin(conn.as_mut()).unwrap();
            tx.exec("INSERT INTO t VALUES (1);").unwrap();
            tx.commit().unwrap();
        }
        let mut other = ds.connect().unwrap();
        assert_eq!(count(other.as_mut(), "t"), 1);
    }

    #[test]
    fn abandoned_guard_reverts_statements() {
        let dir = TempDir::new().unwrap();
        let ds = source(&dir);
        let mut conn = ds.connect().unwrap();
        conn.exec("CREATE TABLE t (x BIGINT);").unwrap();
        {
            let mut tx = TxGuard::begin(conn.as_mut()).unwrap();
            tx.exec("INSERT INTO t VALUES (1);").unwrap();
            tx.exec("CREATE TABLE u (y BIGINT);").unwrap();
        }
        assert_eq!(count(conn.as_mut(), "t"), 0);
        assert!(conn.exec("SELECT * FROM u;").is_err());
        // Back in autocommit mode.
        conn.exec("INSERT INTO t VALUES (2);").unwrap();
        let mut other = ds.connect().unwrap();
        assert_eq!(count(other.as_mut(), "t"), 1);
    }

    #[test]
    fn rename_ignores_triggers_on_dropped_targets() {
        let dir = TempDir::new().unwrap();
        let mut conn = source(&dir).connect().unwrap();
        conn.exec(
            "CREATE TABLE users (sk BIGINT);\n\
             CREATE TABLE orders (user_id_sk BIGINT);\n\
             CREATE TRIGGER orders_fk BEFORE INSERT ON orders\n\
             BEGIN SELECT 1 FROM users; END;\n\
             CREATE TABLE users_stage (sk BIGINT);\n\
             DROP TABLE users;",
        )
        .unwrap();
        conn.exec("ALTER TABLE users_stage RENAME TO users;").unwrap();
    }

    #[test]
    fn dropping_a_missing_live_table_keeps_its_history() {
        let dir = TempDir::new().unwrap();
        let mut conn = source(&dir).connect().unwrap();
        conn.exec("CREATE TABLE history.t (sk BIGINT);").unwrap();
        conn.exec("INSERT INTO history.t VALUES (1);").unwrap();
        let dialect = Dialect::Sqlite;
        conn.exec(&dialect.drop_table(&dialect.live_table("t"))).unwrap();
        assert_eq!(count(conn.as_mut(), "history.t"), 1);
        assert!(conn
            .query(&format!("SELECT sk FROM {};", dialect.live_table("t")))
            .is_err());
    }
}
