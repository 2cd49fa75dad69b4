//! Warehouse connection contract.

use crate::error::{WarehouseError, WarehouseResult};

/// One result row; every cell is rendered as text and `None` marks SQL NULL.
pub type Row = Vec<Option<String>>;

/// How an open transaction is ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Make every statement since the transaction began durable.
    Commit,
    /// Revert every statement since the transaction began.
    Rollback,
}

impl Completion {
    fn action(self) -> &'static str {
        match self {
            Completion::Commit => "committing",
            Completion::Rollback => "rolling back",
        }
    }
}

/// A connection to a SQL warehouse.
///
/// Connections follow ODBC conventions: they start in autocommit mode, a
/// transaction is opened by switching autocommit off, and ending the
/// transaction (commit or rollback) is followed by switching it back on.
///
/// Implementors provide the primitive operations; `begin`, `commit` and
/// `rollback` are provided on top of them and should not be overridden.
pub trait Connection {
    /// Returns the name of the data source this connection is bound to.
    fn data_source_name(&self) -> &str;

    /// Returns the backend product name (e.g. `PostgreSQL`).
    fn dbms_name(&mut self) -> WarehouseResult<String>;

    /// Executes a statement that returns no rows.
    fn exec(&mut self, sql: &str) -> WarehouseResult<()>;

    /// Executes a query and fetches every row.
    fn query(&mut self, sql: &str) -> WarehouseResult<Vec<Row>>;

    /// Switches autocommit mode on or off.
    fn set_autocommit(&mut self, autocommit: bool) -> WarehouseResult<()>;

    /// Ends the current transaction without touching autocommit mode.
    fn end_transaction(&mut self, completion: Completion) -> WarehouseResult<()>;

    /// Executes a query that must return at least one row and returns the first.
    fn query_one(&mut self, sql: &str) -> WarehouseResult<Row> {
        self.query(sql)?
            .into_iter()
            .next()
            .ok_or_else(|| WarehouseError::NoRows {
                dsn: self.data_source_name().to_string(),
                sql: sql.to_string(),
            })
    }

    /// Executes a query and returns the first column of the first row.
    fn query_scalar(&mut self, sql: &str) -> WarehouseResult<Option<String>> {
        Ok(self.query_one(sql)?.into_iter().next().flatten())
    }

    /// Opens a transaction by disabling autocommit.
    fn begin(&mut self) -> WarehouseResult<()> {
        self.set_autocommit(false)
    }

    /// Commits the current transaction and restores autocommit.
    fn commit(&mut self) -> WarehouseResult<()> {
        finish(self, Completion::Commit)
    }

    /// Rolls back the current transaction and restores autocommit.
    fn rollback(&mut self) -> WarehouseResult<()> {
        finish(self, Completion::Rollback)
    }
}

/// Ends the transaction, then restores autocommit.
///
/// A failure to restore autocommit is logged and dropped so that it never
/// masks the outcome of the commit or rollback itself.
fn finish<C: Connection + ?Sized>(conn: &mut C, completion: Completion) -> WarehouseResult<()> {
    let outcome = conn.end_transaction(completion);
    if let Err(e) = conn.set_autocommit(true) {
        tracing::debug!(error = %e, "ignoring failure to restore autocommit");
    }
    outcome.map_err(|e| match e {
        err @ WarehouseError::Transaction { .. } => err,
        other => WarehouseError::Transaction {
            dsn: conn.data_source_name().to_string(),
            action: completion.action(),
            message: other.to_string(),
        },
    })
}

/// A named source of warehouse connections.
pub trait DataSource {
    /// Returns the data source name.
    fn name(&self) -> &str;

    /// Opens a new connection bound to serializable isolation.
    fn connect(&self) -> WarehouseResult<Box<dyn Connection>>;
}
