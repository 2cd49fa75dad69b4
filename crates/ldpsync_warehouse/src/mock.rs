//! Recording connection for tests.

use crate::connection::{Completion, Connection, Row};
use crate::error::{WarehouseError, WarehouseResult};

/// A call observed by [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `exec` with the statement text.
    Exec(String),
    /// `query` with the statement text.
    Query(String),
    /// `set_autocommit` with the requested mode.
    SetAutocommit(bool),
    /// `end_transaction` with the requested completion.
    EndTransaction(Completion),
}

/// An in-memory connection that records every call.
///
/// Statements executed in autocommit mode become durable immediately;
/// statements executed inside a transaction become durable on commit and
/// are discarded on rollback. Failures can be injected per statement
/// pattern, for commit, and for autocommit restoration.
#[derive(Debug)]
pub struct MockConnection {
    name: String,
    dbms: String,
    autocommit: bool,
    pending: Vec<String>,
    durable: Vec<String>,
    calls: Vec<MockCall>,
    responses: Vec<(String, Vec<Row>)>,
    failing: Vec<String>,
    fail_commit: bool,
    fail_autocommit_restore: bool,
}

impl MockConnection {
    /// Creates a mock connection reporting itself as PostgreSQL.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dbms: "PostgreSQL".to_string(),
            autocommit: true,
            pending: Vec::new(),
            durable: Vec::new(),
            calls: Vec::new(),
            responses: Vec::new(),
            failing: Vec::new(),
            fail_commit: false,
            fail_autocommit_restore: false,
        }
    }

    /// Sets the reported backend product name.
    pub fn with_dbms(mut self, dbms: impl Into<String>) -> Self {
        self.dbms = dbms.into();
        self
    }

    /// Returns `rows` for every query containing `pattern`.
    pub fn respond(&mut self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.responses.push((pattern.into(), rows));
    }

    /// Fails every statement containing `pattern`.
    pub fn fail_on(&mut self, pattern: impl Into<String>) {
        self.failing.push(pattern.into());
    }

    /// Makes commits fail.
    pub fn fail_commit(&mut self, fail: bool) {
        self.fail_commit = fail;
    }

    /// Makes switching autocommit back on fail.
    pub fn fail_autocommit_restore(&mut self, fail: bool) {
        self.fail_autocommit_restore = fail;
    }

    /// Returns whether the connection is in autocommit mode.
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// Returns every statement that has become durable.
    pub fn durable(&self) -> Vec<String> {
        self.durable.clone()
    }

    /// Returns every recorded call.
    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    fn check(&self, sql: &str) -> WarehouseResult<()> {
        match self.failing.iter().find(|p| sql.contains(p.as_str())) {
            Some(_) => Err(WarehouseError::statement(
                &self.name,
                sql,
                "injected failure",
                None,
            )),
            None => Ok(()),
        }
    }
}

impl Connection for MockConnection {
    fn data_source_name(&self) -> &str {
        &self.name
    }

    fn dbms_name(&mut self) -> WarehouseResult<String> {
        Ok(self.dbms.clone())
    }

    fn exec(&mut self, sql: &str) -> WarehouseResult<()> {
        self.calls.push(MockCall::Exec(sql.to_string()));
        self.check(sql)?;
        if self.autocommit {
            self.durable.push(sql.to_string());
        } else {
            self.pending.push(sql.to_string());
        }
        Ok(())
    }

    fn query(&mut self, sql: &str) -> WarehouseResult<Vec<Row>> {
        self.calls.push(MockCall::Query(sql.to_string()));
        self.check(sql)?;
        Ok(self
            .responses
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn set_autocommit(&mut self, autocommit: bool) -> WarehouseResult<()> {
        self.calls.push(MockCall::SetAutocommit(autocommit));
        if autocommit && self.fail_autocommit_restore {
            return Err(WarehouseError::Autocommit {
                dsn: self.name.clone(),
                message: "injected failure".into(),
            });
        }
        self.autocommit = autocommit;
        Ok(())
    }

    fn end_transaction(&mut self, completion: Completion) -> WarehouseResult<()> {
        self.calls.push(MockCall::EndTransaction(completion));
        match completion {
            Completion::Commit => {
                if self.fail_commit {
                    self.pending.clear();
                    return Err(WarehouseError::Transaction {
                        dsn: self.name.clone(),
                        action: "committing",
                        message: "injected failure".into(),
                    });
                }
                self.durable.append(&mut self.pending);
            }
            Completion::Rollback => self.pending.clear(),
        }
        Ok(())
    }
}
