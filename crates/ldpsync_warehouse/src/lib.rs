//! # ldpsync Warehouse
//!
//! Warehouse connectivity for ldpsync.
//!
//! This crate provides the plumbing the synchronization engine relies on:
//! - The [`Connection`] and [`DataSource`] contract (execute, fetch rows as
//!   text with `None` as the null marker, begin/commit/rollback, product name)
//! - [`TxGuard`], a scoped transaction that rolls back unless committed
//! - [`Dialect`] for backend-specific literals and DDL
//! - A SQLite backend ([`SqliteDataSource`]) and a recording
//!   [`MockConnection`] for tests
//!
//! ## Transaction semantics
//!
//! - A new connection is in autocommit mode
//! - `begin` switches autocommit off; `commit`/`rollback` end the
//!   transaction and switch it back on
//! - A failure to restore autocommit never masks the commit/rollback outcome
//!
//! ## Example
//!
//! ```rust,no_run
//! use ldpsync_warehouse::{Connection, DataSource, SqliteDataSource, TxGuard};
//!
//! let ds = SqliteDataSource::new("ldp", "/var/lib/ldp/ldp.db");
//! let mut conn = ds.connect().unwrap();
//! let mut tx = TxGuard::begin(conn.as_mut()).unwrap();
//! tx.exec("DELETE FROM ldpconfig.foreign_keys;").unwrap();
//! tx.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod dialect;
mod error;
mod guard;
mod mock;
mod sqlite;

pub use connection::{Completion, Connection, DataSource, Row};
pub use dialect::{escape_literal, Dialect, ForeignKey};
pub use error::{WarehouseError, WarehouseResult};
pub use guard::TxGuard;
pub use mock::{MockCall, MockConnection};
pub use sqlite::{SqliteConnection, SqliteDataSource, WAREHOUSE_SCHEMAS};
