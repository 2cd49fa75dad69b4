//! Scoped transaction guard.

use crate::connection::Connection;
use crate::error::WarehouseResult;
use std::ops::{Deref, DerefMut};

/// A transaction scoped to the lifetime of the guard.
///
/// Creating the guard opens a transaction on the connection and registers a
/// deferred rollback. An explicit [`TxGuard::commit`] cancels the deferred
/// rollback; dropping the guard without a terminal call reverts every
/// statement issued through it.
///
/// The guard dereferences to the connection, so statements are issued
/// through it directly:
///
/// ```rust,ignore
/// let mut tx = TxGuard::begin(&mut *conn)?;
/// tx.exec("DELETE FROM ldpconfig.foreign_keys;")?;
/// tx.commit()?;
/// ```
pub struct TxGuard<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    completed: bool,
}

impl<'c, C: Connection + ?Sized> TxGuard<'c, C> {
    /// Opens a transaction on `conn`.
    pub fn begin(conn: &'c mut C) -> WarehouseResult<Self> {
        conn.begin()?;
        Ok(Self {
            conn,
            completed: false,
        })
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> WarehouseResult<()> {
        self.completed = true;
        self.conn.commit()
    }

    /// Rolls back the transaction.
    pub fn rollback(mut self) -> WarehouseResult<()> {
        self.completed = true;
        self.conn.rollback()
    }
}

impl<C: Connection + ?Sized> Deref for TxGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
    }
}

impl<C: Connection + ?Sized> DerefMut for TxGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
    }
}

impl<C: Connection + ?Sized> Drop for TxGuard<'_, C> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Err(e) = self.conn.rollback() {
            tracing::error!(
                dsn = self.conn.data_source_name(),
                error = %e,
                "rollback of abandoned transaction failed"
            );
        }
    }
}
