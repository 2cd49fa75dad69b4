//! ID mapping store trait definition.

use crate::error::IdMapResult;

/// Local persistent storage for source-id → surrogate-key assignments.
///
/// Stores are transactional: inserts are visible to `get` immediately but
/// only become durable on `commit`. Dropping a store discards uncommitted
/// inserts.
///
/// # Invariants
///
/// - An id maps to at most one sk, and an sk to at most one id
/// - `max_sk` is 0 for an empty store
/// - `vacuum` is only valid when nothing is uncommitted
///
/// # Implementors
///
/// - [`super::MemoryIdMapStore`] - For testing
/// - [`super::SqliteIdMapStore`] - For persistent storage
pub trait IdMapStore {
    /// Looks up the sk assigned to `id`.
    fn get(&self, id: &str) -> IdMapResult<Option<i64>>;

    /// Records an assignment.
    fn insert(&mut self, id: &str, sk: i64) -> IdMapResult<()>;

    /// Returns the largest assigned sk, or 0.
    fn max_sk(&self) -> IdMapResult<i64>;

    /// Returns the number of assignments, including uncommitted ones.
    fn len(&self) -> IdMapResult<u64>;

    /// Returns true if the store holds no assignments.
    fn is_empty(&self) -> IdMapResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Makes every insert since the last commit durable.
    fn commit(&mut self) -> IdMapResult<()>;

    /// Compacts the store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IdMapError::Uncommitted`] if inserts are pending.
    fn vacuum(&mut self) -> IdMapResult<()>;
}
