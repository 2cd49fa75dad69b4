//! In-memory ID mapping store for testing.

use crate::error::{IdMapError, IdMapResult};
use crate::store::IdMapStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryState {
    working: HashMap<String, i64>,
    committed: HashMap<String, i64>,
    commits: u64,
    vacuums: u64,
}

/// An in-memory ID mapping store.
///
/// Clones share the same state, so a test can keep a handle while the
/// updater owns another and inspect what was committed afterwards.
///
/// # Example
///
/// ```rust
/// use ldpsync_idmap::{IdMapStore, MemoryIdMapStore};
///
/// let mut store = MemoryIdMapStore::new();
/// store.insert("a", 1).unwrap();
/// assert_eq!(store.committed_len(), 0);
/// store.commit().unwrap();
/// assert_eq!(store.committed_len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryIdMapStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryIdMapStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing committed assignments.
    #[must_use]
    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let map: HashMap<String, i64> = entries.into_iter().map(|(id, sk)| (id.into(), sk)).collect();
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                working: map.clone(),
                committed: map,
                ..MemoryState::default()
            })),
        }
    }

    /// Returns the number of durable assignments.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.state.read().committed.len()
    }

    /// Returns the durable sk for `id`.
    #[must_use]
    pub fn committed_sk(&self, id: &str) -> Option<i64> {
        self.state.read().committed.get(id).copied()
    }

    /// Returns how many times the store was committed.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.state.read().commits
    }

    /// Returns how many times the store was vacuumed.
    #[must_use]
    pub fn vacuum_count(&self) -> u64 {
        self.state.read().vacuums
    }

    /// Discards uncommitted assignments, as a crash would.
    pub fn discard_uncommitted(&self) {
        let mut state = self.state.write();
        state.working = state.committed.clone();
    }
}

impl IdMapStore for MemoryIdMapStore {
    fn get(&self, id: &str) -> IdMapResult<Option<i64>> {
        Ok(self.state.read().working.get(id).copied())
    }

    fn insert(&mut self, id: &str, sk: i64) -> IdMapResult<()> {
        let mut state = self.state.write();
        if let Some(&existing) = state.working.get(id) {
            if existing != sk {
                return Err(IdMapError::Conflict {
                    id: id.to_string(),
                    local: existing,
                    warehouse: sk,
                });
            }
        }
        state.working.insert(id.to_string(), sk);
        Ok(())
    }

    fn max_sk(&self) -> IdMapResult<i64> {
        Ok(self.state.read().working.values().copied().max().unwrap_or(0))
    }

    fn len(&self) -> IdMapResult<u64> {
        Ok(self.state.read().working.len() as u64)
    }

    fn commit(&mut self) -> IdMapResult<()> {
        let mut state = self.state.write();
        state.committed = state.working.clone();
        state.commits += 1;
        Ok(())
    }

    fn vacuum(&mut self) -> IdMapResult<()> {
        let mut state = self.state.write();
        if state.working.len() != state.committed.len() {
            return Err(IdMapError::Uncommitted);
        }
        state.vacuums += 1;
        Ok(())
    }
}
