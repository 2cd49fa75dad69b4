//! ID mapping cache lifecycle.

use crate::error::{IdMapError, IdMapResult};
use crate::store::IdMapStore;
use ldpsync_warehouse::{escape_literal, Connection, TxGuard};

/// Warehouse table holding every committed assignment.
pub const WAREHOUSE_IDMAP_TABLE: &str = "ldpsystem.idmap";

const INSERT_BATCH: usize = 500;

/// Source-id → surrogate-key cache shared by one synchronization run.
///
/// Lifecycle:
/// 1. [`IdMap::open`] synchronizes the local store against the warehouse
/// 2. [`IdMap::make_sk`] looks up or allocates keys during merges
/// 3. [`IdMap::sync_commit`] persists the run's new assignments, once
/// 4. [`IdMap::vacuum`] compacts the local store, last
///
/// Keys are allocated as `max + 1`, so an sk is never reused for a
/// different id.
pub struct IdMap<S: IdMapStore> {
    store: S,
    next_sk: i64,
    pending: Vec<(i64, String)>,
}

impl<S: IdMapStore> IdMap<S> {
    /// Opens the cache, pulling every warehouse assignment newer than the
    /// local store's maximum sk.
    pub fn open<C: Connection + ?Sized>(mut store: S, conn: &mut C) -> IdMapResult<Self> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {WAREHOUSE_IDMAP_TABLE} (\n    \
             sk BIGINT NOT NULL PRIMARY KEY,\n    \
             id VARCHAR(65535) NOT NULL\n);"
        );
        tracing::trace!("{sql}");
        conn.exec(&sql)?;

        let local_max = store.max_sk()?;
        let sql = format!(
            "SELECT sk, id FROM {WAREHOUSE_IDMAP_TABLE}\n    WHERE sk > {local_max}\n    ORDER BY sk;"
        );
        tracing::trace!("{sql}");
        let rows = conn.query(&sql)?;
        let pulled = rows.len();
        for row in rows {
            let (sk, id) = match row.as_slice() {
                [Some(sk), Some(id)] => (sk, id),
                _ => return Err(IdMapError::InvalidRow(format!("{row:?}"))),
            };
            let sk: i64 = sk
                .parse()
                .map_err(|_| IdMapError::InvalidRow(format!("sk={sk} id={id}")))?;
            match store.get(id)? {
                Some(local) if local != sk => {
                    return Err(IdMapError::Conflict {
                        id: id.clone(),
                        local,
                        warehouse: sk,
                    })
                }
                Some(_) => {}
                None => store.insert(id, sk)?,
            }
        }
        store.commit()?;
        let next_sk = store.max_sk()? + 1;
        tracing::debug!(pulled, next_sk, "synchronized idmap with warehouse");
        Ok(Self {
            store,
            next_sk,
            pending: Vec::new(),
        })
    }

    /// Returns the sk for `id`, allocating a new one if the id is unseen.
    pub fn make_sk(&mut self, id: &str) -> IdMapResult<i64> {
        if let Some(sk) = self.store.get(id)? {
            return Ok(sk);
        }
        let sk = self.next_sk;
        self.store.insert(id, sk)?;
        self.next_sk += 1;
        self.pending.push((sk, id.to_string()));
        Ok(sk)
    }

    /// Looks up the sk for `id` without allocating.
    pub fn lookup(&self, id: &str) -> IdMapResult<Option<i64>> {
        self.store.get(id)
    }

    /// Returns the number of assignments made since the last commit.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Persists every assignment made during the run: first to the warehouse
    /// in one transaction, then to the local store.
    pub fn sync_commit<C: Connection + ?Sized>(&mut self, conn: &mut C) -> IdMapResult<()> {
        if !self.pending.is_empty() {
            let mut tx = TxGuard::begin(conn)?;
            for chunk in self.pending.chunks(INSERT_BATCH) {
                let values: Vec<String> = chunk
                    .iter()
                    .map(|(sk, id)| format!("({sk}, '{}')", escape_literal(id)))
                    .collect();
                let sql = format!(
                    "INSERT INTO {WAREHOUSE_IDMAP_TABLE} (sk, id) VALUES\n    {};",
                    values.join(",\n    ")
                );
                tracing::trace!("{sql}");
                tx.exec(&sql)?;
            }
            tx.commit()?;
        }
        self.store.commit()?;
        tracing::debug!(committed = self.pending.len(), "committed idmap");
        self.pending.clear();
        Ok(())
    }

    /// Compacts the local store. Must follow [`IdMap::sync_commit`].
    pub fn vacuum(&mut self) -> IdMapResult<()> {
        if !self.pending.is_empty() {
            return Err(IdMapError::Uncommitted);
        }
        self.store.vacuum()
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the cache and returns the store.
    pub fn into_store(self) -> S {
        self.store
    }
}
