//! SQLite-file ID mapping store.

use crate::error::{IdMapError, IdMapResult};
use crate::store::IdMapStore;
use rusqlite::OptionalExtension;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the cache within `<datadir>/cache`.
pub const IDMAP_FILE: &str = "idmap.db";

/// A persistent ID mapping store backed by a local SQLite file.
///
/// The store keeps a write transaction open between commits, so inserts
/// made after the last [`IdMapStore::commit`] are discarded if the process
/// ends before the next one.
pub struct SqliteIdMapStore {
    path: PathBuf,
    conn: rusqlite::Connection,
    dirty: bool,
}

impl SqliteIdMapStore {
    /// Opens or creates the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> IdMapResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let display = path.display().to_string();
        let conn = rusqlite::Connection::open(&path).map_err(|e| IdMapError::store(&display, e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS idmap (\n\
             \x20   sk INTEGER NOT NULL PRIMARY KEY,\n\
             \x20   id TEXT NOT NULL UNIQUE\n\
             );\n\
             BEGIN;",
        )
        .map_err(|e| IdMapError::store(&display, e))?;
        Ok(Self {
            path,
            conn,
            dirty: false,
        })
    }

    /// Opens the store in its conventional location, `<datadir>/cache/idmap.db`.
    pub fn open_in_datadir(datadir: impl AsRef<Path>) -> IdMapResult<Self> {
        Self::open(datadir.as_ref().join("cache").join(IDMAP_FILE))
    }

    /// Returns the file path of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, e: rusqlite::Error) -> IdMapError {
        IdMapError::store(self.path.display().to_string(), e)
    }
}

impl IdMapStore for SqliteIdMapStore {
    fn get(&self, id: &str) -> IdMapResult<Option<i64>> {
        self.conn
            .query_row("SELECT sk FROM idmap WHERE id = ?1;", [id], |row| row.get(0))
            .optional()
            .map_err(|e| self.err(e))
    }

    fn insert(&mut self, id: &str, sk: i64) -> IdMapResult<()> {
        if let Some(existing) = self.get(id)? {
            if existing == sk {
                return Ok(());
            }
            return Err(IdMapError::Conflict {
                id: id.to_string(),
                local: existing,
                warehouse: sk,
            });
        }
        self.conn
            .execute("INSERT INTO idmap (sk, id) VALUES (?1, ?2);", rusqlite::params![sk, id])
            .map_err(|e| self.err(e))?;
        self.dirty = true;
        Ok(())
    }

    fn max_sk(&self) -> IdMapResult<i64> {
        self.conn
            .query_row("SELECT COALESCE(MAX(sk), 0) FROM idmap;", [], |row| row.get(0))
            .map_err(|e| self.err(e))
    }

    fn len(&self) -> IdMapResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM idmap;", [], |row| row.get(0))
            .map_err(|e| self.err(e))?;
        Ok(n as u64)
    }

    fn commit(&mut self) -> IdMapResult<()> {
        self.conn
            .execute_batch("COMMIT;\nBEGIN;")
            .map_err(|e| self.err(e))?;
        self.dirty = false;
        Ok(())
    }

    fn vacuum(&mut self) -> IdMapResult<()> {
        if self.dirty {
            return Err(IdMapError::Uncommitted);
        }
        // VACUUM cannot run inside a transaction.
        self.conn
            .execute_batch("COMMIT;\nVACUUM;\nBEGIN;")
            .map_err(|e| self.err(e))
    }
}
