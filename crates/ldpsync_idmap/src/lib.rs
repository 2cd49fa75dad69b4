//! # ldpsync IdMap
//!
//! Persistent source-id → surrogate-key cache.
//!
//! Every record extracted from the source system carries a natural
//! identifier (usually a UUID). The warehouse addresses records by a
//! compact surrogate key (`sk`) instead, and history tables depend on that
//! key staying the same across runs. This crate keeps the mapping.
//!
//! ## Available Stores
//!
//! - [`MemoryIdMapStore`] - For testing
//! - [`SqliteIdMapStore`] - Local file in `<datadir>/cache/idmap.db`
//!
//! ## Durability
//!
//! The warehouse table `ldpsystem.idmap` is the system of record; the local
//! store is a cache that [`IdMap::open`] brings up to date before a run and
//! [`IdMap::sync_commit`] extends after it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod idmap;
mod memory;
mod sqlite;
mod store;

pub use error::{IdMapError, IdMapResult};
pub use idmap::{IdMap, WAREHOUSE_IDMAP_TABLE};
pub use memory::MemoryIdMapStore;
pub use sqlite::{SqliteIdMapStore, IDMAP_FILE};
pub use store::IdMapStore;
