//! # ldpsync Testkit
//!
//! Test utilities for ldpsync.
//!
//! This crate provides:
//! - [`TestWarehouse`], a SQLite warehouse in a temporary data directory
//! - [`FixtureExtractor`], an extractor serving canned records and
//!   recording every call
//! - Canned scenarios over a `users`/`orders` schema
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ldpsync_testkit::prelude::*;
//!
//! #[test]
//! fn updates_orders() {
//!     let wh = TestWarehouse::new();
//!     let (mut schema, mut extractor) = users_orders(Orphans::None);
//!     let options = UpdateOptions::new(wh.datadir());
//!     Updater::new(&options, wh.source(), &mut extractor)
//!         .run(&mut schema, MemoryIdMapStore::new())
//!         .unwrap();
//!     assert_eq!(wh.count("orders"), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod extractor;
pub mod scenarios;
pub mod warehouse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::extractor::*;
    pub use crate::scenarios::*;
    pub use crate::warehouse::*;
    pub use ldpsync_core::{Schema, UpdateOptions, Updater};
    pub use ldpsync_idmap::MemoryIdMapStore;
}

pub use extractor::*;
pub use scenarios::*;
pub use warehouse::*;
