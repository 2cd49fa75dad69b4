//! # ldpsync Core
//!
//! Incremental synchronization of a SQL warehouse with FOLIO data, and
//! inference of the foreign keys the source never declares.
//!
//! This crate provides:
//! - The table schema and run options
//! - Extraction through the Okapi gateway or directly from the source database
//! - Staging, history merge and live-table replacement
//! - Catalog bookkeeping in `ldpsystem.tables`
//! - Referential inference (probing, orphan analysis, constraints)
//! - The [`Updater`] that drives a full run
//!
//! ## Run sequence
//!
//! For every selected table, in schema order:
//! 1. Extract pages into the staging area (or find them in a load directory)
//! 2. In one transaction: stage, merge into history, drop the live table,
//!    rename the stage table into place, commit
//! 3. Update the table's catalog row
//!
//! Then commit the ID mapping cache, run referential inference if
//! `ldpconfig.general.detect_foreign_keys` is set, and vacuum the cache.
//!
//! ## Key Invariants
//!
//! - Surrogate keys are only ever allocated through the ID mapping cache
//! - A table's merge is atomic; the run as a whole is not
//! - Anonymized tables are never extracted or loaded unless anonymization
//!   is disabled both locally and in the warehouse
//! - The foreign-key candidate table is replaced wholesale, never patched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod error;
mod extract;
mod init;
mod merge;
mod options;
mod referential;
mod schema;
mod stage;
mod update;

pub use catalog::{count_rows, update_table_catalog, TableCounts};
pub use config::GeneralConfig;
pub use error::{UpdateError, UpdateResult};
pub use extract::{
    existing_pages, make_update_tmp_dir, page_path, records_of, write_page, DirectExtractor,
    ExtractionFiles, Extractor, HttpClient, HttpResponse, OkapiClient, ReqwestClient,
    SavedPages, SourceExtractor,
};
pub use init::init_warehouse;
pub use merge::{drop_table, merge_table, place_table};
pub use options::{
    DataSourceConf, LdpConf, LdpDatabase, SourceConf, UpdateOptions, CONFIG_FILE,
    DEFAULT_PAGE_SIZE,
};
pub use referential::{
    analyze_referential_paths, is_foreign_key, persist_candidates, probe,
    process_referential_paths, run_referential_inference, Candidate, CandidateSet,
    InferenceReport, Orphan, OrphanAnalysis, ProbeOutcome, Reference,
};
pub use schema::{
    decode_camel_case, is_uuid, ColumnSchema, ColumnType, Schema, TableSchema, STAGE_SUFFIX,
};
pub use stage::{infer_columns, read_records, stage_table};
pub use update::{TableUpdate, UpdateReport, Updater};
