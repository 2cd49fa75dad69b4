//! The update orchestrator.

use crate::catalog::update_table_catalog;
use crate::config::GeneralConfig;
use crate::error::UpdateResult;
use crate::extract::{existing_pages, make_update_tmp_dir, ExtractionFiles, Extractor};
use crate::init::init_warehouse;
use crate::merge::{drop_table, merge_table, place_table};
use crate::options::UpdateOptions;
use crate::referential::{run_referential_inference, InferenceReport};
use crate::schema::Schema;
use crate::stage::stage_table;
use ldpsync_idmap::{IdMap, IdMapStore};
use ldpsync_warehouse::{DataSource, Dialect, TxGuard};
use std::time::{Duration, Instant};

/// Outcome of updating one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableUpdate {
    /// Table name.
    pub table_name: String,
    /// Records staged from the extracted pages.
    pub staged_rows: usize,
    /// Rows in the live table after the update.
    pub row_count: i64,
    /// Rows in the history table after the update.
    pub history_row_count: i64,
    /// Wall time spent on the table.
    pub elapsed: Duration,
}

/// Outcome of a synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Tables merged into the warehouse, in processing order.
    pub tables: Vec<TableUpdate>,
    /// Tables extracted but not loaded because the run is extraction-only.
    pub extracted: Vec<String>,
    /// Tables skipped because no data was found.
    pub skipped: Vec<String>,
    /// Tables excluded by anonymization.
    pub anonymized: Vec<String>,
    /// Referential inference outcome, if the pass ran.
    pub inference: Option<InferenceReport>,
}

impl UpdateReport {
    /// Returns the names of the merged tables.
    pub fn updated_tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.table_name.as_str())
    }
}

/// Drives one full synchronization pass.
///
/// Tables are processed one at a time in schema order. Each table's stage,
/// merge and replace run in one transaction on a connection of their own;
/// any error aborts the run.
pub struct Updater<'a> {
    options: &'a UpdateOptions,
    warehouse: &'a dyn DataSource,
    extractor: &'a mut dyn Extractor,
}

impl<'a> Updater<'a> {
    /// Creates an updater.
    pub fn new(
        options: &'a UpdateOptions,
        warehouse: &'a dyn DataSource,
        extractor: &'a mut dyn Extractor,
    ) -> Self {
        Self {
            options,
            warehouse,
            extractor,
        }
    }

    /// Runs the update, using `store` as the local ID mapping cache.
    pub fn run<S: IdMapStore>(&mut self, schema: &mut Schema, store: S) -> UpdateResult<UpdateReport> {
        let span = tracing::info_span!("update");
        let _enter = span.enter();
        let started = Instant::now();
        tracing::debug!("starting full update");

        let mut conn = self.warehouse.connect()?;
        init_warehouse(conn.as_mut(), schema)?;
        let general = GeneralConfig::select(conn.as_mut())?;
        let anonymization_disabled =
            self.options.disable_anonymization && general.disable_anonymization;
        if anonymization_disabled {
            tracing::warn!("anonymization disabled");
        }

        let load_dir = match &self.options.load_from_dir {
            Some(dir) => {
                tracing::debug!(dir = %dir.display(), "loading data from directory");
                dir.clone()
            }
            None => {
                let dir = make_update_tmp_dir(&self.options.datadir)?;
                self.extractor.authenticate()?;
                dir
            }
        };
        let keep_files = self.options.save_temps || self.options.load_from_dir.is_some();

        let mut idmap = IdMap::open(store, conn.as_mut())?;
        let mut report = UpdateReport::default();

        for table in schema.tables.iter_mut() {
            if !self.options.selects(&table.table_name) {
                continue;
            }
            if table.anonymize && !anonymization_disabled {
                tracing::debug!(table = %table.table_name, "skipping anonymized table");
                report.anonymized.push(table.table_name.clone());
                continue;
            }

            let span = tracing::info_span!("table", table = %table.table_name);
            let _enter = span.enter();
            let table_started = Instant::now();
            tracing::debug!("updating table");

            let mut files = ExtractionFiles::new(keep_files);
            let found = if self.options.load_from_dir.is_some() {
                !existing_pages(&load_dir, &table.table_name).is_empty()
            } else {
                tracing::debug!("extracting");
                self.extractor.retrieve(table, &load_dir, &mut files)?
            };
            table.skip = !found;
            if table.skip {
                tracing::debug!("no data found");
                report.skipped.push(table.table_name.clone());
                continue;
            }
            if self.options.extract_only {
                report.extracted.push(table.table_name.clone());
                continue;
            }

            let mut table_conn = self.warehouse.connect()?;
            let dialect = Dialect::resolve(table_conn.as_mut())?;
            let staged_rows = {
                let mut tx = TxGuard::begin(table_conn.as_mut())?;
                let staged = stage_table(&mut *tx, dialect, table, &load_dir, &mut idmap)?;
                merge_table(&mut *tx, dialect, table)?;
                drop_table(&mut *tx, dialect, table)?;
                place_table(&mut *tx, table)?;
                tx.commit()?;
                staged
            };
            let counts = update_table_catalog(table_conn.as_mut(), dialect, table)?;
            let elapsed = table_started.elapsed();
            tracing::info!(
                rows = counts.row_count,
                history_rows = counts.history_row_count,
                elapsed = ?elapsed,
                "updated table"
            );
            report.tables.push(TableUpdate {
                table_name: table.table_name.clone(),
                staged_rows,
                row_count: counts.row_count,
                history_row_count: counts.history_row_count,
                elapsed,
            });
        }

        idmap.sync_commit(conn.as_mut())?;
        if general.detect_foreign_keys {
            report.inference = Some(run_referential_inference(self.warehouse, schema, &general)?);
        }
        idmap.vacuum()?;

        tracing::info!(
            tables = report.tables.len(),
            elapsed = ?started.elapsed(),
            "completed full update"
        );
        Ok(report)
    }
}
