//! Fixture extraction source.

use ldpsync_core::{write_page, ExtractionFiles, Extractor, TableSchema, UpdateResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Serves canned records per table and records every call.
#[derive(Debug, Clone, Default)]
pub struct FixtureExtractor {
    records: BTreeMap<String, Vec<Value>>,
    page_size: usize,
    /// Number of `authenticate` calls.
    pub authentications: usize,
    /// Tables passed to `retrieve`, in call order.
    pub retrieved: Vec<String>,
}

impl FixtureExtractor {
    /// Creates an extractor with no data.
    pub fn new() -> Self {
        Self {
            page_size: 100,
            ..Self::default()
        }
    }

    /// Sets the records served for `table`.
    #[must_use]
    pub fn with_records(mut self, table: impl Into<String>, records: Vec<Value>) -> Self {
        self.records.insert(table.into(), records);
        self
    }

    /// Sets the number of records per page.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Replaces the records served for `table`.
    pub fn set_records(&mut self, table: impl Into<String>, records: Vec<Value>) {
        self.records.insert(table.into(), records);
    }
}

impl Extractor for FixtureExtractor {
    fn authenticate(&mut self) -> UpdateResult<()> {
        self.authentications += 1;
        Ok(())
    }

    fn retrieve(
        &mut self,
        table: &TableSchema,
        load_dir: &Path,
        files: &mut ExtractionFiles,
    ) -> UpdateResult<bool> {
        self.retrieved.push(table.table_name.clone());
        let Some(records) = self.records.get(&table.table_name) else {
            return Ok(false);
        };
        for (n, page) in records.chunks(self.page_size).enumerate() {
            let body = serde_json::json!({ "records": page, "totalRecords": records.len() });
            write_page(load_dir, &table.table_name, n, &body.to_string(), files)?;
        }
        Ok(!records.is_empty())
    }
}
