//! Direct retrieval from the source database.

use super::{write_page, ExtractionFiles, Extractor};
use crate::error::{UpdateError, UpdateResult};
use crate::schema::TableSchema;
use ldpsync_warehouse::DataSource;
use serde_json::Value;
use std::path::Path;

/// Reads a table's JSON documents straight from the source database and
/// writes them as a single page.
pub struct DirectExtractor {
    source: Box<dyn DataSource>,
    tenant: String,
}

impl DirectExtractor {
    /// Creates an extractor reading from `source` on behalf of `tenant`.
    pub fn new(source: Box<dyn DataSource>, tenant: impl Into<String>) -> Self {
        Self {
            source,
            tenant: tenant.into(),
        }
    }

    /// Returns the source schema holding a module's tables,
    /// `<tenant>_<module>` with hyphens replaced.
    pub fn source_schema(tenant: &str, module: &str) -> String {
        format!("{tenant}_{module}").replace('-', "_")
    }
}

impl Extractor for DirectExtractor {
    fn authenticate(&mut self) -> UpdateResult<()> {
        Ok(())
    }

    fn retrieve(
        &mut self,
        table: &TableSchema,
        load_dir: &Path,
        files: &mut ExtractionFiles,
    ) -> UpdateResult<bool> {
        let source_table = table.direct_source_table.as_deref().ok_or_else(|| {
            UpdateError::extraction(&table.table_name, "no direct source table")
        })?;
        let sql = format!(
            "SELECT jsonb FROM {}.{source_table};",
            Self::source_schema(&self.tenant, &table.module_name)
        );
        tracing::debug!(table = %table.table_name, source = %self.source.name(), "direct retrieval");
        tracing::trace!("{sql}");
        let mut conn = self.source.connect()?;
        let rows = conn.query(&sql)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(text) = row.into_iter().next().flatten() else {
                continue;
            };
            let record: Value = serde_json::from_str(&text)
                .map_err(|e| UpdateError::extraction(&table.table_name, e.to_string()))?;
            records.push(record);
        }
        if records.is_empty() {
            return Ok(false);
        }
        let body = serde_json::json!({ "records": records }).to_string();
        write_page(load_dir, &table.table_name, 0, &body, files)?;
        Ok(true)
    }
}
