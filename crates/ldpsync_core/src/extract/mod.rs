//! Extraction of source records into the local staging area.
//!
//! Each table's records are written as numbered page files,
//! `<load_dir>/<table>_<n>.json`, holding the API response document (an
//! object with one array of records) or a bare array.

mod direct;
mod okapi;

pub use direct::DirectExtractor;
pub use okapi::{HttpClient, HttpResponse, OkapiClient, ReqwestClient};

use crate::error::{UpdateError, UpdateResult};
use crate::schema::TableSchema;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Retrieves a table's records into page files.
pub trait Extractor {
    /// Establishes a session with the source. Called once per run, before
    /// any retrieval, and only when the run extracts.
    fn authenticate(&mut self) -> UpdateResult<()>;

    /// Writes the table's records into `load_dir`, registering every file
    /// written with `files`. Returns false if the source has no records.
    fn retrieve(
        &mut self,
        table: &TableSchema,
        load_dir: &Path,
        files: &mut ExtractionFiles,
    ) -> UpdateResult<bool>;
}

/// Chooses direct or paged retrieval per table.
///
/// A table is retrieved directly when it is listed in the direct tables,
/// names a direct source table, and a direct extractor is configured;
/// otherwise it is paged from the API.
pub struct SourceExtractor<P: Extractor> {
    paged: P,
    direct: Option<DirectExtractor>,
    direct_tables: Vec<String>,
}

impl<P: Extractor> SourceExtractor<P> {
    /// Creates an extractor that pages every table.
    pub fn new(paged: P) -> Self {
        Self {
            paged,
            direct: None,
            direct_tables: Vec::new(),
        }
    }

    /// Enables direct retrieval for the listed tables.
    #[must_use]
    pub fn with_direct(mut self, direct: DirectExtractor, tables: Vec<String>) -> Self {
        self.direct = Some(direct);
        self.direct_tables = tables;
        self
    }

    /// Returns true if `table` will be retrieved directly.
    pub fn is_direct(&self, table: &TableSchema) -> bool {
        self.direct.is_some()
            && table.direct_source_table.is_some()
            && self.direct_tables.iter().any(|t| *t == table.table_name)
    }
}

impl<P: Extractor> Extractor for SourceExtractor<P> {
    fn authenticate(&mut self) -> UpdateResult<()> {
        self.paged.authenticate()
    }

    fn retrieve(
        &mut self,
        table: &TableSchema,
        load_dir: &Path,
        files: &mut ExtractionFiles,
    ) -> UpdateResult<bool> {
        let direct = self.is_direct(table);
        match (direct, self.direct.as_mut()) {
            (true, Some(d)) => d.retrieve(table, load_dir, files),
            _ => self.paged.retrieve(table, load_dir, files),
        }
    }
}

/// The source of a run that loads previously extracted pages.
///
/// Such runs neither authenticate nor retrieve, so no source needs to be
/// configured; both operations fail if called.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedPages;

impl Extractor for SavedPages {
    fn authenticate(&mut self) -> UpdateResult<()> {
        Err(UpdateError::Config(
            "no extraction source: pages are loaded from a directory".into(),
        ))
    }

    fn retrieve(
        &mut self,
        table: &TableSchema,
        _load_dir: &Path,
        _files: &mut ExtractionFiles,
    ) -> UpdateResult<bool> {
        Err(UpdateError::Extraction {
            table: table.table_name.clone(),
            message: "pages are loaded from a directory".into(),
        })
    }
}

/// Page files written for one table.
///
/// Files are deleted when the value is dropped unless temporary files are
/// kept.
#[derive(Debug)]
pub struct ExtractionFiles {
    files: Vec<PathBuf>,
    keep: bool,
}

impl ExtractionFiles {
    /// Creates an empty set.
    pub fn new(keep: bool) -> Self {
        Self {
            files: Vec::new(),
            keep,
        }
    }

    /// Registers a written file.
    pub fn push(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    /// Returns the registered files.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for ExtractionFiles {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for file in &self.files {
            if let Err(e) = fs::remove_file(file) {
                tracing::debug!(file = %file.display(), error = %e, "could not remove page file");
            }
        }
    }
}

/// Recreates the staging area `<datadir>/tmp/update` and returns its path.
pub fn make_update_tmp_dir(datadir: &Path) -> UpdateResult<PathBuf> {
    let dir = datadir.join("tmp").join("update");
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| UpdateError::staging(&dir, e))?;
    }
    fs::create_dir_all(&dir).map_err(|e| UpdateError::staging(&dir, e))?;
    Ok(dir)
}

/// Returns the path of page `page` of `table`.
pub fn page_path(load_dir: &Path, table: &str, page: usize) -> PathBuf {
    load_dir.join(format!("{table}_{page}.json"))
}

/// Returns the consecutive page files present for `table`, starting at 0.
pub fn existing_pages(load_dir: &Path, table: &str) -> Vec<PathBuf> {
    (0..)
        .map(|page| page_path(load_dir, table, page))
        .take_while(|p| p.is_file())
        .collect()
}

/// Writes one page document and registers it.
pub fn write_page(
    load_dir: &Path,
    table: &str,
    page: usize,
    body: &str,
    files: &mut ExtractionFiles,
) -> UpdateResult<()> {
    let path = page_path(load_dir, table, page);
    fs::write(&path, body).map_err(|e| UpdateError::staging(&path, e))?;
    files.push(path);
    Ok(())
}

/// Returns the records of a page document.
///
/// A bare array is the record list. In an object, the record list is its
/// only array-valued field; when there are several, it is the only one
/// holding objects with an `id`. Any other shape has no records.
pub fn records_of(document: &Value) -> Option<&Vec<Value>> {
    let fields = match document {
        Value::Array(records) => return Some(records),
        Value::Object(fields) => fields,
        _ => return None,
    };
    let arrays: Vec<&Vec<Value>> = fields.values().filter_map(Value::as_array).collect();
    if let [records] = arrays.as_slice() {
        return Some(*records);
    }
    let mut holding_records = arrays
        .into_iter()
        .filter(|a| a.iter().any(|v| v.get("id").is_some_and(Value::is_string)));
    match (holding_records.next(), holding_records.next()) {
        (Some(records), None) => Some(records),
        _ => None,
    }
}
