//! Run options and the local configuration file.

use crate::error::{UpdateError, UpdateResult};
use ldpsync_warehouse::SqliteDataSource;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file within the data directory.
pub const CONFIG_FILE: &str = "ldpconf.json";

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Options controlling one synchronization run.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Data directory holding the configuration, cache and staging area.
    pub datadir: PathBuf,
    /// Only process the table with this name.
    pub table: Option<String>,
    /// Extract data without touching the warehouse.
    pub extract_only: bool,
    /// Load previously extracted pages from this directory instead of
    /// extracting.
    pub load_from_dir: Option<PathBuf>,
    /// Keep extracted page files after loading.
    pub save_temps: bool,
    /// Locally requested suspension of anonymization. Takes effect only if
    /// the warehouse configuration agrees.
    pub disable_anonymization: bool,
    /// Records requested per page.
    pub page_size: usize,
}

impl UpdateOptions {
    /// Creates options for a full run in `datadir`.
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            table: None,
            extract_only: false,
            load_from_dir: None,
            save_temps: false,
            disable_anonymization: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Restricts the run to a single table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets extraction-only mode.
    #[must_use]
    pub fn with_extract_only(mut self, value: bool) -> Self {
        self.extract_only = value;
        self
    }

    /// Loads pages from an existing directory.
    #[must_use]
    pub fn with_load_from_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.load_from_dir = Some(dir.into());
        self
    }

    /// Keeps extracted page files.
    #[must_use]
    pub fn with_save_temps(mut self, value: bool) -> Self {
        self.save_temps = value;
        self
    }

    /// Requests that anonymization be suspended.
    #[must_use]
    pub fn with_disable_anonymization(mut self, value: bool) -> Self {
        self.disable_anonymization = value;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Returns true if `table` passes the single-table filter.
    pub fn selects(&self, table: &str) -> bool {
        self.table.as_deref().map_or(true, |t| t == table)
    }
}

/// Contents of `<datadir>/ldpconf.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct LdpConf {
    /// Free-form deployment label, used in log output.
    #[serde(default)]
    pub deployment_environment: Option<String>,
    /// Warehouse settings.
    pub ldp_database: LdpDatabase,
    /// Known data sources by name.
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceConf>,
    /// Names of the enabled extraction sources; exactly one is supported.
    #[serde(default)]
    pub enable_sources: Vec<String>,
    /// Extraction sources by name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConf>,
    /// Local request to suspend anonymization.
    #[serde(default)]
    pub disable_anonymization: bool,
}

/// Warehouse settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LdpDatabase {
    /// Data source name of the warehouse.
    pub odbc_database: String,
}

/// A data source definition.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConf {
    /// Main database file, relative to the data directory unless absolute.
    pub path: PathBuf,
}

/// An extraction source definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConf {
    /// Base URL of the Okapi gateway.
    pub okapi_url: String,
    /// Tenant identifier.
    pub okapi_tenant: String,
    /// Login user.
    pub okapi_user: String,
    /// Login password.
    pub okapi_password: String,
    /// Tables retrieved directly from the source database.
    #[serde(default)]
    pub direct_tables: Vec<String>,
    /// Data source name of the source database for direct retrieval.
    #[serde(default)]
    pub direct_database: Option<String>,
}

impl LdpConf {
    /// Reads and parses `<datadir>/ldpconf.json`.
    pub fn load(datadir: &Path) -> UpdateResult<Self> {
        let path = datadir.join(CONFIG_FILE);
        let text = fs::read_to_string(&path).map_err(|e| UpdateError::staging(&path, e))?;
        Self::parse(&text)
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> UpdateResult<Self> {
        serde_json::from_str(text).map_err(|e| UpdateError::Config(format!("{CONFIG_FILE}: {e}")))
    }

    /// Resolves a named data source relative to `datadir`.
    pub fn data_source(&self, datadir: &Path, name: &str) -> UpdateResult<SqliteDataSource> {
        let conf = self
            .data_sources
            .get(name)
            .ok_or_else(|| UpdateError::Config(format!("unknown data source: {name}")))?;
        let path = if conf.path.is_absolute() {
            conf.path.clone()
        } else {
            datadir.join(&conf.path)
        };
        Ok(SqliteDataSource::new(name, path))
    }

    /// Resolves the warehouse data source.
    pub fn warehouse(&self, datadir: &Path) -> UpdateResult<SqliteDataSource> {
        self.data_source(datadir, &self.ldp_database.odbc_database)
    }

    /// Returns the single enabled extraction source.
    pub fn source(&self) -> UpdateResult<&SourceConf> {
        match self.enable_sources.as_slice() {
            [name] => self
                .sources
                .get(name)
                .ok_or_else(|| UpdateError::Config(format!("unknown source: {name}"))),
            [] => Err(UpdateError::Config("no source enabled".into())),
            _ => Err(UpdateError::Config("only one source may be enabled".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = r#"{
        "deployment_environment": "testing",
        "ldp_database": { "odbc_database": "ldp" },
        "data_sources": {
            "ldp": { "path": "warehouse/ldp.db" },
            "folio": { "path": "/srv/folio/folio.db" }
        },
        "enable_sources": ["library"],
        "sources": {
            "library": {
                "okapi_url": "https://okapi.example.edu",
                "okapi_tenant": "diku",
                "okapi_user": "ldp",
                "okapi_password": "secret",
                "direct_tables": ["inventory_items"],
                "direct_database": "folio"
            }
        }
    }"#;

    #[test]
    fn options_builder() {
        let opt = UpdateOptions::new("/data")
            .with_table("orders")
            .with_extract_only(true)
            .with_page_size(0);
        assert_eq!(opt.table.as_deref(), Some("orders"));
        assert!(opt.extract_only);
        assert_eq!(opt.page_size, 1);
        assert!(opt.selects("orders"));
        assert!(!opt.selects("users"));
        assert!(UpdateOptions::new("/data").selects("users"));
    }

    #[test]
    fn parses_configuration() {
        let conf = LdpConf::parse(CONF).unwrap();
        assert_eq!(conf.deployment_environment.as_deref(), Some("testing"));
        assert!(!conf.disable_anonymization);
        let source = conf.source().unwrap();
        assert_eq!(source.okapi_tenant, "diku");
        assert_eq!(source.direct_tables, vec!["inventory_items".to_string()]);
    }

    #[test]
    fn resolves_data_sources_relative_to_datadir() {
        let conf = LdpConf::parse(CONF).unwrap();
        let ds = conf.warehouse(Path::new("/var/lib/ldp")).unwrap();
        assert_eq!(ds.path(), Path::new("/var/lib/ldp/warehouse/ldp.db"));
        let direct = conf.data_source(Path::new("/var/lib/ldp"), "folio").unwrap();
        assert_eq!(direct.path(), Path::new("/srv/folio/folio.db"));
        assert!(conf.data_source(Path::new("/x"), "nope").is_err());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(matches!(LdpConf::parse("{}"), Err(UpdateError::Config(_))));
    }
}
