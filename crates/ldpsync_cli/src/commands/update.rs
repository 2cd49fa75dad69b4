//! Update command implementation.

use crate::UpdateArgs;
use ldpsync_core::{
    DirectExtractor, Extractor, LdpConf, OkapiClient, ReqwestClient, SavedPages, Schema,
    SourceConf, SourceExtractor, UpdateOptions, UpdateReport, UpdateResult, Updater,
};
use ldpsync_idmap::SqliteIdMapStore;
use ldpsync_warehouse::SqliteDataSource;
use std::collections::BTreeSet;
use std::path::Path;

/// Builds the options of a run from the command line and configuration.
pub fn options(args: &UpdateArgs, conf: &LdpConf) -> UpdateOptions {
    let mut options = UpdateOptions::new(&args.datadir)
        .with_extract_only(args.extract_only)
        .with_save_temps(args.savetemps)
        .with_disable_anonymization(conf.disable_anonymization);
    if let Some(table) = &args.table {
        options = options.with_table(table);
    }
    if let Some(dir) = &args.load_from_dir {
        options = options.with_load_from_dir(dir);
    }
    options
}

/// Builds the direct extractor, attaching the source schema of every
/// direct table.
fn direct_extractor(
    conf: &LdpConf,
    datadir: &Path,
    source: &SourceConf,
    schema: &Schema,
) -> UpdateResult<Option<DirectExtractor>> {
    let Some(name) = &source.direct_database else {
        return Ok(None);
    };
    let base = conf.data_source(datadir, name)?;
    let schemas: BTreeSet<String> = schema
        .tables
        .iter()
        .filter(|t| source.direct_tables.contains(&t.table_name))
        .map(|t| DirectExtractor::source_schema(&source.okapi_tenant, &t.module_name))
        .collect();
    let ds = SqliteDataSource::with_schemas(name.as_str(), base.path(), schemas);
    Ok(Some(DirectExtractor::new(Box::new(ds), &source.okapi_tenant)))
}

/// Builds the extractor for the enabled source: paged from Okapi, with
/// direct retrieval for the configured tables.
fn source_extractor(
    conf: &LdpConf,
    datadir: &Path,
    options: &UpdateOptions,
    schema: &Schema,
) -> UpdateResult<SourceExtractor<OkapiClient<ReqwestClient>>> {
    let source = conf.source()?;
    let okapi = OkapiClient::new(ReqwestClient::new()?, source).with_page_size(options.page_size);
    let mut extractor = SourceExtractor::new(okapi);
    if let Some(direct) = direct_extractor(conf, datadir, source, schema)? {
        extractor = extractor.with_direct(direct, source.direct_tables.clone());
    }
    Ok(extractor)
}

/// Runs a full update.
///
/// A run that loads a saved directory needs no extraction source.
pub fn run(args: &UpdateArgs) -> UpdateResult<UpdateReport> {
    let conf = LdpConf::load(&args.datadir)?;
    if let Some(env) = &conf.deployment_environment {
        tracing::debug!(deployment_environment = %env, "loaded configuration");
    }
    let options = options(args, &conf);
    let warehouse = conf.warehouse(&args.datadir)?;
    let mut schema = Schema::default_schema();

    let mut extractor: Box<dyn Extractor> = match &options.load_from_dir {
        Some(_) => Box::new(SavedPages),
        None => Box::new(source_extractor(&conf, &args.datadir, &options, &schema)?),
    };

    let store = SqliteIdMapStore::open_in_datadir(&args.datadir)?;
    Updater::new(&options, &warehouse, extractor.as_mut()).run(&mut schema, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CONF: &str = r#"{
        "ldp_database": { "odbc_database": "ldp" },
        "data_sources": { "ldp": { "path": "ldp.db" } },
        "disable_anonymization": true
    }"#;

    fn args() -> UpdateArgs {
        UpdateArgs {
            datadir: PathBuf::from("/var/lib/ldp"),
            table: Some("po_lines".into()),
            extract_only: false,
            load_from_dir: Some(PathBuf::from("/tmp/pages")),
            savetemps: true,
        }
    }

    #[test]
    fn options_follow_arguments_and_configuration() {
        let conf = LdpConf::parse(CONF).unwrap();
        let options = options(&args(), &conf);
        assert_eq!(options.table.as_deref(), Some("po_lines"));
        assert_eq!(options.load_from_dir, Some(PathBuf::from("/tmp/pages")));
        assert!(options.save_temps);
        assert!(options.disable_anonymization);
        assert!(!options.extract_only);
    }

    #[test]
    fn missing_configuration_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut a = args();
        a.datadir = dir.path().to_path_buf();
        assert!(run(&a).is_err());
    }

    #[test]
    fn saved_directory_loads_without_a_source() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("ldpconf.json"), CONF).unwrap();
        let pages = dir.path().join("pages");
        std::fs::create_dir(&pages).unwrap();
        std::fs::write(
            pages.join("finance_funds_0.json"),
            r#"{"funds": [{"id": "0b1f7d2c-1a2b-4c3d-8e9f-0a1b2c3d4e5f", "code": "GEN"}],
                "totalRecords": 1}"#,
        )
        .unwrap();

        let a = UpdateArgs {
            datadir: dir.path().to_path_buf(),
            table: None,
            extract_only: false,
            load_from_dir: Some(pages.clone()),
            savetemps: false,
        };
        let report = run(&a).unwrap();
        assert_eq!(report.updated_tables().collect::<Vec<_>>(), vec!["finance_funds"]);
        assert!(pages.join("finance_funds_0.json").is_file());
    }
}
