//! Init command implementation.

use ldpsync_core::{init_warehouse, LdpConf, Schema, UpdateResult};
use ldpsync_warehouse::DataSource;
use std::path::Path;

/// Creates the warehouse system tables and catalog rows.
pub fn run(datadir: &Path) -> UpdateResult<()> {
    let conf = LdpConf::load(datadir)?;
    let warehouse = conf.warehouse(datadir)?;
    let mut conn = warehouse.connect()?;
    init_warehouse(conn.as_mut(), &Schema::default_schema())?;
    tracing::info!(warehouse = %warehouse.name(), "initialized warehouse");
    Ok(())
}
