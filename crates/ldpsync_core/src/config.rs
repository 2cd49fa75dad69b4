//! Warehouse-resident configuration.

use crate::error::{UpdateError, UpdateResult};
use ldpsync_warehouse::Connection;

/// Toggles read from `ldpconfig.general`.
///
/// Each toggle is true only when the stored value renders as `"1"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralConfig {
    /// Run the referential inference pass after the update.
    pub detect_foreign_keys: bool,
    /// Delete orphans and materialize constraints for unambiguous keys.
    pub force_foreign_key_constraints: bool,
    /// Report orphans at warning level.
    pub enable_foreign_key_warnings: bool,
    /// Warehouse side of the anonymization suspension.
    pub disable_anonymization: bool,
}

impl GeneralConfig {
    /// Reads the configuration row.
    pub fn select<C: Connection + ?Sized>(conn: &mut C) -> UpdateResult<Self> {
        let sql = "SELECT detect_foreign_keys,\n       \
                   force_foreign_key_constraints,\n       \
                   enable_foreign_key_warnings,\n       \
                   disable_anonymization\n    \
                   FROM ldpconfig.general;";
        tracing::trace!("{sql}");
        let rows = conn.query(sql)?;
        let row = rows
            .first()
            .ok_or_else(|| UpdateError::MissingData("no rows in ldpconfig.general".into()))?;
        let flag = |i: usize| row.get(i).and_then(|v| v.as_deref()) == Some("1");
        Ok(Self {
            detect_foreign_keys: flag(0),
            force_foreign_key_constraints: flag(1),
            enable_foreign_key_warnings: flag(2),
            disable_anonymization: flag(3),
        })
    }
}
