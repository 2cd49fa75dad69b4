//! Per-table bookkeeping in `ldpsystem.tables`.

use crate::error::{UpdateError, UpdateResult};
use crate::schema::TableSchema;
use ldpsync_warehouse::{escape_literal, Connection, Dialect, TxGuard};

/// Row counts recorded for a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    /// Rows in the live table.
    pub row_count: i64,
    /// Rows in the history table.
    pub history_row_count: i64,
}

/// Counts the rows of a table.
pub fn count_rows<C: Connection + ?Sized>(conn: &mut C, table: &str) -> UpdateResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table};");
    tracing::trace!("{sql}");
    let value = conn
        .query_scalar(&sql)?
        .ok_or_else(|| UpdateError::MissingData(format!("no row count for {table}")))?;
    value
        .parse()
        .map_err(|_| UpdateError::MissingData(format!("invalid row count for {table}: {value}")))
}

/// Records the update time, row counts and documentation of a table.
///
/// Runs after the table's merge has committed.
pub fn update_table_catalog<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    table: &TableSchema,
) -> UpdateResult<TableCounts> {
    let counts = TableCounts {
        row_count: count_rows(conn, &dialect.live_table(&table.table_name))?,
        history_row_count: count_rows(conn, &table.history_table_name())?,
    };
    let name = escape_literal(&table.table_name);
    let documentation = escape_literal(&format!("{} in {}", table.source_path, table.module_name));
    let url = escape_literal(&format!(
        "https://dev.folio.org/reference/api/#{}",
        table.module_name
    ));
    let mut tx = TxGuard::begin(conn)?;
    for sql in [
        format!(
            "INSERT INTO ldpsystem.tables (table_name)\n    \
             SELECT '{name}'\n    \
             WHERE NOT EXISTS (SELECT 1 FROM ldpsystem.tables WHERE table_name = '{name}');"
        ),
        format!(
            "UPDATE ldpsystem.tables\n    SET updated = {},\n        \
             row_count = {},\n        \
             history_row_count = {},\n        \
             documentation = '{documentation}',\n        \
             documentation_url = '{url}'\n    \
             WHERE table_name = '{name}';",
            dialect.current_timestamp(),
            counts.row_count,
            counts.history_row_count
        ),
    ] {
        tracing::trace!("{sql}");
        tx.exec(&sql)?;
    }
    tx.commit()?;
    Ok(counts)
}
