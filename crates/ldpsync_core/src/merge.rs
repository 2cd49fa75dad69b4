//! Merging staged records into history and replacing the live table.

use crate::error::UpdateResult;
use crate::schema::TableSchema;
use ldpsync_warehouse::{Connection, Dialect};

fn exec<C: Connection + ?Sized>(conn: &mut C, sql: &str) -> UpdateResult<()> {
    tracing::trace!("{sql}");
    conn.exec(sql)?;
    Ok(())
}

/// Appends to `history.<table>` every staged record whose exact data is
/// not yet recorded for its sk, creating the history table if needed.
pub fn merge_table<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    table: &TableSchema,
) -> UpdateResult<()> {
    tracing::debug!("merging table");
    let history = table.history_table_name();
    let stage = table.stage_table_name();
    exec(
        conn,
        &format!(
            "CREATE TABLE IF NOT EXISTS {history} (\n    \
             sk BIGINT NOT NULL,\n    \
             id VARCHAR(65535) NOT NULL,\n    \
             data {},\n    \
             updated TIMESTAMPTZ NOT NULL\n);",
            dialect.json_type()
        ),
    )?;
    exec(
        conn,
        &format!(
            "INSERT INTO {history} (sk, id, data, updated)\n    \
             SELECT s.sk, s.id, s.data, {}\n        \
             FROM {stage} AS s\n        \
             WHERE NOT EXISTS (\n            \
             SELECT 1 FROM {history} AS h\n                \
             WHERE h.sk = s.sk AND h.data = s.data\n        );",
            dialect.current_timestamp()
        ),
    )
}

/// Drops the live table.
pub fn drop_table<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    table: &TableSchema,
) -> UpdateResult<()> {
    exec(conn, &dialect.drop_table(&dialect.live_table(&table.table_name)))
}

/// Promotes the stage table to be the live table.
pub fn place_table<C: Connection + ?Sized>(conn: &mut C, table: &TableSchema) -> UpdateResult<()> {
    exec(
        conn,
        &format!(
            "ALTER TABLE {}\n    RENAME TO {};",
            table.stage_table_name(),
            table.table_name
        ),
    )
}
