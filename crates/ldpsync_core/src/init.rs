//! Warehouse initialization.
//!
//! Creates the system and configuration tables the engine writes to, and a
//! catalog row for every table of the schema. Existing tables and rows are
//! left untouched, so initialization is safe to repeat before every run.

use crate::error::UpdateResult;
use crate::schema::Schema;
use ldpsync_warehouse::{escape_literal, Connection, Dialect, TxGuard};

/// Schemas created on server backends.
const SCHEMAS: [&str; 3] = ["ldpsystem", "ldpconfig", "history"];

const SYSTEM_TABLES: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS ldpsystem.tables (\n    \
     table_name VARCHAR(63) NOT NULL PRIMARY KEY,\n    \
     updated TIMESTAMPTZ,\n    \
     row_count BIGINT,\n    \
     history_row_count BIGINT,\n    \
     documentation VARCHAR(65535),\n    \
     documentation_url VARCHAR(65535)\n);",
    "CREATE TABLE IF NOT EXISTS ldpsystem.referential_constraints (\n    \
     referencing_table VARCHAR(63) NOT NULL,\n    \
     referencing_column VARCHAR(63) NOT NULL,\n    \
     referenced_table VARCHAR(63) NOT NULL,\n    \
     referenced_column VARCHAR(63) NOT NULL,\n    \
     PRIMARY KEY (referencing_table, referencing_column)\n);",
    "CREATE TABLE IF NOT EXISTS ldpsystem.idmap (\n    \
     sk BIGINT NOT NULL PRIMARY KEY,\n    \
     id VARCHAR(65535) NOT NULL\n);",
    "CREATE TABLE IF NOT EXISTS ldpconfig.general (\n    \
     detect_foreign_keys BOOLEAN NOT NULL DEFAULT FALSE,\n    \
     force_foreign_key_constraints BOOLEAN NOT NULL DEFAULT FALSE,\n    \
     enable_foreign_key_warnings BOOLEAN NOT NULL DEFAULT FALSE,\n    \
     disable_anonymization BOOLEAN NOT NULL DEFAULT FALSE\n);",
    "CREATE TABLE IF NOT EXISTS ldpconfig.foreign_keys (\n    \
     enable_constraint BOOLEAN NOT NULL,\n    \
     referencing_table VARCHAR(63) NOT NULL,\n    \
     referencing_column VARCHAR(63) NOT NULL,\n    \
     referenced_table VARCHAR(63) NOT NULL,\n    \
     referenced_column VARCHAR(63) NOT NULL\n);",
];

/// Creates missing system tables and catalog rows in one transaction.
pub fn init_warehouse<C: Connection + ?Sized>(conn: &mut C, schema: &Schema) -> UpdateResult<()> {
    let dialect = Dialect::resolve(conn)?;
    let mut tx = TxGuard::begin(conn)?;
    let mut exec = |sql: &str| -> UpdateResult<()> {
        tracing::trace!("{sql}");
        tx.exec(sql)?;
        Ok(())
    };
    for schema_name in SCHEMAS {
        if let Some(sql) = dialect.create_schema(schema_name) {
            exec(&sql)?;
        }
    }
    for sql in SYSTEM_TABLES {
        exec(sql)?;
    }
    exec(
        "INSERT INTO ldpconfig.general\n    \
         (detect_foreign_keys, force_foreign_key_constraints,\n        \
         enable_foreign_key_warnings, disable_anonymization)\n    \
         SELECT FALSE, FALSE, FALSE, FALSE\n    \
         WHERE NOT EXISTS (SELECT 1 FROM ldpconfig.general);",
    )?;
    for table in &schema.tables {
        let name = escape_literal(&table.table_name);
        exec(&format!(
            "INSERT INTO ldpsystem.tables (table_name)\n    \
             SELECT '{name}'\n    \
             WHERE NOT EXISTS (SELECT 1 FROM ldpsystem.tables WHERE table_name = '{name}');"
        ))?;
    }
    tx.commit()?;
    tracing::debug!(tables = schema.tables.len(), "initialized warehouse");
    Ok(())
}
