//! Staging of extracted pages into a table's stage table.
//!
//! Records are read from every page of the table, their scalar fields are
//! typed and turned into columns, and each record is loaded with its sk
//! allocated through the ID mapping cache. Identifier columns other than
//! `id` get a companion `<column>_sk` column holding the referenced sk.

use crate::error::{UpdateError, UpdateResult};
use crate::extract::{existing_pages, records_of};
use crate::schema::{decode_camel_case, is_uuid, ColumnSchema, ColumnType, TableSchema};
use ldpsync_idmap::{IdMap, IdMapStore};
use ldpsync_warehouse::{escape_literal, Connection, Dialect};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const INSERT_BATCH: usize = 500;

/// Column names generated by staging that source fields may not claim.
fn is_reserved(name: &str) -> bool {
    name.is_empty() || name == "sk" || name == "data" || name.ends_with("_sk")
}

/// Reads every page of `table` and returns its records, deduplicated by
/// `id` with the last occurrence winning.
pub fn read_records(load_dir: &Path, table: &str) -> UpdateResult<Vec<Map<String, Value>>> {
    let mut records: Vec<Map<String, Value>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for path in existing_pages(load_dir, table) {
        let text = fs::read_to_string(&path).map_err(|e| UpdateError::staging(&path, e))?;
        let document: Value = serde_json::from_str(&text).map_err(|source| UpdateError::Json {
            path: path.clone(),
            source,
        })?;
        let Some(page) = records_of(&document) else {
            continue;
        };
        for record in page {
            let Some(object) = record.as_object() else {
                continue;
            };
            let Some(id) = object.get("id").and_then(Value::as_str) else {
                tracing::warn!(file = %path.display(), "skipping record without id");
                continue;
            };
            match positions.get(id) {
                Some(&i) => records[i] = object.clone(),
                None => {
                    positions.insert(id.to_string(), records.len());
                    records.push(object.clone());
                }
            }
        }
    }
    Ok(records)
}

/// Infers the columns of a set of records.
///
/// Field names are decoded from camelCase and conflicting types are
/// widened. Declared columns keep their declared type. `id` always comes
/// first.
pub fn infer_columns(declared: &[ColumnSchema], records: &[Map<String, Value>]) -> Vec<ColumnSchema> {
    let mut columns: Vec<ColumnSchema> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        for (field, value) in record {
            let name = decode_camel_case(field);
            if is_reserved(&name) {
                continue;
            }
            let Some(found) = ColumnType::of_value(value) else {
                continue;
            };
            match index.get(&name) {
                Some(&i) => columns[i].column_type = columns[i].column_type.widen(found),
                None => {
                    index.insert(name.clone(), columns.len());
                    columns.push(ColumnSchema::new(name, found));
                }
            }
        }
    }
    for column in declared {
        match index.get(&column.column_name) {
            Some(&i) => columns[i].column_type = column.column_type,
            None => {
                index.insert(column.column_name.clone(), columns.len());
                columns.push(column.clone());
            }
        }
    }
    match columns.iter().position(|c| c.column_name == "id") {
        Some(0) => {}
        Some(i) => {
            let id = columns.remove(i);
            columns.insert(0, id);
        }
        None => columns.insert(0, ColumnSchema::new("id", ColumnType::Id)),
    }
    columns
}

/// Renders a JSON value as a literal for a column of the given type.
fn literal(value: Option<&Value>, column_type: ColumnType) -> String {
    let quoted = |s: &str| format!("'{}'", escape_literal(s));
    match (value, column_type) {
        (None | Some(Value::Null), _) => "NULL".to_string(),
        (Some(Value::Bool(true)), ColumnType::Boolean) => "TRUE".to_string(),
        (Some(Value::Bool(false)), ColumnType::Boolean) => "FALSE".to_string(),
        (Some(Value::Number(n)), ColumnType::Bigint | ColumnType::Numeric) => n.to_string(),
        (Some(Value::String(s)), ColumnType::Id | ColumnType::Timestamptz | ColumnType::Varchar) => {
            quoted(s)
        }
        (Some(other), ColumnType::Varchar) => quoted(&other.to_string()),
        _ => "NULL".to_string(),
    }
}

/// Loads the extracted pages of `table` into its stage table and returns
/// the number of staged records.
///
/// The discovered columns are recorded on `table`.
pub fn stage_table<C, S>(
    conn: &mut C,
    dialect: Dialect,
    table: &mut TableSchema,
    load_dir: &Path,
    idmap: &mut IdMap<S>,
) -> UpdateResult<usize>
where
    C: Connection + ?Sized,
    S: IdMapStore,
{
    tracing::debug!("staging table");
    let records = read_records(load_dir, &table.table_name)?;
    table.columns = infer_columns(&table.columns, &records);

    let stage = table.stage_table_name();
    let drop = dialect.drop_table(&dialect.live_table(&stage));
    tracing::trace!("{drop}");
    conn.exec(&drop)?;

    let mut defs = vec!["sk BIGINT NOT NULL PRIMARY KEY".to_string()];
    let mut names = vec!["sk".to_string()];
    for column in &table.columns {
        if column.column_name == "id" {
            defs.push(format!("id {} NOT NULL UNIQUE", column.column_type.sql_type()));
        } else {
            defs.push(format!("{} {}", column.column_name, column.column_type.sql_type()));
        }
        names.push(column.column_name.clone());
    }
    let references: Vec<ColumnSchema> = table.reference_columns().cloned().collect();
    for column in &references {
        defs.push(format!("{} BIGINT", column.sk_column_name()));
        names.push(column.sk_column_name());
    }
    defs.push(format!("data {}", dialect.json_type()));
    names.push("data".to_string());
    let sql = format!("CREATE TABLE {stage} (\n    {}\n);", defs.join(",\n    "));
    tracing::trace!("{sql}");
    conn.exec(&sql)?;

    let insert = format!("INSERT INTO {stage} ({}) VALUES", names.join(", "));
    for chunk in records.chunks(INSERT_BATCH) {
        let mut rows = Vec::with_capacity(chunk.len());
        for record in chunk {
            let by_column: HashMap<String, &Value> = record
                .iter()
                .map(|(k, v)| (decode_camel_case(k), v))
                .collect();
            let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
            let mut values = vec![idmap.make_sk(id)?.to_string()];
            for column in &table.columns {
                let value = if column.column_name == "id" {
                    record.get("id")
                } else {
                    by_column.get(&column.column_name).copied()
                };
                values.push(literal(value, column.column_type));
            }
            for column in &references {
                let target = by_column
                    .get(&column.column_name)
                    .and_then(|v| v.as_str())
                    .filter(|s| is_uuid(s));
                values.push(match target {
                    Some(target) => idmap.make_sk(target)?.to_string(),
                    None => "NULL".to_string(),
                });
            }
            values.push(format!(
                "'{}'",
                escape_literal(&Value::Object(record.clone()).to_string())
            ));
            rows.push(format!("({})", values.join(", ")));
        }
        let sql = format!("{insert}\n    {};", rows.join(",\n    "));
        tracing::trace!("{sql}");
        conn.exec(&sql)?;
    }
    tracing::debug!(rows = records.len(), columns = table.columns.len(), "staged table");
    Ok(records.len())
}
