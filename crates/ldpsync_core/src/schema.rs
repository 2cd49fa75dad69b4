//! Warehouse schema definition.

use serde_json::Value;

/// Suffix of the staging table built for each table during a run.
pub const STAGE_SUFFIX: &str = "_ldp_stage";

/// Type of a warehouse column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit integer.
    Bigint,
    /// Boolean.
    Boolean,
    /// Source-system identifier (UUID-shaped).
    Id,
    /// Decimal number.
    Numeric,
    /// Timestamp with time zone.
    Timestamptz,
    /// Free text.
    Varchar,
}

impl ColumnType {
    /// Returns the SQL type used for the column.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Bigint => "BIGINT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Id => "VARCHAR(36)",
            ColumnType::Numeric => "NUMERIC(19,4)",
            ColumnType::Timestamptz => "TIMESTAMPTZ",
            ColumnType::Varchar => "VARCHAR(65535)",
        }
    }

    /// Classifies a scalar JSON value; `None` for nulls, objects and arrays.
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Bigint),
            Value::Number(_) => Some(ColumnType::Numeric),
            Value::String(s) if is_uuid(s) => Some(ColumnType::Id),
            Value::String(_) => Some(ColumnType::Varchar),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Returns the narrowest type that holds values of both types.
    pub fn widen(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Bigint, Numeric) | (Numeric, Bigint) => Numeric,
            _ => Varchar,
        }
    }
}

/// A column of a warehouse table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Column name in the warehouse.
    pub column_name: String,
    /// Column type.
    pub column_type: ColumnType,
}

impl ColumnSchema {
    /// Creates a column.
    pub fn new(column_name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            column_name: column_name.into(),
            column_type,
        }
    }

    /// Returns the name of the surrogate-key column paired with an id column.
    pub fn sk_column_name(&self) -> String {
        format!("{}_sk", self.column_name)
    }
}

/// A table synchronized from the source system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Warehouse table name.
    pub table_name: String,
    /// API path the records are retrieved from.
    pub source_path: String,
    /// Source module providing the API.
    pub module_name: String,
    /// Whether the table holds personal data that must not be loaded.
    pub anonymize: bool,
    /// Set during a run when there is nothing to load.
    pub skip: bool,
    /// Source database table for direct retrieval, if supported.
    pub direct_source_table: Option<String>,
    /// Columns, declared or discovered while staging.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Creates a table definition with no declared columns.
    pub fn new(
        table_name: impl Into<String>,
        source_path: impl Into<String>,
        module_name: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            source_path: source_path.into(),
            module_name: module_name.into(),
            anonymize: false,
            skip: false,
            direct_source_table: None,
            columns: Vec::new(),
        }
    }

    /// Marks the table as holding personal data.
    #[must_use]
    pub fn anonymized(mut self) -> Self {
        self.anonymize = true;
        self
    }

    /// Declares a column.
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSchema::new(name, column_type));
        self
    }

    /// Names the source database table used for direct retrieval.
    #[must_use]
    pub fn with_direct_source(mut self, table: impl Into<String>) -> Self {
        self.direct_source_table = Some(table.into());
        self
    }

    /// Returns the named column.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    /// Returns the id-typed columns that may reference other tables,
    /// i.e. every id column except the primary `id`.
    pub fn reference_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Id && c.column_name != "id")
    }

    /// Returns the name of the staging table.
    pub fn stage_table_name(&self) -> String {
        format!("{}{STAGE_SUFFIX}", self.table_name)
    }

    /// Returns the name of the history table.
    pub fn history_table_name(&self) -> String {
        format!("history.{}", self.table_name)
    }
}

/// The ordered set of tables processed by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Tables in processing order.
    pub tables: Vec<TableSchema>,
}

impl Schema {
    /// Creates a schema from tables.
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// Returns the named table.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.table_name == name)
    }

    /// Returns the named table mutably.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableSchema> {
        self.tables.iter_mut().find(|t| t.table_name == name)
    }

    /// Builds the standard schema of FOLIO tables.
    pub fn default_schema() -> Self {
        let t = TableSchema::new;
        let circ = "mod-circulation-storage";
        let fees = "mod-feesfines";
        let fin = "mod-finance-storage";
        let inv = "mod-inventory-storage";
        let orders = "mod-orders-storage";
        let users = "mod-users";
        Self::new(vec![
            t("circulation_cancellation_reasons", "/cancellation-reason-storage/cancellation-reasons", circ),
            t("circulation_fixed_due_date_schedules", "/fixed-due-date-schedule-storage/fixed-due-date-schedules", circ),
            t("circulation_loan_history", "/loan-storage/loan-history", circ),
            t("circulation_loan_policies", "/loan-policy-storage/loan-policies", circ),
            t("circulation_loans", "/loan-storage/loans", circ),
            t("circulation_patron_action_sessions", "/patron-action-session-storage/patron-action-sessions", circ),
            t("circulation_request_policies", "/request-policy-storage/request-policies", circ),
            t("circulation_requests", "/request-storage/requests", circ),
            t("circulation_staff_slips", "/staff-slips-storage/staff-slips", circ),
            t("feesfines_accounts", "/accounts", fees),
            t("feesfines_feefineactions", "/feefineactions", fees),
            t("feesfines_feefines", "/feefines", fees),
            t("feesfines_owners", "/owners", fees),
            t("finance_budgets", "/finance-storage/budgets", fin),
            t("finance_fiscal_years", "/finance-storage/fiscal-years", fin),
            t("finance_funds", "/finance-storage/funds", fin),
            t("finance_ledgers", "/finance-storage/ledgers", fin),
            t("finance_transactions", "/finance-storage/transactions", fin),
            t("inventory_call_number_types", "/call-number-types", inv),
            t("inventory_holdings", "/holdings-storage/holdings", inv).with_direct_source("holdings_record"),
            t("inventory_instances", "/instance-storage/instances", inv).with_direct_source("instance"),
            t("inventory_items", "/item-storage/items", inv).with_direct_source("item"),
            t("inventory_loan_types", "/loan-types", inv),
            t("inventory_locations", "/locations", inv),
            t("inventory_material_types", "/material-types", inv),
            t("inventory_service_points", "/service-points", inv),
            t("po_lines", "/orders-storage/po-lines", orders),
            t("po_purchase_orders", "/orders-storage/purchase-orders", orders),
            t("organization_organizations", "/organizations-storage/organizations", "mod-organizations-storage"),
            t("user_addresstypes", "/addresstypes", users),
            t("user_groups", "/groups", users),
            t("user_users", "/users", users).anonymized(),
        ])
    }
}

/// Returns true if `s` is a hyphenated UUID.
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::parse_str(s).is_ok()
}

/// Converts a camelCase JSON field name to a snake_case column name.
///
/// Runs of capitals are kept together (`holdingsHRID` → `holdings_hrid`,
/// `HTTPServer` → `http_server`) and anything other than ASCII letters and
/// digits becomes an underscore.
pub fn decode_camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case() {
        assert_eq!(decode_camel_case("userId"), "user_id");
        assert_eq!(decode_camel_case("id"), "id");
        assert_eq!(decode_camel_case("holdingsHRID"), "holdings_hrid");
        assert_eq!(decode_camel_case("HTTPServer"), "http_server");
        assert_eq!(decode_camel_case("address2Line"), "address2_line");
        assert_eq!(decode_camel_case("due-date"), "due_date");
    }

    #[test]
    fn classifies_json_values() {
        assert_eq!(
            ColumnType::of_value(&json!("0b1f7d2c-1a2b-4c3d-8e9f-0a1b2c3d4e5f")),
            Some(ColumnType::Id)
        );
        assert_eq!(ColumnType::of_value(&json!("Open")), Some(ColumnType::Varchar));
        assert_eq!(ColumnType::of_value(&json!(3)), Some(ColumnType::Bigint));
        assert_eq!(ColumnType::of_value(&json!(3.5)), Some(ColumnType::Numeric));
        assert_eq!(ColumnType::of_value(&json!(true)), Some(ColumnType::Boolean));
        assert_eq!(ColumnType::of_value(&json!(null)), None);
        assert_eq!(ColumnType::of_value(&json!({"a": 1})), None);
    }

    #[test]
    fn widening() {
        assert_eq!(ColumnType::Bigint.widen(ColumnType::Numeric), ColumnType::Numeric);
        assert_eq!(ColumnType::Id.widen(ColumnType::Varchar), ColumnType::Varchar);
        assert_eq!(ColumnType::Boolean.widen(ColumnType::Boolean), ColumnType::Boolean);
        assert_eq!(ColumnType::Boolean.widen(ColumnType::Bigint), ColumnType::Varchar);
    }

    #[test]
    fn reference_columns_exclude_primary_id() {
        let orders = TableSchema::new("orders", "/orders", "mod-orders")
            .with_column("id", ColumnType::Id)
            .with_column("user_id", ColumnType::Id)
            .with_column("status", ColumnType::Varchar);
        let refs: Vec<_> = orders.reference_columns().map(|c| c.column_name.as_str()).collect();
        assert_eq!(refs, vec!["user_id"]);
        assert_eq!(orders.column("user_id").unwrap().sk_column_name(), "user_id_sk");
        assert_eq!(orders.stage_table_name(), "orders_ldp_stage");
        assert_eq!(orders.history_table_name(), "history.orders");
    }

    #[test]
    fn default_schema_has_unique_names() {
        let schema = Schema::default_schema();
        let mut names: Vec<_> = schema.tables.iter().map(|t| t.table_name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), schema.tables.len());
        assert!(schema.table("user_users").unwrap().anonymize);
        assert!(!schema.table("circulation_loans").unwrap().anonymize);
    }
}
