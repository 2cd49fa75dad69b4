//! Backend-specific SQL.

use crate::connection::Connection;
use crate::error::{WarehouseError, WarehouseResult};

/// The SQL dialect of a warehouse backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL.
    PostgreSql,
    /// Amazon Redshift.
    Redshift,
    /// SQLite, with warehouse schemas as attached databases.
    Sqlite,
}

impl Dialect {
    /// Maps a backend product name to a dialect.
    pub fn from_dbms_name(name: &str) -> WarehouseResult<Self> {
        match name {
            "PostgreSQL" => Ok(Dialect::PostgreSql),
            "Redshift" => Ok(Dialect::Redshift),
            "SQLite" => Ok(Dialect::Sqlite),
            other => Err(WarehouseError::UnsupportedDbms(other.to_string())),
        }
    }

    /// Asks the connection for its backend product and maps it to a dialect.
    pub fn resolve<C: Connection + ?Sized>(conn: &mut C) -> WarehouseResult<Self> {
        Self::from_dbms_name(&conn.dbms_name()?)
    }

    /// Returns the literal for the current timestamp.
    pub fn current_timestamp(self) -> &'static str {
        match self {
            Dialect::PostgreSql | Dialect::Sqlite => "CURRENT_TIMESTAMP",
            Dialect::Redshift => "GETDATE()",
        }
    }

    /// Returns the column type used for raw JSON documents.
    pub fn json_type(self) -> &'static str {
        match self {
            Dialect::PostgreSql => "JSONB",
            Dialect::Redshift => "VARCHAR(65535)",
            Dialect::Sqlite => "TEXT",
        }
    }

    /// Returns the statement creating a schema, if the backend has schemas.
    ///
    /// SQLite schemas are attached databases and exist once attached.
    pub fn create_schema(self, schema: &str) -> Option<String> {
        match self {
            Dialect::PostgreSql | Dialect::Redshift => {
                Some(format!("CREATE SCHEMA IF NOT EXISTS {schema};"))
            }
            Dialect::Sqlite => None,
        }
    }

    /// Returns the name of a live table as it must appear in statements.
    ///
    /// SQLite resolves an unqualified name through every attached database
    /// when `main` has no such table, so a missing live table would silently
    /// resolve to its `history` twin. Live tables are pinned to `main` there.
    pub fn live_table(self, table: &str) -> String {
        match self {
            Dialect::PostgreSql | Dialect::Redshift => table.to_string(),
            Dialect::Sqlite => format!("main.{table}"),
        }
    }

    /// Returns the statement dropping a table if it exists.
    ///
    /// Dependent constraints from other tables are dropped along with it.
    pub fn drop_table(self, table: &str) -> String {
        match self {
            Dialect::PostgreSql | Dialect::Redshift => {
                format!("DROP TABLE IF EXISTS {table} CASCADE;")
            }
            Dialect::Sqlite => format!("DROP TABLE IF EXISTS {table};"),
        }
    }

    /// Returns the statements that materialize a foreign key on an existing
    /// table, replacing a previous constraint of the same name.
    ///
    /// SQLite cannot add constraints to existing tables, so there the
    /// constraint is enforced by a pair of triggers.
    pub fn add_foreign_key(self, fk: &ForeignKey) -> Vec<String> {
        let name = fk.constraint_name();
        let ForeignKey {
            referencing_table: table,
            referencing_column: column,
            referenced_table: target,
            referenced_column: target_column,
        } = fk;
        match self {
            Dialect::PostgreSql | Dialect::Redshift => vec![
                format!("ALTER TABLE\n    {table}\n    DROP CONSTRAINT IF EXISTS {name};"),
                format!(
                    "ALTER TABLE\n    {table}\n    ADD CONSTRAINT\n        {name}\n        \
                     FOREIGN KEY ({column})\n        REFERENCES\n        {target}\n        \
                     ({target_column});"
                ),
            ],
            Dialect::Sqlite => {
                let mut statements = Vec::with_capacity(4);
                for event in ["insert", "update"] {
                    let trigger = format!("{name}_{event}");
                    let on = match event {
                        "insert" => "INSERT".to_string(),
                        _ => format!("UPDATE OF {column}"),
                    };
                    statements.push(format!("DROP TRIGGER IF EXISTS {trigger};"));
                    statements.push(format!(
                        "CREATE TRIGGER {trigger}\n    BEFORE {on} ON {table}\n    \
                         FOR EACH ROW\n    WHEN NEW.{column} IS NOT NULL\n        \
                         AND NOT EXISTS (SELECT 1 FROM {target} WHERE {target_column} = NEW.{column})\n\
                         BEGIN\n    SELECT RAISE(ABORT, 'foreign key violation: {name}');\nEND;"
                    ));
                }
                statements
            }
        }
    }
}

/// A foreign key between two warehouse tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignKey {
    /// Table holding the reference.
    pub referencing_table: String,
    /// Column holding the reference.
    pub referencing_column: String,
    /// Table being referenced.
    pub referenced_table: String,
    /// Column being referenced.
    pub referenced_column: String,
}

impl ForeignKey {
    /// Returns the conventional constraint name, `<table>_<column>_fkey`.
    pub fn constraint_name(&self) -> String {
        format!("{}_{}_fkey", self.referencing_table, self.referencing_column)
    }
}

/// Escapes a value for use inside a single-quoted SQL literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;

    fn orders_fk() -> ForeignKey {
        ForeignKey {
            referencing_table: "orders".into(),
            referencing_column: "user_id_sk".into(),
            referenced_table: "users".into(),
            referenced_column: "sk".into(),
        }
    }

    #[test]
    fn resolves_from_product_name() {
        let mut conn = MockConnection::new("ldp").with_dbms("Redshift");
        assert_eq!(Dialect::resolve(&mut conn).unwrap(), Dialect::Redshift);
        assert!(matches!(
            Dialect::from_dbms_name("Oracle"),
            Err(WarehouseError::UnsupportedDbms(_))
        ));
    }

    #[test]
    fn current_timestamp_literals() {
        assert_eq!(Dialect::PostgreSql.current_timestamp(), "CURRENT_TIMESTAMP");
        assert_eq!(Dialect::Redshift.current_timestamp(), "GETDATE()");
        assert_eq!(Dialect::Sqlite.current_timestamp(), "CURRENT_TIMESTAMP");
    }

    #[test]
    fn schemas_exist_only_on_servers() {
        assert_eq!(
            Dialect::PostgreSql.create_schema("history").as_deref(),
            Some("CREATE SCHEMA IF NOT EXISTS history;")
        );
        assert!(Dialect::Sqlite.create_schema("history").is_none());
        assert_eq!(Dialect::Sqlite.drop_table("t"), "DROP TABLE IF EXISTS t;");
        assert!(Dialect::PostgreSql.drop_table("t").ends_with("CASCADE;"));
    }

    #[test]
    fn live_tables_are_pinned_to_main_on_sqlite() {
        assert_eq!(Dialect::Sqlite.live_table("users"), "main.users");
        assert_eq!(Dialect::PostgreSql.live_table("users"), "users");
        assert_eq!(Dialect::Redshift.live_table("users"), "users");
    }

    #[test]
    fn constraint_name_follows_convention() {
        assert_eq!(orders_fk().constraint_name(), "orders_user_id_sk_fkey");
    }

    #[test]
    fn postgres_foreign_key_is_alter_table() {
        let ddl = Dialect::PostgreSql.add_foreign_key(&orders_fk());
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("DROP CONSTRAINT IF EXISTS orders_user_id_sk_fkey"));
        assert!(ddl[1].contains("ADD CONSTRAINT"));
        assert!(ddl[1].contains("FOREIGN KEY (user_id_sk)"));
        assert!(ddl[1].contains("users"));
    }

    #[test]
    fn sqlite_foreign_key_is_trigger_pair() {
        let ddl = Dialect::Sqlite.add_foreign_key(&orders_fk());
        assert_eq!(ddl.len(), 4);
        assert!(ddl[1].contains("CREATE TRIGGER orders_user_id_sk_fkey_insert"));
        assert!(ddl[3].contains("BEFORE UPDATE OF user_id_sk ON orders"));
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
    }
}
