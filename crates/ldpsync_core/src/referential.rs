//! Referential inference.
//!
//! Foreign keys are not declared by the source system, so they are
//! discovered by probing: an identifier column `c` of table `t2` is taken to
//! reference table `t1` when at least one `t2.c_sk` value matches a `t1.sk`.
//!
//! A pass over the schema proceeds in three steps:
//!
//! 1. Probe every reference column against every other table
//!    ([`process_referential_paths`]). Candidates are grouped by referencing
//!    column; a group with one member is enabled, a larger group is
//!    ambiguous and every member is disabled.
//! 2. Replace the stored candidate set in one transaction
//!    ([`persist_candidates`]).
//! 3. For every enabled candidate, report orphaned references and, when
//!    constraints are forced, delete them and materialize the constraint
//!    ([`analyze_referential_paths`]).
//!
//! Probing is exploratory: a probe whose query fails is inconclusive and
//! counts as negative.

use crate::config::GeneralConfig;
use crate::error::UpdateResult;
use crate::schema::{ColumnSchema, Schema, TableSchema};
use ldpsync_warehouse::{
    escape_literal, Connection, DataSource, Dialect, ForeignKey, TxGuard, WarehouseError,
};
use std::collections::{BTreeMap, BTreeSet};

/// A candidate foreign key.
pub type Reference = ForeignKey;

/// Result of probing one referencing column against one table.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// At least one reference matched.
    Confirmed,
    /// The query ran and nothing matched.
    Refuted,
    /// The query failed, e.g. because a table or column does not exist.
    Inconclusive(WarehouseError),
}

impl ProbeOutcome {
    /// Returns true only for [`ProbeOutcome::Confirmed`].
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ProbeOutcome::Confirmed)
    }
}

/// Probes whether `referencing.<column>_sk` joins `referenced.sk`.
pub fn probe<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    referencing: &TableSchema,
    column: &ColumnSchema,
    referenced: &TableSchema,
) -> ProbeOutcome {
    let sql = format!(
        "SELECT 1\n    FROM {} AS r2\n        JOIN {} AS r1\n            \
         ON r2.{} = r1.sk\n    LIMIT 1;",
        dialect.live_table(&referencing.table_name),
        dialect.live_table(&referenced.table_name),
        column.sk_column_name()
    );
    tracing::trace!("{sql}");
    match conn.query(&sql) {
        Ok(rows) if rows.is_empty() => ProbeOutcome::Refuted,
        Ok(_) => ProbeOutcome::Confirmed,
        Err(e) => ProbeOutcome::Inconclusive(e),
    }
}

/// Returns true if the probe confirms a reference. Inconclusive probes are
/// negative.
pub fn is_foreign_key<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    referencing: &TableSchema,
    column: &ColumnSchema,
    referenced: &TableSchema,
) -> bool {
    match probe(conn, dialect, referencing, column, referenced) {
        ProbeOutcome::Inconclusive(e) => {
            tracing::debug!(
                referencing = %referencing.table_name,
                column = %column.column_name,
                referenced = %referenced.table_name,
                error = %e,
                "inconclusive probe"
            );
            false
        }
        outcome => outcome.is_confirmed(),
    }
}

/// A candidate and whether its constraint is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The candidate foreign key.
    pub reference: Reference,
    /// True if this is the only candidate for its referencing column.
    pub enabled: bool,
}

/// Candidates grouped by `<referencing table>.<referencing column>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    groups: BTreeMap<String, Vec<Reference>>,
}

impl CandidateSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate to its group.
    pub fn insert(&mut self, reference: Reference) {
        let key = format!(
            "{}.{}",
            reference.referencing_table, reference.referencing_column
        );
        self.groups.entry(key).or_default().push(reference);
    }

    /// Returns the number of candidates.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns true if there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns every candidate with its enable flag, in key order.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.groups
            .values()
            .flat_map(|group| {
                let enabled = group.len() == 1;
                group.iter().map(move |reference| Candidate {
                    reference: reference.clone(),
                    enabled,
                })
            })
            .collect()
    }

    /// Returns the unambiguous candidates.
    pub fn enabled(&self) -> impl Iterator<Item = &Reference> {
        self.groups
            .values()
            .filter(|group| group.len() == 1)
            .flat_map(|group| group.iter())
    }
}

/// Probes every reference column of `table` against every other table of
/// the schema and adds the confirmed candidates to `candidates`.
pub fn process_referential_paths<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    schema: &Schema,
    table: &TableSchema,
    candidates: &mut CandidateSet,
) {
    tracing::trace!(table = %table.table_name, "searching for foreign keys");
    for column in table.reference_columns() {
        for referenced in &schema.tables {
            if referenced.table_name == table.table_name {
                continue;
            }
            if is_foreign_key(conn, dialect, table, column, referenced) {
                candidates.insert(Reference {
                    referencing_table: table.table_name.clone(),
                    referencing_column: column.sk_column_name(),
                    referenced_table: referenced.table_name.clone(),
                    referenced_column: "sk".to_string(),
                });
            }
        }
    }
}

/// Replaces the contents of `ldpconfig.foreign_keys` with `candidates` in
/// one transaction.
pub fn persist_candidates<C: Connection + ?Sized>(
    conn: &mut C,
    candidates: &CandidateSet,
) -> UpdateResult<()> {
    let mut tx = TxGuard::begin(conn)?;
    let sql = "DELETE FROM ldpconfig.foreign_keys;";
    tracing::trace!("{sql}");
    tx.exec(sql)?;
    for candidate in candidates.candidates() {
        let r = &candidate.reference;
        let sql = format!(
            "INSERT INTO ldpconfig.foreign_keys\n    \
             (enable_constraint,\n        \
             referencing_table, referencing_column,\n        \
             referenced_table, referenced_column)\n    \
             VALUES\n    \
             ({}, '{}', '{}', '{}', '{}');",
            if candidate.enabled { "TRUE" } else { "FALSE" },
            escape_literal(&r.referencing_table),
            escape_literal(&r.referencing_column),
            escape_literal(&r.referenced_table),
            escape_literal(&r.referenced_column)
        );
        tracing::trace!("{sql}");
        tx.exec(&sql)?;
    }
    tx.commit()?;
    Ok(())
}

/// A referencing row whose target does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    /// The dangling surrogate key.
    pub sk: String,
    /// The source identifier it was derived from.
    pub id: Option<String>,
}

/// Outcome of analyzing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanAnalysis {
    /// The analyzed candidate.
    pub reference: Reference,
    /// Every orphaned reference found.
    pub orphans: Vec<Orphan>,
    /// Number of orphaned rows deleted.
    pub deleted: usize,
    /// True if the constraint was materialized.
    pub constraint_added: bool,
}

/// Reports the orphans of `reference` and, when constraints are forced,
/// deletes the orphaned rows and materializes the constraint.
///
/// The caller owns the transaction.
pub fn analyze_referential_paths<C: Connection + ?Sized>(
    conn: &mut C,
    dialect: Dialect,
    reference: &Reference,
    config: &GeneralConfig,
) -> UpdateResult<OrphanAnalysis> {
    let force = config.force_foreign_key_constraints;
    let table = &reference.referencing_table;
    let column = &reference.referencing_column;
    let target = &reference.referenced_table;
    let target_column = &reference.referenced_column;
    let id_column = column.strip_suffix("_sk").unwrap_or(column);
    let live = dialect.live_table(table);
    let sql = format!(
        "SELECT {column} AS fkey_sk,\n       {id_column} AS fkey_id\n    \
         FROM {live}\n    \
         WHERE {column} NOT IN (\n        SELECT {target_column} FROM {}\n    );",
        dialect.live_table(target)
    );
    tracing::trace!("{sql}");
    let mut orphans = Vec::new();
    for row in conn.query(&sql)? {
        let mut cells = row.into_iter();
        let Some(sk) = cells.next().flatten() else {
            continue;
        };
        let id = cells.next().flatten();
        let action = if force { "Deleted (cascading)" } else { "Ignored" };
        if config.enable_foreign_key_warnings {
            tracing::warn!(
                referencing_table = %table,
                referencing_column = %column,
                sk = %sk,
                id = id.as_deref().unwrap_or(""),
                referenced_table = %target,
                action,
                "nonexistent key in referential path"
            );
        } else {
            tracing::debug!(
                referencing_table = %table,
                referencing_column = %column,
                sk = %sk,
                id = id.as_deref().unwrap_or(""),
                referenced_table = %target,
                action,
                "nonexistent key in referential path"
            );
        }
        orphans.push(Orphan { sk, id });
    }

    let mut analysis = OrphanAnalysis {
        reference: reference.clone(),
        deleted: 0,
        orphans,
        constraint_added: false,
    };
    if !force {
        return Ok(analysis);
    }

    let dangling: BTreeSet<&str> = analysis.orphans.iter().map(|o| o.sk.as_str()).collect();
    let mut exec = |sql: &str| -> UpdateResult<()> {
        tracing::trace!("{sql}");
        conn.exec(sql)?;
        Ok(())
    };
    for sk in dangling {
        exec(&format!(
            "DELETE FROM\n    {live}\n    WHERE {column} = {};",
            literal_sk(sk)
        ))?;
    }
    analysis.deleted = analysis.orphans.len();

    let tracked = format!(
        "referencing_table = '{}' AND referencing_column = '{}'",
        escape_literal(table),
        escape_literal(column)
    );
    exec(&format!(
        "DELETE FROM ldpsystem.referential_constraints\n    WHERE {tracked};"
    ))?;
    exec(&format!(
        "INSERT INTO ldpsystem.referential_constraints\n    \
         (referencing_table, referencing_column,\n        \
         referenced_table, referenced_column)\n    \
         VALUES\n    \
         ('{}',\n        '{}',\n        '{}',\n        '{}');",
        escape_literal(table),
        escape_literal(column),
        escape_literal(target),
        escape_literal(target_column)
    ))?;
    for sql in dialect.add_foreign_key(reference) {
        exec(&sql)?;
    }
    analysis.constraint_added = true;
    Ok(analysis)
}

/// Renders an sk read back as text: bare if numeric, quoted otherwise.
fn literal_sk(sk: &str) -> String {
    if !sk.is_empty() && sk.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        sk.to_string()
    } else {
        format!("'{}'", escape_literal(sk))
    }
}

/// Outcome of a referential inference pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReport {
    /// Every persisted candidate.
    pub candidates: Vec<Candidate>,
    /// Orphan analysis of each enabled candidate, when it ran.
    pub analyses: Vec<OrphanAnalysis>,
}

impl InferenceReport {
    /// Returns the enabled candidates.
    pub fn enabled(&self) -> impl Iterator<Item = &Reference> {
        self.candidates
            .iter()
            .filter(|c| c.enabled)
            .map(|c| &c.reference)
    }

    /// Returns the total number of orphans found.
    pub fn orphans(&self) -> usize {
        self.analyses.iter().map(|a| a.orphans.len()).sum()
    }

    /// Returns the total number of orphaned rows deleted.
    pub fn deleted(&self) -> usize {
        self.analyses.iter().map(|a| a.deleted).sum()
    }

    /// Returns the number of constraints materialized.
    pub fn constraints(&self) -> usize {
        self.analyses.iter().filter(|a| a.constraint_added).count()
    }
}

/// Runs a full referential inference pass over the schema.
///
/// Probes run on their own autocommit connection so a failed probe cannot
/// disturb the transactions that follow.
pub fn run_referential_inference(
    source: &dyn DataSource,
    schema: &Schema,
    config: &GeneralConfig,
) -> UpdateResult<InferenceReport> {
    let span = tracing::info_span!("referential");
    let _enter = span.enter();

    let mut candidates = CandidateSet::new();
    let dialect = {
        let mut probe_conn = source.connect()?;
        let dialect = Dialect::resolve(probe_conn.as_mut())?;
        for table in &schema.tables {
            process_referential_paths(probe_conn.as_mut(), dialect, schema, table, &mut candidates);
        }
        dialect
    };

    let mut conn = source.connect()?;
    persist_candidates(conn.as_mut(), &candidates)?;

    let mut report = InferenceReport {
        candidates: candidates.candidates(),
        analyses: Vec::new(),
    };
    if config.force_foreign_key_constraints || config.enable_foreign_key_warnings {
        for reference in candidates.enabled() {
            let mut tx = TxGuard::begin(conn.as_mut())?;
            let analysis = analyze_referential_paths(&mut *tx, dialect, reference, config)?;
            tx.commit()?;
            report.analyses.push(analysis);
        }
    }
    tracing::info!(
        candidates = report.candidates.len(),
        enabled = report.enabled().count(),
        orphans = report.orphans(),
        deleted = report.deleted(),
        constraints = report.constraints(),
        "completed referential inference"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use ldpsync_warehouse::{MockCall, MockConnection};
    use proptest::prelude::*;

    fn reference(table: &str, column: &str, target: &str) -> Reference {
        Reference {
            referencing_table: table.into(),
            referencing_column: column.into(),
            referenced_table: target.into(),
            referenced_column: "sk".into(),
        }
    }

    fn schema() -> Schema {
        Schema::new(vec![
            TableSchema::new("users", "/users", "mod-users").with_column("id", ColumnType::Id),
            TableSchema::new("groups", "/groups", "mod-users").with_column("id", ColumnType::Id),
            TableSchema::new("orders", "/orders", "mod-orders")
                .with_column("id", ColumnType::Id)
                .with_column("user_id", ColumnType::Id)
                .with_column("status", ColumnType::Varchar),
        ])
    }

    #[test]
    fn probe_is_tri_state() {
        let schema = schema();
        let orders = schema.table("orders").unwrap();
        let users = schema.table("users").unwrap();
        let user_id = orders.column("user_id").unwrap();

        let pg = Dialect::PostgreSql;

        let mut conn = MockConnection::new("ldp");
        assert!(matches!(probe(&mut conn, pg, orders, user_id, users), ProbeOutcome::Refuted));
        conn.respond("JOIN users AS r1", vec![vec![Some("1".into())]]);
        assert!(probe(&mut conn, pg, orders, user_id, users).is_confirmed());

        let mut conn = MockConnection::new("ldp");
        conn.fail_on("user_id_sk");
        let outcome = probe(&mut conn, pg, orders, user_id, users);
        assert!(matches!(outcome, ProbeOutcome::Inconclusive(_)));
        assert!(!is_foreign_key(&mut conn, pg, orders, user_id, users));
    }

    #[test]
    fn sqlite_statements_name_main_tables() {
        let schema = schema();
        let orders = schema.table("orders").unwrap();
        let users = schema.table("users").unwrap();
        let user_id = orders.column("user_id").unwrap();

        let mut conn = MockConnection::new("ldp").with_dbms("SQLite");
        conn.respond("JOIN main.users AS r1", vec![vec![Some("1".into())]]);
        assert!(probe(&mut conn, Dialect::Sqlite, orders, user_id, users).is_confirmed());

        conn.respond("NOT IN", vec![vec![Some("9".into()), Some("abc".into())]]);
        let config = GeneralConfig {
            force_foreign_key_constraints: true,
            ..GeneralConfig::default()
        };
        let r = reference("orders", "user_id_sk", "users");
        analyze_referential_paths(&mut conn, Dialect::Sqlite, &r, &config).unwrap();
        let queries: Vec<_> = conn
            .calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::Query(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect();
        assert!(queries[1].contains("FROM main.orders"));
        assert!(queries[1].contains("SELECT sk FROM main.users"));
        assert!(conn
            .durable()
            .contains(&"DELETE FROM\n    main.orders\n    WHERE user_id_sk = 9;".to_string()));
    }

    #[test]
    fn probes_every_other_table() {
        let schema = schema();
        let mut conn = MockConnection::new("ldp");
        conn.respond("JOIN users AS r1", vec![vec![Some("1".into())]]);
        let mut set = CandidateSet::new();
        for table in &schema.tables {
            process_referential_paths(&mut conn, Dialect::PostgreSql, &schema, table, &mut set);
        }
        let probes = conn
            .calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Query(_)))
            .count();
        assert_eq!(probes, 2);
        assert_eq!(
            set.candidates(),
            vec![Candidate {
                reference: reference("orders", "user_id_sk", "users"),
                enabled: true,
            }]
        );
    }

    #[test]
    fn ambiguous_candidates_are_disabled() {
        let mut set = CandidateSet::new();
        set.insert(reference("orders", "user_id_sk", "users"));
        set.insert(reference("orders", "user_id_sk", "groups"));
        set.insert(reference("loans", "item_id_sk", "items"));
        let enabled: Vec<_> = set.enabled().collect();
        assert_eq!(enabled, vec![&reference("loans", "item_id_sk", "items")]);
        assert_eq!(set.candidates().iter().filter(|c| !c.enabled).count(), 2);
    }

    #[test]
    fn persistence_replaces_candidate_table() {
        let mut set = CandidateSet::new();
        set.insert(reference("orders", "user_id_sk", "users"));
        let mut conn = MockConnection::new("ldp");
        persist_candidates(&mut conn, &set).unwrap();
        let durable = conn.durable();
        assert_eq!(durable[0], "DELETE FROM ldpconfig.foreign_keys;");
        assert!(durable[1].contains("(TRUE, 'orders', 'user_id_sk', 'users', 'sk')"));
        assert!(conn.autocommit());
    }

    #[test]
    fn failed_persistence_leaves_previous_set() {
        let mut set = CandidateSet::new();
        set.insert(reference("orders", "user_id_sk", "users"));
        let mut conn = MockConnection::new("ldp");
        conn.fail_on("INSERT INTO ldpconfig.foreign_keys");
        assert!(persist_candidates(&mut conn, &set).is_err());
        assert!(conn.durable().is_empty());
    }

    #[test]
    fn orphans_only_reported_without_force() {
        let mut conn = MockConnection::new("ldp");
        conn.respond("NOT IN", vec![vec![Some("9".into()), Some("abc".into())]]);
        let config = GeneralConfig {
            enable_foreign_key_warnings: true,
            ..GeneralConfig::default()
        };
        let r = reference("orders", "user_id_sk", "users");
        let analysis = analyze_referential_paths(&mut conn, Dialect::PostgreSql, &r, &config).unwrap();
        assert_eq!(
            analysis.orphans,
            vec![Orphan {
                sk: "9".into(),
                id: Some("abc".into())
            }]
        );
        assert_eq!(analysis.deleted, 0);
        assert!(!analysis.constraint_added);
        assert!(conn.durable().is_empty());
    }

    #[test]
    fn force_deletes_and_materializes() {
        let mut conn = MockConnection::new("ldp");
        conn.respond(
            "NOT IN",
            vec![
                vec![Some("9".into()), Some("abc".into())],
                vec![Some("9".into()), Some("abc".into())],
            ],
        );
        let config = GeneralConfig {
            force_foreign_key_constraints: true,
            ..GeneralConfig::default()
        };
        let r = reference("orders", "user_id_sk", "users");
        let analysis = analyze_referential_paths(&mut conn, Dialect::PostgreSql, &r, &config).unwrap();
        assert_eq!(analysis.deleted, 2);
        assert!(analysis.constraint_added);
        let durable = conn.durable();
        let deletes = durable
            .iter()
            .filter(|s| s.starts_with("DELETE FROM\n    orders"))
            .count();
        assert_eq!(deletes, 1);
        assert!(durable
            .iter()
            .any(|s| s.contains("ADD CONSTRAINT\n        orders_user_id_sk_fkey")));
    }

    #[test]
    fn numeric_sks_are_bare() {
        assert_eq!(literal_sk("42"), "42");
        assert_eq!(literal_sk("x'y"), "'x''y'");
    }

    proptest! {
        #[test]
        fn groups_of_one_are_enabled(
            refs in proptest::collection::vec((0u8..4, 0u8..3, 0u8..5), 0..40)
        ) {
            let mut set = CandidateSet::new();
            for (t, c, target) in &refs {
                set.insert(reference(&format!("t{t}"), &format!("c{c}_sk"), &format!("r{target}")));
            }
            let candidates = set.candidates();
            prop_assert_eq!(candidates.len(), refs.len());
            for candidate in &candidates {
                let r = &candidate.reference;
                let group = refs
                    .iter()
                    .filter(|(t, c, _)| {
                        format!("t{t}") == r.referencing_table
                            && format!("c{c}_sk") == r.referencing_column
                    })
                    .count();
                prop_assert_eq!(candidate.enabled, group == 1);
            }
        }
    }
}
