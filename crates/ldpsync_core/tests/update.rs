//! End-to-end update runs against a SQLite warehouse.

use ldpsync_core::{UpdateOptions, Updater};
use ldpsync_idmap::{IdMapStore, MemoryIdMapStore};
use ldpsync_testkit::prelude::*;
use serde_json::json;

fn sk_of(wh: &TestWarehouse, table: &str, id: &str) -> Option<String> {
    wh.scalar(&format!("SELECT sk FROM {table} WHERE id = '{id}';"))
}

#[test]
fn full_run_loads_every_table() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir());
    let store = MemoryIdMapStore::new();
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, store.clone())
        .unwrap();

    assert_eq!(report.updated_tables().collect::<Vec<_>>(), vec!["users", "orders"]);
    assert_eq!(extractor.authentications, 1);
    assert_eq!(wh.count("users"), 2);
    assert_eq!(wh.count("orders"), 3);
    assert_eq!(wh.count("history.orders"), 3);
    assert!(wh.has_table("history.users"));
    assert!(!wh.has_table("orders_ldp_stage"));
    assert!(report.inference.is_none());

    // Every id seen, including referenced ones, is committed to both caches.
    assert_eq!(wh.count("ldpsystem.idmap"), 5);
    assert_eq!(store.committed_len(), 5);
    assert_eq!(store.vacuum_count(), 1);

    let row = &wh.rows(
        "SELECT updated, row_count, history_row_count, documentation \
         FROM ldpsystem.tables WHERE table_name = 'orders';",
    )[0];
    assert!(row[0].is_some());
    assert_eq!(row[1].as_deref(), Some("3"));
    assert_eq!(row[2].as_deref(), Some("3"));
    assert_eq!(
        row[3].as_deref(),
        Some("/orders-storage/purchase-orders in mod-orders-storage")
    );
}

#[test]
fn references_carry_the_referenced_sk() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir());
    Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    let user_sk = sk_of(&wh, "users", USERS[0]);
    let referenced = wh.scalar(&format!(
        "SELECT user_id_sk FROM orders WHERE id = '{}';",
        ORDERS[0]
    ));
    assert!(user_sk.is_some());
    assert_eq!(user_sk, referenced);
    assert_eq!(
        wh.scalar(&format!("SELECT po_number FROM orders WHERE id = '{}';", ORDERS[1]))
            .as_deref(),
        Some("PO1")
    );
}

#[test]
fn single_table_filter_touches_only_that_table() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::initialized(&schema);
    let options = UpdateOptions::new(wh.datadir()).with_table("orders");
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();

    assert_eq!(extractor.retrieved, vec!["orders".to_string()]);
    assert_eq!(report.updated_tables().collect::<Vec<_>>(), vec!["orders"]);
    assert!(!wh.has_table("users"));
    assert!(!wh.has_table("history.users"));
    assert_eq!(
        wh.scalar("SELECT updated FROM ldpsystem.tables WHERE table_name = 'users';"),
        None
    );
    assert!(wh
        .scalar("SELECT updated FROM ldpsystem.tables WHERE table_name = 'orders';")
        .is_some());
}

#[test]
fn anonymized_tables_are_not_processed() {
    let (_, mut extractor) = users_orders(Orphans::None);
    let mut schema = Schema::new(vec![users_table().anonymized(), orders_table()]);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir());
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();

    assert_eq!(report.anonymized, vec!["users".to_string()]);
    assert_eq!(extractor.retrieved, vec!["orders".to_string()]);
    assert!(!wh.has_table("users"));
    assert_eq!(
        wh.scalar("SELECT row_count FROM ldpsystem.tables WHERE table_name = 'users';"),
        None
    );
}

#[test]
fn anonymization_is_suspended_only_when_both_sides_agree() {
    let (_, mut extractor) = users_orders(Orphans::None);
    let mut schema = Schema::new(vec![users_table().anonymized(), orders_table()]);
    let wh = TestWarehouse::initialized(&schema);

    // Local request alone is not enough.
    let options = UpdateOptions::new(wh.datadir()).with_disable_anonymization(true);
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert_eq!(report.anonymized, vec!["users".to_string()]);

    wh.set_general(false, false, false, true);
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert!(report.anonymized.is_empty());
    assert_eq!(wh.count("users"), 2);
}

#[test]
fn tables_without_data_are_skipped() {
    let (mut schema, _) = users_orders(Orphans::None);
    let mut extractor = FixtureExtractor::new().with_records("users", user_records());
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir());
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert_eq!(report.skipped, vec!["orders".to_string()]);
    assert!(schema.table("orders").unwrap().skip);
    assert!(!wh.has_table("orders"));
}

#[test]
fn extract_only_then_load_from_dir() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir())
        .with_extract_only(true)
        .with_save_temps(true);
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert_eq!(report.extracted, vec!["users".to_string(), "orders".to_string()]);
    assert!(report.tables.is_empty());
    assert!(!wh.has_table("users"));

    let pages = wh.datadir().join("tmp").join("update");
    assert!(pages.join("orders_0.json").is_file());
    let mut empty = FixtureExtractor::new();
    let options = UpdateOptions::new(wh.datadir()).with_load_from_dir(&pages);
    let report = Updater::new(&options, wh.source(), &mut empty)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert_eq!(empty.authentications, 0);
    assert!(empty.retrieved.is_empty());
    assert_eq!(report.tables.len(), 2);
    assert_eq!(wh.count("orders"), 3);
    // Loaded pages are left in place.
    assert!(pages.join("orders_0.json").is_file());
}

#[test]
fn first_load_keeps_the_new_history_table() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir()).with_table("users");
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();

    assert_eq!(report.tables[0].row_count, 2);
    assert_eq!(report.tables[0].history_row_count, 2);
    assert_eq!(wh.count("main.users"), 2);
    assert_eq!(wh.count("history.users"), 2);
}

#[test]
fn extract_only_still_infers_over_loaded_tables() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::initialized(&schema);
    let options = UpdateOptions::new(wh.datadir());
    Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert!(wh.foreign_keys().is_empty());

    wh.set_general(true, false, false, false);
    let options = UpdateOptions::new(wh.datadir()).with_extract_only(true);
    let report = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert!(report.tables.is_empty());
    assert_eq!(report.inference.unwrap().enabled().count(), 1);
    assert_eq!(wh.foreign_keys().len(), 1);
}

#[test]
fn extracted_pages_are_removed_without_savetemps() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir());
    Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    assert!(!wh.datadir().join("tmp").join("update").join("orders_0.json").exists());
}

#[test]
fn surrogate_keys_are_stable_across_runs() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::new();
    let options = UpdateOptions::new(wh.datadir());
    Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new())
        .unwrap();
    let first = sk_of(&wh, "users", USERS[1]);

    // A fresh local cache is rebuilt from the warehouse.
    let store = MemoryIdMapStore::new();
    let mut changed = user_records();
    changed[1] = json!({ "id": USERS[1], "username": "renamed", "active": false });
    extractor.set_records("users", changed);
    Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, store.clone())
        .unwrap();

    assert_eq!(sk_of(&wh, "users", USERS[1]), first);
    assert_eq!(store.max_sk().unwrap(), 5);
    // Only the changed record adds a history row.
    assert_eq!(wh.count("history.users"), 3);
    assert_eq!(wh.count("history.orders"), 3);
    assert_eq!(wh.count("ldpsystem.idmap"), 5);
}

#[test]
fn failed_merge_rolls_back_the_table() {
    let (mut schema, mut extractor) = users_orders(Orphans::None);
    let wh = TestWarehouse::initialized(&schema);
    wh.exec("CREATE TABLE history.orders (unrelated INTEGER);");
    let options = UpdateOptions::new(wh.datadir());
    let result = Updater::new(&options, wh.source(), &mut extractor)
        .run(&mut schema, MemoryIdMapStore::new());

    assert!(result.is_err());
    // The table before the failure stays committed.
    assert_eq!(wh.count("users"), 2);
    assert!(!wh.has_table("orders"));
    assert!(!wh.has_table("orders_ldp_stage"));
    // The cache is never committed for an aborted run.
    assert_eq!(wh.count("ldpsystem.idmap"), 0);
}
