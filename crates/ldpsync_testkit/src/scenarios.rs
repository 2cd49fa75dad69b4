//! Canned scenarios over a `users`/`orders` schema.

use crate::extractor::FixtureExtractor;
use ldpsync_core::{Schema, TableSchema};
use serde_json::{json, Value};

/// User ids.
pub const USERS: [&str; 2] = [
    "0b1f7d2c-1a2b-4c3d-8e9f-0a1b2c3d4e5f",
    "1c2e8e3d-2b3c-4d4e-9f0a-1b2c3d4e5f60",
];

/// Order ids.
pub const ORDERS: [&str; 3] = [
    "7c9e6679-7425-40de-944b-e07fc1f90ae7",
    "8d0f7780-8536-41ef-a55c-f18ad2e01bf8",
    "9e1a8891-9647-42f0-b66d-a29be3f12ca9",
];

/// A user id that no `users` record carries.
pub const MISSING_USER: &str = "ffffffff-0000-4000-8000-000000000001";

/// Whether the scenario contains orphaned orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orphans {
    /// Every order references an existing user.
    None,
    /// The last order references [`MISSING_USER`].
    One,
}

/// The `users` table.
pub fn users_table() -> TableSchema {
    TableSchema::new("users", "/users", "mod-users")
}

/// The `orders` table.
pub fn orders_table() -> TableSchema {
    TableSchema::new("orders", "/orders-storage/purchase-orders", "mod-orders-storage")
}

/// User records.
pub fn user_records() -> Vec<Value> {
    USERS
        .iter()
        .enumerate()
        .map(|(i, id)| json!({ "id": id, "username": format!("user{i}"), "active": true }))
        .collect()
}

/// Order records.
pub fn order_records(orphans: Orphans) -> Vec<Value> {
    ORDERS
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let user = match (orphans, i) {
                (Orphans::One, 2) => MISSING_USER,
                _ => USERS[i % USERS.len()],
            };
            json!({ "id": id, "userId": user, "poNumber": format!("PO{i}"), "total": 10 + i })
        })
        .collect()
}

/// The `users`/`orders` schema and an extractor serving it.
pub fn users_orders(orphans: Orphans) -> (Schema, FixtureExtractor) {
    let schema = Schema::new(vec![users_table(), orders_table()]);
    let extractor = FixtureExtractor::new()
        .with_records("users", user_records())
        .with_records("orders", order_records(orphans));
    (schema, extractor)
}
