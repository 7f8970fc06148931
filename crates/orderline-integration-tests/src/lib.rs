//! Shared fixtures for the cross-crate scenario tests in `tests/`

use chrono::{DateTime, TimeZone, Utc};
use orderline_core::testing::sample_order;
use orderline_core::{ManualClock, Order};
use orderline_store_sqlite::{SqliteOrderStore, SqliteStoreConfig};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Start time used by every clock-driven scenario
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(start_time())
}

/// SQLite store backed by a file in `dir`
pub async fn sqlite_store(dir: &Path) -> Arc<SqliteOrderStore> {
    let url = format!("sqlite://{}", dir.join("orders.db").display());
    let store = SqliteOrderStore::connect(&SqliteStoreConfig::new(url))
        .await
        .unwrap();
    Arc::new(store)
}

/// An order whose second item is named `item_name`
pub fn order_with_item_named(order_uid: &str, item_name: &str) -> Order {
    let mut order = sample_order(order_uid);
    order.items[1].name = item_name.to_string();
    order
}

/// Make every write that includes an item named `item_name` fail mid-transaction
pub async fn reject_items_named(store: &SqliteOrderStore, item_name: &str) {
    let sql = format!(
        "CREATE TRIGGER reject_item BEFORE INSERT ON items WHEN NEW.name = '{}' \
         BEGIN SELECT RAISE(ABORT, 'item rejected'); END",
        item_name
    );
    sqlx::query(&sql).execute(store.pool()).await.unwrap();
}

/// Undo [`reject_items_named`]
pub async fn accept_all_items(store: &SqliteOrderStore) {
    sqlx::query("DROP TRIGGER IF EXISTS reject_item")
        .execute(store.pool())
        .await
        .unwrap();
}

/// Rows for `order_uid` in orders, delivery, payment, and items
pub async fn row_counts(store: &SqliteOrderStore, order_uid: &str) -> [i64; 4] {
    let mut counts = [0; 4];
    for (count, table) in counts
        .iter_mut()
        .zip(["orders", "delivery", "payment", "items"])
    {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE order_uid = ?", table);
        *count = sqlx::query_scalar(&sql)
            .bind(order_uid)
            .fetch_one(store.pool())
            .await
            .unwrap();
    }
    counts
}

/// Append one payload per line to `path`
pub fn append_lines(path: &Path, payloads: &[Vec<u8>]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for payload in payloads {
        file.write_all(payload).unwrap();
        file.write_all(b"\n").unwrap();
    }
}
