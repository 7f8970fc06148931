use orderline_core::{Error, Result};
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_uid TEXT PRIMARY KEY,
        track_number TEXT NOT NULL,
        entry TEXT NOT NULL,
        locale TEXT NOT NULL,
        internal_signature TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        delivery_service TEXT NOT NULL,
        shardkey TEXT NOT NULL,
        sm_id INTEGER NOT NULL,
        date_created TIMESTAMP NOT NULL,
        oof_shard TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS delivery (
        order_uid TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        zip TEXT NOT NULL,
        city TEXT NOT NULL,
        address TEXT NOT NULL,
        region TEXT NOT NULL,
        email TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS payment (
        order_uid TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
        transaction_id TEXT NOT NULL,
        request_id TEXT NOT NULL,
        currency TEXT NOT NULL,
        provider TEXT NOT NULL,
        amount INTEGER NOT NULL,
        payment_dt INTEGER NOT NULL,
        bank TEXT NOT NULL,
        delivery_cost INTEGER NOT NULL,
        goods_total INTEGER NOT NULL,
        custom_fee INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        order_uid TEXT NOT NULL REFERENCES orders(order_uid) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        chrt_id INTEGER NOT NULL,
        track_number TEXT NOT NULL,
        price INTEGER NOT NULL,
        rid TEXT NOT NULL,
        name TEXT NOT NULL,
        sale INTEGER NOT NULL,
        size TEXT NOT NULL,
        total_price INTEGER NOT NULL,
        nm_id INTEGER NOT NULL,
        brand TEXT NOT NULL,
        status INTEGER NOT NULL,
        PRIMARY KEY (order_uid, position)
    )
    "#,
];

/// Create tables if they do not exist
pub(crate) async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
    }
    Ok(())
}
