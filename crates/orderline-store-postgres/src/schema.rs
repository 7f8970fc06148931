use orderline_core::{Error, Result};
use sqlx::PgPool;
use tracing::debug;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "orders",
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
            sm_id BIGINT NOT NULL,
            date_created TIMESTAMPTZ NOT NULL,
            oof_shard TEXT NOT NULL
        )
        "#,
    ),
    (
        "delivery",
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
    ),
    (
        "payment",
        r#"
        CREATE TABLE IF NOT EXISTS payment (
            order_uid TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
            transaction_id TEXT NOT NULL,
            request_id TEXT NOT NULL,
            currency TEXT NOT NULL,
            provider TEXT NOT NULL,
            amount BIGINT NOT NULL,
            payment_dt BIGINT NOT NULL,
            bank TEXT NOT NULL,
            delivery_cost BIGINT NOT NULL,
            goods_total BIGINT NOT NULL,
            custom_fee BIGINT NOT NULL
        )
        "#,
    ),
    (
        "items",
        r#"
        CREATE TABLE IF NOT EXISTS items (
            order_uid TEXT NOT NULL REFERENCES orders(order_uid) ON DELETE CASCADE,
            position BIGINT NOT NULL,
            chrt_id BIGINT NOT NULL,
            track_number TEXT NOT NULL,
            price BIGINT NOT NULL,
            rid TEXT NOT NULL,
            name TEXT NOT NULL,
            sale BIGINT NOT NULL,
            size TEXT NOT NULL,
            total_price BIGINT NOT NULL,
            nm_id BIGINT NOT NULL,
            brand TEXT NOT NULL,
            status BIGINT NOT NULL,
            PRIMARY KEY (order_uid, position)
        )
        "#,
    ),
];

/// Create tables if they do not exist
pub(crate) async fn initialize_schema(pool: &PgPool) -> Result<()> {
    for (table, statement) in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to create table {}: {}", table, e)))?;
        debug!(table, "Table ready");
    }
    Ok(())
}
