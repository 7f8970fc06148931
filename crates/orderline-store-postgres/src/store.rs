//! PostgreSQL implementation of `OrderStore`

use async_trait::async_trait;
use orderline_core::{Error, Order, OrderStore, PutOutcome, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PostgresStoreConfig;
use crate::{rows, schema};

const SELECT_ORDERS: &str = r#"
    SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
           o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
           d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
           p.transaction_id, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
           p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    JOIN delivery d ON d.order_uid = o.order_uid
    JOIN payment p ON p.order_uid = o.order_uid
    WHERE ($1::TEXT IS NULL OR o.order_uid = $1)
    ORDER BY o.order_uid
"#;

const SELECT_ITEMS: &str = r#"
    SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size,
           total_price, nm_id, brand, status
    FROM items
    WHERE ($1::TEXT IS NULL OR order_uid = $1)
    ORDER BY order_uid, position
"#;

/// PostgreSQL-backed order store
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    /// Connect with default pool settings
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_config(database_url, PostgresStoreConfig::default()).await
    }

    /// Connect with custom pool settings and create tables if needed
    ///
    /// # Errors
    /// - `Error::StoreUnavailable` if the connection fails
    /// - `Error::Database` if table creation fails
    pub async fn with_config(database_url: &str, config: PostgresStoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(database_url)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        schema::initialize_schema(&pool).await?;
        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL order store ready"
        );

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create from an existing pool (tables must already exist)
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_nested(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> std::result::Result<(), sqlx::Error> {
        let d = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&order.order_uid)
        .bind(&d.name)
        .bind(&d.phone)
        .bind(&d.zip)
        .bind(&d.city)
        .bind(&d.address)
        .bind(&d.region)
        .bind(&d.email)
        .execute(&mut **tx)
        .await?;

        let p = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payment (order_uid, transaction_id, request_id, currency, provider,
                amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&order.order_uid)
        .bind(&p.transaction)
        .bind(&p.request_id)
        .bind(&p.currency)
        .bind(&p.provider)
        .bind(p.amount)
        .bind(p.payment_dt)
        .bind(&p.bank)
        .bind(p.delivery_cost)
        .bind(p.goods_total)
        .bind(p.custom_fee)
        .execute(&mut **tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO items (order_uid, position, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(&order.order_uid)
            .bind(position as i64)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn fetch(&self, order_uid: Option<&str>) -> Result<Vec<Order>> {
        let order_rows = sqlx::query(SELECT_ORDERS)
            .bind(order_uid)
            .fetch_all(&*self.pool)
            .await
            .map_err(read_error)?;

        if order_rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut orders = Vec::with_capacity(order_rows.len());
        let mut index = HashMap::with_capacity(order_rows.len());
        for row in &order_rows {
            let mut order = rows::order_header(row)?;
            order.delivery = rows::delivery(row)?;
            order.payment = rows::payment(row)?;
            index.insert(order.order_uid.clone(), orders.len());
            orders.push(order);
        }

        let item_rows = sqlx::query(SELECT_ITEMS)
            .bind(order_uid)
            .fetch_all(&*self.pool)
            .await
            .map_err(read_error)?;
        for row in &item_rows {
            let key: String = row.try_get("order_uid").map_err(read_error)?;
            if let Some(&i) = index.get(&key) {
                orders[i].items.push(rows::item(row)?);
            }
        }

        Ok(orders)
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

fn read_error(e: sqlx::Error) -> Error {
    if is_connection_error(&e) {
        Error::StoreUnavailable(e.to_string())
    } else {
        Error::Database(e.to_string())
    }
}

fn write_error(e: sqlx::Error) -> Error {
    if is_connection_error(&e) {
        Error::StoreUnavailable(e.to_string())
    } else {
        Error::StoreWriteFailed(e.to_string())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn put(&self, order: &Order) -> Result<PutOutcome> {
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        // ON CONFLICT covers both an earlier write and a concurrent one
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(write_error)?;
            tracing::debug!(order_uid = %order.order_uid, "Order already stored");
            return Ok(PutOutcome::AlreadyExists);
        }

        Self::insert_nested(&mut tx, order)
            .await
            .map_err(write_error)?;
        tx.commit().await.map_err(write_error)?;

        tracing::debug!(order_uid = %order.order_uid, items = order.items.len(), "Order stored");
        Ok(PutOutcome::Created)
    }

    async fn get_by_key(&self, order_uid: &str) -> Result<Option<Order>> {
        Ok(self.fetch(Some(order_uid)).await?.into_iter().next())
    }

    async fn scan_all(&self) -> Result<Vec<Order>> {
        self.fetch(None).await
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL order store closed");
    }
}
