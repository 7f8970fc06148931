//! `OrderStore` over SQLite

use async_trait::async_trait;
use orderline_core::{Error, Order, OrderStore, PutOutcome, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::{rows, schema};

/// Connection settings for [`SqliteOrderStore`]
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// sqlx URL, e.g. `sqlite://orders.db` or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl SqliteStoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// SQLite-backed order store
#[derive(Clone)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Connect, creating the database file and tables if needed
    pub async fn connect(config: &SqliteStoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| Error::Config(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);

        // Every connection to `:memory:` is its own database, and closing the
        // last one drops it
        if config.database_url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating tables if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::initialize_schema(&pool).await?;
        tracing::info!("SQLite order store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert(&self, order: &Order) -> std::result::Result<PutOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = ?)")
                .bind(&order.order_uid)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            tx.rollback().await?;
            return Ok(PutOutcome::AlreadyExists);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
        .await;

        // Lost a race with a concurrent writer of the same order
        if let Err(sqlx::Error::Database(db)) = &inserted {
            if db.is_unique_violation() {
                tx.rollback().await?;
                return Ok(PutOutcome::AlreadyExists);
            }
        }
        inserted?;

        let d = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
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
        .execute(&mut *tx)
        .await?;

        let p = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payment (order_uid, transaction_id, request_id, currency, provider,
                amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO items (order_uid, position, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(PutOutcome::Created)
    }

    /// Load orders, optionally restricted to one id, with all nested rows
    async fn fetch(&self, order_uid: Option<&str>) -> Result<Vec<Order>> {
        let headers = sqlx::query(
            "SELECT * FROM orders WHERE (?1 IS NULL OR order_uid = ?1) ORDER BY order_uid",
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let mut orders = Vec::with_capacity(headers.len());
        let mut index = HashMap::with_capacity(headers.len());
        for row in &headers {
            let order = rows::order_header(row)?;
            index.insert(order.order_uid.clone(), orders.len());
            orders.push(order);
        }

        let deliveries = sqlx::query("SELECT * FROM delivery WHERE (?1 IS NULL OR order_uid = ?1)")
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;
        for row in &deliveries {
            let key: String = sqlx::Row::try_get(row, "order_uid").map_err(read_error)?;
            if let Some(&i) = index.get(&key) {
                orders[i].delivery = rows::delivery(row)?;
            }
        }

        let payments = sqlx::query("SELECT * FROM payment WHERE (?1 IS NULL OR order_uid = ?1)")
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;
        for row in &payments {
            let key: String = sqlx::Row::try_get(row, "order_uid").map_err(read_error)?;
            if let Some(&i) = index.get(&key) {
                orders[i].payment = rows::payment(row)?;
            }
        }

        let items = sqlx::query(
            "SELECT * FROM items WHERE (?1 IS NULL OR order_uid = ?1) ORDER BY order_uid, position",
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;
        for row in &items {
            let key: String = sqlx::Row::try_get(row, "order_uid").map_err(read_error)?;
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
impl OrderStore for SqliteOrderStore {
    async fn put(&self, order: &Order) -> Result<PutOutcome> {
        let outcome = self.insert(order).await.map_err(write_error)?;
        tracing::debug!(order_uid = %order.order_uid, ?outcome, "SQLite put");
        Ok(outcome)
    }

    async fn get_by_key(&self, order_uid: &str) -> Result<Option<Order>> {
        Ok(self.fetch(Some(order_uid)).await?.into_iter().next())
    }

    async fn scan_all(&self) -> Result<Vec<Order>> {
        self.fetch(None).await
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite order store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::testing::sample_order;
    use tempfile::TempDir;

    async fn memory_store() -> SqliteOrderStore {
        SqliteOrderStore::connect(&SqliteStoreConfig::new("sqlite::memory:"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_returns_full_order() {
        let store = memory_store().await;
        let order = sample_order("b563feb7b2b84b6test");

        assert_eq!(store.put(&order).await.unwrap(), PutOutcome::Created);
        let loaded = store.get_by_key("b563feb7b2b84b6test").await.unwrap();

        assert_eq!(loaded, Some(order));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = memory_store().await;
        assert_eq!(store.get_by_key("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_put_is_already_exists() {
        let store = memory_store().await;
        let order = sample_order("dup");

        assert_eq!(store.put(&order).await.unwrap(), PutOutcome::Created);

        let mut changed = order.clone();
        changed.track_number = "OTHER".to_string();
        assert_eq!(store.put(&changed).await.unwrap(), PutOutcome::AlreadyExists);

        // First write wins
        let loaded = store.get_by_key("dup").await.unwrap().unwrap();
        assert_eq!(loaded.track_number, order.track_number);
    }

    #[tokio::test]
    async fn test_failed_item_insert_rolls_back_whole_order() {
        let store = memory_store().await;
        sqlx::query(
            "CREATE TRIGGER reject_poison_item BEFORE INSERT ON items \
             WHEN NEW.name = 'poison' BEGIN SELECT RAISE(ABORT, 'item rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let mut order = sample_order("broken");
        order.items[1].name = "poison".to_string();

        let err = store.put(&order).await.unwrap_err();
        assert!(matches!(err, Error::StoreWriteFailed(_)));
        assert!(err.is_transient());

        assert_eq!(store.get_by_key("broken").await.unwrap(), None);
        assert!(store.scan_all().await.unwrap().is_empty());

        // The id is free again once the write can succeed
        order.items[1].name = "Lipstick".to_string();
        assert_eq!(store.put(&order).await.unwrap(), PutOutcome::Created);
    }

    #[tokio::test]
    async fn test_negative_amounts_are_stored_as_published() {
        let store = memory_store().await;
        let mut order = sample_order("refund");
        order.items[0].price = -453;
        order.payment.amount = -1817;

        assert_eq!(store.put(&order).await.unwrap(), PutOutcome::Created);
        assert_eq!(store.get_by_key("refund").await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_scan_all_preserves_item_order() {
        let store = memory_store().await;
        let mut many_items = sample_order("many");
        many_items.items = (0..12)
            .map(|i| {
                let mut item = sample_order("many").items[0].clone();
                item.chrt_id = 100 - i;
                item
            })
            .collect();
        let no_items = Order {
            items: Vec::new(),
            ..sample_order("empty")
        };

        store.put(&many_items).await.unwrap();
        store.put(&no_items).await.unwrap();
        store.put(&sample_order("third")).await.unwrap();

        let all = store.scan_all().await.unwrap();
        assert_eq!(all.len(), 3);
        let by_id: HashMap<_, _> = all.into_iter().map(|o| (o.order_uid.clone(), o)).collect();
        assert_eq!(by_id["many"], many_items);
        assert_eq!(by_id["empty"], no_items);
        assert_eq!(by_id["third"], sample_order("third"));
    }

    #[tokio::test]
    async fn test_file_database_survives_reconnect() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", temp_dir.path().join("orders.db").display());

        let store = SqliteOrderStore::connect(&SqliteStoreConfig::new(&url))
            .await
            .unwrap();
        store.put(&sample_order("persisted")).await.unwrap();
        store.close().await;

        let reopened = SqliteOrderStore::connect(&SqliteStoreConfig::new(&url))
            .await
            .unwrap();
        assert_eq!(
            reopened.get_by_key("persisted").await.unwrap(),
            Some(sample_order("persisted"))
        );
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = memory_store().await;
        store.close().await;

        let err = store.put(&sample_order("late")).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(matches!(
            store.get_by_key("late").await.unwrap_err(),
            Error::StoreUnavailable(_)
        ));
    }
}
