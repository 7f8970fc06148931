//! Durable order store trait
//!
//! The `OrderStore` trait abstracts the relational store that owns the
//! canonical copy of every order. Implementations:
//! - `SqliteOrderStore`: SQLite via sqlx (single-node deployments, tests)
//! - `PostgresOrderStore`: PostgreSQL via sqlx
//! - `MemoryOrderStore`: in-process map (embedding and tests)

use async_trait::async_trait;

use crate::{Result, order::Order};

/// Result of a successful `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The order was written
    Created,
    /// An order with the same `order_uid` already exists; nothing was written
    AlreadyExists,
}

/// Durable order store
///
/// # Example
/// ```no_run
/// # use orderline_core::{Order, OrderStore, PutOutcome};
/// # async fn example(store: &dyn OrderStore, order: Order) -> orderline_core::Result<()> {
/// match store.put(&order).await? {
///     PutOutcome::Created => println!("stored {}", order.order_uid),
///     PutOutcome::AlreadyExists => println!("duplicate {}", order.order_uid),
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order with its delivery, payment, and items
    ///
    /// The write is all-or-nothing: on error no part of the order is visible
    /// to later reads.
    ///
    /// # Errors
    /// - `Error::StoreUnavailable` if the store cannot be reached
    /// - `Error::StoreWriteFailed` if the transaction fails
    async fn put(&self, order: &Order) -> Result<PutOutcome>;

    /// Fetch a single order by id
    ///
    /// Returns `Ok(None)` if no such order exists.
    async fn get_by_key(&self, order_uid: &str) -> Result<Option<Order>>;

    /// Load every order with its nested data
    ///
    /// Used once at boot to reconcile the cache.
    async fn scan_all(&self) -> Result<Vec<Order>>;

    /// Release connections held by the store
    ///
    /// Used during graceful shutdown.
    async fn close(&self) {
        // Default implementation: no-op
    }
}
