//! PostgreSQL-backed order storage
//!
//! This crate implements the `OrderStore` trait on PostgreSQL. Tables are
//! created on connect if they are missing.
//!
//! # Example
//! ```no_run
//! # use orderline_store_postgres::{PostgresOrderStore, PostgresStoreConfig};
//! # use orderline_core::OrderStore;
//! # async fn example() -> orderline_core::Result<()> {
//! let config = PostgresStoreConfig::default().with_max_connections(10);
//! let store = PostgresOrderStore::with_config("postgres://localhost/orders", config).await?;
//! let orders = store.scan_all().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod rows;
mod schema;
mod store;

pub use config::PostgresStoreConfig;
pub use store::PostgresOrderStore;
