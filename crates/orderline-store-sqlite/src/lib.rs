//! SQLite order store
//!
//! Implements `OrderStore` over a sqlx SQLite pool. Each order is spread over
//! four tables (`orders`, `delivery`, `payment`, `items`) and written in a
//! single transaction.

mod rows;
mod schema;
mod store;

pub use store::{SqliteOrderStore, SqliteStoreConfig};
