//! Orderline server
//!
//! Wires the cache, durable store, and ingestion consumer together and
//! serves order lookups over HTTP:
//! - `config`: YAML/TOML configuration with environment overrides
//! - `bootstrap`: store and message source selection
//! - `lookup`: read-through lookups with JSON error bodies
//! - `coordinator`: boot reconciliation and ordered shutdown
//! - `http`: axum routes

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod lookup;

pub use app::App;
pub use bootstrap::BootstrapError;
pub use config::ServerConfig;
pub use coordinator::{BootReport, Coordinator, ShutdownReport, SnapshotStatus};
pub use lookup::{LookupError, LookupService};
