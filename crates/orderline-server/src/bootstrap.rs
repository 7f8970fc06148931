//! Startup wiring
//!
//! Turns a validated [`ServerConfig`] into a connected durable store and an
//! open message source. Failures here are fatal: the binary reports them and
//! exits without serving.

use orderline_core::{MessageSource, OrderStore};
use orderline_ingest::sources::FileSource;
use orderline_store_sqlite::{SqliteOrderStore, SqliteStoreConfig};
use std::sync::Arc;

use crate::config::{ServerConfig, SourceKind, is_postgres_url, is_sqlite_url};

/// Fatal startup errors
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// File read error
    #[error("Failed to read config: {0}")]
    FileRead(String),

    /// Parse error
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),

    /// The durable store could not be reached
    #[error("Failed to connect to store: {0}")]
    Store(#[source] orderline_core::Error),

    /// The message source could not be opened
    #[error("Failed to open message source: {0}")]
    Source(#[source] orderline_core::Error),

    /// Support for this backend was not compiled in
    #[error("{0} support not enabled (rebuild with --features {1})")]
    FeatureDisabled(&'static str, &'static str),

    #[error("Failed to initialize metrics: {0}")]
    Metrics(String),

    #[error("Failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Connect to the store named by `database_url`
pub async fn connect_store(config: &ServerConfig) -> Result<Arc<dyn OrderStore>, BootstrapError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| BootstrapError::ValidationError("database_url is required".to_string()))?;

    if is_sqlite_url(url) {
        let store_config =
            SqliteStoreConfig::new(url).with_max_connections(config.database.max_connections);
        let store = SqliteOrderStore::connect(&store_config)
            .await
            .map_err(BootstrapError::Store)?;
        tracing::info!("Using SQLite order store");
        return Ok(Arc::new(store));
    }

    if is_postgres_url(url) {
        return connect_postgres(url, config).await;
    }

    Err(BootstrapError::ValidationError(format!(
        "Unsupported database_url scheme: {}",
        url
    )))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(
    url: &str,
    config: &ServerConfig,
) -> Result<Arc<dyn OrderStore>, BootstrapError> {
    use orderline_store_postgres::{PostgresOrderStore, PostgresStoreConfig};

    let store_config =
        PostgresStoreConfig::new().with_max_connections(config.database.max_connections);
    let store = PostgresOrderStore::with_config(url, store_config)
        .await
        .map_err(BootstrapError::Store)?;
    tracing::info!("Using PostgreSQL order store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(
    _url: &str,
    _config: &ServerConfig,
) -> Result<Arc<dyn OrderStore>, BootstrapError> {
    Err(BootstrapError::FeatureDisabled("PostgreSQL", "postgres"))
}

/// Open the configured message source
pub async fn open_source(config: &ServerConfig) -> Result<Box<dyn MessageSource>, BootstrapError> {
    match config.source.kind {
        SourceKind::File => {
            let path = config.expanded_source_path().ok_or_else(|| {
                BootstrapError::ValidationError("source.path is required".to_string())
            })?;
            let source = FileSource::open(&path, config.source.follow, config.poll_interval())
                .await
                .map_err(BootstrapError::Source)?;
            Ok(Box::new(source))
        }
        SourceKind::Kafka => open_kafka(config),
    }
}

#[cfg(feature = "kafka")]
fn open_kafka(config: &ServerConfig) -> Result<Box<dyn MessageSource>, BootstrapError> {
    use orderline_ingest::sources::{KafkaSource, KafkaSourceConfig};

    let kafka_config = KafkaSourceConfig {
        brokers: config.source.brokers.clone(),
        topic: config.source.topic.clone(),
        group_id: config.source.group_id.clone(),
    };
    let source = KafkaSource::connect(&kafka_config).map_err(BootstrapError::Source)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "kafka"))]
fn open_kafka(_config: &ServerConfig) -> Result<Box<dyn MessageSource>, BootstrapError> {
    Err(BootstrapError::FeatureDisabled("Kafka", "kafka"))
}
