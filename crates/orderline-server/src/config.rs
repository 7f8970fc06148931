//! Server configuration
//!
//! Loaded from YAML (default) or TOML, then overridden by `ORDERLINE_*`
//! environment variables and finally by command-line flags.

use orderline_ingest::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bootstrap::BootstrapError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `sqlite:...` or `postgres://...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for entries written by ingestion and read-through lookups
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Newline-delimited payloads from a local file
    #[default]
    File,
    /// Kafka topic (requires the `kafka` feature)
    Kafka,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Keep reading as the file grows instead of closing at end of file
    #[serde(default = "default_true")]
    pub follow: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause before a failed message is processed again
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Processing attempts per message before it waits for a restart
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_brokers")]
    pub brokers: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_group_id")]
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_sql_queries: bool,

    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    5
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_reaper_interval_secs() -> u64 {
    30
}

fn default_snapshot_path() -> String {
    "order_cache.snap".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_brokers() -> String {
    "kafka:9092".to_string()
}

fn default_topic() -> String {
    "orders".to_string()
}

fn default_group_id() -> String {
    "order-service-group".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            source: SourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: None,
            follow: default_true(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_attempts: default_max_attempts(),
            brokers: default_brokers(),
            topic: default_topic(),
            group_id: default_group_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql_queries: false,
            json: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML or TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BootstrapError> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy();
        let path = PathBuf::from(shellexpand::tilde(&path_str).as_ref());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            BootstrapError::FileRead(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| BootstrapError::ParseError(format!("TOML parse error: {}", e)))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| BootstrapError::ParseError(format!("YAML parse error: {}", e)))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("ORDERLINE_HOST") {
            self.host = val;
        }

        if let Ok(val) = std::env::var("ORDERLINE_PORT") {
            match val.parse() {
                Ok(port) => self.port = port,
                Err(_) => eprintln!("Warning: Invalid ORDERLINE_PORT '{}', ignoring", val),
            }
        }

        // DATABASE_URL is honored for compatibility with sqlx tooling
        if let Ok(val) =
            std::env::var("ORDERLINE_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))
        {
            self.database_url = Some(val);
        }

        if let Ok(val) = std::env::var("ORDERLINE_DB_MAX_CONNECTIONS")
            && let Ok(max) = val.parse()
        {
            self.database.max_connections = max;
        }

        // Cache settings
        if let Ok(val) = std::env::var("ORDERLINE_CACHE_TTL_SECS") {
            match val.parse() {
                Ok(secs) => self.cache.default_ttl_secs = secs,
                Err(_) => eprintln!("Warning: Invalid ORDERLINE_CACHE_TTL_SECS '{}', ignoring", val),
            }
        }

        if let Ok(val) = std::env::var("ORDERLINE_REAPER_INTERVAL_SECS") {
            match val.parse() {
                Ok(secs) => self.cache.reaper_interval_secs = secs,
                Err(_) => eprintln!(
                    "Warning: Invalid ORDERLINE_REAPER_INTERVAL_SECS '{}', ignoring",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("ORDERLINE_SNAPSHOT_PATH") {
            self.cache.snapshot_path = val;
        }

        // Message source settings
        if let Ok(val) = std::env::var("ORDERLINE_SOURCE_KIND") {
            match val.to_lowercase().as_str() {
                "file" => self.source.kind = SourceKind::File,
                "kafka" => self.source.kind = SourceKind::Kafka,
                _ => eprintln!("Warning: Invalid ORDERLINE_SOURCE_KIND '{}', using default", val),
            }
        }

        if let Ok(val) = std::env::var("ORDERLINE_SOURCE_PATH") {
            self.source.path = Some(val);
        }

        if let Ok(val) = std::env::var("ORDERLINE_SOURCE_FOLLOW")
            && let Ok(follow) = val.parse::<bool>()
        {
            self.source.follow = follow;
        }

        if let Ok(val) = std::env::var("ORDERLINE_RETRY_BACKOFF_MS")
            && let Ok(ms) = val.parse()
        {
            self.source.retry_backoff_ms = ms;
        }

        if let Ok(val) = std::env::var("ORDERLINE_MAX_ATTEMPTS")
            && let Ok(attempts) = val.parse()
        {
            self.source.max_attempts = attempts;
        }

        if let Ok(val) = std::env::var("ORDERLINE_KAFKA_BROKERS") {
            self.source.brokers = val;
        }

        if let Ok(val) = std::env::var("ORDERLINE_KAFKA_TOPIC") {
            self.source.topic = val;
        }

        if let Ok(val) = std::env::var("ORDERLINE_KAFKA_GROUP_ID") {
            self.source.group_id = val;
        }

        // Logging settings
        if let Ok(val) = std::env::var("ORDERLINE_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("ORDERLINE_LOG_JSON")
            && let Ok(json) = val.parse::<bool>()
        {
            self.logging.json = json;
        }

        if let Ok(val) = std::env::var("ORDERLINE_LOG_SQL")
            && let Ok(log_sql) = val.parse::<bool>()
        {
            self.logging.log_sql_queries = log_sql;
        }
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.cache.default_ttl_secs == 0 {
            return Err(BootstrapError::ValidationError(
                "cache.default_ttl_secs must be greater than zero".to_string(),
            ));
        }

        if self.cache.reaper_interval_secs == 0 {
            return Err(BootstrapError::ValidationError(
                "cache.reaper_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.source.max_attempts == 0 {
            return Err(BootstrapError::ValidationError(
                "source.max_attempts must be at least 1".to_string(),
            ));
        }

        match self.database_url.as_deref() {
            None | Some("") => {
                return Err(BootstrapError::ValidationError(
                    "database_url is required (or set DATABASE_URL)".to_string(),
                ));
            }
            Some(url) if !is_sqlite_url(url) && !is_postgres_url(url) => {
                return Err(BootstrapError::ValidationError(format!(
                    "database_url must start with 'sqlite:' or 'postgres://', got '{}'",
                    url
                )));
            }
            Some(_) => {}
        }

        if self.source.kind == SourceKind::File
            && self.source.path.as_deref().is_none_or(str::is_empty)
        {
            return Err(BootstrapError::ValidationError(
                "source.path is required when source.kind is 'file'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.cache.reaper_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.source.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.source.retry_backoff_ms),
            max_attempts: self.source.max_attempts,
        }
    }

    /// Snapshot path with `~` expanded
    pub fn expanded_snapshot_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache.snapshot_path).as_ref())
    }

    /// Source file path with `~` expanded
    pub fn expanded_source_path(&self) -> Option<PathBuf> {
        self.source
            .path
            .as_ref()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub(crate) fn is_sqlite_url(url: &str) -> bool {
    url.starts_with("sqlite:")
}

pub(crate) fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}
