//! Tracing subscriber setup

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Map a config level string to a tracing level, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the env filter for the given level
///
/// sqlx is held at WARN unless SQL query logging is requested.
pub fn build_filter(level: &str, log_sql_queries: bool) -> EnvFilter {
    let mut filter = EnvFilter::new(parse_level(level).to_string());

    if !log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => tracing::warn!("Failed to set sqlx log filter: {}", e),
        }
    }

    if let Ok(extra) = std::env::var("RUST_LOG") {
        for part in extra.split(',').filter(|p| !p.trim().is_empty()) {
            match part.trim().parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring invalid RUST_LOG directive '{}': {}", part, e),
            }
        }
    }

    filter
}

/// Install the global tracing subscriber
pub fn init_tracing(
    level: &str,
    json: bool,
    log_sql_queries: bool,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = build_filter(level, log_sql_queries);

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}
