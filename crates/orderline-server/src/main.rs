use clap::Parser;
use orderline_observability::logging::init_tracing;
use orderline_server::{App, BootstrapError, ServerConfig, SnapshotStatus};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "orderline-server")]
#[command(about = "Order ingestion and lookup service", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "ORDERLINE_CONFIG")]
    config: Option<String>,

    /// Port to listen on (overrides config and environment)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (sqlite:... or postgres://...)
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    // Environment overrides the file, CLI flags override both
    config.merge_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(
        &config.logging.level,
        config.logging.json,
        config.logging.log_sql_queries,
    )?;

    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("Using default configuration"),
    }

    let app = App::start(&config).await?;

    let boot = app.boot_report();
    match &boot.snapshot {
        SnapshotStatus::Loaded(count) => info!(entries = count, "Restored cache snapshot"),
        SnapshotStatus::Missing => info!("Started without a cache snapshot"),
        SnapshotStatus::Unreadable(reason) => info!(%reason, "Discarded unreadable cache snapshot"),
    }
    info!(reconciled = boot.reconciled, "Cache ready");

    let addr = config.bind_address();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            app.shutdown().await;
            return Err(BootstrapError::Bind(addr, e).into());
        }
    };
    info!("Listening on http://{}", addr);
    info!("  GET /order/{{order_uid}}");
    info!("  GET /healthz, /readyz, /metrics");

    let report = app.serve(listener, shutdown_signal()).await?;
    if let Some(error) = report.snapshot_error {
        tracing::warn!(%error, "Final cache snapshot was not written");
    }

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
