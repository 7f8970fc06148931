//! Assembled service
//!
//! [`App::start`] connects the store, opens the message source, boots the
//! cache, and starts ingestion; [`App::serve`] runs the HTTP server until the
//! shutdown future resolves and then hands off to the coordinator.

use axum::Router;
use orderline_cache::OrderCache;
use orderline_core::{MessageSource, OrderStore};
use orderline_ingest::IngestPipeline;
use orderline_observability::{HealthState, Metrics};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::bootstrap::{self, BootstrapError};
use crate::config::ServerConfig;
use crate::coordinator::{BootReport, Coordinator, RunningServices, ShutdownReport};
use crate::http;
use crate::lookup::LookupService;

/// A booted service with ingestion running
pub struct App {
    coordinator: Coordinator,
    running: RunningServices,
    cache: OrderCache,
    metrics: Arc<Metrics>,
    router: Router,
    boot: BootReport,
}

impl App {
    /// Connect to the configured store and source, then start
    pub async fn start(config: &ServerConfig) -> Result<Self, BootstrapError> {
        config.validate()?;
        let store = bootstrap::connect_store(config).await?;
        let source = match bootstrap::open_source(config).await {
            Ok(source) => source,
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        };
        Self::start_with(config, store, source).await
    }

    /// Start on an already connected store and source
    pub async fn start_with(
        config: &ServerConfig,
        store: Arc<dyn OrderStore>,
        source: Box<dyn MessageSource>,
    ) -> Result<Self, BootstrapError> {
        let metrics =
            Arc::new(Metrics::new().map_err(|e| BootstrapError::Metrics(e.to_string()))?);
        let cache = OrderCache::new().with_metrics(metrics.clone());

        let coordinator = Coordinator::new(
            cache.clone(),
            store.clone(),
            config.expanded_snapshot_path(),
            config.reaper_interval(),
        )
        .with_retry_policy(config.retry_policy());
        let boot = coordinator.boot().await;

        let pipeline = IngestPipeline::new(cache.clone(), store.clone(), config.default_ttl())
            .with_metrics(metrics.clone());
        let running = coordinator.start(source, pipeline);

        let lookup = LookupService::new(cache.clone(), store, config.default_ttl())
            .with_metrics(metrics.clone());
        let health = HealthState::with_readiness_checker(metrics.clone(), coordinator.readiness());
        let router = http::router(lookup, health);

        Ok(Self {
            coordinator,
            running,
            cache,
            metrics,
            router,
            boot,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn boot_report(&self) -> &BootReport {
        &self.boot
    }

    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Serve HTTP on `listener` until `shutdown` resolves, then shut down
    ///
    /// The coordinator shutdown runs even if the HTTP server fails.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<ShutdownReport, BootstrapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let served = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown)
            .await;

        let report = self.shutdown().await;
        served.map_err(BootstrapError::Serve)?;
        Ok(report)
    }

    /// Stop ingestion, persist the cache, and close the source and store
    pub async fn shutdown(self) -> ShutdownReport {
        self.coordinator.shutdown(self.running).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::coordinator::SnapshotStatus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use orderline_core::MemoryOrderStore;
    use orderline_core::testing::{sample_order, sample_payload};
    use orderline_ingest::sources::channel;
    use tempfile::TempDir;
    use tower::ServiceExt; // for oneshot

    fn config(dir: &TempDir) -> ServerConfig {
        ServerConfig {
            database_url: Some("sqlite::memory:".to_string()),
            source: SourceConfig {
                path: Some(dir.path().join("orders.ndjson").to_string_lossy().into_owned()),
                follow: false,
                ..SourceConfig::default()
            },
            cache: crate::config::CacheConfig {
                snapshot_path: dir.path().join("cache.snap").to_string_lossy().into_owned(),
                ..Default::default()
            },
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_with_reconciles_and_serves() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOrderStore::with_orders([sample_order("A1")]);
        let (sender, source) = channel::channel(4);

        let app = App::start_with(&config(&dir), Arc::new(store.clone()), Box::new(source))
            .await
            .unwrap();
        assert_eq!(app.boot_report().snapshot, SnapshotStatus::Missing);
        assert_eq!(app.boot_report().reconciled, 1);

        sender.send(sample_payload("B2")).await.unwrap();
        drop(sender);
        while store.len() < 2 {
            tokio::task::yield_now().await;
        }

        for uid in ["A1", "B2"] {
            let response = app
                .router()
                .oneshot(
                    Request::builder()
                        .uri(format!("/order/{}", uid))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let report = app.shutdown().await;
        assert_eq!(report.snapshot_entries, Some(2));
    }

    #[tokio::test]
    async fn test_start_from_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("orders.ndjson"),
            String::from_utf8(sample_payload("C3")).unwrap() + "\n",
        )
        .unwrap();

        let app = App::start(&config(&dir)).await.unwrap();
        while !app.cache().contains("C3").await {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let report = app.shutdown().await;
        assert_eq!(report.consumer.unwrap().committed, 1);
        assert!(dir.path().join("cache.snap").exists());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.database_url = None;

        let err = App::start(&config).await.err().unwrap();
        assert!(matches!(err, BootstrapError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOrderStore::new();
        let (_sender, source) = channel::channel(1);
        let app = App::start_with(&config(&dir), Arc::new(store), Box::new(source))
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(app.serve(listener, async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let report = server.await.unwrap().unwrap();
        assert!(report.consumer.is_some());
        assert_eq!(report.snapshot_entries, Some(0));
    }
}
