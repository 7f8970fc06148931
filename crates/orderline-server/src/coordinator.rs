//! Startup and shutdown sequencing
//!
//! Boot restores the cache from its snapshot and then fills in every stored
//! order the snapshot did not cover. Shutdown stops ingestion first so the
//! snapshot it writes reflects every committed message.

use orderline_cache::{OrderCache, ReaperHandle, Ttl};
use orderline_core::{MessageSource, OrderStore};
use orderline_ingest::{Consumer, ConsumerHandle, ConsumerStats, IngestPipeline, RetryPolicy};
use orderline_observability::{ComponentStatus, ReadinessChecker};
use orderline_storage::StorageError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// What happened to the snapshot during boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Snapshot restored with this many entries
    Loaded(usize),
    /// No snapshot file
    Missing,
    /// File present but not usable; the cache started empty
    Unreadable(String),
}

/// Outcome of [`Coordinator::boot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub snapshot: SnapshotStatus,
    /// Stored orders added to the cache as permanent entries
    pub reconciled: usize,
    /// Set when the store scan failed and reconciliation was skipped
    pub scan_error: Option<String>,
}

/// Outcome of [`Coordinator::shutdown`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// `None` if the consumer task panicked
    pub consumer: Option<ConsumerStats>,
    /// Entries written to the final snapshot
    pub snapshot_entries: Option<usize>,
    pub snapshot_error: Option<String>,
}

/// Background tasks started by [`Coordinator::start`]
pub struct RunningServices {
    consumer: ConsumerHandle,
    reaper: ReaperHandle,
}

impl RunningServices {
    /// Whether the consumer has stopped on its own
    pub fn consumer_finished(&self) -> bool {
        self.consumer.is_finished()
    }
}

/// Readiness flags shared with the `/readyz` endpoint
#[derive(Debug, Default)]
pub struct ServiceReadiness {
    booted: AtomicBool,
    consuming: AtomicBool,
    stopping: AtomicBool,
}

impl ReadinessChecker for ServiceReadiness {
    fn is_ready(&self) -> bool {
        self.booted.load(Ordering::Acquire) && !self.stopping.load(Ordering::Acquire)
    }

    fn components(&self) -> Vec<ComponentStatus> {
        let cache = if self.booted.load(Ordering::Acquire) {
            "ready"
        } else {
            "starting"
        };
        let consumer = if self.consuming.load(Ordering::Acquire) {
            "running"
        } else {
            "stopped"
        };
        let mut components = vec![
            ComponentStatus {
                name: "cache".to_string(),
                status: cache.to_string(),
                detail: None,
            },
            ComponentStatus {
                name: "consumer".to_string(),
                status: consumer.to_string(),
                detail: None,
            },
        ];
        if self.stopping.load(Ordering::Acquire) {
            components.push(ComponentStatus {
                name: "server".to_string(),
                status: "stopping".to_string(),
                detail: Some("shutdown in progress".to_string()),
            });
        }
        components
    }
}

/// Owns the boot and shutdown order of the cache, store, and consumer
pub struct Coordinator {
    cache: OrderCache,
    store: Arc<dyn OrderStore>,
    snapshot_path: PathBuf,
    reaper_interval: Duration,
    retry_policy: RetryPolicy,
    readiness: Arc<ServiceReadiness>,
}

impl Coordinator {
    pub fn new(
        cache: OrderCache,
        store: Arc<dyn OrderStore>,
        snapshot_path: impl Into<PathBuf>,
        reaper_interval: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            snapshot_path: snapshot_path.into(),
            reaper_interval,
            retry_policy: RetryPolicy::default(),
            readiness: Arc::new(ServiceReadiness::default()),
        }
    }

    /// Backoff and attempt limit for transiently failed messages
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn readiness(&self) -> Arc<ServiceReadiness> {
        self.readiness.clone()
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Restore the cache from the snapshot, then from the store
    ///
    /// Never fails: a missing or corrupt snapshot starts the cache empty and a
    /// failed scan leaves it with whatever the snapshot held. Entries restored
    /// from the snapshot keep their remaining lifetime.
    pub async fn boot(&self) -> BootReport {
        let snapshot = match self.cache.load_snapshot(&self.snapshot_path).await {
            Ok(count) => SnapshotStatus::Loaded(count),
            Err(StorageError::NotFound(_)) => {
                tracing::info!(
                    path = %self.snapshot_path.display(),
                    "No cache snapshot found, starting empty"
                );
                SnapshotStatus::Missing
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.snapshot_path.display(),
                    error = %e,
                    "Cache snapshot unreadable, starting empty"
                );
                SnapshotStatus::Unreadable(e.to_string())
            }
        };

        let (reconciled, scan_error) = match self.store.scan_all().await {
            Ok(orders) => {
                let scanned = orders.len();
                let reconciled = self.cache.insert_missing(orders, Ttl::Never).await;
                tracing::info!(scanned, reconciled, "Cache reconciled with store");
                (reconciled, None)
            }
            Err(e) => {
                tracing::error!(error = %e, "Store scan failed, skipping reconciliation");
                (0, Some(e.to_string()))
            }
        };

        self.readiness.booted.store(true, Ordering::Release);

        BootReport {
            snapshot,
            reconciled,
            scan_error,
        }
    }

    /// Start the reaper and the consumer
    pub fn start(&self, source: Box<dyn MessageSource>, pipeline: IngestPipeline) -> RunningServices {
        let reaper = self.cache.start_reaper(self.reaper_interval);
        let consumer = Consumer::spawn_with_policy(source, pipeline, self.retry_policy);
        self.readiness.consuming.store(true, Ordering::Release);

        RunningServices { consumer, reaper }
    }

    /// Stop everything in order and persist the cache
    ///
    /// The consumer finishes its in-flight message before the reaper stops
    /// and the snapshot is written; the source and store are closed last.
    /// A failed snapshot is reported, not raised.
    pub async fn shutdown(&self, running: RunningServices) -> ShutdownReport {
        self.readiness.stopping.store(true, Ordering::Release);
        let mut report = ShutdownReport::default();

        let stopped = running.consumer.shutdown().await;
        self.readiness.consuming.store(false, Ordering::Release);
        let source = match stopped {
            Some((source, stats)) => {
                tracing::info!(
                    received = stats.received,
                    committed = stats.committed,
                    rejected = stats.rejected,
                    transient_failures = stats.transient_failures,
                    abandoned = stats.abandoned,
                    "Consumer stopped"
                );
                report.consumer = Some(stats);
                Some(source)
            }
            None => None,
        };

        running.reaper.stop().await;

        match self.cache.save_snapshot(&self.snapshot_path).await {
            Ok(count) => report.snapshot_entries = Some(count),
            Err(e) => {
                tracing::error!(
                    path = %self.snapshot_path.display(),
                    error = %e,
                    "Failed to save cache snapshot"
                );
                report.snapshot_error = Some(e.to_string());
            }
        }

        if let Some(mut source) = source
            && let Err(e) = source.close().await
        {
            tracing::warn!(error = %e, "Failed to close message source");
        }

        self.store.close().await;
        tracing::info!("Shutdown complete");

        report
    }
}
