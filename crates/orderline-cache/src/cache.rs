//! Concurrent TTL cache of orders keyed by `order_uid`

use chrono::{DateTime, Utc};
use orderline_core::{Clock, Order, SystemClock};
use orderline_observability::Metrics;
use orderline_observability::metrics::SnapshotOperation;
use orderline_storage::snapshot::{SnapshotEntry, read_snapshot, write_snapshot};
use orderline_storage::{CompressionAlgorithm, StorageError, StorageResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::entry::{CacheEntry, Ttl};

/// Shared handle to the order cache
///
/// Cloning is cheap; all clones see the same entries. The lock is only ever
/// held for in-memory work.
#[derive(Clone)]
pub struct OrderCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
    compression: CompressionAlgorithm,
}

impl OrderCache {
    /// Create an empty cache on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache on the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            metrics: None,
            compression: CompressionAlgorithm::default(),
        }
    }

    /// Report size, evictions and snapshot results to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compression used when writing snapshots
    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Insert or replace the entry for `order.order_uid`
    pub async fn set(&self, order: Order, ttl: Ttl) {
        let expires_at = ttl.expires_at(self.clock.now());
        let key = order.order_uid.clone();

        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { order, expires_at });
        self.report_len(entries.len());
    }

    /// Get a live entry; expired entries read as absent even before the reaper runs
    pub async fn get(&self, key: &str) -> Option<Order> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.order.clone())
    }

    /// Whether a live entry exists for `key`
    pub async fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Remove `key`; absent keys are ignored
    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        self.report_len(entries.len());
    }

    /// Insert each order whose key has no live entry, returning how many were inserted
    ///
    /// Live entries keep their order and expiry. Runs under a single write
    /// lock so a concurrent `set` is never overwritten.
    pub async fn insert_missing(&self, orders: Vec<Order>, ttl: Ttl) -> usize {
        let now = self.clock.now();
        let expires_at = ttl.expires_at(now);

        let mut entries = self.entries.write().await;
        let mut inserted = 0;
        for order in orders {
            let live = entries
                .get(&order.order_uid)
                .is_some_and(|entry| !entry.is_expired_at(now));
            if !live {
                entries.insert(order.order_uid.clone(), CacheEntry { order, expires_at });
                inserted += 1;
            }
        }
        self.report_len(entries.len());
        inserted
    }

    /// Physically remove every expired entry, returning how many were removed
    pub async fn delete_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        self.report_len(entries.len());
        removed
    }

    /// Number of stored entries, including expired ones not yet reaped
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Point-in-time copy of all stored entries
    pub async fn entries(&self) -> Vec<(String, CacheEntry)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Write every entry, expired or not, to `path`
    ///
    /// The map is copied under the read lock; encoding and disk I/O happen
    /// after it is released. The file is replaced atomically, so a failed save
    /// leaves the previous snapshot intact.
    pub async fn save_snapshot(&self, path: &Path) -> StorageResult<usize> {
        let snapshot: Vec<SnapshotEntry> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .map(|(key, entry)| SnapshotEntry {
                    key: key.clone(),
                    order: entry.order.clone(),
                    expires_at_unix_nanos: entry.expires_at.map(to_unix_nanos),
                })
                .collect()
        };

        let count = snapshot.len();
        let path_buf = path.to_path_buf();
        let compression = self.compression;
        let result = tokio::task::spawn_blocking(move || {
            write_snapshot(&path_buf, &snapshot, compression)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))
        .and_then(|r| r);

        self.report_snapshot(SnapshotOperation::Save, result.is_ok());
        let bytes = result?;

        tracing::info!(
            path = %path.display(),
            entries = count,
            bytes,
            "Cache snapshot saved"
        );
        Ok(count)
    }

    /// Replace the whole cache with the snapshot at `path`
    ///
    /// A missing file yields `StorageError::NotFound`; a corrupt or foreign
    /// file yields `StorageError::InvalidData`. On any error the current
    /// entries are left untouched. Stored expiries are kept as-is.
    pub async fn load_snapshot(&self, path: &Path) -> StorageResult<usize> {
        let path_buf = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || read_snapshot(&path_buf))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))
            .and_then(|r| r);

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.report_snapshot(SnapshotOperation::Load, false);
                return Err(e);
            }
        };

        let loaded: HashMap<String, CacheEntry> = snapshot
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    CacheEntry {
                        order: entry.order,
                        expires_at: entry.expires_at_unix_nanos.map(DateTime::from_timestamp_nanos),
                    },
                )
            })
            .collect();
        let count = loaded.len();

        {
            let mut entries = self.entries.write().await;
            *entries = loaded;
            self.report_len(entries.len());
        }
        self.report_snapshot(SnapshotOperation::Load, true);

        tracing::info!(path = %path.display(), entries = count, "Cache snapshot loaded");
        Ok(count)
    }

    fn report_len(&self, len: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_cache_entries(len);
        }
    }

    fn report_snapshot(&self, operation: SnapshotOperation, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot(operation, success);
        }
    }
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCache")
            .field("clock", &self.clock)
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

// Expiries past year 2262 do not fit in i64 nanoseconds; clamp rather than
// silently turning them into "never"
fn to_unix_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}
