//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for Orderline:
//! - Ingestion outcomes and processing latency
//! - Cache lookups, size, and reaper evictions
//! - Snapshot save/load results

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for Orderline
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    // Ingestion
    /// Messages processed, by outcome
    pub ingest_messages_total: IntCounterVec,
    /// Time spent processing one message
    pub ingest_duration_seconds: Histogram,

    // Cache
    /// Lookups, by result (hit, miss, not_found, error)
    pub cache_lookups_total: IntCounterVec,
    /// Entries currently held in the cache
    pub cache_entries: IntGauge,
    /// Entries physically removed by the reaper
    pub cache_evictions_total: IntCounter,

    // Snapshots
    /// Snapshot saves and loads, by operation and result
    pub snapshot_operations_total: IntCounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let ingest_messages_total = IntCounterVec::new(
            Opts::new(
                "orderline_ingest_messages_total",
                "Total number of messages handled by the ingestion pipeline",
            ),
            &["outcome"],
        )?;

        let ingest_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "orderline_ingest_duration_seconds",
                "Per-message ingestion duration in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new(
                "orderline_cache_lookups_total",
                "Total number of order lookups",
            ),
            &["result"],
        )?;

        let cache_entries = IntGauge::with_opts(Opts::new(
            "orderline_cache_entries",
            "Number of entries in the order cache",
        ))?;

        let cache_evictions_total = IntCounter::with_opts(Opts::new(
            "orderline_cache_evictions_total",
            "Total number of expired entries removed by the reaper",
        ))?;

        let snapshot_operations_total = IntCounterVec::new(
            Opts::new(
                "orderline_snapshot_operations_total",
                "Total number of cache snapshot operations",
            ),
            &["operation", "result"],
        )?;

        registry.register(Box::new(ingest_messages_total.clone()))?;
        registry.register(Box::new(ingest_duration_seconds.clone()))?;
        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(cache_evictions_total.clone()))?;
        registry.register(Box::new(snapshot_operations_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            ingest_messages_total,
            ingest_duration_seconds,
            cache_lookups_total,
            cache_entries,
            cache_evictions_total,
            snapshot_operations_total,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one processed message
    pub fn record_ingest(&self, outcome: &str, duration_secs: f64) {
        self.ingest_messages_total
            .with_label_values(&[outcome])
            .inc();
        self.ingest_duration_seconds.observe(duration_secs);
    }

    /// Record a lookup result
    pub fn record_lookup(&self, result: LookupResult) {
        self.cache_lookups_total
            .with_label_values(&[result.as_str()])
            .inc();
    }

    /// Update the cache size gauge
    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }

    /// Record entries removed by one reaper sweep
    pub fn record_evictions(&self, removed: usize) {
        self.cache_evictions_total.inc_by(removed as u64);
    }

    /// Record a snapshot save or load
    pub fn record_snapshot(&self, operation: SnapshotOperation, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.snapshot_operations_total
            .with_label_values(&[operation.as_str(), result])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Result label for `orderline_cache_lookups_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    /// Served from the cache
    Hit,
    /// Cache miss, served from the store
    Miss,
    /// Not in the cache or the store
    NotFound,
    /// Store error
    Error,
}

impl LookupResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupResult::Hit => "hit",
            LookupResult::Miss => "miss",
            LookupResult::NotFound => "not_found",
            LookupResult::Error => "error",
        }
    }
}

/// Operation label for `orderline_snapshot_operations_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOperation {
    Save,
    Load,
}

impl SnapshotOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOperation::Save => "save",
            SnapshotOperation::Load => "load",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str, labels: &[(&str, &str)]) -> f64 {
        let gathered = metrics.registry().gather();
        let family = gathered
            .iter()
            .find(|m| m.name() == name)
            .unwrap_or_else(|| panic!("{} metric not found", name));

        family
            .metric
            .iter()
            .find(|m| {
                labels.iter().all(|(k, v)| {
                    m.label
                        .iter()
                        .any(|l| l.name() == *k && l.value() == *v)
                })
            })
            .and_then(|m| m.counter.as_ref())
            .and_then(|c| c.value)
            .unwrap_or(0.0)
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        // Gauges and plain counters are exported before first use
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_ingest() {
        let metrics = Metrics::new().unwrap();
        metrics.record_ingest("stored", 0.002);
        metrics.record_ingest("stored", 0.004);
        metrics.record_ingest("malformed_payload", 0.0001);

        assert_eq!(
            counter_value(
                &metrics,
                "orderline_ingest_messages_total",
                &[("outcome", "stored")]
            ),
            2.0
        );
        assert_eq!(
            counter_value(
                &metrics,
                "orderline_ingest_messages_total",
                &[("outcome", "malformed_payload")]
            ),
            1.0
        );

        let gathered = metrics.registry().gather();
        let histogram = gathered
            .iter()
            .find(|m| m.name() == "orderline_ingest_duration_seconds")
            .expect("ingest_duration_seconds metric not found");
        assert_eq!(
            histogram.metric[0]
                .histogram
                .as_ref()
                .unwrap()
                .sample_count
                .unwrap(),
            3
        );
    }

    #[test]
    fn test_record_lookup() {
        let metrics = Metrics::new().unwrap();
        metrics.record_lookup(LookupResult::Hit);
        metrics.record_lookup(LookupResult::Miss);
        metrics.record_lookup(LookupResult::Hit);

        assert_eq!(
            counter_value(
                &metrics,
                "orderline_cache_lookups_total",
                &[("result", "hit")]
            ),
            2.0
        );
        assert_eq!(
            counter_value(
                &metrics,
                "orderline_cache_lookups_total",
                &[("result", "miss")]
            ),
            1.0
        );
    }

    #[test]
    fn test_cache_gauge_and_evictions() {
        let metrics = Metrics::new().unwrap();
        metrics.set_cache_entries(42);
        metrics.record_evictions(3);
        metrics.record_evictions(0);

        assert_eq!(metrics.cache_entries.get(), 42);
        assert_eq!(metrics.cache_evictions_total.get(), 3);
    }

    #[test]
    fn test_record_snapshot() {
        let metrics = Metrics::new().unwrap();
        metrics.record_snapshot(SnapshotOperation::Save, true);
        metrics.record_snapshot(SnapshotOperation::Load, false);

        assert_eq!(
            counter_value(
                &metrics,
                "orderline_snapshot_operations_total",
                &[("operation", "save"), ("result", "success")]
            ),
            1.0
        );
        assert_eq!(
            counter_value(
                &metrics,
                "orderline_snapshot_operations_total",
                &[("operation", "load"), ("result", "failure")]
            ),
            1.0
        );
    }

    #[test]
    fn test_label_strings() {
        assert_eq!(LookupResult::NotFound.as_str(), "not_found");
        assert_eq!(LookupResult::Error.as_str(), "error");
        assert_eq!(SnapshotOperation::Save.as_str(), "save");
    }
}
