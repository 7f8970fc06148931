//! Per-message ingestion
//!
//! `IngestPipeline::process` turns one raw payload into a [`ProcessOutcome`].
//! Failures are values, never panics or early returns out of the consumer:
//! the consumer only has to decide whether to commit.

use orderline_cache::{OrderCache, Ttl};
use orderline_core::{Error, Order, OrderStore, PutOutcome};
use orderline_observability::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a message was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    /// Empty payload, skipped
    Empty,
    /// Written to the store and cached
    Stored,
    /// Already cached; the store was not touched
    DuplicateInCache,
    /// The store already had it; now cached
    DuplicateInStore,
}

/// Why a message was dropped (it is still committed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Not a JSON order
    MalformedPayload(String),
    /// Decoded, but `order_uid` is empty
    MissingKey,
}

/// Result of processing one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Committed(CommitKind),
    Rejected(RejectReason),
    /// The store write failed; leave the message uncommitted for redelivery
    TransientFailure(String),
}

impl ProcessOutcome {
    /// Whether the source should be told this message is consumed
    pub fn should_commit(&self) -> bool {
        !matches!(self, ProcessOutcome::TransientFailure(_))
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Committed(CommitKind::Empty) => "empty",
            ProcessOutcome::Committed(CommitKind::Stored) => "stored",
            ProcessOutcome::Committed(CommitKind::DuplicateInCache) => "duplicate_cache",
            ProcessOutcome::Committed(CommitKind::DuplicateInStore) => "duplicate_store",
            ProcessOutcome::Rejected(RejectReason::MalformedPayload(_)) => "malformed_payload",
            ProcessOutcome::Rejected(RejectReason::MissingKey) => "missing_key",
            ProcessOutcome::TransientFailure(_) => "transient_failure",
        }
    }
}

/// Decode, dedup, write through, and cache incoming orders
#[derive(Clone)]
pub struct IngestPipeline {
    cache: OrderCache,
    store: Arc<dyn OrderStore>,
    default_ttl: Ttl,
    metrics: Option<Arc<Metrics>>,
}

impl IngestPipeline {
    pub fn new(cache: OrderCache, store: Arc<dyn OrderStore>, default_ttl: Duration) -> Self {
        Self {
            cache,
            store,
            default_ttl: Ttl::After(default_ttl),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process one raw payload
    pub async fn process(&self, payload: &[u8]) -> ProcessOutcome {
        let started = Instant::now();
        let outcome = self.process_inner(payload).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_ingest(outcome.label(), started.elapsed().as_secs_f64());
        }
        outcome
    }

    async fn process_inner(&self, payload: &[u8]) -> ProcessOutcome {
        if payload.is_empty() {
            tracing::debug!("Skipping empty message");
            return ProcessOutcome::Committed(CommitKind::Empty);
        }

        let order = match Order::from_payload(payload) {
            Ok(order) => order,
            Err(Error::MissingKey) => {
                tracing::warn!("Rejecting order without order_uid");
                return ProcessOutcome::Rejected(RejectReason::MissingKey);
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "Rejecting malformed payload");
                return ProcessOutcome::Rejected(RejectReason::MalformedPayload(e.to_string()));
            }
        };

        if self.cache.contains(order.key()).await {
            tracing::debug!(order_uid = %order.order_uid, "Order already cached, skipping store write");
            return ProcessOutcome::Committed(CommitKind::DuplicateInCache);
        }

        match self.store.put(&order).await {
            Ok(PutOutcome::Created) => {
                tracing::info!(
                    order_uid = %order.order_uid,
                    items = order.items.len(),
                    "Order stored"
                );
                self.cache.set(order, self.default_ttl).await;
                ProcessOutcome::Committed(CommitKind::Stored)
            }
            Ok(PutOutcome::AlreadyExists) => {
                tracing::debug!(order_uid = %order.order_uid, "Order already in store");
                self.cache.set(order, self.default_ttl).await;
                ProcessOutcome::Committed(CommitKind::DuplicateInStore)
            }
            Err(e) => {
                tracing::error!(
                    order_uid = %order.order_uid,
                    error = %e,
                    transient = e.is_transient(),
                    "Store write failed, leaving message for redelivery"
                );
                ProcessOutcome::TransientFailure(e.to_string())
            }
        }
    }
}
