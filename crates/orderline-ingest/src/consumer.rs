//! The receive loop
//!
//! One task receives messages, processes them one at a time, and commits
//! every outcome except a transient store failure. A transiently failed
//! message is parked and processed again after a backoff while newer
//! messages keep flowing; once it succeeds its commit releases the source
//! position held behind it. A message that keeps failing is given up after
//! `max_attempts` and stays uncommitted, so the source redelivers it after a
//! restart. Shutdown is observed between messages; a message already
//! received is always processed to completion.

use orderline_core::{Error, InboundMessage, MessageSource};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::pipeline::{IngestPipeline, ProcessOutcome};

const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 5;

/// Pause and attempt limits for the receive loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after a receive error, and before processing a failed message again
    pub backoff: Duration,
    /// Processing attempts per message before leaving it for a restart
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: RECEIVE_BACKOFF,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

/// Counters for one consumer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages received
    pub received: u64,
    /// Messages committed back to the source
    pub committed: u64,
    /// Messages rejected (and committed)
    pub rejected: u64,
    /// Processing attempts that ended in a transient failure
    pub transient_failures: u64,
    /// Attempts on a previously failed message
    pub retried: u64,
    /// Messages left uncommitted after their last attempt
    pub abandoned: u64,
    /// Receive or commit errors from the source
    pub source_errors: u64,
}

/// A transiently failed message waiting for another attempt
struct Parked {
    message: InboundMessage,
    attempts: u32,
    due: Instant,
}

enum Step {
    Shutdown,
    Retry,
    Received(orderline_core::Result<InboundMessage>),
}

/// Spawns the receive loop
pub struct Consumer;

impl Consumer {
    /// Start consuming `source` on a new task
    pub fn spawn(source: Box<dyn MessageSource>, pipeline: IngestPipeline) -> ConsumerHandle {
        Self::spawn_with_policy(source, pipeline, RetryPolicy::default())
    }

    /// Start consuming with a custom pause after receive errors and failures
    pub fn spawn_with_backoff(
        source: Box<dyn MessageSource>,
        pipeline: IngestPipeline,
        backoff: Duration,
    ) -> ConsumerHandle {
        Self::spawn_with_policy(
            source,
            pipeline,
            RetryPolicy {
                backoff,
                ..RetryPolicy::default()
            },
        )
    }

    pub fn spawn_with_policy(
        mut source: Box<dyn MessageSource>,
        pipeline: IngestPipeline,
        policy: RetryPolicy,
    ) -> ConsumerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let max_attempts = policy.max_attempts.max(1);

        let task = tokio::spawn(async move {
            let mut stats = ConsumerStats::default();
            let mut parked: VecDeque<Parked> = VecDeque::new();
            let mut source_open = true;
            tracing::info!("Consumer started");

            loop {
                // Parked messages share one backoff, so the front is due first
                let next_due = parked.front().map(|p| p.due);
                if !source_open && next_due.is_none() {
                    tracing::info!("Message source closed, consumer stopping");
                    break;
                }

                let step = tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => Step::Shutdown,
                    _ = sleep_until(next_due) => Step::Retry,
                    received = source.receive(), if source_open => Step::Received(received),
                };

                let (message, attempt) = match step {
                    Step::Shutdown => {
                        tracing::info!(parked = parked.len(), "Consumer shutting down");
                        break;
                    }
                    Step::Retry => {
                        let Some(retry) = parked.pop_front() else {
                            continue;
                        };
                        stats.retried += 1;
                        (retry.message, retry.attempts + 1)
                    }
                    Step::Received(Ok(message)) => {
                        stats.received += 1;
                        (message, 1)
                    }
                    Step::Received(Err(Error::SourceClosed)) => {
                        source_open = false;
                        continue;
                    }
                    Step::Received(Err(e)) => {
                        stats.source_errors += 1;
                        tracing::warn!(error = %e, "Receive failed, backing off");
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.recv() => break,
                            _ = tokio::time::sleep(policy.backoff) => continue,
                        }
                    }
                };

                let outcome = pipeline.process(&message.payload).await;
                match &outcome {
                    ProcessOutcome::Rejected(reason) => {
                        stats.rejected += 1;
                        tracing::warn!(
                            key = %message.key_lossy(),
                            offset = message.token.offset,
                            ?reason,
                            "Message rejected"
                        );
                    }
                    ProcessOutcome::TransientFailure(_) => {
                        stats.transient_failures += 1;
                        if attempt < max_attempts {
                            tracing::warn!(
                                partition = message.token.partition,
                                offset = message.token.offset,
                                attempt,
                                "Message not committed, will retry"
                            );
                            parked.push_back(Parked {
                                message,
                                attempts: attempt,
                                due: Instant::now() + policy.backoff,
                            });
                        } else {
                            stats.abandoned += 1;
                            tracing::error!(
                                partition = message.token.partition,
                                offset = message.token.offset,
                                attempt,
                                "Message still failing, leaving it for redelivery after restart"
                            );
                        }
                        continue;
                    }
                    ProcessOutcome::Committed(_) => {}
                }

                match source.commit(&message.token).await {
                    Ok(()) => stats.committed += 1,
                    Err(e) => {
                        stats.source_errors += 1;
                        tracing::error!(
                            offset = message.token.offset,
                            error = %e,
                            "Commit failed"
                        );
                    }
                }
            }

            tracing::info!(
                received = stats.received,
                committed = stats.committed,
                rejected = stats.rejected,
                transient_failures = stats.transient_failures,
                retried = stats.retried,
                abandoned = stats.abandoned,
                "Consumer stopped"
            );
            (source, stats)
        });

        ConsumerHandle { shutdown_tx, task }
    }
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running consumer
pub struct ConsumerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<(Box<dyn MessageSource>, ConsumerStats)>,
}

impl ConsumerHandle {
    /// Whether the loop has already exited (source closed)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end on its own (source closed)
    pub async fn join(self) -> Option<(Box<dyn MessageSource>, ConsumerStats)> {
        match self.task.await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!("Consumer task failed: {}", e);
                None
            }
        }
    }

    /// Stop after the in-flight message and hand back the source
    ///
    /// Returns `None` if the consumer task panicked.
    pub async fn shutdown(self) -> Option<(Box<dyn MessageSource>, ConsumerStats)> {
        let _ = self.shutdown_tx.send(()).await;
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::channel;
    use async_trait::async_trait;
    use orderline_cache::OrderCache;
    use orderline_core::testing::sample_payload;
    use orderline_core::{AckToken, InboundMessage, MemoryOrderStore, Result};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline(store: &MemoryOrderStore, cache: &OrderCache) -> IngestPipeline {
        IngestPipeline::new(cache.clone(), Arc::new(store.clone()), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_commits_everything_but_transient_failures() {
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();
        let (tx, source) = channel::channel(16);
        let log = source.commit_log();

        tx.send(sample_payload("a")).await.unwrap(); // 0 stored
        tx.send(Vec::new()).await.unwrap(); // 1 empty
        tx.send(b"garbage".to_vec()).await.unwrap(); // 2 malformed
        tx.send(br#"{"order_uid":""}"#.to_vec()).await.unwrap(); // 3 missing key
        tx.send(sample_payload("a")).await.unwrap(); // 4 duplicate
        drop(tx);

        let handle = Consumer::spawn(Box::new(source), pipeline(&store, &cache));
        let (_, stats) = handle.join().await.unwrap();

        assert_eq!(log.offsets(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.received, 5);
        assert_eq!(stats.rejected, 2);
        assert_eq!(store.put_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_while_later_messages_commit() {
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();
        store.set_fail_writes(true);

        let (tx, source) = channel::channel(16);
        let log = source.commit_log();
        tx.send(sample_payload("x")).await.unwrap(); // 0 fails at first
        tx.send(Vec::new()).await.unwrap(); // 1 empty, committed meanwhile

        let handle = Consumer::spawn(Box::new(source), pipeline(&store, &cache));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(log.offsets(), vec![1]);
        assert!(cache.get("x").await.is_none());

        // The store recovers before the next attempt
        store.set_fail_writes(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(log.offsets(), vec![1, 0]);
        assert!(cache.get("x").await.is_some());

        drop(tx);
        let (_, stats) = handle.join().await.unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.committed, 2);
        assert_eq!(stats.transient_failures, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.abandoned, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_is_abandoned_after_max_attempts() {
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();
        store.set_fail_writes(true);

        let (tx, source) = channel::channel(16);
        let log = source.commit_log();
        tx.send(sample_payload("x")).await.unwrap();
        tx.send(Vec::new()).await.unwrap();
        drop(tx);

        let policy = RetryPolicy {
            backoff: Duration::from_secs(1),
            max_attempts: 3,
        };
        let handle = Consumer::spawn_with_policy(Box::new(source), pipeline(&store, &cache), policy);
        let (_, stats) = handle.join().await.unwrap();

        assert_eq!(log.offsets(), vec![1]);
        assert_eq!(stats.transient_failures, 3);
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(store.put_calls(), 3);
        assert!(cache.get("x").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_parked_message_uncommitted() {
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();
        store.set_fail_writes(true);

        let (tx, source) = channel::channel(4);
        let log = source.commit_log();
        tx.send(sample_payload("x")).await.unwrap();

        let handle = Consumer::spawn(Box::new(source), pipeline(&store, &cache));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let (_, stats) = handle.shutdown().await.unwrap();

        assert!(log.offsets().is_empty());
        assert_eq!(stats.transient_failures, 1);
        assert_eq!(stats.abandoned, 0);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle_returns_source() {
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();
        let (tx, source) = channel::channel(4);

        let handle = Consumer::spawn(Box::new(source), pipeline(&store, &cache));
        tokio::task::yield_now().await;
        let (mut source, stats) = handle.shutdown().await.unwrap();

        assert_eq!(stats.received, 0);
        source.close().await.unwrap();
        assert!(tx.send(b"late".to_vec()).await.is_err());
    }

    /// Fails the first `failures` receives, then ends
    struct FlakySource {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageSource for FlakySource {
        async fn receive(&mut self) -> Result<InboundMessage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::Source("broker unreachable".to_string()))
            } else {
                Err(Error::SourceClosed)
            }
        }

        async fn commit(&mut self, _token: &AckToken) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_errors_back_off_and_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            failures: 3,
            calls: calls.clone(),
        };
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();

        let handle = Consumer::spawn_with_backoff(
            Box::new(source),
            pipeline(&store, &cache),
            Duration::from_secs(2),
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.is_finished());

        let (_, stats) = handle.shutdown().await.unwrap();
        assert_eq!(stats.source_errors, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
