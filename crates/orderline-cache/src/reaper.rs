//! Background removal of expired cache entries

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::cache::OrderCache;

/// Handle to a running reaper task
///
/// Dropping the handle without calling [`ReaperHandle::stop`] also ends the
/// task at its next wakeup, but gives no guarantee about when.
pub struct ReaperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the reaper and wait for it to exit
    ///
    /// No sweep starts after this returns.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!("Reaper task ended abnormally: {}", e);
        }
    }
}

impl OrderCache {
    /// Start a task that calls [`OrderCache::delete_expired`] every `interval`
    pub fn start_reaper(&self, interval: Duration) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let cache = self.clone();

        let task = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs_f64(), "Starting cache reaper");

            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Cache reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.delete_expired().await;
                        if let Some(metrics) = cache.metrics() {
                            metrics.record_evictions(removed);
                        }
                        if removed > 0 {
                            tracing::debug!(removed, "Reaped expired cache entries");
                        }
                    }
                }
            }
        });

        ReaperHandle { shutdown_tx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Ttl;
    use chrono::{TimeZone, Utc};
    use orderline_core::ManualClock;
    use orderline_core::testing::sample_order;
    use orderline_observability::Metrics;
    use std::sync::Arc;

    fn cache_on(clock: &ManualClock) -> OrderCache {
        OrderCache::with_clock(Arc::new(clock.clone()))
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_on_each_tick() {
        let clock = clock();
        let metrics = Arc::new(Metrics::new().unwrap());
        let cache = cache_on(&clock).with_metrics(metrics.clone());
        cache.set(sample_order("short"), Ttl::from_secs(10)).await;
        cache.set(sample_order("forever"), Ttl::Never).await;

        let reaper = cache.start_reaper(Duration::from_secs(30));

        clock.advance(Duration::from_secs(11));
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(cache.len().await, 2, "no sweep before the first tick");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("forever").await.is_some());
        assert_eq!(metrics.cache_evictions_total.get(), 1);

        reaper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sweep_after_stop() {
        let clock = clock();
        let cache = cache_on(&clock);
        cache.set(sample_order("short"), Ttl::from_secs(1)).await;

        let reaper = cache.start_reaper(Duration::from_secs(5));
        reaper.stop().await;

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Expired but still physically present
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("short").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_within_a_tick() {
        let cache = OrderCache::new();
        let reaper = cache.start_reaper(Duration::from_secs(3600));

        let started = Instant::now();
        reaper.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
