//! Expiry, snapshot, and warm-restart scenarios

use orderline_cache::{OrderCache, Ttl};
use orderline_core::testing::{sample_order, sample_payload};
use orderline_core::{MemoryOrderStore, OrderStore};
use orderline_integration_tests::{append_lines, manual_clock, sqlite_store, start_time};
use orderline_server::config::{CacheConfig, SourceConfig};
use orderline_server::{App, Coordinator, ServerConfig, SnapshotStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn entry_is_visible_exactly_until_its_ttl() {
    let clock = manual_clock();
    let cache = OrderCache::with_clock(Arc::new(clock.clone()));
    cache.set(sample_order("A1"), Ttl::from_secs(30)).await;

    clock.advance(Duration::from_millis(29_999));
    assert!(cache.get("A1").await.is_some());

    clock.advance(Duration::from_millis(1));
    assert!(cache.get("A1").await.is_none());

    // Still physically present until a sweep
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.delete_expired().await, 1);
    assert!(cache.get("A1").await.is_none());
}

#[tokio::test]
async fn snapshot_reload_reproduces_live_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.snap");
    let clock = manual_clock();

    let cache = OrderCache::with_clock(Arc::new(clock.clone()));
    cache.set(sample_order("short"), Ttl::from_secs(10)).await;
    cache.set(sample_order("long"), Ttl::from_secs(3600)).await;
    cache.set(sample_order("forever"), Ttl::Never).await;
    let before: HashMap<_, _> = cache.entries().await.into_iter().collect();
    assert_eq!(cache.save_snapshot(&path).await.unwrap(), 3);

    clock.advance(Duration::from_secs(60));
    let reloaded = OrderCache::with_clock(Arc::new(clock.clone()));
    assert_eq!(reloaded.load_snapshot(&path).await.unwrap(), 3);

    for key in ["long", "forever"] {
        assert_eq!(reloaded.get(key).await.as_ref(), Some(&before[key].order));
    }
    assert!(reloaded.get("short").await.is_none());

    let after: HashMap<_, _> = reloaded.entries().await.into_iter().collect();
    assert_eq!(after["long"].expires_at, before["long"].expires_at);
    assert_eq!(after["forever"].expires_at, None);
}

#[tokio::test]
async fn boot_keeps_remaining_ttl_of_restored_entries() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("cache.snap");
    let clock = manual_clock();
    let store = MemoryOrderStore::with_orders([sample_order("A1")]);

    let previous = OrderCache::with_clock(Arc::new(clock.clone()));
    previous.set(sample_order("A1"), Ttl::from_secs(120)).await;
    previous.save_snapshot(&snapshot).await.unwrap();

    let cache = OrderCache::with_clock(Arc::new(clock.clone()));
    let coordinator = Coordinator::new(
        cache.clone(),
        Arc::new(store),
        &snapshot,
        Duration::from_secs(30),
    );
    let report = coordinator.boot().await;
    assert_eq!(report.snapshot, SnapshotStatus::Loaded(1));
    assert_eq!(report.reconciled, 0);

    // Not permanent, not expired
    clock.advance(Duration::from_secs(60));
    assert!(cache.get("A1").await.is_some());
    clock.advance(Duration::from_secs(60));
    assert!(cache.get("A1").await.is_none());

    let entries = cache.entries().await;
    assert_eq!(
        entries[0].1.expires_at,
        Some(start_time() + chrono::Duration::seconds(120))
    );
}

fn server_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        database_url: Some(format!(
            "sqlite://{}",
            dir.path().join("orders.db").display()
        )),
        source: SourceConfig {
            path: Some(dir.path().join("orders.ndjson").to_string_lossy().into_owned()),
            follow: false,
            ..SourceConfig::default()
        },
        cache: CacheConfig {
            snapshot_path: dir.path().join("cache.snap").to_string_lossy().into_owned(),
            ..CacheConfig::default()
        },
        ..ServerConfig::default()
    }
}

async fn wait_for(app: &App, key: &str) {
    while !app.cache().contains(key).await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn restart_restores_snapshot_and_resumes_stream() {
    let dir = TempDir::new().unwrap();
    let config = server_config(&dir);
    let input = dir.path().join("orders.ndjson");
    append_lines(&input, &[sample_payload("A1"), sample_payload("B2")]);

    let app = App::start(&config).await.unwrap();
    assert_eq!(app.boot_report().snapshot, SnapshotStatus::Missing);
    wait_for(&app, "B2").await;
    let report = app.shutdown().await;
    assert_eq!(report.snapshot_entries, Some(2));

    // New input arrives while the service is down
    append_lines(&input, &[sample_payload("C3")]);

    let app = App::start(&config).await.unwrap();
    assert_eq!(app.boot_report().snapshot, SnapshotStatus::Loaded(2));
    assert_eq!(app.boot_report().reconciled, 0);
    wait_for(&app, "C3").await;

    let entries: HashMap<_, _> = app.cache().entries().await.into_iter().collect();
    assert!(entries["A1"].expires_at.is_some());
    let report = app.shutdown().await;

    // Only the new line was consumed on the second run
    assert_eq!(report.consumer.unwrap().received, 1);

    let store = sqlite_store(dir.path()).await;
    assert_eq!(store.scan_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn lost_snapshot_is_rebuilt_from_store() {
    let dir = TempDir::new().unwrap();
    let config = server_config(&dir);
    let input = dir.path().join("orders.ndjson");
    append_lines(&input, &[sample_payload("A1")]);

    let app = App::start(&config).await.unwrap();
    wait_for(&app, "A1").await;
    app.shutdown().await;

    std::fs::write(dir.path().join("cache.snap"), b"garbage").unwrap();

    let app = App::start(&config).await.unwrap();
    assert!(matches!(
        app.boot_report().snapshot,
        SnapshotStatus::Unreadable(_)
    ));
    assert_eq!(app.boot_report().reconciled, 1);

    let entries = app.cache().entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1.expires_at, None);
    app.shutdown().await;
}
