#![allow(clippy::unwrap_used)]
//! End-to-end copy runs against in-memory stores.
//!
//! Each test builds a source keyspace, runs the full scanner → exporter →
//! pusher pipeline into a fresh destination, and checks counters and
//! destination contents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

use kv_migrate::store::{ExportedValue, KeyStore, MemoryStore, ScanPage, TTL_MISSING, TTL_PERSISTENT};
use kv_migrate::{MigrateError, Migration, MigrationOptions, ScanOptions};

fn options(pattern: &str, batch_size: usize, export: usize, push: usize) -> MigrationOptions {
    MigrationOptions {
        scan: ScanOptions {
            pattern: pattern.to_string(),
            batch_size,
            export_workers: export,
        },
        push_workers: push,
        report_interval: Duration::from_secs(60),
    }
}

fn populated(n: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..n {
        let ttl = (i % 3 == 0).then(|| Duration::from_secs(600));
        store.insert(format!("key:{i:05}"), format!("payload-{i}"), ttl);
    }
    store
}

async fn copy(
    source: &Arc<MemoryStore>,
    destination: &Arc<MemoryStore>,
    options: MigrationOptions,
) -> kv_migrate::Result<kv_migrate::ProgressSnapshot> {
    Migration::new(source.clone(), destination.clone(), options)
        .run()
        .await
}

fn contents(store: &MemoryStore) -> Vec<(Bytes, Option<Bytes>, bool)> {
    store
        .keys()
        .into_iter()
        .map(|k| {
            let value = store.get(&k);
            let has_ttl = store.pttl(&k) >= 0;
            (k, value, has_ttl)
        })
        .collect()
}

#[tokio::test]
async fn copy_two_keys_preserves_ttl() {
    let source = Arc::new(MemoryStore::new());
    source.insert("a", "1", Some(Duration::from_millis(5_000)));
    source.insert("b", "2", None);
    let destination = Arc::new(MemoryStore::new());

    let snap = copy(&source, &destination, options("*", 100, 30, 30))
        .await
        .unwrap();

    assert_eq!((snap.scanned, snap.exported, snap.pushed), (2, 2, 2));
    assert_eq!(destination.get(b"a"), Some(Bytes::from("1")));
    assert_eq!(destination.get(b"b"), Some(Bytes::from("2")));

    let ttl_a = destination.pttl(b"a");
    assert!(ttl_a > 4_000 && ttl_a <= 5_000, "ttl was {ttl_a}");
    assert_eq!(destination.pttl(b"b"), TTL_PERSISTENT);
}

#[tokio::test]
async fn copy_counters_balance_on_success() {
    let source = populated(1_000);
    let destination = Arc::new(MemoryStore::new());

    let snap = copy(&source, &destination, options("*", 37, 8, 5))
        .await
        .unwrap();

    assert!(snap.is_balanced());
    assert_eq!(snap.pushed, 1_000);
    assert_eq!(destination.len(), 1_000);
}

#[tokio::test]
async fn copy_only_matching_keys() {
    let source = Arc::new(MemoryStore::new());
    for i in 0..20 {
        source.insert(format!("user:{i}"), "u", None);
        source.insert(format!("session:{i}"), "s", None);
    }
    let destination = Arc::new(MemoryStore::new());

    let snap = copy(&source, &destination, options("user:*", 7, 3, 3))
        .await
        .unwrap();

    assert_eq!(snap.scanned, 20);
    assert_eq!(destination.len(), 20);
    assert!(destination.keys().iter().all(|k| k.starts_with(b"user:")));
}

#[tokio::test]
async fn copy_with_no_matching_keys_completes() {
    let source = populated(10);
    let destination = Arc::new(MemoryStore::new());

    let snap = copy(&source, &destination, options("nothing:*", 4, 4, 4))
        .await
        .unwrap();

    assert_eq!((snap.scanned, snap.exported, snap.pushed), (0, 0, 0));
    assert!(destination.is_empty());
}

#[tokio::test]
async fn copy_from_empty_source_completes() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());

    let snap = copy(&source, &destination, options("*", 10, 1, 1))
        .await
        .unwrap();
    assert_eq!(snap.pushed, 0);
}

#[tokio::test]
async fn copy_result_independent_of_pool_sizes() {
    let source = populated(300);

    let serial = Arc::new(MemoryStore::new());
    let serial_snap = copy(&source, &serial, options("*", 25, 1, 1)).await.unwrap();

    let parallel = Arc::new(MemoryStore::new());
    let parallel_snap = copy(&source, &parallel, options("*", 25, 16, 9))
        .await
        .unwrap();

    assert_eq!(
        (serial_snap.scanned, serial_snap.exported, serial_snap.pushed),
        (parallel_snap.scanned, parallel_snap.exported, parallel_snap.pushed)
    );
    assert_eq!(contents(&serial), contents(&parallel));
}

#[tokio::test]
async fn copy_overwrites_existing_destination_keys() {
    let source = Arc::new(MemoryStore::new());
    source.insert("shared", "fresh", None);
    let destination = Arc::new(MemoryStore::new());
    destination.insert("shared", "stale", Some(Duration::from_secs(30)));
    destination.insert("untouched", "keep", None);

    copy(&source, &destination, options("*", 10, 2, 2))
        .await
        .unwrap();

    assert_eq!(destination.get(b"shared"), Some(Bytes::from("fresh")));
    assert_eq!(destination.pttl(b"shared"), TTL_PERSISTENT);
    assert_eq!(destination.get(b"untouched"), Some(Bytes::from("keep")));
}

#[tokio::test]
async fn copy_rerun_is_idempotent() {
    let source = populated(50);
    let destination = Arc::new(MemoryStore::new());

    copy(&source, &destination, options("*", 10, 4, 4))
        .await
        .unwrap();
    let first = contents(&destination);

    copy(&source, &destination, options("*", 10, 4, 4))
        .await
        .unwrap();
    assert_eq!(contents(&destination), first);
}

#[tokio::test]
async fn scan_failure_on_second_page_aborts() {
    let source = Arc::new(MemoryStore::new());
    source.insert("a", "1", None);
    source.insert("b", "2", None);
    source.insert("c", "3", None);
    source.fail_scan_on_page(1);
    let destination = Arc::new(MemoryStore::new());

    let migration = Migration::new(
        source.clone(),
        destination.clone(),
        options("*", 1, 2, 2),
    );
    let reporter = migration.reporter();
    let err = migration.run().await.unwrap_err();

    assert!(matches!(err, MigrateError::Scan { cursor: 1, .. }));
    let snap = reporter.snapshot();
    assert!(snap.scanned <= 1);
    assert!(snap.exported <= snap.scanned);
    assert!(snap.pushed <= snap.scanned);
    assert!(!reporter.is_ticking());
}

#[tokio::test]
async fn export_failure_aborts_run() {
    let source = populated(100);
    source.fail_export_of("key:00042");
    let destination = Arc::new(MemoryStore::new());

    let err = copy(&source, &destination, options("*", 10, 4, 4))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Export { ref key, .. } if key == "key:00042"));
    assert!(destination.get(b"key:00042").is_none());
}

#[tokio::test]
async fn restore_failure_aborts_run() {
    let source = populated(100);
    let destination = Arc::new(MemoryStore::new());
    destination.fail_restore_of("key:00007");

    let migration = Migration::new(
        source.clone(),
        destination.clone(),
        options("*", 10, 4, 4),
    );
    let reporter = migration.reporter();
    let err = migration.run().await.unwrap_err();

    assert!(matches!(err, MigrateError::Restore { .. }));
    let snap = reporter.snapshot();
    assert!(snap.pushed <= snap.exported);
    assert!(snap.exported <= snap.scanned);
    assert!(destination.len() < 100);
}

/// Source whose export of one key reports it as gone, as when a key expires
/// or is deleted between `SCAN` and `DUMP`.
struct VanishingStore {
    inner: MemoryStore,
    vanished: &'static [u8],
}

#[async_trait]
impl KeyStore for VanishingStore {
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> kv_migrate::Result<ScanPage> {
        self.inner.scan(cursor, pattern, count).await
    }

    async fn export(&self, key: &[u8]) -> kv_migrate::Result<ExportedValue> {
        if key == self.vanished {
            return Ok(ExportedValue {
                ttl_ms: TTL_MISSING,
                payload: None,
            });
        }
        self.inner.export(key).await
    }

    async fn restore(
        &self,
        key: &[u8],
        ttl_ms: u64,
        payload: &[u8],
        replace: bool,
    ) -> kv_migrate::Result<()> {
        self.inner.restore(key, ttl_ms, payload, replace).await
    }

    async fn ping(&self) -> kv_migrate::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn vanished_key_aborts_run() {
    let inner = MemoryStore::new();
    for key in ["a", "b", "c"] {
        inner.insert(key, "v", None);
    }
    let source = Arc::new(VanishingStore {
        inner,
        vanished: b"b",
    });
    let destination = Arc::new(MemoryStore::new());

    let err = Migration::new(source, destination, options("*", 10, 1, 1))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::KeyVanished(ref key) if key == "b"));
}

#[tokio::test]
async fn expired_keys_are_not_copied() {
    let source = populated(5);
    source.insert("key:00002", "gone", Some(Duration::from_millis(0)));
    let destination = Arc::new(MemoryStore::new());

    let snap = copy(&source, &destination, options("*", 10, 1, 1))
        .await
        .unwrap();

    assert_eq!(snap.pushed, 4);
    assert!(destination.get(b"key:00002").is_none());
}

#[tokio::test]
async fn invalid_options_fail_before_touching_stores() {
    let source = populated(5);
    let destination = Arc::new(MemoryStore::new());

    let err = copy(&source, &destination, options("*", 10, 0, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Config(_)));
    assert_eq!(source.scan_calls(), 0);
}

/// Destination whose writes never complete.
struct StalledStore;

#[async_trait]
impl KeyStore for StalledStore {
    async fn scan(&self, _cursor: u64, _pattern: &str, _count: usize) -> kv_migrate::Result<ScanPage> {
        Ok(ScanPage::default())
    }

    async fn export(&self, _key: &[u8]) -> kv_migrate::Result<ExportedValue> {
        Ok(ExportedValue {
            ttl_ms: TTL_MISSING,
            payload: None,
        })
    }

    async fn restore(
        &self,
        _key: &[u8],
        _ttl_ms: u64,
        _payload: &[u8],
        _replace: bool,
    ) -> kv_migrate::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn ping(&self) -> kv_migrate::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn stalled_destination_bounds_in_flight_keys() {
    let source = populated(10_000);
    let (batch, exporters, pushers) = (10, 2, 2);

    let migration = Migration::new(
        source,
        Arc::new(StalledStore),
        options("*", batch, exporters, pushers),
    );
    let reporter = migration.reporter();
    let run = tokio::spawn(migration.run());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snap = reporter.snapshot();
    run.abort();

    assert_eq!(snap.pushed, pushers as u64);
    assert!(snap.exported <= snap.scanned);
    assert!(
        snap.scanned <= (batch + exporters + pushers + 2) as u64,
        "scanned ran ahead of a stalled destination: {snap}"
    );
}

struct ErrorEvents(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn failed_run_leaves_fatal_logging_to_caller() {
    let errors = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(ErrorEvents(errors.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let source = populated(20);
    source.fail_scan_on_page(1);
    let destination = Arc::new(MemoryStore::new());

    let err = copy(&source, &destination, options("*", 5, 3, 3))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Scan { .. }));
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}
