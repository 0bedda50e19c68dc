//! The three-stage copy pipeline.
//!
//! ```text
//!  Scanner ──keys──▶ ExporterPool (N) ──records──▶ PusherPool (M)
//!   SCAN              PTTL + DUMP                   RESTORE ... REPLACE
//! ```
//!
//! Stages are joined by single-slot [`handoff`] queues, so in-flight work is
//! bounded by the worker counts rather than the size of the keyspace. Each
//! queue closes when its producers are done: the scanner drops its sender on
//! exhaustion, the exporter supervisor drops the record sender once every
//! exporter has exited, and the run is complete once every pusher has exited.
//!
//! The first error in any stage aborts the whole run through [`FailFast`];
//! counters then reflect only the work completed before the abort.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kv_migrate::pipeline::{Migration, MigrationOptions};
//! use kv_migrate::store::RedisStore;
//!
//! let source = RedisStore::connect("localhost:6379").await?;
//! let destination = RedisStore::connect("redis://localhost:6380/1").await?;
//! let summary = Migration::new(Arc::new(source), Arc::new(destination), MigrationOptions::default())
//!     .run()
//!     .await?;
//! assert!(summary.is_balanced());
//! ```

pub mod exporter;
pub mod fail_fast;
pub mod handoff;
pub mod pool;
pub mod pusher;
pub mod scanner;

pub use exporter::ExporterPool;
pub use fail_fast::FailFast;
pub use handoff::{handoff, HandoffReceiver, HandoffSender};
pub use pusher::PusherPool;
pub use scanner::Scanner;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::progress::{ProgressSnapshot, Reporter};
use crate::store::KeyStore;

/// One key ready to be restored into the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Binary-safe key
    pub key: Bytes,
    /// Opaque serialized value as produced by `DUMP`
    pub value: Bytes,
    /// Remaining TTL in milliseconds; `0` means no expiry
    pub ttl_ms: u64,
}

/// Map a `PTTL` reply to a restore TTL.
///
/// The negative sentinels (`-1` no expiry, `-2` missing key) become `0`,
/// which `RESTORE` reads as "no TTL". Non-negative values pass through.
pub fn normalize_ttl(ttl_ms: i64) -> u64 {
    u64::try_from(ttl_ms).unwrap_or(0)
}

/// How the source keyspace is enumerated and exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Glob pattern passed to `SCAN ... MATCH`
    pub pattern: String,
    /// `SCAN ... COUNT` page-size hint
    pub batch_size: usize,
    /// Number of exporter workers
    pub export_workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            batch_size: 100,
            export_workers: 30,
        }
    }
}

/// Everything fixed for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Scanner and exporter settings
    pub scan: ScanOptions,
    /// Number of pusher workers
    pub push_workers: usize,
    /// How often the reporter prints progress
    pub report_interval: Duration,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            push_workers: 30,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl MigrationOptions {
    /// Reject settings that would stall or never start the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.scan.pattern.is_empty() {
            return Err(MigrateError::Config("pattern cannot be empty".into()));
        }
        if self.scan.batch_size == 0 {
            return Err(MigrateError::Config("scan count must be at least 1".into()));
        }
        if self.scan.export_workers == 0 {
            return Err(MigrateError::Config(
                "export worker count must be at least 1".into(),
            ));
        }
        if self.push_workers == 0 {
            return Err(MigrateError::Config(
                "push worker count must be at least 1".into(),
            ));
        }
        if self.report_interval.is_zero() {
            return Err(MigrateError::Config(
                "report interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// A single copy run from `source` to `destination`.
pub struct Migration {
    source: Arc<dyn KeyStore>,
    destination: Arc<dyn KeyStore>,
    options: MigrationOptions,
    reporter: Arc<Reporter>,
}

impl Migration {
    /// Prepare a run. Nothing touches either store until [`Migration::run`].
    pub fn new(
        source: Arc<dyn KeyStore>,
        destination: Arc<dyn KeyStore>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            destination,
            options,
            reporter: Arc::new(Reporter::new()),
        }
    }

    /// The run's progress counters, readable while and after it runs.
    pub fn reporter(&self) -> Arc<Reporter> {
        Arc::clone(&self.reporter)
    }

    /// Run all three stages to completion.
    ///
    /// Returns the final counters on success, or the first error raised by
    /// any stage. The reporter's ticker is stopped either way.
    pub async fn run(self) -> Result<ProgressSnapshot> {
        self.options.validate()?;

        let Self {
            source,
            destination,
            options,
            reporter,
        } = self;

        info!(
            pattern = %options.scan.pattern,
            scan_count = options.scan.batch_size,
            export_workers = options.scan.export_workers,
            push_workers = options.push_workers,
            "starting copy"
        );

        let fail = FailFast::new();
        let (key_tx, key_rx) = handoff::<Bytes>();
        let (record_tx, record_rx) = handoff::<MigrationRecord>();

        reporter.start(options.report_interval);

        let pushers = PusherPool::new(
            destination,
            record_rx,
            Arc::clone(&reporter),
            fail.clone(),
        )
        .start(options.push_workers);

        let exporters = ExporterPool::new(
            Arc::clone(&source),
            key_rx,
            record_tx,
            Arc::clone(&reporter),
            fail.clone(),
        )
        .start(options.scan.export_workers);

        let scanner = Scanner::new(
            source,
            options.scan.clone(),
            Arc::clone(&reporter),
            key_tx,
            fail.clone(),
        );
        let scan_fail = fail.clone();
        let scanning = tokio::spawn(async move {
            if let Err(err) = scanner.run().await {
                scan_fail.fail("scan", err);
            }
        });

        pushers.join().await;

        if let Err(join_err) = scanning.await {
            fail.fail(
                "scan",
                MigrateError::Task {
                    stage: "scan",
                    message: join_err.to_string(),
                },
            );
        }
        if let Err(join_err) = exporters.await {
            fail.fail(
                "export",
                MigrateError::Task {
                    stage: "export",
                    message: join_err.to_string(),
                },
            );
        }

        reporter.stop();
        let snapshot = reporter.snapshot();

        match fail.take_error() {
            Some(err) => Err(err),
            None => {
                if !snapshot.is_balanced() {
                    warn!(%snapshot, "counters diverged on a clean run");
                }
                info!(
                    scanned = snapshot.scanned,
                    exported = snapshot.exported,
                    pushed = snapshot.pushed,
                    "copy finished"
                );
                Ok(snapshot)
            }
        }
    }
}
