//! Export stage: keys in, [`MigrationRecord`]s out.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::debug;

use super::fail_fast::FailFast;
use super::handoff::{HandoffReceiver, HandoffSender};
use super::pool::WorkerPool;
use super::{normalize_ttl, MigrationRecord};
use crate::error::{display_key, MigrateError, Result};
use crate::progress::Reporter;
use crate::store::KeyStore;

const STAGE: &str = "export";

/// Pool of workers reading TTL and serialized value for each key.
pub struct ExporterPool {
    source: Arc<dyn KeyStore>,
    keys: HandoffReceiver<Bytes>,
    records: HandoffSender<MigrationRecord>,
    reporter: Arc<Reporter>,
    fail: FailFast,
}

impl ExporterPool {
    /// Create a pool consuming `keys` and producing into `records`.
    pub fn new(
        source: Arc<dyn KeyStore>,
        keys: HandoffReceiver<Bytes>,
        records: HandoffSender<MigrationRecord>,
        reporter: Arc<Reporter>,
        fail: FailFast,
    ) -> Self {
        Self {
            source,
            keys,
            records,
            reporter,
            fail,
        }
    }

    /// Spawn `workers` exporters plus a supervisor.
    ///
    /// The supervisor holds the pool's own record sender until every worker
    /// has exited, then drops it; that is what closes the record queue for
    /// the pushers. The returned handle completes at the same moment.
    pub fn start(self, workers: usize) -> JoinHandle<()> {
        let mut pool = WorkerPool::new(STAGE, self.fail.clone());
        for id in 0..workers {
            pool.spawn(export_worker(
                id,
                Arc::clone(&self.source),
                self.keys.clone(),
                self.records.clone(),
                Arc::clone(&self.reporter),
                self.fail.clone(),
            ));
        }

        let records = self.records;
        tokio::spawn(async move {
            pool.join().await;
            drop(records);
            debug!("record queue closed");
        })
    }
}

async fn export_worker(
    id: usize,
    source: Arc<dyn KeyStore>,
    keys: HandoffReceiver<Bytes>,
    records: HandoffSender<MigrationRecord>,
    reporter: Arc<Reporter>,
    fail: FailFast,
) -> Result<()> {
    debug!(worker = id, "exporter started");
    loop {
        let key = tokio::select! {
            biased;
            _ = fail.cancelled() => break,
            key = keys.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };

        let record = export_key(source.as_ref(), key).await?;
        reporter.add_exported(1);

        tokio::select! {
            biased;
            _ = fail.cancelled() => break,
            sent = records.send(record) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(worker = id, "exporter exited");
    Ok(())
}

/// Read one key and build its record with the TTL normalised.
pub async fn export_key(source: &dyn KeyStore, key: Bytes) -> Result<MigrationRecord> {
    let exported = source.export(&key).await?;
    let value = exported
        .payload
        .ok_or_else(|| MigrateError::KeyVanished(display_key(&key)))?;
    Ok(MigrationRecord {
        key,
        value,
        ttl_ms: normalize_ttl(exported.ttl_ms),
    })
}
