//! Push stage: restore records into the destination.

use std::sync::Arc;

use tracing::debug;

use super::fail_fast::FailFast;
use super::handoff::HandoffReceiver;
use super::pool::WorkerPool;
use super::MigrationRecord;
use crate::error::Result;
use crate::progress::Reporter;
use crate::store::KeyStore;

const STAGE: &str = "push";

/// Pool of workers writing records with restore-and-replace.
pub struct PusherPool {
    destination: Arc<dyn KeyStore>,
    records: HandoffReceiver<MigrationRecord>,
    reporter: Arc<Reporter>,
    fail: FailFast,
}

impl PusherPool {
    /// Create a pool consuming `records`.
    pub fn new(
        destination: Arc<dyn KeyStore>,
        records: HandoffReceiver<MigrationRecord>,
        reporter: Arc<Reporter>,
        fail: FailFast,
    ) -> Self {
        Self {
            destination,
            records,
            reporter,
            fail,
        }
    }

    /// Spawn `workers` pushers.
    ///
    /// Joining the returned pool is the run's completion barrier.
    pub fn start(self, workers: usize) -> WorkerPool {
        let mut pool = WorkerPool::new(STAGE, self.fail.clone());
        for id in 0..workers {
            pool.spawn(push_worker(
                id,
                Arc::clone(&self.destination),
                self.records.clone(),
                Arc::clone(&self.reporter),
                self.fail.clone(),
            ));
        }
        pool
    }
}

async fn push_worker(
    id: usize,
    destination: Arc<dyn KeyStore>,
    records: HandoffReceiver<MigrationRecord>,
    reporter: Arc<Reporter>,
    fail: FailFast,
) -> Result<()> {
    debug!(worker = id, "pusher started");
    loop {
        let record = tokio::select! {
            biased;
            _ = fail.cancelled() => break,
            record = records.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        reporter.add_pushed(1);
        push_record(destination.as_ref(), &record).await?;
    }
    debug!(worker = id, "pusher exited");
    Ok(())
}

/// Restore one record, replacing whatever the destination holds at its key.
pub async fn push_record(destination: &dyn KeyStore, record: &MigrationRecord) -> Result<()> {
    destination
        .restore(&record.key, record.ttl_ms, &record.value, true)
        .await
}
