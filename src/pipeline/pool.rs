//! Fixed-size worker pools with a completion barrier.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::debug;

use super::fail_fast::FailFast;
use crate::error::{MigrateError, Result};

/// A set of identical workers for one pipeline stage.
///
/// Worker errors and panics are routed to the run's [`FailFast`];
/// [`WorkerPool::join`] is the barrier that returns once every worker has
/// exited, whichever way it exited.
pub struct WorkerPool {
    stage: &'static str,
    workers: JoinSet<Result<()>>,
    fail: FailFast,
}

impl WorkerPool {
    /// Create an empty pool for `stage`.
    pub fn new(stage: &'static str, fail: FailFast) -> Self {
        Self {
            stage,
            workers: JoinSet::new(),
            fail,
        }
    }

    /// Spawn one worker.
    pub fn spawn<F>(&mut self, worker: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.workers.spawn(worker);
    }

    /// Number of workers not yet joined.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has no workers left.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(mut self) {
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.fail.fail(self.stage, err),
                Err(join_err) => self.fail.fail(
                    self.stage,
                    MigrateError::Task {
                        stage: self.stage,
                        message: join_err.to_string(),
                    },
                ),
            }
        }
        debug!(stage = self.stage, "all workers exited");
    }
}
