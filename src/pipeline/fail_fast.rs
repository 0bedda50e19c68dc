//! Run-wide abort on the first fatal error.
//!
//! Every stage holds a clone of the same [`FailFast`]. The first stage to
//! fail stores its error and cancels the shared token; all other stages see
//! the cancellation at their next queue operation and wind down without
//! taking new work. Later errors are logged but never replace the first.
//! Reporting the fatal error is left to the caller of the run.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::error::MigrateError;

/// Shared cancellation flag plus first-error slot.
#[derive(Clone, Default)]
pub struct FailFast {
    token: CancellationToken,
    first: Arc<Mutex<Option<MigrateError>>>,
}

impl FailFast {
    /// Create an untriggered instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `err` from `stage` and cancel the run.
    pub fn fail(&self, stage: &'static str, err: MigrateError) {
        let mut first = self.first.lock();
        if first.is_none() {
            warn!(stage, error = %err, "aborting copy");
            *first = Some(err);
        } else {
            debug!(stage, error = %err, "error after abort");
        }
        drop(first);
        self.token.cancel();
    }

    /// Whether the run has been aborted.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the run has been aborted.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Take the first recorded error, if any.
    pub fn take_error(&self) -> Option<MigrateError> {
        self.first.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untriggered() {
        let ff = FailFast::new();
        assert!(!ff.is_cancelled());
        assert!(ff.take_error().is_none());
    }

    #[test]
    fn test_first_error_wins() {
        let ff = FailFast::new();
        let other = ff.clone();
        ff.fail("scan", MigrateError::KeyVanished("a".into()));
        other.fail("push", MigrateError::KeyVanished("b".into()));

        assert!(other.is_cancelled());
        match ff.take_error() {
            Some(MigrateError::KeyVanished(key)) => assert_eq!(key, "a"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let ff = FailFast::new();
        let waiter = ff.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        ff.fail("export", MigrateError::Config("boom".into()));
        task.await.unwrap();
    }
}
