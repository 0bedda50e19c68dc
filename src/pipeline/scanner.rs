//! Key enumeration stage.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use super::fail_fast::FailFast;
use super::handoff::HandoffSender;
use super::ScanOptions;
use crate::error::Result;
use crate::progress::Reporter;
use crate::store::KeyStore;

/// Walks the source keyspace and feeds matching keys to the exporters.
///
/// Keys are placed on the queue one at a time as each page arrives, so at
/// most one page is held in memory regardless of keyspace size. The queue is
/// closed when the scanner is dropped, which happens when [`Scanner::run`]
/// returns for any reason.
pub struct Scanner {
    source: Arc<dyn KeyStore>,
    options: ScanOptions,
    reporter: Arc<Reporter>,
    keys: HandoffSender<Bytes>,
    fail: FailFast,
}

impl Scanner {
    /// Create a scanner that sends into `keys`.
    pub fn new(
        source: Arc<dyn KeyStore>,
        options: ScanOptions,
        reporter: Arc<Reporter>,
        keys: HandoffSender<Bytes>,
        fail: FailFast,
    ) -> Self {
        Self {
            source,
            options,
            reporter,
            keys,
            fail,
        }
    }

    /// Iterate from cursor 0 until the store reports exhaustion.
    ///
    /// A scan error is returned as-is; the caller routes it to the run's
    /// fail-fast. An abort raised by another stage ends the walk early with
    /// `Ok(())`.
    pub async fn run(self) -> Result<()> {
        let mut cursor = 0u64;
        let mut pages = 0u64;

        loop {
            if self.fail.is_cancelled() {
                debug!(cursor, "scan stopped by abort");
                return Ok(());
            }

            let page = self
                .source
                .scan(cursor, &self.options.pattern, self.options.batch_size)
                .await?;
            pages += 1;
            debug!(cursor, next = page.cursor, keys = page.keys.len(), "scanned page");

            for key in page.keys {
                self.reporter.add_scanned(1);
                tokio::select! {
                    biased;
                    _ = self.fail.cancelled() => return Ok(()),
                    sent = self.keys.send(key) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }

            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }

        info!(pages, pattern = %self.options.pattern, "scan complete");
        Ok(())
    }
}
