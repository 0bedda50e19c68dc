//! Live progress counters for a copy run.
//!
//! The [`Reporter`] owns three monotonic counters, one per pipeline
//! checkpoint (scanned, exported, pushed). Workers bump them with relaxed
//! atomic adds; the background ticker and the final report only ever read
//! them, so observing progress never blocks the pipeline.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A point-in-time reading of the run's counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Keys enumerated from the source
    pub scanned: u64,
    /// Keys whose TTL and value were read
    pub exported: u64,
    /// Keys handed to the destination
    pub pushed: u64,
    /// Time since the reporter was created
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Average pushed keys per second since the run started.
    pub fn keys_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs < f64::EPSILON {
            return 0.0;
        }
        self.pushed as f64 / secs
    }

    /// Whether every scanned key made it through both later stages.
    pub fn is_balanced(&self) -> bool {
        self.scanned == self.exported && self.exported == self.pushed
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned: {}  exported: {}  pushed: {}  ({:.1}s, {:.0} keys/s)",
            self.scanned,
            self.exported,
            self.pushed,
            self.elapsed.as_secs_f64(),
            self.keys_per_sec()
        )
    }
}

/// Progress counters plus an optional periodic printer.
///
/// Scoped to a single run: create one per copy, share it by `Arc` with every
/// worker, read it one final time when the run ends.
pub struct Reporter {
    scanned: AtomicU64,
    exported: AtomicU64,
    pushed: AtomicU64,
    ticks: AtomicU64,
    started: Instant,
    ticker: Mutex<Option<Ticker>>,
}

struct Ticker {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reporter {
    /// Create a reporter with all counters at zero. The clock starts now.
    pub fn new() -> Self {
        Self {
            scanned: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            pushed: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            started: Instant::now(),
            ticker: Mutex::new(None),
        }
    }

    /// Record `n` more enumerated keys.
    pub fn add_scanned(&self, n: u64) {
        self.scanned.fetch_add(n, Ordering::Relaxed);
    }

    /// Record `n` more exported keys.
    pub fn add_exported(&self, n: u64) {
        self.exported.fetch_add(n, Ordering::Relaxed);
    }

    /// Record `n` more pushed keys.
    pub fn add_pushed(&self, n: u64) {
        self.pushed.fetch_add(n, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            scanned: self.scanned.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }

    /// Number of periodic reports printed by the ticker so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Print a snapshot every `every` on a background task.
    ///
    /// Calling `start` while a ticker is already running replaces it.
    pub fn start(self: &Arc<Self>, every: Duration) {
        let stop = CancellationToken::new();
        let reporter = Arc::clone(self);
        let token = stop.clone();

        let handle = tokio::spawn(async move {
            let mut tick = interval_at(tokio::time::Instant::now() + every, every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let snap = reporter.snapshot();
                        info!(
                            scanned = snap.scanned,
                            exported = snap.exported,
                            pushed = snap.pushed,
                            "progress"
                        );
                        println!("{}", snap);
                        reporter.ticks.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            debug!("progress ticker stopped");
        });

        if let Some(previous) = self.ticker.lock().replace(Ticker { stop, handle }) {
            previous.stop.cancel();
            previous.handle.abort();
        }
    }

    /// Stop the background ticker. Idempotent.
    ///
    /// No progress line is printed once this returns, so a following
    /// [`Reporter::report`] is always the last line of the run.
    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop.cancel();
            ticker.handle.abort();
        }
    }

    /// Whether a ticker is currently running.
    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Print the final snapshot and return it.
    pub fn report(&self) -> ProgressSnapshot {
        let snap = self.snapshot();
        println!("{}", snap);
        snap
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.stop.cancel();
            ticker.handle.abort();
        }
    }
}
