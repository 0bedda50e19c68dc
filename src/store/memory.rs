//! In-process [`KeyStore`] used by the test suites.
//!
//! Keys are kept in a `BTreeMap` so that `SCAN` can be emulated with a
//! positional cursor over the sorted keyspace: each call inspects `count`
//! slots from the cursor and returns the ones that match the pattern, which
//! mirrors how a server applies `MATCH` after fetching a page. Serialized
//! payloads are stored and returned verbatim.
//!
//! Failures can be injected per operation to exercise the abort paths of
//! the pipeline.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::glob::glob_match;
use super::{ExportedValue, KeyStore, ScanPage, TTL_MISSING, TTL_PERSISTENT};
use crate::error::{display_key, MigrateError, Result};

#[derive(Debug, Clone)]
struct Entry {
    payload: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Injected failures.
#[derive(Debug, Default)]
struct Faults {
    /// Fail the scan call with this zero-based page index.
    scan_page: Option<usize>,
    /// Fail exports of these keys.
    export_keys: HashSet<Bytes>,
    /// Fail restores of these keys.
    restore_keys: HashSet<Bytes>,
}

/// An in-memory key-value store speaking the [`KeyStore`] operations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Bytes, Entry>>,
    faults: RwLock<Faults>,
    scan_calls: AtomicUsize,
    restore_calls: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` under `key`, optionally expiring after `ttl`.
    pub fn insert(&self, key: impl Into<Bytes>, payload: impl Into<Bytes>, ttl: Option<Duration>) {
        let entry = Entry {
            payload: payload.into(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Remove a key, returning whether it existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Current payload of a live key.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.payload.clone())
    }

    /// Remaining TTL in milliseconds, with the `PTTL` sentinels for
    /// persistent (`-1`) and missing (`-2`) keys.
    pub fn pttl(&self, key: &[u8]) -> i64 {
        let now = Instant::now();
        match self.entries.read().get(key) {
            None => TTL_MISSING,
            Some(e) if e.is_expired(now) => TTL_MISSING,
            Some(Entry { expires_at: None, .. }) => TTL_PERSISTENT,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => at.saturating_duration_since(now).as_millis() as i64,
        }
    }

    /// Live keys in sorted order.
    pub fn keys(&self) -> Vec<Bytes> {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `scan` calls served so far.
    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::Relaxed)
    }

    /// Number of `restore` calls served so far, including failed ones.
    pub fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::Relaxed)
    }

    /// Make the scan call for zero-based page `page` fail.
    pub fn fail_scan_on_page(&self, page: usize) {
        self.faults.write().scan_page = Some(page);
    }

    /// Make exports of `key` fail.
    pub fn fail_export_of(&self, key: impl Into<Bytes>) {
        self.faults.write().export_keys.insert(key.into());
    }

    /// Make restores of `key` fail.
    pub fn fail_restore_of(&self, key: impl Into<Bytes>) {
        self.faults.write().restore_keys.insert(key.into());
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        let page = self.scan_calls.fetch_add(1, Ordering::Relaxed);
        if self.faults.read().scan_page == Some(page) {
            return Err(MigrateError::Scan {
                cursor,
                message: "injected scan failure".into(),
            });
        }

        let now = Instant::now();
        let entries = self.entries.read();
        let start = cursor as usize;
        let count = count.max(1);

        let keys = entries
            .iter()
            .skip(start)
            .take(count)
            .filter(|(k, e)| !e.is_expired(now) && glob_match(pattern.as_bytes(), k))
            .map(|(k, _)| k.clone())
            .collect();

        let next = start + count;
        let cursor = if next >= entries.len() { 0 } else { next as u64 };
        Ok(ScanPage { cursor, keys })
    }

    async fn export(&self, key: &[u8]) -> Result<ExportedValue> {
        if self.faults.read().export_keys.contains(key) {
            return Err(MigrateError::Export {
                key: display_key(key),
                message: "injected export failure".into(),
            });
        }
        Ok(ExportedValue {
            ttl_ms: self.pttl(key),
            payload: self.get(key),
        })
    }

    async fn restore(&self, key: &[u8], ttl_ms: u64, payload: &[u8], replace: bool) -> Result<()> {
        self.restore_calls.fetch_add(1, Ordering::Relaxed);
        if self.faults.read().restore_keys.contains(key) {
            return Err(MigrateError::Restore {
                key: display_key(key),
                message: "injected restore failure".into(),
            });
        }
        if !replace && self.get(key).is_some() {
            return Err(MigrateError::Restore {
                key: display_key(key),
                message: "BUSYKEY Target key name already exists.".into(),
            });
        }

        let ttl = (ttl_ms > 0).then(|| Duration::from_millis(ttl_ms));
        self.insert(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(payload),
            ttl,
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
