//! Store endpoints the pipeline reads from and writes to.
//!
//! The pipeline only needs four wire operations from a store, captured by
//! [`KeyStore`]:
//!
//! 1. cursor-based key iteration with a pattern filter (`SCAN`)
//! 2. remaining TTL plus serialized value in one round trip (`PTTL` + `DUMP`)
//! 3. restoring a serialized value with a TTL (`RESTORE ... REPLACE`)
//! 4. a liveness probe (`PING`)
//!
//! [`RedisStore`] speaks these to any Redis-protocol server. [`MemoryStore`]
//! keeps everything in process and is used by the test suites.

pub mod glob;
pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// `PTTL` reply for a key without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// `PTTL` reply for a key that does not exist.
pub const TTL_MISSING: i64 = -2;

/// One page of a cursor-based iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next call; `0` once the keyspace is exhausted.
    pub cursor: u64,
    /// Keys returned by this page, already filtered by the pattern.
    pub keys: Vec<Bytes>,
}

impl ScanPage {
    /// Whether this page ends the iteration.
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Raw export of a single key, before TTL normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedValue {
    /// Remaining TTL in milliseconds, or one of the negative sentinels.
    pub ttl_ms: i64,
    /// Opaque serialized value; `None` when the key no longer exists.
    pub payload: Option<Bytes>,
}

/// The wire operations a migration endpoint must support.
///
/// Implementations are shared by every worker that targets the endpoint, so
/// all methods take `&self` and must be safe to call concurrently.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch one page of keys matching `pattern`, starting at `cursor`.
    ///
    /// `count` is a page-size hint; a page may hold fewer or more keys, and
    /// may even be empty while the cursor is still non-zero.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage>;

    /// Read a key's remaining TTL and serialized value in one round trip.
    async fn export(&self, key: &[u8]) -> Result<ExportedValue>;

    /// Write a serialized value under `key`.
    ///
    /// `ttl_ms == 0` stores the key without expiry. With `replace` set any
    /// existing value is overwritten; otherwise an existing key is an error.
    async fn restore(&self, key: &[u8], ttl_ms: u64, payload: &[u8], replace: bool) -> Result<()>;

    /// Check that the endpoint answers.
    async fn ping(&self) -> Result<()>;
}
