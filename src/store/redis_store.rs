//! [`KeyStore`] over a Redis-protocol server.
//!
//! Wraps a [`redis::aio::MultiplexedConnection`]: one connection per
//! endpoint, cloned cheaply into every call so all workers targeting the
//! endpoint share it.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionInfo, IntoConnectionInfo};
use tracing::debug;

use super::{ExportedValue, KeyStore, ScanPage};
use crate::error::{display_key, MigrateError, Result};

/// URL schemes accepted as-is by [`normalize_address`].
const URL_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

/// Turn a `host:port` address into a `redis://` URL; URLs pass through.
///
/// Accepted URL form: `redis://[[user]:password@]host[:port][/db]`.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    if URL_SCHEMES.iter().any(|scheme| trimmed.starts_with(scheme)) {
        trimmed.to_string()
    } else {
        format!("redis://{}", trimmed)
    }
}

/// Parse a store address into connection parameters.
pub fn parse_address(address: &str) -> Result<ConnectionInfo> {
    if address.trim().is_empty() {
        return Err(MigrateError::Connection("empty address".into()));
    }
    normalize_address(address)
        .into_connection_info()
        .map_err(|e| MigrateError::Connection(format!("invalid address {:?}: {}", address, e)))
}

/// A store endpoint reached over RESP.
#[derive(Clone)]
pub struct RedisStore {
    address: String,
    connection: MultiplexedConnection,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.address)
            .finish()
    }
}

impl RedisStore {
    /// Connect to `address` (`host:port` or a Redis URL).
    pub async fn connect(address: &str) -> Result<Self> {
        let info = parse_address(address)?;
        debug!(addr = %info.addr, db = info.redis.db, "connecting to store");

        let client = redis::Client::open(info)
            .map_err(|e| MigrateError::Connection(format!("{}: {}", address, e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MigrateError::Connection(format!("{}: {}", address, e)))?;

        Ok(Self {
            address: address.to_string(),
            connection,
        })
    }

    /// The address this store was connected with.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl KeyStore for RedisStore {
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        let mut conn = self.connection.clone();
        let (next, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| MigrateError::Scan {
                cursor,
                message: e.to_string(),
            })?;

        Ok(ScanPage {
            cursor: next,
            keys: keys.into_iter().map(Bytes::from).collect(),
        })
    }

    async fn export(&self, key: &[u8]) -> Result<ExportedValue> {
        let mut conn = self.connection.clone();
        let (ttl_ms, payload): (i64, Option<Vec<u8>>) = redis::pipe()
            .cmd("PTTL")
            .arg(key)
            .cmd("DUMP")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| MigrateError::Export {
                key: display_key(key),
                message: e.to_string(),
            })?;

        Ok(ExportedValue {
            ttl_ms,
            payload: payload.map(Bytes::from),
        })
    }

    async fn restore(&self, key: &[u8], ttl_ms: u64, payload: &[u8], replace: bool) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("RESTORE");
        cmd.arg(key).arg(ttl_ms).arg(payload);
        if replace {
            cmd.arg("REPLACE");
        }
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| MigrateError::Restore {
                key: display_key(key),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| MigrateError::Connection(format!("{}: {}", self.address, e)))?;
        Ok(())
    }
}
