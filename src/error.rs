//! Error types for the migration pipeline.
//!
//! Every failure the pipeline can hit is fatal to the run, so there is a
//! single error enum shared by the store layer, the three pipeline stages and
//! configuration loading. The variants carry enough context (cursor, key) to
//! make the one fatal log line actionable.

use thiserror::Error;

/// The error type returned by all migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A store endpoint could not be parsed or reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The cursor-based key iteration failed.
    #[error("scan failed at cursor {cursor}: {message}")]
    Scan {
        /// Cursor the failing page was requested with
        cursor: u64,
        /// Underlying failure
        message: String,
    },

    /// Reading a key's TTL and serialized value failed.
    #[error("export of key {key:?} failed: {message}")]
    Export {
        /// Key being exported
        key: String,
        /// Underlying failure
        message: String,
    },

    /// Writing a record into the destination failed.
    #[error("restore of key {key:?} failed: {message}")]
    Restore {
        /// Key being restored
        key: String,
        /// Underlying failure
        message: String,
    },

    /// A scanned key no longer existed when its value was exported.
    #[error("key {0:?} disappeared between scan and export")]
    KeyVanished(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A pipeline worker panicked or was aborted.
    #[error("{stage} worker failed: {message}")]
    Task {
        /// Stage the worker belonged to
        stage: &'static str,
        /// Join error description
        message: String,
    },
}

/// Convenience type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Render a binary-safe key for messages and log fields.
pub fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
