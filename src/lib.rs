//! # kv-migrate
//!
//! Copies keys between two Redis-protocol stores. Keys matching a glob
//! pattern are enumerated on the source with `SCAN`, exported with
//! `PTTL` + `DUMP`, and written to the destination with
//! `RESTORE ... REPLACE`, preserving each key's remaining TTL.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Scanner, exporter and pusher stages and the run driver |
//! | [`store`] | The [`store::KeyStore`] seam, Redis and in-memory endpoints |
//! | [`progress`] | Scanned / exported / pushed counters and the ticker |
//! | [`config`] | TOML configuration and defaults |
//! | [`error`] | [`MigrateError`] and the crate `Result` alias |

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use config::MigrateConfig;
pub use error::{MigrateError, Result};
pub use pipeline::{Migration, MigrationOptions, MigrationRecord, ScanOptions};
pub use progress::{ProgressSnapshot, Reporter};
