//! Configuration for the `migrate` tool.
//!
//! Values come from three layers, lowest precedence first: built-in
//! defaults, an optional TOML file, and command-line flags. The file layout
//! is:
//!
//! ```toml
//! [copy]
//! pattern = "user:*"
//! scan_count = 500
//! report_interval_secs = 5
//! export_workers = 16
//! push_workers = 16
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::pipeline::{MigrationOptions, ScanOptions};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Copy pipeline settings
    pub copy: CopyConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl MigrateConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::parse_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| MigrateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.copy.to_options().validate()?;
        self.logging.validate()
    }
}

/// Copy pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Glob pattern keys must match
    pub pattern: String,
    /// `SCAN ... COUNT` hint
    pub scan_count: usize,
    /// Seconds between progress lines
    pub report_interval_secs: u64,
    /// Number of exporter workers
    pub export_workers: usize,
    /// Number of pusher workers
    pub push_workers: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            scan_count: 100,
            report_interval_secs: 1,
            export_workers: 30,
            push_workers: 30,
        }
    }
}

impl CopyConfig {
    /// Build the pipeline options for one run.
    pub fn to_options(&self) -> MigrationOptions {
        MigrationOptions {
            scan: ScanOptions {
                pattern: self.pattern.clone(),
                batch_size: self.scan_count,
                export_workers: self.export_workers,
            },
            push_workers: self.push_workers,
            report_interval: Duration::from_secs(self.report_interval_secs),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
            other => Err(MigrateError::Config(format!(
                "Invalid log level '{}': expected trace, debug, info, warn, error or off",
                other
            ))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format
    Json,
}
