//! migrate - copy keys between Redis-protocol stores
//!
//! Enumerates keys on the source with SCAN, exports them with PTTL + DUMP
//! and restores them on the destination with RESTORE ... REPLACE.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::{error, info};

use kv_migrate::config::{LogFormat, LoggingConfig, MigrateConfig};
use kv_migrate::store::{KeyStore, RedisStore};
use kv_migrate::Migration;

/// migrate - copy keys between Redis-protocol stores
#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(author, version, about = "Copy keys between Redis-protocol stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error (overrides config file)
    #[arg(
        short = 'l',
        long = "log-level",
        value_name = "LEVEL",
        env = "MIGRATE_LOG_LEVEL",
        global = true
    )]
    log_level: Option<String>,

    /// Log format (overrides config file)
    #[arg(long = "log-format", value_enum, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormatArg>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy keys from source to destination by given pattern
    ///
    /// <source> and <destination> can be given as `<host>:<port>` or in
    /// Redis URL format: `redis://[:<password>@]<host>:<port>[/<dbIndex>]`
    Copy {
        /// Source store address
        source: String,

        /// Destination store address
        destination: String,

        /// Match pattern for keys
        #[arg(long)]
        pattern: Option<String>,

        /// COUNT parameter for the SCAN command
        #[arg(long = "scanCount", alias = "scan-count", value_name = "N")]
        scan_count: Option<usize>,

        /// Report current status every N seconds
        #[arg(long, value_name = "SECONDS")]
        report: Option<u64>,

        /// Number of parallel export workers
        #[arg(long = "exportRoutines", alias = "export-routines", value_name = "N")]
        export_routines: Option<usize>,

        /// Number of parallel push workers
        #[arg(long = "pushRoutines", alias = "push-routines", value_name = "N")]
        push_routines: Option<usize>,
    },
}

/// CLI-friendly log format enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    /// Human-readable output
    Pretty,
    /// One JSON object per event
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Apply CLI argument overrides to the configuration
    fn apply_to_config(&self, config: &mut MigrateConfig) {
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }

        match &self.command {
            Commands::Copy {
                pattern,
                scan_count,
                report,
                export_routines,
                push_routines,
                ..
            } => {
                if let Some(pattern) = pattern {
                    config.copy.pattern = pattern.clone();
                }
                if let Some(scan_count) = scan_count {
                    config.copy.scan_count = *scan_count;
                }
                if let Some(report) = report {
                    config.copy.report_interval_secs = *report;
                }
                if let Some(workers) = export_routines {
                    config.copy.export_workers = *workers;
                }
                if let Some(workers) = push_routines {
                    config.copy.push_workers = *workers;
                }
            }
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<MigrateConfig> {
    let mut config = match &cli.config {
        Some(path) => MigrateConfig::from_file(path)?,
        None => MigrateConfig::default(),
    };
    cli.apply_to_config(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Errors returned here are printed by `main`; a failed copy run has
/// already been logged and comes back as `ExitCode::FAILURE`.
async fn run(cli: Cli, config: MigrateConfig) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Copy {
            source,
            destination,
            ..
        } => cmd_copy(&source, &destination, &config).await,
    }
}

// ── Copy ─────────────────────────────────────────────────────────────

async fn cmd_copy(
    source: &str,
    destination: &str,
    config: &MigrateConfig,
) -> anyhow::Result<ExitCode> {
    println!("{}", "Start copying".cyan().bold());
    println!(
        "  {} → {}  pattern: {}  scan count: {}  workers: {}/{}",
        source.yellow(),
        destination.yellow(),
        config.copy.pattern.cyan(),
        config.copy.scan_count,
        config.copy.export_workers,
        config.copy.push_workers,
    );

    let source_store = connect(source).await?;
    let destination_store = connect(destination).await?;

    Ok(copy_between(source_store, destination_store, config).await)
}

/// Run one copy and report its outcome. A failed run emits exactly one
/// ERROR event carrying the error and the counters at abort.
async fn copy_between(
    source: Arc<dyn KeyStore>,
    destination: Arc<dyn KeyStore>,
    config: &MigrateConfig,
) -> ExitCode {
    let migration = Migration::new(source, destination, config.copy.to_options());
    let reporter = migration.reporter();

    match migration.run().await {
        Ok(_) => {
            reporter.report();
            println!("{}", "Finish copying".green().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            let snap = reporter.snapshot();
            error!(
                error = %e,
                scanned = snap.scanned,
                exported = snap.exported,
                pushed = snap.pushed,
                "copy failed"
            );
            ExitCode::FAILURE
        }
    }
}

async fn connect(address: &str) -> anyhow::Result<Arc<dyn KeyStore>> {
    let store = RedisStore::connect(address).await?;
    store.ping().await?;
    info!(address, "connected");
    Ok(Arc::new(store))
}
