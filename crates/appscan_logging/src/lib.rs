//! Shared logging utilities for Appscan binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "appscan=info,appscan_worker=info,appscan_sinks=info,\
                                  appscan_store=info,appscan_google=info";
const VERBOSE_LOG_FILTER: &str = "appscan=debug,appscan_worker=debug,appscan_sinks=debug,\
                                  appscan_store=debug,appscan_google=debug";

/// Environment variable naming a directory for the rolling log file.
pub const LOG_DIR_ENV: &str = "APPSCAN_LOG_DIR";

/// Logging configuration shared by Appscan binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// When set, a daily-rolling file is written here in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

/// Keeps the non-blocking file writer alive; drop it last in `main`.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize tracing with stderr output and an optional rolling file writer.
///
/// `RUST_LOG` takes precedence over both the default and the verbose filter.
pub fn init_logging(config: LogConfig<'_>) -> Result<LoggingGuard> {
    let mut file_guard = None;
    let file_layer = match config.log_dir.as_deref() {
        Some(dir) => {
            let dir = ensure_log_dir(dir)?;
            let file_name = format!("{}.log", sanitize_name(config.app_name));
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(build_filter(config.verbose)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(build_filter(config.verbose)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(VERBOSE_LOG_FILTER)
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    })
}

/// Ensure the log directory exists.
pub fn ensure_log_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir.to_path_buf())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
