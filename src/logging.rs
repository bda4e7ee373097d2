//! Logging setup for light-etl runs.
//!
//! Console output plus two daily-rotating files in the configured log
//! directory:
//!
//! - `execucao.<date>.log`: everything passing the env filter
//! - `error.<date>.log`: warnings and errors only
//!
//! ```no_run
//! use light_etl::logging;
//!
//! logging::init(std::path::Path::new("logs"))?;
//! tracing::info!("Run started");
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const RUN_LOG_PREFIX: &str = "execucao";
const ERROR_LOG_PREFIX: &str = "error";
const RETAINED_LOG_FILES: usize = 30;

/// Creates the log directory if needed and returns it.
pub fn ensure_log_dir(log_dir: &Path) -> Result<PathBuf> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }
    Ok(log_dir.to_path_buf())
}

fn appender(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(RETAINED_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// level.
///
/// # Errors
///
/// Fails if the log directory cannot be created, an appender cannot be
/// opened, or a global subscriber is already installed.
pub fn init(log_dir: &Path) -> Result<()> {
    let log_dir = ensure_log_dir(log_dir)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let run_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, RUN_LOG_PREFIX)?);

    let error_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, ERROR_LOG_PREFIX)?)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(run_layer)
        .with(error_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("Logging initialized, log directory: {}", log_dir.display());
    Ok(())
}

/// Path of today's run log.
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    dated_log_path(log_dir, RUN_LOG_PREFIX)
}

/// Path of today's error log.
pub fn current_error_log_path(log_dir: &Path) -> PathBuf {
    dated_log_path(log_dir, ERROR_LOG_PREFIX)
}

/// The appender rolls over at UTC midnight and names files by UTC date.
fn dated_log_path(log_dir: &Path, prefix: &str) -> PathBuf {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    log_dir.join(format!("{prefix}.{today}.log"))
}
