//! Log sink setup: JSON records to stdout and, optionally, to a rolling file.
//!
//! `RUST_LOG` takes precedence over `log.level`.

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "app";
const LOG_FILE_SUFFIX: &str = "log";

/// Keeps the background file writer alive; drop it last to flush buffered records.
#[must_use]
pub struct LoggerGuard {
    _file: Option<WorkerGuard>,
}

/// Parses `log.level`, falling back to `info` for unknown values.
pub fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(config: &LogConfig) -> Result<RollingFileAppender> {
    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX);
    if config.max_backups > 0 {
        builder = builder.max_log_files(config.max_backups);
    }

    builder
        .build(&config.location)
        .with_context(|| format!("Failed to open log directory {}", config.location))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LogConfig, stdout: bool) -> Result<LoggerGuard> {
    let stdout_layer = stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_writer(std::io::stdout)
            .boxed()
    });

    let (file_layer, guard) = if config.location.is_empty() {
        (None, None)
    } else {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(config)?);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed();
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(filter_for(&config.level))
        .try_init()
        .context("Failed to install log subscriber")?;

    if config.compress || config.max_size > 0 || config.max_age > 0 {
        tracing::debug!(
            max_size = config.max_size,
            max_age = config.max_age,
            compress = config.compress,
            "size, age and compression limits are not applied; files rotate daily"
        );
    }

    Ok(LoggerGuard { _file: guard })
}
