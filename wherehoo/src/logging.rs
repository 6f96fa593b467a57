//! Tracing subscriber setup.
//!
//! Console output always, plus a daily rolling file when a log directory is
//! configured. `RUST_LOG` overrides the configured level.

use std::path::Path;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Prefix of the rolling log file names.
pub const LOG_FILE_PREFIX: &str = "wherehoo.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to create log directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Parses a filter directive such as `info` or `wherehoo=debug,warn`.
pub fn filter_for(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(&settings.level)?,
    };

    let console = fmt::layer()
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(true);

    let (file, guard) = match &settings.directory {
        Some(dir) => {
            let (writer, guard) = rolling_writer(dir)?;
            let layer = fmt::layer()
                .with_timer(LocalTime::new(Rfc3339))
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guard)
}

fn rolling_writer(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
        path: dir.display().to_string(),
        source,
    })?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_directives() {
        assert!(filter_for("info").is_ok());
        assert!(filter_for("wherehoo=debug,warn").is_ok());
        assert!(matches!(
            filter_for("wherehoo=loud"),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_rolling_writer_creates_directory() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let (_writer, _guard) = rolling_writer(&logs).unwrap();
        assert!(logs.is_dir());
    }
}
