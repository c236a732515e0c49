//! Tracing subscriber setup.
//!
//! A human-readable stderr layer filtered by `RUST_LOG` (or the given level),
//! plus an optional daily-rolling JSON file layer at debug level.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Default directory for JSON logs.
pub fn default_log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "gatehouse", "gatehouse")
        .map(|dirs| dirs.data_local_dir().join("logs"))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init(level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (json_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gatehouse.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init("info", Some(dir.path()));
        assert!(guard.is_some());
        assert!(init("debug", None).is_none());
        tracing::info!(stage = "test", "telemetry initialized");
    }
}
