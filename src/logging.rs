//! Tracing setup for the pipeline runner.
//!
//! Events go to stdout in compact form and to an append-only log file. The file defaults to
//! `logs/facetflow.log` and can be moved with `FACETFLOW_LOG_FILE`. Without `RUST_LOG`, the
//! crate's own targets log at `debug` so wave and commit progress is visible, while
//! dependencies stay at `info`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info,facetflow=debug";

const LOG_FILE_ENV: &str = "FACETFLOW_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/facetflow.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stdout and file subscribers.
///
/// Safe to call more than once; later calls leave the installed subscriber in place. If the log
/// file cannot be opened, only stdout logging is installed.
pub fn init_tracing() {
    let log_path = resolve_log_path(std::env::var(LOG_FILE_ENV).ok());
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer);

    let (installed, log_file) = match open_log_writer(&log_path) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .compact();
            let log_file = log_path.display().to_string();
            (registry.with(file_layer).try_init(), log_file)
        }
        None => (registry.try_init(), "stdout only".to_string()),
    };

    match installed {
        Ok(()) => tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            log_file = log_file.as_str(),
            "facetflow tracing initialized"
        ),
        Err(_) => tracing::debug!("Tracing subscriber already installed"),
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn resolve_log_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

/// Non-blocking appender for `path`, creating its parent directory.
fn open_log_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_raises_crate_verbosity() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).expect("valid directives");
        let rendered = filter.to_string();
        assert!(rendered.contains("facetflow=debug"));
        assert!(rendered.contains("info"));
    }

    #[test]
    fn log_path_falls_back_to_the_logs_directory() {
        assert_eq!(resolve_log_path(None), PathBuf::from("logs/facetflow.log"));
        assert_eq!(resolve_log_path(Some("  ".into())), PathBuf::from("logs/facetflow.log"));
        assert_eq!(
            resolve_log_path(Some("/var/log/ff.log".into())),
            PathBuf::from("/var/log/ff.log")
        );
    }

    #[test]
    fn log_writer_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/run/facetflow.log");
        assert!(open_log_writer(&path).is_some());
        assert!(path.exists());
    }
}
