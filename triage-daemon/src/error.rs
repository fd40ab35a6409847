use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and launchd management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] triage_core::ConfigError),

    #[error("triage error: {0}")]
    Sort(#[from] triage_sort::SortError),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("signal handler failed: {0}")]
    Signal(String),

    #[error("launchd error: {0}")]
    Launchd(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
