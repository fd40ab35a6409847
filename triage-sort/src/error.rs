//! Error types for triage-sort.

use std::path::PathBuf;

use thiserror::Error;

use triage_core::ConfigError;

/// All errors that can arise while triaging files.
#[derive(Debug, Error)]
pub enum SortError {
    /// Invalid configuration when building the engine.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source path has no final component (e.g. `/` or `..`).
    #[error("{path} has no file name")]
    NoFileName { path: PathBuf },

    /// File names must be valid UTF-8 to be rewritten.
    #[error("{path} has a non UTF-8 file name")]
    NonUtf8Name { path: PathBuf },

    /// The rule routes the file onto itself.
    #[error("{path} is already at its destination")]
    AlreadyInPlace { path: PathBuf },

    /// Every hash-qualified name was taken by different content.
    #[error("no free name for {name} in {dir}")]
    NameExhausted { dir: PathBuf, name: String },
}

/// Convenience constructor for [`SortError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SortError {
    SortError::Io {
        path: path.into(),
        source,
    }
}
