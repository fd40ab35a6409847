//! Error types for triage-detector.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a provenance collaborator. The resolver logs and discards
/// these; they never abort a cycle.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to decode PNG metadata in {path}: {source}")]
    Png {
        path: PathBuf,
        #[source]
        source: png::DecodingError,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProvenanceError {
    ProvenanceError::Io {
        path: path.into(),
        source,
    }
}
