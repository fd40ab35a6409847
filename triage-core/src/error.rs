//! Error types for triage-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.triage/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// An explicitly requested config file does not exist.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// `config init` refused to overwrite an existing file.
    #[error("config already exists at {path} (use --force to overwrite)")]
    AlreadyExists { path: PathBuf },

    /// A routing rule entry is malformed.
    #[error("rule #{index} is invalid: {reason}")]
    InvalidRule { index: usize, reason: String },

    /// Any other semantically invalid setting.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
