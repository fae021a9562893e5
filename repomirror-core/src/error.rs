//! Error types for repomirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while building a sync request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the manifest failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest YAML is malformed; includes file path and serde_yaml line context.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Repository identifier is not in `owner/name` form.
    #[error("repository must be in 'owner/name' format, got: {0:?}")]
    InvalidRepo(String),

    /// A repository path is empty or escapes the repository root.
    #[error("invalid repository path: {0:?}")]
    InvalidPath(String),

    /// A required setting was given neither on the command line nor in the manifest.
    #[error("missing required setting `{0}` (pass it as a flag or set it in the manifest)")]
    Missing(&'static str),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
