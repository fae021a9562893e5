//! Error types for repomirror-sync.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::SyncOutcome;

/// Discriminated outcome of a failed remote call.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Listing or fetch target does not exist at the requested ref.
    #[error("remote path not found: {path} (ref={git_ref})")]
    NotFound { path: String, git_ref: String },

    /// Remote quota exhausted and the run is not allowed to wait.
    #[error(
        "rate limit exceeded{}; provide a token, wait, or use --wait-on-rate-limit",
        reset_hint(.reset_at)
    )]
    RateLimited { reset_at: Option<i64> },

    /// 5xx that persisted through every retry.
    #[error("server error {status} persisted after retries: {url}")]
    TransientServer { status: u16, url: String },

    /// 403 that is not a rate-limit signal.
    #[error("access denied: {url}")]
    AccessDenied { url: String },

    /// Any other non-success status.
    #[error("unexpected HTTP status {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Connection, TLS or read failure below HTTP.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Listing body was not the expected JSON shape.
    #[error("could not decode listing for {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn reset_hint(reset_at: &Option<i64>) -> String {
    match reset_at {
        Some(ts) => match chrono::DateTime::from_timestamp(*ts, 0) {
            Some(at) => format!(" (resets at {})", at.to_rfc3339()),
            None => format!(" (resets at unix {ts})"),
        },
        None => String::new(),
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A fatal error while processing one requested path.
    #[error("error while processing '{requested}'")]
    Aborted {
        requested: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Local conditions that skip one file instead of aborting the run:
    /// permission denied, or the file being held open by another process.
    pub fn is_local_access_denied(&self) -> bool {
        match self {
            SyncError::Io { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied || is_file_in_use(source)
            }
            _ => false,
        }
    }
}

/// A fatal run failure. Carries the counts gathered before the abort.
#[derive(Debug, Error)]
#[error(
    "sync aborted (created {}, updated {}, unchanged {})",
    .outcome.created,
    .outcome.updated,
    .outcome.skipped
)]
pub struct SyncFailure {
    pub outcome: SyncOutcome,
    #[source]
    pub error: SyncError,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Sharing/lock violation on Windows, `ETXTBSY` on Unix.
#[cfg(windows)]
fn is_file_in_use(err: &io::Error) -> bool {
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;
    matches!(
        err.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_file_in_use(err: &io::Error) -> bool {
    const ETXTBSY: i32 = 26;
    err.raw_os_error() == Some(ETXTBSY)
}
