//! repomirror core library: domain types, manifest loading, errors.
//!
//! - [`types`]: newtypes, remote entries and the [`SyncRequest`]
//! - [`config`]: optional YAML manifest ([`MirrorConfig`])
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::MirrorConfig;
pub use error::ConfigError;
pub use types::{
    EntryKind, MarkerPair, RefName, RemoteEntry, RepoId, RepoPath, SyncRequest, DEFAULT_REF,
};
