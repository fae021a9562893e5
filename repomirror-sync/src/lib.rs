//! # repomirror-sync
//!
//! Mirrors files from a remote repository into a local directory tree.
//!
//! Build a [`Synchronizer`] over a [`RemoteSource`] (normally
//! [`GithubSource`]) and call [`Synchronizer::run`] with a
//! [`SyncRequest`](repomirror_core::SyncRequest). Files are written only when
//! their content differs; operator edits between marker lines in mergeable
//! files survive the update.

pub mod diff;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod remote;
pub mod self_replace;
pub mod walker;
pub mod writer;

pub use diff::unified_diff;
pub use error::{RemoteError, SyncError, SyncFailure};
pub use merge::ProtectedRegionMerger;
pub use pipeline::{
    FileAction, FileReport, NoProgress, ProgressSink, SyncOptions, SyncOutcome, Synchronizer,
};
pub use remote::{GithubSource, Listing, RemoteSource, RetryPolicy};
pub use self_replace::SelfIdentity;
pub use walker::TreeWalker;
pub use writer::atomic_write;
