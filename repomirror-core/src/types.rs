//! Domain types for repository mirroring.
//!
//! Repository-relative paths are [`RepoPath`] (forward slashes, no leading
//! `/`, no `..` segments). Local filesystem paths are always `PathBuf`.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Branch used when neither the command line nor the manifest names one.
pub const DEFAULT_REF: &str = "main";

/// Default sentinel opening a protected block.
pub const DEFAULT_START_MARKER: &str = "-----BEGIN USER SECTION-----";

/// Default sentinel closing a protected block.
pub const DEFAULT_END_MARKER: &str = "-----END USER SECTION-----";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A remote repository in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                })
            }
            _ => Err(ConfigError::InvalidRepo(s.to_owned())),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A branch or tag name identifying the remote state to read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefName(pub String);

impl Default for RefName {
    fn default() -> Self {
        Self(DEFAULT_REF.to_owned())
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RefName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RefName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A normalized repository-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Normalize a user- or API-supplied path.
    ///
    /// Strips surrounding whitespace and leading slashes, drops empty and `.`
    /// segments. Returns `None` for an empty result, any `..` segment, or a
    /// segment that the local filesystem would not treat as one plain name
    /// (backslashes, drive or stream colons).
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        for segment in raw.trim().split('/') {
            match segment {
                "" | "." => continue,
                ".." => return None,
                other if !is_plain_segment(other) => return None,
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Resolve under a local root directory.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }
}

fn is_plain_segment(segment: &str) -> bool {
    if segment.contains(['\\', ':']) {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RepoPath {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(ConfigError::InvalidPath(value))
    }
}

impl From<RepoPath> for String {
    fn from(p: RepoPath) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Remote listing entries
// ---------------------------------------------------------------------------

/// Kind of a remote listing entry. Anything that is neither a file nor a
/// directory (symlinks, submodules) collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: RepoPath,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

// ---------------------------------------------------------------------------
// Protected-block markers
// ---------------------------------------------------------------------------

/// Sentinel pair delimiting operator-maintained regions in text files.
///
/// Matching is a case-insensitive substring test anywhere on the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPair {
    pub start: String,
    pub end: String,
}

impl Default for MarkerPair {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.to_owned(),
            end: DEFAULT_END_MARKER.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync request
// ---------------------------------------------------------------------------

/// Everything one synchronization run needs. Immutable for the run.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub repo: RepoId,
    pub git_ref: RefName,
    /// Local destination root.
    pub dest: PathBuf,
    /// Requested selectors, in order. Raw so empty ones can be reported.
    pub paths: Vec<String>,
    pub token: Option<String>,
    pub dry_run: bool,
    pub wait_on_rate_limit: bool,
}

impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRequest")
            .field("repo", &self.repo)
            .field("git_ref", &self.git_ref)
            .field("dest", &self.dest)
            .field("paths", &self.paths)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("dry_run", &self.dry_run)
            .field("wait_on_rate_limit", &self.wait_on_rate_limit)
            .finish()
    }
}
