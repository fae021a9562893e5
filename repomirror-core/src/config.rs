//! Optional YAML manifest describing a mirror.
//!
//! # Lookup
//!
//! ```text
//! --config <FILE>                          explicit manifest
//! <config_dir>/repomirror/config.yaml      user default, if present
//! ```
//!
//! Command-line flags are layered on top with [`MirrorConfig::overlay`], then
//! the result becomes a [`SyncRequest`] through [`MirrorConfig::into_request`].
//!
//! As in the rest of the workspace, `fn_at(root, …)` takes an explicit root
//! (used by tests) and `fn(…)` derives it from `dirs`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{MarkerPair, RefName, RepoId, SyncRequest};

/// Remote content API used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// File-name extensions whose protected blocks are merged by default.
pub const DEFAULT_MERGE_EXTENSIONS: &[&str] = &[".bat"];

/// Manifest contents. Every field is optional so a manifest can hold just
/// shared defaults (a token, an API URL) and leave the rest to flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub dest: Option<PathBuf>,
    pub paths: Vec<String>,
    pub token: Option<String>,
    pub wait_on_rate_limit: Option<bool>,
    pub api_url: Option<String>,
    pub merge_extensions: Option<Vec<String>>,
    pub markers: Option<MarkerPair>,
}

impl MirrorConfig {
    /// Layer `over` on top of `self`. Set fields in `over` win; a non-empty
    /// `paths` list in `over` replaces the manifest list entirely.
    pub fn overlay(self, over: MirrorConfig) -> MirrorConfig {
        MirrorConfig {
            repo: over.repo.or(self.repo),
            branch: over.branch.or(self.branch),
            dest: over.dest.or(self.dest),
            paths: if over.paths.is_empty() {
                self.paths
            } else {
                over.paths
            },
            token: over.token.or(self.token),
            wait_on_rate_limit: over.wait_on_rate_limit.or(self.wait_on_rate_limit),
            api_url: over.api_url.or(self.api_url),
            merge_extensions: over.merge_extensions.or(self.merge_extensions),
            markers: over.markers.or(self.markers),
        }
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn merge_extensions(&self) -> Vec<String> {
        match &self.merge_extensions {
            Some(exts) => exts.clone(),
            None => DEFAULT_MERGE_EXTENSIONS
                .iter()
                .map(|e| (*e).to_owned())
                .collect(),
        }
    }

    pub fn markers(&self) -> MarkerPair {
        self.markers.clone().unwrap_or_default()
    }

    /// Validate and freeze into a [`SyncRequest`].
    pub fn into_request(self, dry_run: bool) -> Result<SyncRequest, ConfigError> {
        let repo: RepoId = self.repo.as_deref().ok_or(ConfigError::Missing("repo"))?.parse()?;
        let dest = self.dest.ok_or(ConfigError::Missing("dest"))?;
        if self.paths.is_empty() {
            return Err(ConfigError::Missing("path"));
        }
        Ok(SyncRequest {
            repo,
            git_ref: self.branch.map(RefName::from).unwrap_or_default(),
            dest,
            paths: self.paths,
            token: self.token.filter(|t| !t.trim().is_empty()),
            dry_run,
            wait_on_rate_limit: self.wait_on_rate_limit.unwrap_or(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a manifest from an explicit path.
///
/// Returns `ConfigError::Io` if unreadable and `ConfigError::Parse` (with
/// path + line context) if malformed. An empty file is an empty manifest.
pub fn load(path: &Path) -> Result<MirrorConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(MirrorConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `<config_root>/repomirror/config.yaml`: pure, no I/O.
pub fn default_path_at(config_root: &Path) -> PathBuf {
    config_root.join("repomirror").join("config.yaml")
}

/// Load the user default manifest under `config_root`, if there is one.
pub fn load_default_at(config_root: &Path) -> Result<Option<MirrorConfig>, ConfigError> {
    let path = default_path_at(config_root);
    if !path.exists() {
        return Ok(None);
    }
    load(&path).map(Some)
}

/// `load_default_at` convenience wrapper (uses `dirs::config_dir()`).
pub fn load_default() -> Result<Option<MirrorConfig>, ConfigError> {
    match dirs::config_dir() {
        Some(root) => load_default_at(&root),
        None => Ok(None),
    }
}
