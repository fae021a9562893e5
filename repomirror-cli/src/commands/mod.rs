//! Subcommand implementations and the flags they share.

pub mod diff;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use repomirror_core::{config, MirrorConfig, SyncRequest};
use repomirror_sync::{GithubSource, SyncOptions, Synchronizer};

/// Source, destination and credential flags. Each one overrides the
/// matching manifest key.
#[derive(Args, Debug, Default)]
pub struct MirrorArgs {
    /// YAML manifest [default: <config dir>/repomirror/config.yaml, if present].
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Repository as `owner/name`.
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch or tag to read [default: main].
    #[arg(short, long = "branch", value_name = "REF")]
    pub branch: Option<String>,

    /// Local directory to mirror into.
    #[arg(short, long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Repo-relative file or directory to mirror. Repeatable; replaces the
    /// manifest's `paths`.
    #[arg(short, long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// Access token sent as a bearer credential.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Sleep until the rate-limit reset instead of failing.
    #[arg(long)]
    pub wait_on_rate_limit: bool,

    /// Contents API base URL.
    #[arg(long, env = "REPOMIRROR_API_URL", hide = true)]
    pub api_url: Option<String>,
}

impl MirrorArgs {
    /// The manifest with every flag layered on top.
    pub fn resolve(&self) -> Result<MirrorConfig> {
        let manifest = match &self.config {
            Some(path) => config::load(path)
                .with_context(|| format!("could not load manifest {}", path.display()))?,
            None => config::load_default()
                .context("could not load default manifest")?
                .unwrap_or_default(),
        };
        Ok(manifest.overlay(self.as_overrides()))
    }

    fn as_overrides(&self) -> MirrorConfig {
        MirrorConfig {
            repo: self.repo.clone(),
            branch: self.branch.clone(),
            dest: self.dest.clone(),
            paths: self.paths.clone(),
            token: self.token.clone(),
            wait_on_rate_limit: self.wait_on_rate_limit.then_some(true),
            api_url: self.api_url.clone(),
            ..MirrorConfig::default()
        }
    }

    /// Validated request plus a synchronizer wired to the real remote.
    pub fn prepare(&self, dry_run: bool) -> Result<(SyncRequest, Synchronizer<GithubSource>)> {
        let resolved = self.resolve()?;
        let options = SyncOptions::from_config(&resolved);
        let api_url = resolved.api_url().to_owned();
        let request = resolved
            .into_request(dry_run)
            .context("invalid sync settings")?;
        tracing::debug!(?request, api_url = %api_url, "resolved request");

        let source = GithubSource::new(&api_url, &request);
        Ok((request, Synchronizer::new(source, options)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_manifest_and_replace_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = dir.path().join("m.yaml");
        std::fs::write(
            &manifest,
            "repo: acme/tools\nbranch: dev\ndest: out\npaths: [docs, bin]\nwait_on_rate_limit: true\n",
        )
        .unwrap();

        let args = MirrorArgs {
            config: Some(manifest),
            branch: Some("release".into()),
            paths: vec!["scripts".into()],
            ..MirrorArgs::default()
        };
        let resolved = args.resolve().unwrap();
        assert_eq!(resolved.repo.as_deref(), Some("acme/tools"));
        assert_eq!(resolved.branch.as_deref(), Some("release"));
        assert_eq!(resolved.paths, vec!["scripts"]);
        assert_eq!(resolved.wait_on_rate_limit, Some(true));
    }

    #[test]
    fn unset_wait_flag_keeps_manifest_value() {
        let args = MirrorArgs::default();
        assert_eq!(args.as_overrides().wait_on_rate_limit, None);
    }
}
