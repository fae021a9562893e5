//! End-to-end sync orchestration.
//!
//! Per requested path: walk -> fetch -> read local -> merge-decide -> apply
//! -> count. Runs sequentially, one file at a time, in walk order.
//!
//! | Condition                                   | Effect                 |
//! |---------------------------------------------|------------------------|
//! | empty or non-plain path selector            | warn, skip selector    |
//! | listing `NotFound`                          | warn, skip subtree     |
//! | fetch `NotFound` / `AccessDenied`           | warn, skip file        |
//! | local permission denied / file in use       | warn, skip file        |
//! | deferred self-replace could not be launched | warn, skip file        |
//! | anything else                               | abort, keep the counts |

use std::fs;
use std::path::Path;

use repomirror_core::{MarkerPair, MirrorConfig, RepoPath, SyncRequest};

use crate::error::{io_err, RemoteError, SyncError, SyncFailure};
use crate::merge::ProtectedRegionMerger;
use crate::remote::RemoteSource;
use crate::self_replace::{in_use_files_locked, schedule_deferred_replace, SelfIdentity};
use crate::walker::TreeWalker;
use crate::writer::{atomic_write, read_existing};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Engine settings that are not part of a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// File-name extensions whose protected regions are merged. Matched
    /// case-insensitively, with or without the leading dot.
    pub merge_extensions: Vec<String>,
    pub markers: MarkerPair,
    /// Route the program's own files through the detached deferred replace
    /// instead of the atomic writer.
    pub deferred_self_replace: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&MirrorConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            merge_extensions: config.merge_extensions(),
            markers: config.markers(),
            deferred_self_replace: in_use_files_locked(),
        }
    }

    fn is_mergeable(&self, path: &RepoPath) -> bool {
        let name = path.file_name().to_lowercase();
        self.merge_extensions.iter().any(|ext| {
            let ext = ext.trim().trim_start_matches('.').to_lowercase();
            !ext.is_empty() && name.ends_with(&format!(".{ext}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// What happened to one remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Unchanged,
    Created,
    Updated,
    WouldCreate,
    WouldUpdate,
    ScheduledCreate,
    ScheduledUpdate,
}

impl FileAction {
    /// Human-readable progress label.
    pub fn label(self) -> &'static str {
        match self {
            FileAction::Unchanged => "Up-to-date",
            FileAction::Created => "Created",
            FileAction::Updated => "Updated",
            FileAction::WouldCreate => "Would create",
            FileAction::WouldUpdate => "Would update",
            FileAction::ScheduledCreate => "Scheduled create (self)",
            FileAction::ScheduledUpdate => "Scheduled update (self)",
        }
    }

    pub fn is_change(self) -> bool {
        self != FileAction::Unchanged
    }
}

/// One processed file, handed to the [`ProgressSink`] as soon as it is done.
#[derive(Debug, Clone, Copy)]
pub struct FileReport<'a> {
    pub path: &'a RepoPath,
    pub local_path: &'a Path,
    pub action: FileAction,
    /// Local content before the run, if the file existed.
    pub previous: Option<&'a [u8]>,
    /// Content the run wrote, scheduled, or would write.
    pub planned: &'a [u8],
}

/// Receives per-file results while the run is in progress.
pub trait ProgressSink {
    fn file(&mut self, report: &FileReport<'_>);

    fn warning(&mut self, _message: &str) {}
}

impl<F: FnMut(&FileReport<'_>)> ProgressSink for F {
    fn file(&mut self, report: &FileReport<'_>) {
        self(report)
    }
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn file(&mut self, _report: &FileReport<'_>) {}
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Aggregate counts for one run. In dry-run mode `created`/`updated` count
/// the intended actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

impl SyncOutcome {
    fn record(&mut self, action: FileAction) {
        match action {
            FileAction::Unchanged => self.skipped += 1,
            FileAction::Created | FileAction::WouldCreate | FileAction::ScheduledCreate => {
                self.created += 1
            }
            FileAction::Updated | FileAction::WouldUpdate | FileAction::ScheduledUpdate => {
                self.updated += 1
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Drives one or more sync runs against a [`RemoteSource`].
pub struct Synchronizer<R> {
    remote: R,
    options: SyncOptions,
    merger: ProtectedRegionMerger,
    identity: SelfIdentity,
}

/// Mutable state threaded through one run.
struct Run<'p> {
    outcome: SyncOutcome,
    progress: &'p mut dyn ProgressSink,
}

impl Run<'_> {
    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.progress.warning(&message);
        self.outcome.warnings.push(message);
    }
}

impl<R: RemoteSource> Synchronizer<R> {
    pub fn new(remote: R, options: SyncOptions) -> Self {
        let merger = ProtectedRegionMerger::new(&options.markers);
        Self {
            remote,
            options,
            merger,
            identity: SelfIdentity::current(),
        }
    }

    /// Replace the set of paths treated as the running program's own files.
    pub fn with_identity(mut self, identity: SelfIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Mirror every requested path into `request.dest`.
    ///
    /// Recoverable per-file conditions become warnings. The first other
    /// failure aborts the run; the returned [`SyncFailure`] still carries the
    /// counts accumulated up to that point.
    pub fn run(
        &self,
        request: &SyncRequest,
        progress: &mut dyn ProgressSink,
    ) -> Result<SyncOutcome, SyncFailure> {
        let mut run = Run {
            outcome: SyncOutcome::default(),
            progress,
        };

        if !request.dry_run {
            if let Err(e) = fs::create_dir_all(&request.dest) {
                return Err(SyncFailure {
                    outcome: run.outcome,
                    error: io_err(&request.dest, e),
                });
            }
        }

        for raw in &request.paths {
            let Some(root) = RepoPath::parse(raw) else {
                run.warn(format!("ignoring unusable path selector {raw:?}"));
                continue;
            };
            tracing::debug!(path = %root, git_ref = %request.git_ref, "syncing");
            if let Err(error) = self.sync_path(request, root, &mut run) {
                return Err(SyncFailure {
                    outcome: run.outcome,
                    error: SyncError::Aborted {
                        requested: raw.trim().to_owned(),
                        source: Box::new(error),
                    },
                });
            }
        }

        tracing::info!(
            created = run.outcome.created,
            updated = run.outcome.updated,
            skipped = run.outcome.skipped,
            "sync finished"
        );
        Ok(run.outcome)
    }

    fn sync_path(
        &self,
        request: &SyncRequest,
        root: RepoPath,
        run: &mut Run<'_>,
    ) -> Result<(), SyncError> {
        for item in TreeWalker::new(&self.remote, root, &request.git_ref) {
            match item {
                Ok(path) => self.sync_file(request, &path, run)?,
                Err(RemoteError::NotFound { path, git_ref }) => {
                    run.warn(format!(
                        "path '{path}' not found on the remote (ref={git_ref}); skipping"
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn sync_file(
        &self,
        request: &SyncRequest,
        path: &RepoPath,
        run: &mut Run<'_>,
    ) -> Result<(), SyncError> {
        let remote = match self.remote.fetch(path, &request.git_ref) {
            Ok(bytes) => bytes,
            Err(err @ (RemoteError::NotFound { .. } | RemoteError::AccessDenied { .. })) => {
                run.warn(format!("could not fetch '{path}' ({err}); skipping"));
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let local_path = path.to_local(&request.dest);
        let previous = match read_existing(&local_path) {
            Ok(previous) => previous,
            Err(err) if err.is_local_access_denied() => {
                run.warn(format!(
                    "cannot read '{}' ({err}); skipping",
                    local_path.display()
                ));
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let planned = match &previous {
            Some(local) if self.options.is_mergeable(path) => self.merger.merge(local, &remote),
            _ => remote,
        };

        let exists = previous.is_some();
        let action = if previous.as_deref() == Some(planned.as_slice()) {
            FileAction::Unchanged
        } else if request.dry_run {
            pick(exists, FileAction::WouldCreate, FileAction::WouldUpdate)
        } else if self.options.deferred_self_replace && self.identity.is_self_target(&local_path) {
            if let Err(err) = schedule_deferred_replace(&local_path, &planned) {
                run.warn(format!(
                    "could not schedule replacement of '{}' ({err}); skipping",
                    local_path.display()
                ));
                return Ok(());
            }
            pick(exists, FileAction::ScheduledCreate, FileAction::ScheduledUpdate)
        } else {
            match atomic_write(&local_path, &planned) {
                Ok(()) => pick(exists, FileAction::Created, FileAction::Updated),
                Err(err) if err.is_local_access_denied() => {
                    run.warn(format!(
                        "cannot write '{}' ({err}); skipping",
                        local_path.display()
                    ));
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        };

        if action.is_change() {
            tracing::info!(path = %path, action = action.label(), "applied");
        } else {
            tracing::debug!(path = %path, "up to date");
        }
        run.outcome.record(action);
        run.progress.file(&FileReport {
            path,
            local_path: &local_path,
            action,
            previous: previous.as_deref(),
            planned: &planned,
        });
        Ok(())
    }
}

fn pick(exists: bool, create: FileAction, update: FileAction) -> FileAction {
    if exists {
        update
    } else {
        create
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn repo_path(raw: &str) -> RepoPath {
        RepoPath::parse(raw).unwrap()
    }

    #[rstest]
    #[case("config.bat", true)]
    #[case("tools/SETUP.BAT", true)]
    #[case("run.sh", false)]
    #[case("bat", false)]
    #[case("notes.batch", false)]
    fn mergeable_by_extension(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(SyncOptions::default().is_mergeable(&repo_path(path)), expected);
    }

    #[test]
    fn configured_extensions_accept_missing_dot() {
        let options = SyncOptions {
            merge_extensions: vec!["cmd".into(), ".PS1".into()],
            ..SyncOptions::default()
        };
        assert!(options.is_mergeable(&repo_path("a/start.CMD")));
        assert!(options.is_mergeable(&repo_path("setup.ps1")));
        assert!(!options.is_mergeable(&repo_path("config.bat")));
    }

    #[test]
    fn outcome_counts_intended_actions() {
        let mut outcome = SyncOutcome::default();
        for action in [
            FileAction::Unchanged,
            FileAction::Created,
            FileAction::WouldCreate,
            FileAction::ScheduledUpdate,
            FileAction::Updated,
        ] {
            outcome.record(action);
        }
        assert_eq!((outcome.created, outcome.updated, outcome.skipped), (2, 2, 1));
    }

    #[test]
    fn labels_match_progress_vocabulary() {
        assert_eq!(FileAction::Unchanged.label(), "Up-to-date");
        assert_eq!(FileAction::WouldUpdate.label(), "Would update");
        assert_eq!(FileAction::ScheduledCreate.label(), "Scheduled create (self)");
        assert!(!FileAction::Unchanged.is_change());
    }
}
