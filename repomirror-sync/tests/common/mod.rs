//! In-memory remote for orchestrator tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use repomirror_core::{EntryKind, RefName, RemoteEntry, RepoId, RepoPath, SyncRequest};
use repomirror_sync::{Listing, RemoteError, RemoteSource};

/// Failure injected for one path.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    NotFound,
    RateLimited,
    ServerError,
    AccessDenied,
}

impl Fault {
    fn into_error(self, path: &RepoPath, git_ref: &RefName) -> RemoteError {
        match self {
            Fault::NotFound => RemoteError::NotFound {
                path: path.to_string(),
                git_ref: git_ref.to_string(),
            },
            Fault::RateLimited => RemoteError::RateLimited { reset_at: None },
            Fault::ServerError => RemoteError::TransientServer {
                status: 503,
                url: format!("memory://{path}"),
            },
            Fault::AccessDenied => RemoteError::AccessDenied {
                url: format!("memory://{path}"),
            },
        }
    }
}

/// Remote tree held as a flat map of file path to bytes. Directories are
/// implied by the file paths.
#[derive(Default)]
pub struct MemoryRemote {
    files: BTreeMap<String, Vec<u8>>,
    list_faults: HashMap<String, Fault>,
    fetch_faults: HashMap<String, Fault>,
    pub calls: RefCell<Vec<String>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_owned(), bytes.into());
        self
    }

    pub fn fail_list(mut self, path: &str, fault: Fault) -> Self {
        self.list_faults.insert(path.to_owned(), fault);
        self
    }

    pub fn fail_fetch(mut self, path: &str, fault: Fault) -> Self {
        self.fetch_faults.insert(path.to_owned(), fault);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("fetch "))
            .count()
    }

    fn entry(path: &str, kind: EntryKind) -> RemoteEntry {
        RemoteEntry {
            path: RepoPath::parse(path).expect("valid path"),
            kind,
        }
    }
}

impl RemoteSource for MemoryRemote {
    fn list(&self, path: &RepoPath, git_ref: &RefName) -> Result<Listing, RemoteError> {
        self.calls.borrow_mut().push(format!("list {path}"));
        if let Some(fault) = self.list_faults.get(path.as_str()) {
            return Err(fault.into_error(path, git_ref));
        }
        if self.files.contains_key(path.as_str()) {
            return Ok(Listing::File(Self::entry(path.as_str(), EntryKind::File)));
        }

        let prefix = format!("{}/", path.as_str());
        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(format!("{prefix}{dir}"));
                }
                None => files.push(Self::entry(key, EntryKind::File)),
            }
        }
        if files.is_empty() && dirs.is_empty() {
            return Err(Fault::NotFound.into_error(path, git_ref));
        }
        files.extend(dirs.iter().map(|d| Self::entry(d, EntryKind::Dir)));
        Ok(Listing::Dir(files))
    }

    fn fetch(&self, path: &RepoPath, git_ref: &RefName) -> Result<Vec<u8>, RemoteError> {
        self.calls.borrow_mut().push(format!("fetch {path}"));
        if let Some(fault) = self.fetch_faults.get(path.as_str()) {
            return Err(fault.into_error(path, git_ref));
        }
        self.files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| Fault::NotFound.into_error(path, git_ref))
    }
}

pub fn request(dest: &std::path::Path, paths: &[&str]) -> SyncRequest {
    SyncRequest {
        repo: "acme/tools".parse::<RepoId>().expect("repo id"),
        git_ref: RefName::default(),
        dest: dest.to_path_buf(),
        paths: paths.iter().map(|p| (*p).to_owned()).collect(),
        token: None,
        dry_run: false,
        wait_on_rate_limit: false,
    }
}

/// CRLF-joined batch file body.
pub fn bat(lines: &[&str]) -> Vec<u8> {
    lines
        .iter()
        .flat_map(|line| [*line, "\r\n"])
        .collect::<String>()
        .into_bytes()
}
