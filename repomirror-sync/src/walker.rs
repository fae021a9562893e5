//! Lazy remote tree traversal.
//!
//! [`TreeWalker`] keeps a worklist of pending paths instead of recursing, so
//! the first file is yielded after a single listing call and later subtrees
//! are listed only when the caller pulls that far.

use repomirror_core::{EntryKind, RefName, RepoPath};

use crate::error::RemoteError;
use crate::remote::{Listing, RemoteSource};

enum Pending {
    /// Needs a listing call; may turn out to be a file or a directory.
    List(RepoPath),
    /// Known file from a parent listing.
    File(RepoPath),
}

/// Iterator over every file path under one requested root.
///
/// Never yields directories. Symlinks, submodules and other entry kinds are
/// dropped. A listing error is yielded in place of that subtree and the walk
/// continues with the remaining worklist; the caller decides whether to stop.
/// Not restartable: walking again re-queries the remote.
pub struct TreeWalker<'a, R: ?Sized> {
    remote: &'a R,
    git_ref: &'a RefName,
    pending: Vec<Pending>,
}

impl<'a, R: RemoteSource + ?Sized> TreeWalker<'a, R> {
    pub fn new(remote: &'a R, root: RepoPath, git_ref: &'a RefName) -> Self {
        Self {
            remote,
            git_ref,
            pending: vec![Pending::List(root)],
        }
    }
}

impl<R: RemoteSource + ?Sized> Iterator for TreeWalker<'_, R> {
    type Item = Result<RepoPath, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(item) = self.pending.pop() {
            let dir = match item {
                Pending::File(path) => return Some(Ok(path)),
                Pending::List(dir) => dir,
            };
            match self.remote.list(&dir, self.git_ref) {
                Ok(Listing::File(entry)) => return Some(Ok(entry.path)),
                Ok(Listing::Dir(entries)) => {
                    // Reversed so the stack pops entries in listing order.
                    for entry in entries.into_iter().rev() {
                        match entry.kind {
                            EntryKind::File => self.pending.push(Pending::File(entry.path)),
                            EntryKind::Dir => self.pending.push(Pending::List(entry.path)),
                            EntryKind::Other => {
                                tracing::debug!(path = %entry.path, "skipping non-file entry");
                            }
                        }
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use repomirror_core::RemoteEntry;

    /// Flat map of every remote path to its kind.
    struct TreeRemote {
        nodes: BTreeMap<&'static str, EntryKind>,
        listed: RefCell<Vec<String>>,
    }

    impl TreeRemote {
        fn new(nodes: &[(&'static str, EntryKind)]) -> Self {
            Self {
                nodes: nodes.iter().copied().collect(),
                listed: RefCell::default(),
            }
        }
    }

    impl RemoteSource for TreeRemote {
        fn list(&self, path: &RepoPath, git_ref: &RefName) -> Result<Listing, RemoteError> {
            self.listed.borrow_mut().push(path.to_string());
            let entry = |p: &str, kind| RemoteEntry {
                path: RepoPath::parse(p).unwrap(),
                kind,
            };
            match self.nodes.get(path.as_str()) {
                Some(EntryKind::File) => Ok(Listing::File(entry(path.as_str(), EntryKind::File))),
                Some(EntryKind::Dir) => {
                    let prefix = format!("{}/", path.as_str());
                    let children = self
                        .nodes
                        .iter()
                        .filter(|(p, _)| {
                            p.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/'))
                        })
                        .map(|(p, kind)| entry(*p, *kind))
                        .collect();
                    Ok(Listing::Dir(children))
                }
                _ => Err(RemoteError::NotFound {
                    path: path.to_string(),
                    git_ref: git_ref.to_string(),
                }),
            }
        }

        fn fetch(&self, _path: &RepoPath, _git_ref: &RefName) -> Result<Vec<u8>, RemoteError> {
            unreachable!("walker never fetches")
        }
    }

    fn sample_tree() -> TreeRemote {
        TreeRemote::new(&[
            ("docs", EntryKind::Dir),
            ("docs/a.txt", EntryKind::File),
            ("docs/link", EntryKind::Other),
            ("docs/sub", EntryKind::Dir),
            ("docs/sub/b.txt", EntryKind::File),
            ("docs/sub/deeper", EntryKind::Dir),
            ("docs/sub/deeper/c.txt", EntryKind::File),
            ("docs/z.txt", EntryKind::File),
        ])
    }

    fn walk(remote: &TreeRemote, root: &str) -> Vec<String> {
        let git_ref = RefName::default();
        TreeWalker::new(remote, RepoPath::parse(root).unwrap(), &git_ref)
            .map(|r| r.unwrap().to_string())
            .collect()
    }

    #[test]
    fn yields_every_leaf_file_and_no_directories() {
        let remote = sample_tree();
        let mut files = walk(&remote, "docs");
        files.sort();
        assert_eq!(
            files,
            vec![
                "docs/a.txt",
                "docs/sub/b.txt",
                "docs/sub/deeper/c.txt",
                "docs/z.txt"
            ]
        );
    }

    #[test]
    fn single_file_root_yields_itself() {
        let remote = sample_tree();
        assert_eq!(walk(&remote, "docs/sub/b.txt"), vec!["docs/sub/b.txt"]);
        assert_eq!(remote.listed.borrow().len(), 1);
    }

    #[test]
    fn first_file_is_available_before_subtrees_are_listed() {
        let remote = sample_tree();
        let git_ref = RefName::default();
        let mut walker = TreeWalker::new(&remote, RepoPath::parse("docs").unwrap(), &git_ref);

        let first = walker.next().unwrap().unwrap();
        assert_eq!(first.as_str(), "docs/a.txt");
        assert_eq!(*remote.listed.borrow(), vec!["docs"]);
    }

    #[test]
    fn missing_root_yields_one_error_then_ends() {
        let remote = sample_tree();
        let git_ref = RefName::default();
        let mut walker = TreeWalker::new(&remote, RepoPath::parse("nope").unwrap(), &git_ref);
        assert!(matches!(walker.next(), Some(Err(RemoteError::NotFound { .. }))));
        assert!(walker.next().is_none());
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let remote = TreeRemote::new(&[("empty", EntryKind::Dir)]);
        assert!(walk(&remote, "empty").is_empty());
    }
}
