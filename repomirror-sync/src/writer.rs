//! Atomic file replacement.
//!
//! ## `atomic_write` protocol
//!
//! 1. Create missing parent directories.
//! 2. Write to sibling `<name>.repomirror.tmp` (same directory, same filesystem).
//! 3. Copy the existing target's permissions onto the temp file.
//! 4. `fsync` the temp file.
//! 5. Rename onto the final path. `std::fs::rename` replaces an existing
//!    target on every platform (`MoveFileExW` with `MOVEFILE_REPLACE_EXISTING`
//!    on Windows).
//!
//! Any failure removes the temp file and leaves the previous target intact.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

const TMP_SUFFIX: &str = ".repomirror.tmp";

/// Read a local file, treating absence as `None`.
pub fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let tmp = tmp_path_for(path);
    atomic_write_with_tmp(path, bytes, &tmp)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

fn atomic_write_with_tmp(path: &Path, bytes: &[u8], tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let staged = write_synced(tmp, bytes, fs::metadata(path).ok().map(|m| m.permissions()));
    if let Err(e) = staged {
        let _ = fs::remove_file(tmp);
        return Err(io_err(tmp, e));
    }

    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote");
    Ok(())
}

/// Create `path`, write `bytes`, apply `permissions` and flush to disk.
pub(crate) fn write_synced(
    path: &Path,
    bytes: &[u8],
    permissions: Option<fs::Permissions>,
) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    if let Some(permissions) = permissions {
        file.set_permissions(permissions)?;
    }
    file.sync_all()
}
