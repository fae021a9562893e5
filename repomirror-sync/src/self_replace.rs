//! Updating the running program's own files.
//!
//! Windows refuses to overwrite an executable or script that a live process
//! holds open. For those targets the new bytes are staged in a private temp
//! directory and a detached helper script finishes the job once the file is
//! released:
//!
//! ```text
//! <tmp>/repomirror-self-XXXX/
//!   <target file name>      staged content
//!   replace_self.bat|.sh    helper: wait, move target aside (retrying),
//!                           move staged file in, delete the staging dir
//! ```
//!
//! The helper is a separate OS process, so it outlives this one. Elsewhere
//! the orchestrator writes self-targets through the normal atomic writer.

use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{io_err, SyncError};
use crate::writer::write_synced;

/// Attempts the helper makes to move the live file aside, one second apart.
pub const MAX_REPLACE_ATTEMPTS: u32 = 60;

const STAGE_PREFIX: &str = "repomirror-self-";

/// Whether this platform locks files that a running process has open.
pub fn in_use_files_locked() -> bool {
    cfg!(windows)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The set of paths that denote the running program.
#[derive(Debug, Clone, Default)]
pub struct SelfIdentity {
    candidates: Vec<PathBuf>,
}

impl SelfIdentity {
    /// The current executable plus `argv[0]`, both made absolute.
    pub fn current() -> Self {
        let mut candidates = Vec::new();
        if let Ok(exe) = env::current_exe() {
            candidates.push(exe);
        }
        if let Some(arg0) = env::args_os().next() {
            candidates.push(PathBuf::from(arg0));
        }
        Self::from_paths(candidates)
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        for path in paths {
            let abs = absolutize(&path);
            if !candidates.contains(&abs) {
                candidates.push(abs);
            }
        }
        Self { candidates }
    }

    /// True when `path` denotes one of the program's own files.
    ///
    /// When both paths exist the same-file identity check decides; otherwise
    /// (or when that check errors) normalized, case-insensitive path text is
    /// compared.
    pub fn is_self_target(&self, path: &Path) -> bool {
        let target = absolutize(path);
        self.candidates
            .iter()
            .any(|candidate| same_identity(candidate, &target))
    }
}

fn same_identity(a: &Path, b: &Path) -> bool {
    if a.exists() && b.exists() {
        if let Ok(same) = same_file::is_same_file(a, b) {
            return same;
        }
    }
    comparable(a) == comparable(b)
}

fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    lexical_normalize(&joined)
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn comparable(path: &Path) -> String {
    lexical_normalize(path)
        .to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Deferred replace
// ---------------------------------------------------------------------------

/// Files created for one scheduled replacement. Owned by the helper process
/// once scheduling returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReplace {
    pub target: PathBuf,
    pub stage_dir: PathBuf,
    pub staged: PathBuf,
    pub script: PathBuf,
}

/// Stage `bytes` and launch a detached helper that moves them onto `target`.
pub fn schedule_deferred_replace(
    target: &Path,
    bytes: &[u8],
) -> Result<ScheduledReplace, SyncError> {
    let target = absolutize(target);
    let file_name = target.file_name().ok_or_else(|| {
        io_err(
            &target,
            io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"),
        )
    })?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let stage_dir = tempfile::Builder::new()
        .prefix(STAGE_PREFIX)
        .tempdir()
        .map_err(|e| io_err(env::temp_dir(), e))?
        .keep();
    let staged = stage_dir.join(file_name);
    write_synced(&staged, bytes, fs::metadata(&target).ok().map(|m| m.permissions()))
        .map_err(|e| io_err(&staged, e))?;

    let (script_name, script_body) = if cfg!(windows) {
        ("replace_self.bat", render_batch_script(&target, &staged, &stage_dir))
    } else {
        ("replace_self.sh", render_shell_script(&target, &staged, &stage_dir))
    };
    let script = stage_dir.join(script_name);
    fs::write(&script, script_body).map_err(|e| io_err(&script, e))?;

    spawn_detached(&script).map_err(|e| io_err(&script, e))?;
    tracing::info!(
        file = %target.display(),
        staged = %staged.display(),
        "scheduled deferred replace"
    );

    Ok(ScheduledReplace {
        target,
        stage_dir,
        staged,
        script,
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// `cmd.exe` helper. Lines end in CRLF.
fn render_batch_script(target: &Path, staged: &Path, stage_dir: &Path) -> String {
    let quote = |p: &Path| format!("\"{}\"", p.display());
    let t = quote(target);
    let old = quote(&with_suffix(target, ".old"));
    let s = quote(staged);
    let d = quote(stage_dir);
    [
        "@echo off".to_owned(),
        "setlocal enableextensions".to_owned(),
        "set /a tries=0".to_owned(),
        "timeout /t 1 /nobreak >nul".to_owned(),
        format!("if not exist {t} goto place"),
        ":retry".to_owned(),
        format!("move /y {t} {old} >nul 2>&1"),
        "if not errorlevel 1 goto place".to_owned(),
        "set /a tries+=1".to_owned(),
        format!("if %tries% geq {MAX_REPLACE_ATTEMPTS} exit /b 1"),
        "timeout /t 1 /nobreak >nul".to_owned(),
        "goto retry".to_owned(),
        ":place".to_owned(),
        format!("move /y {s} {t} >nul || (move /y {old} {t} >nul 2>&1 & exit /b 1)"),
        format!("del /q {old} >nul 2>&1"),
        format!("rd /s /q {d} >nul 2>&1"),
        String::new(),
    ]
    .join("\r\n")
}

/// POSIX `sh` helper.
fn render_shell_script(target: &Path, staged: &Path, stage_dir: &Path) -> String {
    let quote = |p: &Path| format!("'{}'", p.display().to_string().replace('\'', r"'\''"));
    let t = quote(target);
    let old = quote(&with_suffix(target, ".old"));
    let s = quote(staged);
    let d = quote(stage_dir);
    format!(
        "#!/bin/sh\n\
         sleep 1\n\
         if [ -e {t} ]; then\n\
         \x20 tries=0\n\
         \x20 until mv -f {t} {old} 2>/dev/null; do\n\
         \x20   tries=$((tries + 1))\n\
         \x20   [ \"$tries\" -ge {MAX_REPLACE_ATTEMPTS} ] && exit 1\n\
         \x20   sleep 1\n\
         \x20 done\n\
         fi\n\
         if ! mv -f {s} {t}; then\n\
         \x20 [ -e {old} ] && mv -f {old} {t}\n\
         \x20 exit 1\n\
         fi\n\
         rm -f {old}\n\
         rm -rf {d}\n"
    )
}

#[cfg(windows)]
fn spawn_detached(script: &Path) -> io::Result<()> {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

    Command::new("cmd")
        .arg("/c")
        .arg(script)
        .creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(not(windows))]
fn spawn_detached(script: &Path) -> io::Result<()> {
    use std::os::unix::process::CommandExt;

    Command::new("sh")
        .arg(script)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}
