//! Unified diff previews for `repomirror diff` and `sync --dry-run --diff`.

use similar::TextDiff;

use repomirror_core::RepoPath;

/// Render the change from `previous` (absent for a new file) to `planned`.
///
/// Content that is not UTF-8 text, or that contains NUL bytes, is reported
/// as a single `Binary files ... differ` line. CRLF is folded to LF before
/// diffing so a line-ending change alone does not mark every line.
pub fn unified_diff(path: &RepoPath, previous: Option<&[u8]>, planned: &[u8]) -> String {
    let old_header = match previous {
        Some(_) => format!("a/{path}"),
        None => "/dev/null".to_owned(),
    };
    let new_header = format!("b/{path}");

    let old_text = match previous {
        Some(bytes) => as_text(bytes),
        None => Some(String::new()),
    };
    let (Some(old_text), Some(new_text)) = (old_text, as_text(planned)) else {
        return format!("Binary files {old_header} and {new_header} differ\n");
    };

    TextDiff::from_lines(&old_text, &new_text)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn as_text(bytes: &[u8]) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes)
        .ok()
        .map(|text| text.replace("\r\n", "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> RepoPath {
        RepoPath::parse(raw).unwrap()
    }

    #[test]
    fn changed_line_is_marked() {
        let diff = unified_diff(
            &path("docs/a.txt"),
            Some(b"one\ntwo\nthree\n"),
            b"one\nTWO\nthree\n",
        );
        assert!(diff.contains("--- a/docs/a.txt"));
        assert!(diff.contains("+++ b/docs/a.txt"));
        assert!(diff.contains("-two"));
        assert!(diff.contains("+TWO"));
    }

    #[test]
    fn new_file_diffs_against_dev_null() {
        let diff = unified_diff(&path("new.txt"), None, b"hello\n");
        assert!(diff.contains("--- /dev/null"));
        assert!(diff.contains("+hello"));
    }

    #[test]
    fn binary_content_is_summarized() {
        let diff = unified_diff(&path("logo.png"), Some(b"\x89PNG\0\0"), b"\x89PNG\0\x01");
        assert_eq!(diff, "Binary files a/logo.png and b/logo.png differ\n");
    }

    #[test]
    fn crlf_only_change_produces_no_hunks() {
        let diff = unified_diff(&path("run.bat"), Some(b"echo\n"), b"echo\r\n");
        assert!(!diff.contains("@@"));
    }
}
