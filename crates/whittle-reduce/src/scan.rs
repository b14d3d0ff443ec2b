//! File-set scanning: which files under a test-case root are reducible.
//!
//! # Overview
//!
//! A file qualifies for reduction when it is a regular file, its name is not
//! a reserved metadata name, and either every file is being reduced or its
//! content carries a matched reduction-boundary marker pair
//! (`DDBEGIN`/`DDEND`).
//!
//! Scanning is best-effort discovery, not validation: unreadable entries are
//! skipped silently, and the scan never modifies file contents. Results are
//! sorted so repeated scans of an unmodified root agree in both content and
//! order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use whittle_core::contains_marker_pair;

/// Metadata filenames excluded from reduction and from loaded test-case
/// sets.
pub const RESERVED_NAMES: &[&str] = &["test_info.json", "prefs.js"];

/// True when `name` is a reserved metadata filename.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Collect the reducible files under `root`, sorted by path.
///
/// With `all_files` every non-reserved regular file qualifies; otherwise
/// only files containing a matched marker pair do. Unreadable entries are
/// skipped. Idempotent and side-effect-free on file contents.
pub fn scan(root: &Path, all_files: bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, &mut |path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_reserved(&name) {
            return;
        }
        if all_files || file_has_marker_pair(path) {
            files.push(path.to_path_buf());
        }
    })?;
    files.sort();
    Ok(files)
}

/// Recursive walk over regular files. The root must be readable; entries
/// below it that fail to stat or read are skipped.
fn walk(dir: &Path, visit: &mut impl FnMut(&Path)) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            // A subdirectory that disappears or denies access mid-walk is
            // skipped like any other unreadable entry.
            let _ = walk(&path, visit);
        } else if file_type.is_file() {
            visit(&path);
        }
    }
    Ok(())
}

fn file_has_marker_pair(path: &Path) -> bool {
    match fs::read(path) {
        Ok(content) => contains_marker_pair(&content),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn all_files_includes_everything_but_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.html", b"plain\n");
        let b = touch(dir.path(), "sub/b.js", b"plain\n");
        touch(dir.path(), "test_info.json", b"{}");
        touch(dir.path(), "prefs.js", b"// prefs\n");

        let files = scan(dir.path(), true).unwrap();
        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn marker_mode_requires_matched_pair() {
        let dir = tempfile::tempdir().unwrap();
        let marked = touch(
            dir.path(),
            "marked.html",
            b"<!-- DDBEGIN -->\nx\n<!-- DDEND -->\n",
        );
        touch(dir.path(), "plain.html", b"nothing here\n");
        touch(dir.path(), "half.html", b"DDBEGIN only\n");

        let files = scan(dir.path(), false).unwrap();
        assert_eq!(files, vec![marked]);
    }

    #[test]
    fn scan_is_idempotent_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "z.html", b"z\n");
        touch(dir.path(), "a.html", b"a\n");
        touch(dir.path(), "m/inner.html", b"m\n");

        let first = scan(dir.path(), true).unwrap();
        let second = scan(dir.path(), true).unwrap();
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn empty_root_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(dir.path(), true).unwrap().is_empty());
        assert!(scan(dir.path(), false).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(scan(&gone, true).is_err());
    }
}
