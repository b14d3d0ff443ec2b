//! Test-case store: loading a root's files into caller-visible objects.
//!
//! The engine yields a [`TestCaseSet`] after materializing each candidate;
//! the caller evaluates it and answers with a verdict. The set is a plain
//! value -- the caller owns every yielded copy and the engine never touches
//! one after yielding it.
//!
//! `test_info.json` is a metadata sidecar, not test content: it is excluded
//! from the file list but surfaced as parsed [`TestInfo`] when present and
//! well-formed. A missing or malformed sidecar is not an error.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scan::is_reserved;

/// One file of a test case: root-relative path plus content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseFile {
    pub path: String,
    pub data: Vec<u8>,
}

/// Metadata sidecar (`test_info.json`). Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    /// Relative path of the file the target should be pointed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    /// Environment expected when serving the test case.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// A loaded test-case set: all non-reserved files plus parsed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseSet {
    /// Files sorted by relative path.
    pub files: Vec<TestCaseFile>,
    /// Parsed sidecar, when present and well-formed.
    pub info: Option<TestInfo>,
}

impl TestCaseSet {
    /// Load every non-reserved regular file under `root`, sorted by
    /// relative path, and parse the metadata sidecar if one exists.
    pub fn load(root: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        load_dir(root, root, &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(TestCaseSet {
            files,
            info: load_info(root),
        })
    }

    /// Content of the file at `path`, if present in the set.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.data.as_slice())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn load_dir(root: &Path, dir: &Path, files: &mut Vec<TestCaseFile>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            let _ = load_dir(root, &path, files);
        } else if file_type.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if is_reserved(&name) {
                continue;
            }
            let data = fs::read(&path)?;
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            files.push(TestCaseFile { path: rel, data });
        }
    }
    Ok(())
}

/// Parse `test_info.json` leniently: absent or malformed means `None`.
fn load_info(root: &Path) -> Option<TestInfo> {
    let data = fs::read(root.join("test_info.json")).ok()?;
    match serde_json::from_slice(&data) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed test_info.json");
            None
        }
    }
}
