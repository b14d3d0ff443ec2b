//! Tried-variant cache: whole-set fingerprint snapshots of rejected
//! candidates.
//!
//! # Overview
//!
//! Every rejected candidate is remembered as a snapshot mapping each file's
//! relative path to the BLAKE3 hex digest of its content at rejection time.
//! A snapshot predicts a future rejection only when every file *other* than
//! the one currently being reduced matches the present root state exactly --
//! the active file is the only one allowed to differ, since it is the one
//! being varied.
//!
//! When the engine starts reducing a file it collects, from all recorded
//! snapshots whose non-active entries match the current root, the
//! fingerprints those snapshots hold for the active file, and seeds them
//! into the reducer's skip-set. This is the cross-file memoization bridge:
//! a variant rejected during an earlier pass over a different file is never
//! re-evaluated as long as the rest of the root is unchanged.
//!
//! # Determinism
//!
//! Snapshots are `BTreeMap`s stored in a `BTreeSet`: sorted keys, sorted
//! set order, no hash-iteration nondeterminism anywhere near the engine's
//! observable behavior.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::Path;

/// Lowercase hex BLAKE3 digest of one file's content.
pub type Fingerprint = String;

/// Whole-set state: relative path -> content fingerprint, for every regular
/// file under the root.
pub type Snapshot = BTreeMap<String, Fingerprint>;

/// Set of whole-set snapshots already evaluated and rejected.
#[derive(Debug, Default)]
pub struct TriedCache {
    snapshots: BTreeSet<Snapshot>,
}

impl TriedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejected whole-set snapshot. Duplicates collapse.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.snapshots.insert(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Iterate recorded snapshots, for carrying into a later pass.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    /// Merge snapshots recorded by an earlier pass.
    pub fn extend<I: IntoIterator<Item = Snapshot>>(&mut self, snapshots: I) {
        self.snapshots.extend(snapshots);
    }

    /// Fingerprints previously tried for `current_file` among snapshots
    /// whose every other entry equals `rest` (the present root state minus
    /// the active file).
    pub fn variants_for(&self, current_file: &str, rest: &Snapshot) -> HashSet<Fingerprint> {
        self.snapshots
            .iter()
            .filter_map(|snapshot| {
                let mut snapshot = snapshot.clone();
                let tried = snapshot.remove(current_file)?;
                (snapshot == *rest).then_some(tried)
            })
            .collect()
    }

    /// Would a candidate for `current_file` hashing to `fingerprint` be a
    /// known rejection, given the rest of the root is in state `rest`?
    pub fn predict(&self, current_file: &str, fingerprint: &str, rest: &Snapshot) -> bool {
        self.variants_for(current_file, rest).contains(fingerprint)
    }
}

/// Fingerprint every regular file under `root` into a snapshot. Unreadable
/// entries are skipped, matching the scanner's best-effort discovery.
pub fn snapshot_root(root: &Path) -> io::Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    snapshot_dir(root, root, &mut snapshot)?;
    Ok(snapshot)
}

fn snapshot_dir(root: &Path, dir: &Path, snapshot: &mut Snapshot) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            let _ = snapshot_dir(root, &path, snapshot);
        } else if file_type.is_file() {
            if let Ok(content) = fs::read(&path) {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                snapshot.insert(rel, blake3::hash(&content).to_hex().to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn predict_matches_only_when_rest_agrees() {
        let mut cache = TriedCache::new();
        cache.record(snap(&[("a.html", "fp-a1"), ("b.html", "fp-b")]));

        // Same rest, the recorded variant of the active file: hit.
        let rest = snap(&[("b.html", "fp-b")]);
        assert!(cache.predict("a.html", "fp-a1", &rest));
        // Different variant of the active file: miss.
        assert!(!cache.predict("a.html", "fp-a2", &rest));
        // A non-active file differs: miss.
        let other_rest = snap(&[("b.html", "fp-b-changed")]);
        assert!(!cache.predict("a.html", "fp-a1", &other_rest));
    }

    #[test]
    fn variants_for_collects_all_matching_snapshots() {
        let mut cache = TriedCache::new();
        cache.record(snap(&[("a", "v1"), ("b", "base")]));
        cache.record(snap(&[("a", "v2"), ("b", "base")]));
        cache.record(snap(&[("a", "v3"), ("b", "other")]));

        let variants = cache.variants_for("a", &snap(&[("b", "base")]));
        assert_eq!(variants.len(), 2);
        assert!(variants.contains("v1"));
        assert!(variants.contains("v2"));
        assert!(!variants.contains("v3"));
    }

    #[test]
    fn snapshot_missing_active_file_never_matches() {
        let mut cache = TriedCache::new();
        cache.record(snap(&[("b", "fp-b")]));
        assert!(cache.variants_for("a", &snap(&[("b", "fp-b")])).is_empty());
    }

    #[test]
    fn duplicate_records_collapse() {
        let mut cache = TriedCache::new();
        cache.record(snap(&[("a", "v1")]));
        cache.record(snap(&[("a", "v1")]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn snapshot_root_fingerprints_every_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();

        let snapshot = snapshot_root(dir.path()).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot["a.txt"],
            blake3::hash(b"alpha").to_hex().to_string()
        );
        assert_eq!(
            snapshot["sub/b.txt"],
            blake3::hash(b"beta").to_hex().to_string()
        );
    }

    #[test]
    fn snapshot_root_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"one").unwrap();
        let first = snapshot_root(dir.path()).unwrap();
        fs::write(&path, b"two").unwrap();
        let second = snapshot_root(dir.path()).unwrap();
        assert_ne!(first, second);
    }
}
