//! The reduction engine: a pull-based driver over one strategy variant.
//!
//! # Overview
//!
//! The engine owns a test-case root and walks its reducible files one at a
//! time, delegating candidate generation to the variant's reducer. The
//! caller drives a strict two-step protocol:
//!
//! 1. [`ReductionEngine::next`] materializes the next candidate on disk and
//!    returns the whole set; `Ok(None)` means the reduction is finished.
//! 2. [`ReductionEngine::update`] answers with the oracle's verdict, and
//!    optionally the list of files actually served while evaluating it.
//!
//! Calls out of order are protocol errors, not panics. When a served list
//! accompanies a success, files the evaluation never touched are purged from
//! disk; the purge dirties the root, and the engine yields the purged set
//! once more for a confirming verdict before finishing. A failed
//! confirmation is fatal: the purge broke the test case.
//!
//! # Memoization
//!
//! Every rejected candidate is recorded in a [`TriedCache`] as a whole-set
//! fingerprint snapshot. Before reducing each file the engine seeds the
//! reducer's skip-set with every variant of that file previously rejected
//! against an identical rest-of-root, so earlier passes keep paying off on
//! later files.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use whittle_core::{LoadedFile, Reducer};

use crate::cache::{snapshot_root, Snapshot, TriedCache};
use crate::estimate::{accepted_decrement, possible_iters};
use crate::scan::scan;
use crate::storage::TestCaseSet;
use crate::variant::Variant;

/// Protocol or I/O failure while driving a reduction.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// `next` was called while a candidate still awaits its verdict.
    #[error("a verdict for the last candidate is still pending")]
    VerdictPending,
    /// `update` was called with no candidate outstanding.
    #[error("no candidate is awaiting a verdict")]
    NoCandidatePending,
    /// The confirming run after a purge no longer reproduced.
    #[error("test case no longer reproduces after purging unserved files")]
    PurgeBrokeTestCase,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Where the engine sits in the next/update protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// `next` may be called.
    Ready,
    /// A candidate was yielded; `update` must answer it.
    AwaitingVerdict,
    /// The post-purge set was yielded; `update` must confirm it.
    AwaitingFinalVerdict,
    /// The reduction is finished.
    Done,
}

/// The file currently being reduced.
struct ActiveFile {
    path: PathBuf,
    rel: String,
    reducer: Box<dyn Reducer>,
    /// Removable-token count as of the last verdict.
    length: usize,
}

/// Drives one strategy variant over every reducible file under a root.
pub struct ReductionEngine {
    root: PathBuf,
    variant: Variant,
    all_files: bool,
    reduce_queue: VecDeque<PathBuf>,
    /// Per-file upper bound on attempts still possibly needed.
    iters_remaining: BTreeMap<PathBuf, u64>,
    tried: TriedCache,
    current: Option<ActiveFile>,
    /// Disk diverged from the last confirmed state (a purge happened).
    dirty: bool,
    phase: Phase,
    /// Attempt counter for the degenerate check variant: 1 until the single
    /// candidate is yielded, then 0.
    check_remaining: u64,
    file_no: usize,
    total_files: usize,
}

impl ReductionEngine {
    /// Scan `root` and set up a reduction with `variant`.
    ///
    /// With `all_files` every non-reserved file is reduced; otherwise only
    /// files carrying a matched `DDBEGIN`/`DDEND` pair. The check variant is
    /// limited to the first file regardless. Files that cannot be loaded
    /// are skipped with a warning.
    pub fn new(root: &Path, variant: Variant, all_files: bool) -> Result<Self, ReduceError> {
        let mut files = scan(root, all_files)?;
        if variant.is_check() {
            files.truncate(1);
        }
        let mut iters_remaining = BTreeMap::new();
        let mut reduce_queue = VecDeque::new();
        for path in files {
            match LoadedFile::load(&path, variant.granularity()) {
                Ok(file) => {
                    let estimate = possible_iters(file.len()) * variant.estimate_scale();
                    iters_remaining.insert(path.clone(), estimate);
                    reduce_queue.push_back(path);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
                }
            }
        }
        tracing::info!(
            root = %root.display(),
            strategy = %variant,
            files = reduce_queue.len(),
            "reduction engine initialized"
        );
        Ok(ReductionEngine {
            root: root.to_path_buf(),
            variant,
            all_files,
            total_files: reduce_queue.len(),
            reduce_queue,
            iters_remaining,
            tried: TriedCache::new(),
            current: None,
            dirty: false,
            phase: Phase::Ready,
            check_remaining: 1,
            file_no: 0,
        })
    }

    /// Materialize the next candidate on disk and return the whole set, or
    /// `Ok(None)` once the reduction is finished.
    pub fn next(&mut self) -> Result<Option<TestCaseSet>, ReduceError> {
        match self.phase {
            Phase::AwaitingVerdict | Phase::AwaitingFinalVerdict => {
                return Err(ReduceError::VerdictPending);
            }
            Phase::Done => return Ok(None),
            Phase::Ready => {}
        }
        loop {
            if let Some(active) = self.current.as_mut() {
                if active.reducer.next_candidate()? {
                    tracing::debug!(
                        file = %active.rel,
                        attempt = %active.reducer.description(),
                        "proposing candidate"
                    );
                    let set = TestCaseSet::load(&self.root)?;
                    self.phase = Phase::AwaitingVerdict;
                    self.check_remaining = 0;
                    return Ok(Some(set));
                }
                active.reducer.commit()?;
                tracing::info!(
                    file = %active.rel,
                    tokens = active.reducer.current_len(),
                    "file reduction finished"
                );
                let path = active.path.clone();
                self.current = None;
                self.iters_remaining.remove(&path);
                continue;
            }
            let Some(path) = self.reduce_queue.pop_front() else {
                if self.dirty {
                    // A purge changed the set since the last confirmed run;
                    // ask for one confirming verdict before finishing.
                    self.phase = Phase::AwaitingFinalVerdict;
                    return Ok(Some(TestCaseSet::load(&self.root)?));
                }
                self.phase = Phase::Done;
                return Ok(None);
            };
            self.file_no += 1;
            let rel = self.rel(&path);
            let file = match LoadedFile::load(&path, self.variant.granularity()) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(file = %rel, error = %e, "skipping unloadable file");
                    self.iters_remaining.remove(&path);
                    continue;
                }
            };
            tracing::info!(
                file_no = self.file_no,
                total = self.total_files,
                file = %rel,
                "reducing file"
            );
            let mut reducer = self.variant.build_reducer(file);
            let mut rest = snapshot_root(&self.root)?;
            rest.remove(&rel);
            let known = self.tried.variants_for(&rel, &rest);
            if !known.is_empty() {
                tracing::debug!(
                    file = %rel,
                    count = known.len(),
                    "seeding previously rejected variants"
                );
            }
            reducer.update_tried(&known);
            let length = reducer.current_len();
            self.current = Some(ActiveFile {
                path,
                rel,
                reducer,
                length,
            });
        }
    }

    /// Answer the last yielded candidate.
    ///
    /// On success with a `served` list, files the evaluation never requested
    /// are deleted from disk and dropped from the remaining work.
    pub fn update(&mut self, success: bool, served: Option<&[String]>) -> Result<(), ReduceError> {
        match self.phase {
            Phase::AwaitingFinalVerdict => {
                if !success {
                    return Err(ReduceError::PurgeBrokeTestCase);
                }
                self.dirty = false;
                self.phase = Phase::Done;
                return Ok(());
            }
            Phase::AwaitingVerdict => {}
            Phase::Ready | Phase::Done => return Err(ReduceError::NoCandidatePending),
        }
        let active = self
            .current
            .as_mut()
            .ok_or(ReduceError::NoCandidatePending)?;
        active.reducer.feedback(success);
        if success {
            // The accepted candidate is on disk and just reproduced.
            self.dirty = false;
            let removed = active
                .length
                .saturating_sub(active.reducer.current_len())
                .max(1) as u64;
            active.length = active.reducer.current_len();
            if let Some(remaining) = self.iters_remaining.get_mut(&active.path) {
                *remaining = remaining.saturating_sub(accepted_decrement(removed));
            }
        } else {
            if let Some(remaining) = self.iters_remaining.get_mut(&active.path) {
                *remaining = remaining.saturating_sub(1);
            }
            // Disk still holds the rejected candidate; snapshot it so the
            // same whole-set state is never evaluated again.
            let snapshot = snapshot_root(&self.root)?;
            self.tried.record(snapshot);
        }
        if success {
            if let Some(served) = served {
                self.purge_unserved(served)?;
            }
        }
        self.phase = Phase::Ready;
        Ok(())
    }

    /// Upper bound on evaluation attempts that might still be needed.
    pub fn remaining_attempts(&self) -> u64 {
        if self.variant.is_check() {
            return self.check_remaining;
        }
        self.iters_remaining.values().sum::<u64>() + u64::from(self.dirty)
    }

    /// Summary of the attempt currently awaiting a verdict, if any.
    pub fn description(&self) -> Option<String> {
        match self.phase {
            Phase::AwaitingVerdict => self.current.as_ref().map(|a| a.reducer.description()),
            Phase::AwaitingFinalVerdict => Some("confirm the purged test case".into()),
            _ => None,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Number of distinct rejected whole-set states remembered so far.
    pub fn cached_rejections(&self) -> usize {
        self.tried.len()
    }

    /// Snapshots of every rejected whole-set state, for carrying into the
    /// next strategy pass over the same root.
    pub fn tried_snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.tried.iter()
    }

    /// Merge rejected-state snapshots recorded by an earlier pass, so their
    /// candidates are skipped without being re-evaluated.
    pub fn update_tried<I: IntoIterator<Item = Snapshot>>(&mut self, snapshots: I) {
        self.tried.extend(snapshots);
    }

    /// Delete reducible files whose relative path is not in `served`, then
    /// intersect the remaining work with the surviving set.
    fn purge_unserved(&mut self, served: &[String]) -> Result<(), ReduceError> {
        let before = scan(&self.root, self.all_files)?;
        let mut deleted = 0usize;
        for path in &before {
            let rel = self.rel(path);
            if served.iter().any(|s| *s == rel) {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!(file = %rel, "purging unserved file");
                    deleted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if deleted == 0 {
            return Ok(());
        }
        // The set changed after the last confirmed run.
        self.dirty = true;
        let mut survivors = scan(&self.root, self.all_files)?;
        if self.variant.is_check() {
            survivors.truncate(1);
        }
        let keep: BTreeSet<&PathBuf> = survivors.iter().collect();
        self.iters_remaining.retain(|path, _| keep.contains(path));
        self.reduce_queue.retain(|path| keep.contains(path));
        if let Some(active) = &self.current {
            if !keep.contains(&active.path) {
                tracing::info!(file = %active.rel, "active file was purged");
                self.current = None;
            }
        }
        Ok(())
    }

    fn rel(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}
