//! Reducer algorithms: the candidate-producing half of delta debugging.
//!
//! # Overview
//!
//! A [`Reducer`] owns one [`LoadedFile`] and walks a deterministic schedule
//! of smaller candidates. The driver alternates two calls:
//!
//! 1. [`Reducer::next_candidate`] -- advance to the next untried candidate
//!    and write it to the file's path; `false` when the schedule is done.
//! 2. [`Reducer::feedback`] -- the oracle's verdict for that candidate.
//!    Accepted candidates become the new best; rejected candidates have
//!    their fingerprint remembered so the same content is never proposed
//!    twice. A rejection leaves the candidate bytes on disk; they stay there
//!    until the next candidate or a final [`Reducer::commit`] overwrites
//!    them.
//!
//! The skip-set can also be pre-seeded via [`Reducer::update_tried`] with
//! fingerprints known to fail from earlier passes over other files; such
//! candidates are silently skipped without being proposed.
//!
//! # Implementations
//!
//! - [`Minimize`]: halving-chunk search (ddmin). Chunks start at the largest
//!   power of two below the token count and halve after each full round;
//!   the final chunk-size-1 round is retried once more before giving up.
//! - [`CheckOnly`]: proposes the unmodified content exactly once. A pipeline
//!   gate, not a minimizer.
//! - [`CollapseEmptyBraces`]: line minimization that, after each accepted
//!   removal, additionally tries collapsing an emptied `{` / `}` pair onto
//!   one line so the block can be removed by a later pass.

use std::collections::HashSet;
use std::io;

use crate::math::largest_power_of_two_smaller_than;
use crate::testcase::{LoadedFile, Token};

/// A candidate-producing minimization algorithm over one loaded file.
pub trait Reducer {
    /// Advance to the next untried candidate and materialize it at the
    /// file's path. Returns `false` when the schedule is exhausted.
    ///
    /// Every `true` return must be answered with exactly one
    /// [`feedback`](Reducer::feedback) call before the next invocation.
    fn next_candidate(&mut self) -> io::Result<bool>;

    /// Verdict for the last proposed candidate.
    fn feedback(&mut self, success: bool);

    /// Pre-seed the skip-set with serialized-content fingerprints known to
    /// fail. Matching candidates are skipped without being proposed.
    fn update_tried(&mut self, tried: &HashSet<String>);

    /// Human-readable summary of the current attempt.
    fn description(&self) -> String;

    /// Removable-token count of the current best.
    fn current_len(&self) -> usize;

    /// Best-known content; the original when nothing was accepted.
    fn best(&self) -> &LoadedFile;

    /// Persist the best-known content to the file's path.
    fn commit(&self) -> io::Result<()> {
        self.best().write()
    }
}

// ---------------------------------------------------------------------------
// CheckOnly
// ---------------------------------------------------------------------------

/// Proposes the unmodified content once and performs no reduction.
#[derive(Debug)]
pub struct CheckOnly {
    file: LoadedFile,
    proposed: bool,
    awaiting: bool,
    reproduced: Option<bool>,
}

impl CheckOnly {
    pub fn new(file: LoadedFile) -> Self {
        CheckOnly {
            file,
            proposed: false,
            awaiting: false,
            reproduced: None,
        }
    }

    /// The verdict recorded for the single candidate, once supplied.
    pub fn reproduced(&self) -> Option<bool> {
        self.reproduced
    }
}

impl Reducer for CheckOnly {
    fn next_candidate(&mut self) -> io::Result<bool> {
        debug_assert!(!self.awaiting, "feedback required before next candidate");
        if self.proposed {
            return Ok(false);
        }
        self.file.write()?;
        self.proposed = true;
        self.awaiting = true;
        Ok(true)
    }

    fn feedback(&mut self, success: bool) {
        debug_assert!(self.awaiting, "feedback without a pending candidate");
        self.awaiting = false;
        self.reproduced = Some(success);
    }

    fn update_tried(&mut self, _tried: &HashSet<String>) {
        // The single candidate is always proposed.
    }

    fn description(&self) -> String {
        "check whether the test case still reproduces".into()
    }

    fn current_len(&self) -> usize {
        self.file.len()
    }

    fn best(&self) -> &LoadedFile {
        &self.file
    }
}

// ---------------------------------------------------------------------------
// Minimize
// ---------------------------------------------------------------------------

/// Halving-chunk minimization (ddmin).
///
/// Rounds walk the removable tokens in aligned chunks of the current size.
/// An accepted candidate shrinks the best in place and the walk continues at
/// the same offset (the next chunk slides into it); a rejected candidate
/// advances past the chunk. When a round completes the chunk size halves.
/// Chunk-size-1 rounds repeat until one passes with no removal twice in a
/// row, which gives the schedule its "final round retried once" shape.
#[derive(Debug)]
pub struct Minimize {
    best: LoadedFile,
    pending: Option<LoadedFile>,
    pending_fp: Option<String>,
    chunk_size: usize,
    offset: usize,
    round_removed: bool,
    quiet_size1_rounds: u32,
    tried: HashSet<String>,
    done: bool,
    description: String,
}

impl Minimize {
    pub fn new(file: LoadedFile) -> Self {
        let len = file.len();
        Minimize {
            done: len == 0,
            chunk_size: largest_power_of_two_smaller_than(len as u64) as usize,
            best: file,
            pending: None,
            pending_fp: None,
            offset: 0,
            round_removed: false,
            quiet_size1_rounds: 0,
            tried: HashSet::new(),
            description: "minimize".into(),
        }
    }

    fn end_round(&mut self) {
        self.offset = 0;
        if self.chunk_size > 1 {
            self.chunk_size /= 2;
            tracing::debug!(chunk_size = self.chunk_size, "halving chunk size");
        } else if self.round_removed {
            self.quiet_size1_rounds = 0;
        } else {
            self.quiet_size1_rounds += 1;
            // One quiet round earns a retry; a second ends the schedule.
            if self.quiet_size1_rounds >= 2 {
                self.done = true;
            }
        }
        self.round_removed = false;
    }

    pub(crate) fn set_best(&mut self, best: LoadedFile) {
        self.best = best;
    }

    pub(crate) fn is_tried(&self, fingerprint: &str) -> bool {
        self.tried.contains(fingerprint)
    }

    pub(crate) fn insert_tried(&mut self, fingerprint: String) {
        self.tried.insert(fingerprint);
    }
}

impl Reducer for Minimize {
    fn next_candidate(&mut self) -> io::Result<bool> {
        debug_assert!(
            self.pending.is_none(),
            "feedback required before next candidate"
        );
        loop {
            if self.done {
                return Ok(false);
            }
            let removable = self.best.len();
            if removable == 0 {
                self.done = true;
                return Ok(false);
            }
            if self.offset >= removable {
                self.end_round();
                continue;
            }
            let end = (self.offset + self.chunk_size).min(removable);
            let candidate = self.best.without_removable_range(self.offset, end);
            let fingerprint = candidate.fingerprint();
            if self.tried.contains(&fingerprint) {
                // Known to fail; move past the chunk without proposing.
                self.offset += self.chunk_size;
                continue;
            }
            self.description = format!(
                "remove {} of {} {} (chunk size {})",
                end - self.offset,
                removable,
                self.best.granularity().unit(),
                self.chunk_size,
            );
            candidate.write()?;
            self.pending = Some(candidate);
            self.pending_fp = Some(fingerprint);
            return Ok(true);
        }
    }

    fn feedback(&mut self, success: bool) {
        let fingerprint = self.pending_fp.take();
        let Some(candidate) = self.pending.take() else {
            debug_assert!(false, "feedback without a pending candidate");
            return;
        };
        if success {
            self.best = candidate;
            self.round_removed = true;
            // Offset stays: the next chunk slid into this position.
        } else {
            if let Some(fp) = fingerprint {
                self.tried.insert(fp);
            }
            self.offset += self.chunk_size;
        }
    }

    fn update_tried(&mut self, tried: &HashSet<String>) {
        self.tried.extend(tried.iter().cloned());
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn current_len(&self) -> usize {
        self.best.len()
    }

    fn best(&self) -> &LoadedFile {
        &self.best
    }
}

// ---------------------------------------------------------------------------
// CollapseEmptyBraces
// ---------------------------------------------------------------------------

/// Line minimization with empty-brace collapsing between removals.
///
/// Reducing a block's body leaves `foo {` and `}` on separate lines, and
/// neither line can be removed alone without breaking syntax. After every
/// accepted removal this reducer proposes one extra candidate that joins the
/// first such pair onto a single line, so the emptied block can fall to a
/// later chunk.
#[derive(Debug)]
pub struct CollapseEmptyBraces {
    inner: Minimize,
    collapse: Option<LoadedFile>,
    collapse_fp: Option<String>,
    collapse_armed: bool,
}

impl CollapseEmptyBraces {
    pub fn new(file: LoadedFile) -> Self {
        CollapseEmptyBraces {
            inner: Minimize::new(file),
            collapse: None,
            collapse_fp: None,
            collapse_armed: false,
        }
    }
}

impl Reducer for CollapseEmptyBraces {
    fn next_candidate(&mut self) -> io::Result<bool> {
        if self.collapse_armed {
            self.collapse_armed = false;
            if let Some(candidate) = collapse_empty_braces(self.inner.best()) {
                let fingerprint = candidate.fingerprint();
                if !self.inner.is_tried(&fingerprint) {
                    candidate.write()?;
                    self.collapse = Some(candidate);
                    self.collapse_fp = Some(fingerprint);
                    return Ok(true);
                }
            }
        }
        self.inner.next_candidate()
    }

    fn feedback(&mut self, success: bool) {
        if let Some(candidate) = self.collapse.take() {
            let fingerprint = self.collapse_fp.take();
            if success {
                self.inner.set_best(candidate);
                // Cascade: the collapse may have exposed another pair.
                self.collapse_armed = true;
            } else if let Some(fp) = fingerprint {
                self.inner.insert_tried(fp);
            }
            return;
        }
        self.inner.feedback(success);
        if success {
            self.collapse_armed = true;
        }
    }

    fn update_tried(&mut self, tried: &HashSet<String>) {
        self.inner.update_tried(tried);
    }

    fn description(&self) -> String {
        if self.collapse.is_some() {
            "collapse empty braces onto one line".into()
        } else {
            self.inner.description()
        }
    }

    fn current_len(&self) -> usize {
        self.inner.current_len()
    }

    fn best(&self) -> &LoadedFile {
        self.inner.best()
    }
}

/// A copy with the first `... {` line joined to an immediately following
/// lone `}` line, or `None` when no such pair exists.
fn collapse_empty_braces(file: &LoadedFile) -> Option<LoadedFile> {
    let tokens = file.tokens();
    for i in 0..tokens.len().saturating_sub(1) {
        let open = trim_ascii(&tokens[i].data);
        let close = trim_ascii(&tokens[i + 1].data);
        if open.ends_with(b"{") && close == b"}" {
            let mut joined = trim_end_ascii(&tokens[i].data).to_vec();
            joined.extend_from_slice(b" }");
            if tokens[i + 1].data.ends_with(b"\n") {
                joined.push(b'\n');
            }
            let mut new_tokens: Vec<Token> = tokens.to_vec();
            new_tokens[i].data = joined;
            new_tokens.remove(i + 1);
            return Some(file.with_tokens(new_tokens));
        }
    }
    None
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    trim_end_ascii(&data[start..])
}

fn trim_end_ascii(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::Granularity;
    use std::path::Path;

    /// Drive a reducer to completion against a byte-content oracle.
    /// Returns the number of candidates proposed.
    fn drive<R: Reducer>(reducer: &mut R, dir: &Path, oracle: impl Fn(&[u8]) -> bool) -> usize {
        let mut proposals = 0;
        while reducer.next_candidate().unwrap() {
            proposals += 1;
            let on_disk = std::fs::read(dir).unwrap();
            reducer.feedback(oracle(&on_disk));
        }
        reducer.commit().unwrap();
        proposals
    }

    fn write_case(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.txt");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn check_only_proposes_once_unchanged() {
        let (_dir, path) = write_case(b"a\nb\nc\n");
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut check = CheckOnly::new(file);

        assert!(check.next_candidate().unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"a\nb\nc\n");
        check.feedback(true);
        assert_eq!(check.reproduced(), Some(true));
        assert!(!check.next_candidate().unwrap());
        check.commit().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"a\nb\nc\n");
    }

    #[test]
    fn minimize_converges_to_needle_line() {
        let (_dir, path) = write_case(b"aaa\nbbb\nneedle\nccc\n");
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);
        drive(&mut minimize, &path, |data| {
            data.windows(6).any(|w| w == b"needle")
        });
        assert_eq!(std::fs::read(&path).unwrap(), b"needle\n");
        assert_eq!(minimize.current_len(), 1);
    }

    #[test]
    fn minimize_all_rejected_restores_original() {
        let content = b"a\nb\nc\nd\n";
        let (_dir, path) = write_case(content);
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);
        drive(&mut minimize, &path, |data| data == content);
        // Every removal was rejected: the commit restores the original.
        assert_eq!(std::fs::read(&path).unwrap(), content);
        assert_eq!(minimize.current_len(), 4);
    }

    #[test]
    fn rejected_candidate_stays_on_disk_until_commit() {
        let (_dir, path) = write_case(b"a\nb\n");
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);

        assert!(minimize.next_candidate().unwrap());
        let candidate = std::fs::read(&path).unwrap();
        assert_ne!(candidate, b"a\nb\n");
        minimize.feedback(false);
        // The rejected bytes linger so a driver can snapshot them; only
        // commit restores the best.
        assert_eq!(std::fs::read(&path).unwrap(), candidate);
        minimize.commit().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"a\nb\n");
    }

    #[test]
    fn minimize_never_reproposes_rejected_content() {
        let content = b"a\nb\nc\nd\ne\nf\ng\nh\n";
        let (_dir, path) = write_case(content);
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);

        let mut seen = std::collections::HashSet::new();
        while minimize.next_candidate().unwrap() {
            let on_disk = std::fs::read(&path).unwrap();
            assert!(
                seen.insert(on_disk.clone()),
                "candidate proposed twice: {on_disk:?}"
            );
            minimize.feedback(false);
        }
    }

    #[test]
    fn minimize_empty_file_exhausts_immediately() {
        let (_dir, path) = write_case(b"");
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);
        assert!(!minimize.next_candidate().unwrap());
    }

    #[test]
    fn minimize_single_token() {
        let (_dir, path) = write_case(b"only\n");
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);
        let proposals = drive(&mut minimize, &path, |data| !data.is_empty());
        // One candidate (the empty file), rejected once; the size-1 retry
        // round skips it via the tried set.
        assert_eq!(proposals, 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"only\n");
    }

    #[test]
    fn minimize_update_tried_skips_seeded_candidates() {
        let content = b"a\nb\n";
        let (_dir, path) = write_case(content);
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();

        // Seed the variant that drops the first line; it must never be
        // proposed again.
        let seeded = LoadedFile::from_bytes(&path, Granularity::Lines, b"b\n");
        let mut tried = HashSet::new();
        tried.insert(seeded.fingerprint());

        let mut minimize = Minimize::new(file);
        minimize.update_tried(&tried);

        let mut proposed = Vec::new();
        while minimize.next_candidate().unwrap() {
            proposed.push(std::fs::read(&path).unwrap());
            minimize.feedback(false);
        }
        assert!(
            !proposed.contains(&b"b\n".to_vec()),
            "seeded candidate was proposed: {proposed:?}"
        );
    }

    #[test]
    fn minimize_respects_marker_region() {
        let content = b"keep\nDDBEGIN\nx\ny\nDDEND\nkeep\n";
        let (_dir, path) = write_case(content);
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut minimize = Minimize::new(file);
        drive(&mut minimize, &path, |_| true);
        assert_eq!(std::fs::read(&path).unwrap(), b"keep\nDDBEGIN\nDDEND\nkeep\n");
    }

    #[test]
    fn collapse_joins_emptied_braces() {
        let content = b"function f() {\nbody();\n}\ntrigger();\n";
        let (_dir, path) = write_case(content);
        let file = LoadedFile::load(&path, Granularity::Lines).unwrap();
        let mut reducer = CollapseEmptyBraces::new(file);
        // Oracle: needs the trigger call and balanced braces. Removing either
        // brace line alone breaks it, so only the collapse can shrink the
        // emptied block.
        let contains = |data: &[u8], needle: &[u8]| {
            data.windows(needle.len()).any(|w| w == needle)
        };
        drive(&mut reducer, &path, |data| {
            contains(data, b"trigger();") && contains(data, b"{") == contains(data, b"}")
                && contains(data, b"{")
        });
        let result = std::fs::read(&path).unwrap();
        assert_eq!(result, b"function f() { }\ntrigger();\n");
    }

    #[test]
    fn collapse_candidate_shape() {
        let file = LoadedFile::from_bytes(
            Path::new("t.js"),
            Granularity::Lines,
            b"if (x) {\n}\ndone\n",
        );
        let collapsed = collapse_empty_braces(&file).unwrap();
        assert_eq!(collapsed.serialize(), b"if (x) { }\ndone\n");
        // No pair left afterwards.
        assert!(collapse_empty_braces(&collapsed).is_none());
    }

    #[test]
    fn collapse_ignores_nonempty_blocks() {
        let file = LoadedFile::from_bytes(
            Path::new("t.js"),
            Granularity::Lines,
            b"if (x) {\nbody();\n}\n",
        );
        assert!(collapse_empty_braces(&file).is_none());
    }
}
