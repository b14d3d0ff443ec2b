//! whittle-core -- token models and minimization algorithms for test-case
//! reduction.
//!
//! # Overview
//!
//! This crate is the minimization half of the whittle workspace. It knows how
//! to split a single file into removable tokens at a chosen granularity
//! (bytes, lines, or quoted-string tokens) and how to search for a smaller
//! token subset that still satisfies an external pass/fail oracle.
//!
//! It does **not** know about multi-file test cases, verdict plumbing, or
//! progress accounting -- that orchestration lives in `whittle-reduce`, which
//! drives the [`Reducer`] implementations here one file at a time.
//!
//! # Determinism
//!
//! Everything in this crate is deterministic: the candidate schedule depends
//! only on the loaded content and the feedback sequence. Content fingerprints
//! are lowercase hex BLAKE3 digests of the serialized bytes.

pub mod math;
pub mod reduce;
pub mod testcase;

pub use math::{div_ceil, largest_power_of_two_smaller_than};
pub use reduce::{CheckOnly, CollapseEmptyBraces, Minimize, Reducer};
pub use testcase::{
    contains_marker_pair, content_fingerprint, Granularity, LoadedFile, MARKER_BEGIN, MARKER_END,
};
