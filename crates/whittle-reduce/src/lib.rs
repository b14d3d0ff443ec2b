//! Delta-debugging reduction over multi-file test cases.
//!
//! # Overview
//!
//! This crate drives the reducers from `whittle-core` over a test-case
//! directory. A [`ReductionEngine`] is built from a root path and a named
//! strategy [`Variant`]; the caller then alternates
//! [`next`](ReductionEngine::next) (materialize a candidate, get the whole
//! set) with [`update`](ReductionEngine::update) (deliver the oracle's
//! verdict) until the engine reports completion.
//!
//! Supporting pieces:
//!
//! - [`scan`]: discover which files under the root qualify for reduction.
//! - [`TriedCache`]: whole-set fingerprint snapshots of rejected candidates,
//!   reused across files to skip known failures.
//! - [`possible_iters`]: the closed-form upper bound behind
//!   [`remaining_attempts`](ReductionEngine::remaining_attempts).
//! - [`TestCaseSet`]: the loaded file set (plus `test_info.json` metadata)
//!   handed to the caller with each candidate.

pub mod cache;
pub mod engine;
pub mod estimate;
pub mod scan;
pub mod storage;
pub mod variant;

pub use cache::{snapshot_root, Fingerprint, Snapshot, TriedCache};
pub use engine::{ReduceError, ReductionEngine};
pub use estimate::{accepted_decrement, chunk_iters, possible_iters};
pub use scan::{is_reserved, scan, RESERVED_NAMES};
pub use storage::{TestCaseFile, TestCaseSet, TestInfo};
pub use variant::Variant;
