//! Upper-bound estimation of remaining reduction attempts.
//!
//! # Overview
//!
//! The engine reports progress as a count of attempts that might still be
//! needed. For a sequence of `L` removable tokens the halving-chunk schedule
//! admits a closed-form upper bound: one pass per chunk at every chunk size
//! from the initial power of two down to 1, plus the repeated final
//! granularity-1 round.
//!
//! This is an **estimate**, never an exact count. It exists to drive a
//! progress display; a wrong value misreports a percentage, nothing more.
//! All arithmetic saturates so the estimate can never underflow.

use whittle_core::{div_ceil, largest_power_of_two_smaller_than};

/// Attempts a halving-chunk pass over `length` elements might need when
/// starting from `chunk_size`.
///
/// A chunk that exactly covers the sequence costs `chunk_size * 3 - 1`: two
/// passes at size 1 (the final round repeats) plus one attempt per halving.
/// Otherwise the bound is `2 * length` single-element attempts plus one
/// attempt per chunk at each halving of `chunk_size` down to 1.
pub fn chunk_iters(length: u64, mut chunk_size: u64) -> u64 {
    if length == chunk_size {
        return (chunk_size * 3).saturating_sub(1);
    }
    let mut result = 2 * length;
    while chunk_size > 1 {
        result += div_ceil(length, chunk_size);
        chunk_size /= 2;
    }
    result
}

/// Upper bound on evaluation attempts for a freshly loaded sequence of
/// `length` removable tokens. Zero for an empty sequence.
pub fn possible_iters(length: usize) -> u64 {
    let length = length as u64;
    let chunk_size = largest_power_of_two_smaller_than(length) * 2;
    chunk_iters(length, chunk_size).saturating_sub(1)
}

/// Estimate decrement for an accepted candidate that removed `removed`
/// elements: the chunk-halving bound re-applied to the removed size.
pub fn accepted_decrement(removed: u64) -> u64 {
    let removed = removed.max(1);
    let chunk_size = if removed > 1 {
        largest_power_of_two_smaller_than(removed) * 2
    } else {
        1
    };
    chunk_iters(removed, chunk_size)
}
