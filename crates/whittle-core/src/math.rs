//! Chunk arithmetic shared by the pass schedule and progress estimation.

/// Largest power of two strictly below `n`, with a floor of 1.
///
/// Doubles from 1 while the doubled value is still below `n`, so `n <= 2`
/// returns 1. This matches the chunk schedule used by [`crate::Minimize`]:
/// the initial chunk size for a sequence of length `n` is this value.
pub fn largest_power_of_two_smaller_than(n: u64) -> u64 {
    let mut result = 1;
    while result * 2 < n {
        result *= 2;
    }
    result
}

/// Ceiling division. `div_ceil(0, b)` is 0 for any nonzero `b`.
pub fn div_ceil(a: u64, b: u64) -> u64 {
    a.div_ceil(b)
}
