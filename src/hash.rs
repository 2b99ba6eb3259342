//! xxHash-based fingerprinting.
//!
//! Used by [`crate::normalize::fingerprint`] to turn a normalized AST into
//! the 64-bit key the pipeline builder's dedup cache is keyed on.

use xxhash_rust::xxh64::xxh64;

const SEED: u64 = 0x517cc1b727220a95;

/// Hash a single string deterministically.
pub fn hash_str(input: &str) -> u64 {
    xxh64(input.as_bytes(), SEED)
}
