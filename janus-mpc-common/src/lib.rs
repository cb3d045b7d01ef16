pub mod config;
pub mod error;
pub mod sharing;
pub mod template;
pub mod tracing;

/// Fractional bits of the masked-Hamming threshold numerator.
pub const FIXED_POINT_FRAC_BITS: usize = 7;
/// Default masked-Hamming threshold numerator: 52 / 128 = 0.40625.
pub const DEFAULT_FRACTION_NUMERATOR: u64 = 52;

/// Width of Hamming distances and mask popcounts.
pub const HAMMING_DISTANCE_BITS: usize = 16;
/// Minimum width of Euclidean distance accumulators.
pub const EUCLIDEAN_DISTANCE_BITS: usize = 28;
/// Width of the reconstructed score in the threshold-only path.
pub const SCORE_BITS: usize = 28;

/// Default acceptance threshold for full-protocol Hamming and Euclidean matching.
pub const SIMILARITY_THRESHOLD: u64 = 5000;
/// Default acceptance threshold for finger scores in the threshold-only path.
pub const SCORE_THRESHOLD_FINGER: u64 = 10_000;
/// Default acceptance threshold for iris scores in the threshold-only path.
/// Must be a power of two, see [`config::ThresholdTest`].
pub const SCORE_THRESHOLD_IRIS: u64 = 1 << 14;
/// Public prime modulus of the additively shared scores.
pub const PRIME_MOD: u64 = 0x3ee0001;
/// Upper bound of synthetic similarity scores.
pub const MAX_SIMILARITY_SCORE: u64 = 4_024_000;

/// Default width of a finger template slot.
pub const FINGER_BITS_PER_SLOT: u8 = 8;
/// Widest supported template slot.
pub const MAX_BITS_PER_SLOT: u8 = 8;

/// Smallest `n` such that `2^n >= value`.
pub fn ceil_log2(value: usize) -> usize {
    if value <= 1 {
        0
    } else {
        (usize::BITS - (value - 1).leading_zeros()) as usize
    }
}

/// Number of bits needed to represent `value` in binary.
pub fn bit_length(value: u64) -> usize {
    (u64::BITS - value.leading_zeros()) as usize
}
