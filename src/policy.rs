//! Filter sizing policies
//!
//! A policy turns a target false-positive rate into the concrete sizing
//! parameters of a filter. Policies are stateless, freely shareable, and
//! injectable so that new filter kinds can reuse or replace the math without
//! touching the filter bodies.
//!
//! - [`BloomPolicy`] uses the standard Bloom formulas:
//!   `bits_per_key = -log2(fpr) / ln(2)`, `k = bits_per_key * ln(2)`.
//! - [`BinaryFusePolicy`] sizes fingerprints: `fingerprint_bits =
//!   ceil(-log2(fpr))`, clamped to `[4, 32]`, with roughly
//!   `1.25 * fingerprint_bits` bits of storage per key.

/// Sizing parameters computed by a policy.
///
/// For Bloom filters `num_hash_functions` is the probe count `k`; for binary
/// fuse filters it carries the fingerprint width in bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParameters {
    /// Storage budget per inserted key, in bits
    pub bits_per_key: f64,
    /// Hash-probe count (Bloom) or fingerprint width (binary fuse)
    pub num_hash_functions: u32,
}

/// Maps a target false-positive rate to filter sizing parameters.
pub trait FilterPolicy {
    /// Computes sizing parameters for the given target false-positive rate.
    fn compute_parameters(&self, false_positive_rate: f64) -> FilterParameters;
}

/// Maximum Bloom probe count; beyond this the extra hashing buys nothing.
pub const MAX_BLOOM_HASH_FUNCTIONS: u32 = 20;

/// Bits per key substituted when the caller asks for an FPR of zero or below.
const MAX_PRECISION_BITS_PER_KEY: f64 = 100.0;

/// Bits per key substituted when the caller asks for an FPR of one or above.
const MIN_PRECISION_BITS_PER_KEY: f64 = 0.1;

/// Optimal-parameter policy for Bloom filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BloomPolicy;

impl BloomPolicy {
    /// Computes bits per key for a target false-positive rate.
    ///
    /// Degenerate rates clamp to a maximum- or minimum-precision budget
    /// instead of producing NaN or infinite sizes.
    pub fn bits_per_key(false_positive_rate: f64) -> f64 {
        if false_positive_rate <= 0.0 {
            return MAX_PRECISION_BITS_PER_KEY;
        }
        if false_positive_rate >= 1.0 {
            return MIN_PRECISION_BITS_PER_KEY;
        }
        -false_positive_rate.log2() / std::f64::consts::LN_2
    }

    /// Computes the optimal probe count for a bits-per-key budget, clamped
    /// into `[1, 20]`.
    pub fn num_hash_functions(bits_per_key: f64) -> u32 {
        let k = (bits_per_key * std::f64::consts::LN_2).round();
        (k as u32).clamp(1, MAX_BLOOM_HASH_FUNCTIONS)
    }

    /// Computes the probe count and the achievable FPR when the budget is
    /// fixed rather than the rate.
    ///
    /// Used by the n-gram filter, which distributes a full-key byte budget
    /// across the (usually larger) set of distinct n-grams:
    /// `fpr = (1 - e^(-k / bits_per_key))^k`.
    pub fn fpr_from_bits_per_key(bits_per_key: f64) -> (u32, f64) {
        if bits_per_key <= 0.0 {
            return (1, 1.0);
        }
        let num_hash_functions = Self::num_hash_functions(bits_per_key);
        let exponent = -f64::from(num_hash_functions) / bits_per_key;
        let base = 1.0 - exponent.exp();
        (num_hash_functions, base.powi(num_hash_functions as i32))
    }
}

impl FilterPolicy for BloomPolicy {
    fn compute_parameters(&self, false_positive_rate: f64) -> FilterParameters {
        let bits_per_key = Self::bits_per_key(false_positive_rate);
        FilterParameters {
            bits_per_key,
            num_hash_functions: Self::num_hash_functions(bits_per_key),
        }
    }
}

/// Minimum fingerprint width for binary fuse filters.
pub const MIN_FINGERPRINT_BITS: u32 = 4;

/// Maximum fingerprint width for binary fuse filters.
pub const MAX_FINGERPRINT_BITS: u32 = 32;

/// Sizing policy for binary fuse filters.
///
/// The reported `num_hash_functions` carries the fingerprint width; binary
/// fuse filters derive all three probe positions from a single hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFusePolicy;

impl BinaryFusePolicy {
    /// Computes the fingerprint width for a target false-positive rate,
    /// clamped into `[4, 32]`: `fpr = 2^-fingerprint_bits`.
    pub fn fingerprint_bits(false_positive_rate: f64) -> u32 {
        if false_positive_rate <= 0.0 {
            return MAX_FINGERPRINT_BITS;
        }
        if false_positive_rate >= 1.0 {
            return MIN_FINGERPRINT_BITS;
        }
        let bits = (-false_positive_rate.log2()).ceil();
        (bits as u32).clamp(MIN_FINGERPRINT_BITS, MAX_FINGERPRINT_BITS)
    }
}

impl FilterPolicy for BinaryFusePolicy {
    fn compute_parameters(&self, false_positive_rate: f64) -> FilterParameters {
        let fingerprint_bits = Self::fingerprint_bits(false_positive_rate);
        FilterParameters {
            // Accounts for the ~1.25x expansion factor of 3-wise construction
            bits_per_key: f64::from(fingerprint_bits) * 1.25,
            num_hash_functions: fingerprint_bits,
        }
    }
}
