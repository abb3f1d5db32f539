//! Stable byte-string hashing shared by all filter kinds
//!
//! Two hash families live here. [`hash_pair`] derives two independent 64-bit
//! hashes from SHA-256 digests; the Bloom filter expands them into `k` probe
//! positions via double hashing (`h_i = h1 + i * h2`). [`hash_key`] is a fast
//! seeded mixer used by the binary fuse filter, where construction retries
//! with successive seeds until peeling succeeds.
//!
//! All functions are deterministic and byte-exact across runs and machines:
//! filters serialized on one host must answer identically when read back on
//! another.

use sha2::{Digest, Sha256};

/// Salt appended to the input when deriving the second Bloom hash
const BLOOM_HASH_SALT: &[u8] = b"_bloom_";

/// Computes two independent 64-bit hashes of `value`.
///
/// `h1` is the first 8 bytes (little-endian) of `SHA-256(value)`; `h2` is the
/// first 8 bytes of `SHA-256(value || "_bloom_")`. Suitable for double
/// hashing: `h_i = h1.wrapping_add(i.wrapping_mul(h2))`.
pub fn hash_pair(value: &[u8]) -> (u64, u64) {
    let digest1 = Sha256::digest(value);

    let mut hasher = Sha256::new();
    hasher.update(value);
    hasher.update(BLOOM_HASH_SALT);
    let digest2 = hasher.finalize();

    (digest_prefix_u64(&digest1), digest_prefix_u64(&digest2))
}

fn digest_prefix_u64(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Folds a 128-bit product into 64 bits (wide multiply-xor mixer).
#[inline]
pub fn mix64(a: u64, b: u64) -> u64 {
    let product = (a as u128).wrapping_mul(b as u128);
    (product as u64) ^ ((product >> 64) as u64)
}

/// Seeded 64-bit hash of `key` for binary fuse construction and lookup.
///
/// The seed participates in every byte's mixing round, so successive
/// construction attempts produce fully independent position sets.
#[inline]
pub fn hash_key(key: &[u8], seed: u32) -> u64 {
    let mut h = u64::from(seed) ^ 0x9E37_79B9_7F4A_7C15;
    for &byte in key {
        h ^= u64::from(byte);
        h = mix64(h, 0xbf58_476d_1ce4_e5b9);
    }
    mix64(h, 0x94d0_49bb_1331_11eb)
}

/// Maps `hash` uniformly into `[0, range)` without division.
///
/// Lemire's multiply-shift reduction: `(hash * range) >> 64`.
#[inline]
pub fn fast_range(hash: u64, range: u64) -> usize {
    (((hash as u128).wrapping_mul(range as u128)) >> 64) as usize
}
