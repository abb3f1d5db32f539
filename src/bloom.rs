//! Bloom filter over byte-string keys
//!
//! A classic bit-array Bloom filter with double hashing: two SHA-256 derived
//! base hashes expand into `k` probe positions (`h_i = h1 + i * h2`), which
//! gives good independence without hashing the key `k` times.
//!
//! # Usage
//!
//! ```rust
//! use logsieve::bloom::BloomFilter;
//!
//! let mut filter = BloomFilter::new(3, 0.07);
//! filter.add(b"alpha");
//! filter.add(b"beta");
//!
//! assert!(filter.possibly_contains(b"alpha"));
//! ```
//!
//! False negatives are impossible: if `possibly_contains` returns false, the
//! key was never inserted. A filter created for zero expected elements owns
//! no bytes and rejects every query, including the empty string.

use crate::error::{Result, SieveError};
use crate::hashing::hash_pair;
use crate::policy::{BloomPolicy, FilterPolicy};
use crate::wire::{put_u32, put_u64, ByteReader};

/// Minimum bit-array size for a non-empty filter; prevents degenerate
/// zero-bit arrays for tiny key sets.
const MIN_BIT_ARRAY_SIZE: u64 = 8;

/// Bit-array Bloom filter with double hashing.
///
/// Bits are stored little-endian within each byte: bit `i` lives at position
/// `i % 8` of byte `i / 8`. The filter is built once (streamed via
/// [`add`](Self::add) or bulk via [`from_keys`](Self::from_keys)) and is
/// immutable once serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bit_array: Vec<u8>,
    /// Size of the bit array in bits (`m`)
    bit_array_size: u64,
    /// Probe count (`k`)
    num_hash_functions: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_elements` keys at the target
    /// false-positive rate, using the optimal [`BloomPolicy`].
    ///
    /// `expected_elements == 0` yields the empty filter, which rejects every
    /// query.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        Self::with_policy(expected_elements, false_positive_rate, &BloomPolicy)
    }

    /// Creates a filter sized by a caller-supplied policy.
    pub fn with_policy(
        expected_elements: usize,
        false_positive_rate: f64,
        policy: &dyn FilterPolicy,
    ) -> Self {
        if expected_elements == 0 {
            return Self::empty();
        }

        let params = policy.compute_parameters(false_positive_rate);
        let bit_array_size =
            ((params.bits_per_key * expected_elements as f64).ceil() as u64).max(MIN_BIT_ARRAY_SIZE);
        let num_bytes = bit_array_size.div_ceil(8) as usize;

        Self {
            bit_array: vec![0u8; num_bytes],
            bit_array_size,
            num_hash_functions: params.num_hash_functions,
        }
    }

    /// The empty filter: no bytes, rejects every query.
    pub fn empty() -> Self {
        Self {
            bit_array: Vec::new(),
            bit_array_size: 0,
            num_hash_functions: 0,
        }
    }

    /// Builds a filter over a full key set in one pass.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Self {
        let mut filter = Self::new(keys.len(), false_positive_rate);
        for key in keys {
            filter.add(key.as_ref());
        }
        filter
    }

    /// Inserts a key. No-op on the empty filter.
    pub fn add(&mut self, value: &[u8]) {
        if self.bit_array.is_empty() {
            return;
        }
        let (h1, h2) = hash_pair(value);
        for i in 0..self.num_hash_functions {
            let hash = h1.wrapping_add(u64::from(i).wrapping_mul(h2));
            self.set_bit(hash % self.bit_array_size);
        }
    }

    /// Tests membership. False means the key was definitely never inserted.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        if self.bit_array.is_empty() {
            return false;
        }
        let (h1, h2) = hash_pair(value);
        for i in 0..self.num_hash_functions {
            let hash = h1.wrapping_add(u64::from(i).wrapping_mul(h2));
            if !self.test_bit(hash % self.bit_array_size) {
                return false;
            }
        }
        true
    }

    /// True when the filter owns no bytes (and thus rejects everything).
    pub fn is_empty(&self) -> bool {
        self.bit_array.is_empty()
    }

    /// Size of the bit array in bits.
    pub fn bit_array_size(&self) -> u64 {
        self.bit_array_size
    }

    /// Probe count per key.
    pub fn num_hash_functions(&self) -> u32 {
        self.num_hash_functions
    }

    /// Heap bytes owned by the filter.
    pub fn memory_usage(&self) -> usize {
        self.bit_array.len()
    }

    fn set_bit(&mut self, bit_index: u64) {
        let byte_index = (bit_index / 8) as usize;
        let bit_offset = (bit_index % 8) as u32;
        self.bit_array[byte_index] |= 1u8 << bit_offset;
    }

    fn test_bit(&self, bit_index: u64) -> bool {
        let byte_index = (bit_index / 8) as usize;
        let bit_offset = (bit_index % 8) as u32;
        (self.bit_array[byte_index] & (1u8 << bit_offset)) != 0
    }

    /// Serializes the body: `k(u32) | m(u64) | byte_len(u64) | bytes`.
    pub fn write_body(&self, out: &mut Vec<u8>) {
        put_u32(out, self.num_hash_functions);
        put_u64(out, self.bit_array_size);
        put_u64(out, self.bit_array.len() as u64);
        out.extend_from_slice(&self.bit_array);
    }

    /// Reads a body written by [`write_body`](Self::write_body).
    pub fn read_body(reader: &mut ByteReader<'_>) -> Result<Self> {
        let num_hash_functions = reader.read_u32()?;
        let bit_array_size = reader.read_u64()?;
        let byte_len = reader.read_u64()?;
        if byte_len != bit_array_size.div_ceil(8) {
            return Err(SieveError::CorruptHeader(format!(
                "bloom bit array of {byte_len} bytes cannot hold {bit_array_size} bits"
            )));
        }
        let bit_array = reader.read_bytes(byte_len as usize)?.to_vec();
        Ok(Self {
            bit_array,
            bit_array_size,
            num_hash_functions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sizing_for_one_percent() {
        let filter = BloomFilter::new(1000, 0.01);
        // ~9.59 bits per key -> ~9585 bits
        assert!(filter.bit_array_size() >= 9000 && filter.bit_array_size() <= 10000);
        assert_eq!(filter.num_hash_functions(), 7);
    }

    #[test]
    fn test_empty_filter_rejects_everything() {
        let filter = BloomFilter::new(0, 0.01);
        assert!(filter.is_empty());
        assert!(!filter.possibly_contains(b"anything"));
        assert!(!filter.possibly_contains(b""));
    }

    #[test]
    fn test_minimum_size_enforced() {
        // One key at a loose rate still gets at least one byte.
        let filter = BloomFilter::new(1, 0.99);
        assert!(filter.bit_array_size() >= 8);
        assert_eq!(filter.memory_usage(), 1);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::new(500, 0.05);
        let keys: Vec<String> = (0..500).map(|i| format!("key-{i}")).collect();
        for key in &keys {
            filter.add(key.as_bytes());
        }
        for key in &keys {
            assert!(filter.possibly_contains(key.as_bytes()), "false negative for {key}");
        }
    }

    #[test]
    fn test_measured_fpr_within_bound() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut filter = BloomFilter::new(10_000, 0.01);
        for _ in 0..10_000 {
            let key: [u8; 16] = rng.gen();
            filter.add(&key);
        }

        let mut false_positives = 0usize;
        let trials = 100_000usize;
        for _ in 0..trials {
            // 24-byte queries are disjoint from the 16-byte member set.
            let probe: [u8; 24] = rng.gen();
            if filter.possibly_contains(&probe) {
                false_positives += 1;
            }
        }
        let measured = false_positives as f64 / trials as f64;
        assert!(measured < 0.02, "measured FPR {measured} exceeds 2x target");
    }

    #[test]
    fn test_body_round_trip() {
        let keys = ["alpha", "beta", "gamma"];
        let filter = BloomFilter::from_keys(&keys, 0.07);

        let mut buf = Vec::new();
        filter.write_body(&mut buf);
        let restored = BloomFilter::read_body(&mut ByteReader::new(&buf)).unwrap();

        assert_eq!(filter, restored);
        for key in keys {
            assert!(restored.possibly_contains(key.as_bytes()));
        }
    }

    #[test]
    fn test_empty_body_round_trip() {
        let filter = BloomFilter::empty();
        let mut buf = Vec::new();
        filter.write_body(&mut buf);
        assert_eq!(buf.len(), 4 + 8 + 8);

        let restored = BloomFilter::read_body(&mut ByteReader::new(&buf)).unwrap();
        assert!(restored.is_empty());
        assert!(!restored.possibly_contains(b"alpha"));
    }

    #[test]
    fn test_truncated_body_fails() {
        let filter = BloomFilter::from_keys(&["alpha"], 0.07);
        let mut buf = Vec::new();
        filter.write_body(&mut buf);
        buf.truncate(buf.len() - 1);
        assert!(BloomFilter::read_body(&mut ByteReader::new(&buf)).is_err());
    }
}
