//! Static binary fuse filter
//!
//! A 3-wise XOR filter: every key maps to three slots (one per segment of
//! the fingerprint array) and a fingerprint, and membership holds when the
//! XOR of the three slots equals the fingerprint. Construction peels the
//! key/slot hypergraph down to an assignment order, retrying with successive
//! seeds until peeling succeeds; lookups are three probes and two XORs.
//!
//! The filter is built in one shot from a duplicate-free key set and is
//! immutable afterwards: [`BinaryFuseFilter::add`] panics. Space is roughly
//! `1.23 * fingerprint_bits` bits per key, several times smaller than a
//! Bloom filter at comparable false-positive rates.

use tracing::debug;

use crate::bitpack::PackedFingerprints;
use crate::error::{Result, SieveError};
use crate::hashing::{fast_range, hash_key};
use crate::policy::{BinaryFusePolicy, FilterPolicy, MAX_FINGERPRINT_BITS};
use crate::wire::{put_u32, put_u64, ByteReader};

/// Seed attempts before construction is declared failed. Failure at this cap
/// signals duplicate keys or degenerate input, not bad luck.
pub const MAX_CONSTRUCTION_ATTEMPTS: u32 = 500;

/// Peeling-based sizing floor: below 32 keys the hypergraph is too sparse
/// for the asymptotic expansion factor to hold.
const MIN_SIZING_ELEMENTS: usize = 32;

#[derive(Debug, Clone, Copy)]
struct KeyLocations {
    p0: usize,
    p1: usize,
    p2: usize,
    fingerprint: u32,
}

/// Static 3-wise XOR filter with bit-packed fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFuseFilter {
    fingerprints: PackedFingerprints,
    segment_length: u64,
    fingerprint_bits: u32,
    fingerprint_mask: u64,
    seed: u32,
}

impl BinaryFuseFilter {
    /// Builds a filter over `keys` at the target false-positive rate.
    ///
    /// `keys` must not contain duplicates; duplicate keys make peeling
    /// impossible and surface as [`SieveError::ConstructionFailed`] after
    /// the seed attempts are exhausted. An empty key set yields the empty
    /// filter, which rejects every query.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Result<Self> {
        Self::from_keys_with_policy(keys, false_positive_rate, &BinaryFusePolicy)
    }

    /// Builds a filter with a caller-supplied sizing policy.
    pub fn from_keys_with_policy<K: AsRef<[u8]>>(
        keys: &[K],
        false_positive_rate: f64,
        policy: &dyn FilterPolicy,
    ) -> Result<Self> {
        let fingerprint_bits = policy
            .compute_parameters(false_positive_rate)
            .num_hash_functions
            .min(MAX_FINGERPRINT_BITS);
        let fingerprint_mask = (1u64 << fingerprint_bits) - 1;

        if keys.is_empty() {
            return Ok(Self {
                fingerprints: PackedFingerprints::new(0, fingerprint_bits),
                segment_length: 0,
                fingerprint_bits,
                fingerprint_mask,
                seed: 0,
            });
        }

        let sized_n = keys.len().max(MIN_SIZING_ELEMENTS);
        let margin: f64 = if sized_n < 10_000 { 0.02 } else { 0.005 };
        let expansion_factor = (1.23 + margin).min(2.0);
        let segment_length = ((sized_n as f64 * expansion_factor) / 3.0).ceil() as u64;
        let array_size = 3 * segment_length;

        for seed in 0..MAX_CONSTRUCTION_ATTEMPTS {
            if let Some(fingerprints) = Self::try_construct(
                keys,
                seed,
                segment_length,
                array_size as usize,
                fingerprint_bits,
                fingerprint_mask,
            ) {
                debug!(
                    num_keys = keys.len(),
                    fingerprint_bits, array_size, seed, "binary fuse construction succeeded"
                );
                return Ok(Self {
                    fingerprints,
                    segment_length,
                    fingerprint_bits,
                    fingerprint_mask,
                    seed,
                });
            }
        }

        Err(SieveError::ConstructionFailed {
            attempts: MAX_CONSTRUCTION_ATTEMPTS,
        })
    }

    /// One peeling attempt with a fixed seed.
    fn try_construct<K: AsRef<[u8]>>(
        keys: &[K],
        seed: u32,
        segment_length: u64,
        array_size: usize,
        fingerprint_bits: u32,
        fingerprint_mask: u64,
    ) -> Option<PackedFingerprints> {
        let locations: Vec<KeyLocations> = keys
            .iter()
            .map(|key| Self::locate(key.as_ref(), seed, segment_length, fingerprint_mask))
            .collect();

        // Per slot: how many keys touch it, and the XOR of their indices.
        // When exactly one key remains, the XOR *is* that key's index.
        let mut counts = vec![0u32; array_size];
        let mut xor_indices = vec![0usize; array_size];
        for (index, loc) in locations.iter().enumerate() {
            for slot in [loc.p0, loc.p1, loc.p2] {
                counts[slot] += 1;
                xor_indices[slot] ^= index;
            }
        }

        let mut queue: Vec<usize> = (0..array_size).filter(|&slot| counts[slot] == 1).collect();
        let mut stack: Vec<(usize, usize)> = Vec::with_capacity(keys.len());

        let mut head = 0;
        while head < queue.len() {
            let slot = queue[head];
            head += 1;
            if counts[slot] != 1 {
                continue;
            }
            let key_index = xor_indices[slot];
            stack.push((key_index, slot));

            let loc = locations[key_index];
            for neighbor in [loc.p0, loc.p1, loc.p2] {
                xor_indices[neighbor] ^= key_index;
                counts[neighbor] -= 1;
                if counts[neighbor] == 1 {
                    queue.push(neighbor);
                }
            }
        }

        if stack.len() != keys.len() {
            return None;
        }

        // Replay in reverse: each key's slot is assigned after its other two
        // slots have settled, so the XOR identity holds for every key.
        let mut fingerprints = PackedFingerprints::new(array_size, fingerprint_bits);
        for &(key_index, slot) in stack.iter().rev() {
            let loc = locations[key_index];
            let current = fingerprints.get(loc.p0)
                ^ fingerprints.get(loc.p1)
                ^ fingerprints.get(loc.p2);
            fingerprints.set(slot, loc.fingerprint ^ current);
        }
        Some(fingerprints)
    }

    fn locate(key: &[u8], seed: u32, segment_length: u64, fingerprint_mask: u64) -> KeyLocations {
        let hash = hash_key(key, seed);

        let mut fingerprint = (hash & fingerprint_mask) as u32;
        if fingerprint == 0 {
            // A zero fingerprint would match three untouched slots.
            fingerprint = 1;
        }

        let segment = segment_length as usize;
        KeyLocations {
            p0: fast_range(hash, segment_length),
            p1: fast_range(hash.rotate_right(21), segment_length) + segment,
            p2: fast_range(hash.rotate_right(42), segment_length) + 2 * segment,
            fingerprint,
        }
    }

    /// Unsupported: the filter is static. Panics unconditionally.
    pub fn add(&mut self, _value: &[u8]) {
        panic!("BinaryFuseFilter is static; keys must be supplied at construction");
    }

    /// Tests membership. False means the key was not in the construction set.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        if self.fingerprints.is_empty() {
            return false;
        }
        let loc = Self::locate(value, self.seed, self.segment_length, self.fingerprint_mask);
        let reconstructed = self.fingerprints.get(loc.p0)
            ^ self.fingerprints.get(loc.p1)
            ^ self.fingerprints.get(loc.p2);
        reconstructed == loc.fingerprint
    }

    /// True when the filter holds no fingerprints.
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Fingerprint width in bits.
    pub fn fingerprint_bits(&self) -> u32 {
        self.fingerprint_bits
    }

    /// Total fingerprint slots (three segments).
    pub fn array_size(&self) -> u64 {
        self.fingerprints.num_slots() as u64
    }

    /// Seed that produced a successful peel.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Heap bytes owned by the filter.
    pub fn memory_usage(&self) -> usize {
        self.fingerprints.byte_len()
    }

    /// Serializes the body: `fp_bits(u32) | seed(u32) | array_size(u64) |
    /// segment_length(u64) | byte_len(u64) | packed_bytes`.
    pub fn write_body(&self, out: &mut Vec<u8>) {
        put_u32(out, self.fingerprint_bits);
        put_u32(out, self.seed);
        put_u64(out, self.array_size());
        put_u64(out, self.segment_length);
        put_u64(out, self.fingerprints.byte_len() as u64);
        out.extend_from_slice(self.fingerprints.as_bytes());
    }

    /// Reads a body written by [`write_body`](Self::write_body).
    pub fn read_body(reader: &mut ByteReader<'_>) -> Result<Self> {
        let fingerprint_bits = reader.read_u32()?;
        if fingerprint_bits == 0 || fingerprint_bits > MAX_FINGERPRINT_BITS {
            return Err(SieveError::CorruptHeader(format!(
                "fingerprint width {fingerprint_bits} out of range"
            )));
        }
        let seed = reader.read_u32()?;
        let array_size = reader.read_u64()? as usize;
        let segment_length = reader.read_u64()?;
        if array_size as u64 != 3 * segment_length {
            return Err(SieveError::CorruptHeader(format!(
                "fingerprint array of {array_size} slots does not cover 3 segments of {segment_length}"
            )));
        }
        let byte_len = reader.read_u64()? as usize;
        let bytes = reader.read_bytes(byte_len)?.to_vec();
        let fingerprints = PackedFingerprints::from_bytes(bytes, array_size, fingerprint_bits)?;
        Ok(Self {
            fingerprints,
            segment_length,
            fingerprint_bits,
            fingerprint_mask: (1u64 << fingerprint_bits) - 1,
            seed,
        })
    }
}
