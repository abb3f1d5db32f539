//! Length-partitioned n-gram filter
//!
//! Keys are grouped by length into separate inner filters. A single n-gram
//! length `n` is chosen for the whole filter from a target collision rate,
//! the alphabet size, and the key count; each length class at or above `n`
//! indexes the distinct n-grams of its keys, while shorter classes index
//! full keys. An exact-match query then ANDs the membership of every n-gram
//! of the queried value, which keeps the per-class byte budget equal to a
//! direct Bloom filter over the keys while still refuting most non-members
//! on the first missing n-gram.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::Result;
use crate::filter::{FilterKind, ProbabilisticFilter};
use crate::policy::BloomPolicy;
use crate::wire::{put_u32, ByteReader};

/// Acceptable probability that two distinct keys share all n-grams.
pub const TARGET_COLLISION_RATE: f64 = 0.01;

/// Assumed distinct-symbol count of the indexed values.
pub const ALPHABET_SIZE: f64 = 26.0;

/// Inner filter kind for every length class.
const INNER_KIND: FilterKind = FilterKind::BinaryFuse;

/// Mapping from key length to an inner filter over that class.
#[derive(Debug, Clone, PartialEq)]
pub struct NGramPartitionedFilter {
    /// Global n-gram length; 0 when the filter indexes full keys only
    n: u32,
    classes: FxHashMap<u32, ProbabilisticFilter>,
}

impl NGramPartitionedFilter {
    /// Builds a filter over a duplicate-free key set.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Result<Self> {
        let mut by_length: FxHashMap<u32, Vec<&[u8]>> = FxHashMap::default();
        for key in keys {
            let key = key.as_ref();
            by_length.entry(key.len() as u32).or_default().push(key);
        }

        let n = choose_ngram_length(&by_length);
        debug!(num_keys = keys.len(), n, "sized n-gram filter");

        let mut classes = FxHashMap::default();
        for (&length, class_keys) in &by_length {
            let inner = if n == 0 || length < n {
                ProbabilisticFilter::from_key_set(INNER_KIND, class_keys, false_positive_rate)?
            } else {
                build_ngram_class(class_keys, n as usize, false_positive_rate)?
            };
            classes.insert(length, inner);
        }

        Ok(Self { n, classes })
    }

    /// Tests an exact value.
    ///
    /// A length with no class filter rejects outright: no indexed key had
    /// that length. Values shorter than `n` probe their class directly;
    /// longer values must pass on every n-gram.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        let Some(class) = self.classes.get(&(value.len() as u32)) else {
            return false;
        };

        let n = self.n as usize;
        if n == 0 || value.len() < n {
            return class.possibly_contains(value);
        }

        for window in value.windows(n) {
            if !class.possibly_contains(window) {
                return false;
            }
        }
        true
    }

    /// The chosen global n-gram length.
    pub fn ngram_length(&self) -> u32 {
        self.n
    }

    /// True when no length class exists.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Heap bytes owned across all length classes.
    pub fn memory_usage(&self) -> usize {
        self.classes.values().map(ProbabilisticFilter::memory_usage).sum()
    }

    /// Serializes the body: `n(u32) | class_count(u32) | repeated
    /// { length(u32) | tagged inner filter }`, classes in ascending length
    /// order so identical filters serialize identically.
    pub fn write_body(&self, out: &mut Vec<u8>) {
        put_u32(out, self.n);
        put_u32(out, self.classes.len() as u32);

        let mut lengths: Vec<u32> = self.classes.keys().copied().collect();
        lengths.sort_unstable();
        for length in lengths {
            put_u32(out, length);
            self.classes[&length].write_tagged(out);
        }
    }

    /// Reads a body written by [`write_body`](Self::write_body).
    pub fn read_body(reader: &mut ByteReader<'_>) -> Result<Self> {
        let n = reader.read_u32()?;
        let class_count = reader.read_u32()?;

        let mut classes = FxHashMap::default();
        for _ in 0..class_count {
            let length = reader.read_u32()?;
            let inner = ProbabilisticFilter::read_tagged(reader)?;
            classes.insert(length, inner);
        }
        Ok(Self { n, classes })
    }
}

/// Chooses `n` so that the expected all-n-grams collision rate stays at
/// [`TARGET_COLLISION_RATE`]: `n = round(log_A(K / -ln(1 - T)))`, clamped to
/// `[1, floor(avg_key_length)]`. Returns 0 for an empty key set or when the
/// average length rounds down to nothing.
fn choose_ngram_length(by_length: &FxHashMap<u32, Vec<&[u8]>>) -> u32 {
    let mut total_length = 0usize;
    let mut key_count = 0usize;
    for (&length, class_keys) in by_length {
        total_length += length as usize * class_keys.len();
        key_count += class_keys.len();
    }
    if key_count == 0 {
        return 0;
    }

    let average_key_length = total_length as f64 / key_count as f64;
    let denom = -(1.0 - TARGET_COLLISION_RATE).ln();
    let alphabet_power = key_count as f64 / denom;
    let n_real = alphabet_power.ln() / ALPHABET_SIZE.ln();

    let n = (n_real.round() as i64).max(1);
    n.min(average_key_length.floor() as i64).max(0) as u32
}

/// Builds one length class over its distinct n-grams, spending the byte
/// budget a direct Bloom filter over the class keys would have used.
fn build_ngram_class(
    class_keys: &[&[u8]],
    n: usize,
    false_positive_rate: f64,
) -> Result<ProbabilisticFilter> {
    let mut ngrams: FxHashSet<&[u8]> = FxHashSet::default();
    for key in class_keys {
        for window in key.windows(n) {
            ngrams.insert(window);
        }
    }
    if ngrams.is_empty() {
        return ProbabilisticFilter::from_key_set(INNER_KIND, class_keys, false_positive_rate);
    }

    let per_ngram_fpr = per_ngram_fpr(false_positive_rate, class_keys.len(), ngrams.len());
    let mut ngrams: Vec<&[u8]> = ngrams.into_iter().collect();
    // Reproducible construction: the same key set must produce the same bytes.
    ngrams.sort_unstable();
    ProbabilisticFilter::from_key_set(INNER_KIND, &ngrams, per_ngram_fpr)
}

/// Redistributes the class's full-key bit budget across its distinct
/// n-grams and reports the false-positive rate that budget buys.
fn per_ngram_fpr(target_fpr: f64, num_keys: usize, ngram_count: usize) -> f64 {
    if target_fpr <= 0.0 || target_fpr >= 1.0 || num_keys == 0 || ngram_count == 0 {
        return target_fpr;
    }

    let bits_per_key = BloomPolicy::bits_per_key(target_fpr);
    let total_bits = bits_per_key * num_keys as f64;
    let bits_per_ngram = total_bits / ngram_count as f64;
    let (_, fpr) = BloomPolicy::fpr_from_bits_per_key(bits_per_ngram);
    fpr
}
