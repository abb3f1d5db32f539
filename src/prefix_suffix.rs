//! Prefix/suffix filter for wildcard-shaped queries
//!
//! Two Bloom filters: the forward filter indexes every prefix of every key
//! (from [`MIN_INDEXED_LEN`] up to the full key), the reverse filter indexes
//! every prefix of every *reversed* key. Between them the filter can refute
//! `prefix*`, `*suffix`, and exact-match queries; `*infix*` and
//! `prefix*suffix` shapes are not decidable with two Bloom filters and
//! always admit.

use crate::bloom::BloomFilter;
use crate::error::{Result, SieveError};
use crate::filter::FilterKind;
use crate::wire::{put_u8, ByteReader};

/// Shortest prefix length worth indexing; shorter keys are inserted whole.
pub const MIN_INDEXED_LEN: usize = 3;

/// Index every `PREFIX_STRIDE`-th prefix length. 1 indexes all of them.
pub const PREFIX_STRIDE: usize = 1;

/// Forward/reverse Bloom filter pair over key prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixSuffixFilter {
    forward: BloomFilter,
    reverse: BloomFilter,
}

impl PrefixSuffixFilter {
    /// Creates a filter sized for `expected_elements` keys of roughly
    /// `avg_key_len` bytes each.
    ///
    /// Each key contributes one insertion per indexed prefix length, so the
    /// inner Blooms are sized for the expanded insertion count, not the raw
    /// key count.
    pub fn new(expected_elements: usize, false_positive_rate: f64, avg_key_len: usize) -> Self {
        let per_key = if avg_key_len > MIN_INDEXED_LEN {
            (avg_key_len - MIN_INDEXED_LEN) / PREFIX_STRIDE + 1
        } else {
            1
        };
        let capacity = expected_elements * per_key;
        Self {
            forward: BloomFilter::new(capacity, false_positive_rate),
            reverse: BloomFilter::new(capacity, false_positive_rate),
        }
    }

    /// Builds a filter over a full key set, sizing the inner Blooms from the
    /// exact insertion count.
    pub fn from_keys<K: AsRef<[u8]>>(keys: &[K], false_positive_rate: f64) -> Self {
        let mut total_insertions = 0usize;
        for key in keys {
            total_insertions += Self::insertions_for_len(key.as_ref().len());
        }
        if total_insertions == 0 {
            total_insertions = keys.len();
        }

        let mut filter = Self {
            forward: BloomFilter::new(total_insertions, false_positive_rate),
            reverse: BloomFilter::new(total_insertions, false_positive_rate),
        };
        for key in keys {
            filter.add(key.as_ref());
        }
        filter
    }

    fn insertions_for_len(len: usize) -> usize {
        if len >= MIN_INDEXED_LEN {
            let strided = (len - MIN_INDEXED_LEN) / PREFIX_STRIDE + 1;
            if (len - MIN_INDEXED_LEN) % PREFIX_STRIDE != 0 {
                strided + 1
            } else {
                strided
            }
        } else {
            1
        }
    }

    /// Inserts a key: its prefixes into the forward filter, the reversed
    /// key's prefixes into the reverse filter.
    pub fn add(&mut self, value: &[u8]) {
        if value.is_empty() {
            return;
        }
        add_prefixes(value, &mut self.forward);

        let mut reversed = value.to_vec();
        reversed.reverse();
        add_prefixes(&reversed, &mut self.reverse);
    }

    /// Tests a possibly-wildcarded query value.
    ///
    /// A leading `*` makes it a suffix query (checked against the reverse
    /// filter), a trailing `*` a prefix query; both at once cannot be
    /// refuted and admit unconditionally. An unescaped `*` anywhere else
    /// (`prefix*suffix`) also admits: the split point is unknown, so the
    /// indexed prefixes cannot refute it. Without wildcards the full value
    /// is probed in the forward filter.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        if self.is_empty() {
            return false;
        }

        let leading_wildcard = value.first() == Some(&b'*');
        let trailing_wildcard = value.last() == Some(&b'*');

        if leading_wildcard && trailing_wildcard {
            // *infix*: substring search needs n-grams, not prefixes.
            return true;
        }

        if leading_wildcard {
            let suffix = &value[1..];
            if contains_unescaped_wildcard(suffix) {
                return true;
            }
            let mut reversed_suffix = suffix.to_vec();
            reversed_suffix.reverse();
            return self.reverse.possibly_contains(&reversed_suffix);
        }

        if trailing_wildcard {
            let prefix = &value[..value.len() - 1];
            if contains_unescaped_wildcard(prefix) {
                return true;
            }
            return self.forward.possibly_contains(prefix);
        }

        if contains_unescaped_wildcard(value) {
            // prefix*suffix: neither half alone identifies an indexed
            // prefix, so nothing can be refuted.
            return true;
        }

        self.forward.possibly_contains(value)
    }

    /// True when the forward filter owns no bytes.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Heap bytes owned by both inner filters.
    pub fn memory_usage(&self) -> usize {
        self.forward.memory_usage() + self.reverse.memory_usage()
    }

    /// Serializes both halves. Each inner filter carries its own kind byte
    /// so composite bodies stay self-describing.
    pub fn write_body(&self, out: &mut Vec<u8>) {
        put_u8(out, FilterKind::Bloom.as_u8());
        self.forward.write_body(out);
        put_u8(out, FilterKind::Bloom.as_u8());
        self.reverse.write_body(out);
    }

    /// Reads a body written by [`write_body`](Self::write_body).
    pub fn read_body(reader: &mut ByteReader<'_>) -> Result<Self> {
        let forward = read_tagged_bloom(reader)?;
        let reverse = read_tagged_bloom(reader)?;
        Ok(Self { forward, reverse })
    }
}

/// True when `bytes` contains a `*` not preceded by a backslash escape.
fn contains_unescaped_wildcard(bytes: &[u8]) -> bool {
    let mut escaped = false;
    for &byte in bytes {
        if escaped {
            escaped = false;
        } else if byte == b'\\' {
            escaped = true;
        } else if byte == b'*' {
            return true;
        }
    }
    false
}

fn read_tagged_bloom(reader: &mut ByteReader<'_>) -> Result<BloomFilter> {
    let tag = reader.read_u8()?;
    if tag != FilterKind::Bloom.as_u8() {
        return Err(SieveError::CorruptHeader(format!(
            "expected Bloom inner filter, found kind tag {tag}"
        )));
    }
    BloomFilter::read_body(reader)
}

/// Inserts every indexed prefix of `value`, always including the full value.
fn add_prefixes(value: &[u8], filter: &mut BloomFilter) {
    if value.len() < MIN_INDEXED_LEN {
        filter.add(value);
        return;
    }

    let mut len = MIN_INDEXED_LEN;
    while len <= value.len() {
        filter.add(&value[..len]);
        len += PREFIX_STRIDE;
    }
    // The stride may have stepped over the full key.
    if (value.len() - MIN_INDEXED_LEN) % PREFIX_STRIDE != 0 {
        filter.add(value);
    }
}
