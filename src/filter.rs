//! Filter kinds, configuration, and the polymorphic filter wrapper
//!
//! The filter kinds form a closed set, so the polymorphic surface is an enum
//! rather than a trait object: [`ProbabilisticFilter`] owns one of the
//! concrete filters and exposes the shared capability set (`add`,
//! `possibly_contains`, serialize/deserialize, `memory_usage`, `Clone`)
//! with value semantics.
//!
//! Serialization comes in two shapes. [`write_body`](ProbabilisticFilter::write_body)
//! emits the bare kind-specific body for use inside a filter envelope, where
//! the kind already lives in the envelope header. [`write_tagged`](ProbabilisticFilter::write_tagged)
//! prefixes the body with a kind byte; composite filters use the tagged form
//! for their inner filters so composite bodies stay self-describing.

use serde::{Deserialize, Serialize};

use crate::binary_fuse::BinaryFuseFilter;
use crate::bloom::BloomFilter;
use crate::error::{Result, SieveError};
use crate::ngram::NGramPartitionedFilter;
use crate::prefix_suffix::PrefixSuffixFilter;
use crate::wire::{put_u8, ByteReader};

/// Default target false-positive rate for producer-side filters.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.07;

/// Assumed key length when sizing a streaming prefix/suffix filter without
/// seeing the keys first.
const DEFAULT_AVG_KEY_LEN: usize = 32;

/// On-disk filter kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterKind {
    /// No filter; envelopes of this kind have no body and always admit
    None = 0,
    /// Bit-array Bloom filter
    Bloom = 1,
    /// Static 3-wise XOR filter
    BinaryFuse = 2,
    /// Forward/reverse Bloom pair for wildcard shapes
    PrefixSuffix = 3,
    /// Length-partitioned n-gram filter
    NGramPartitioned = 4,
}

impl FilterKind {
    /// The serialized tag byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a tag byte.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Bloom),
            2 => Some(Self::BinaryFuse),
            3 => Some(Self::PrefixSuffix),
            4 => Some(Self::NGramPartitioned),
            _ => None,
        }
    }

    /// Parses a configuration name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "bloom" => Some(Self::Bloom),
            "binary_fuse" | "binaryfuse" => Some(Self::BinaryFuse),
            "prefix_suffix" => Some(Self::PrefixSuffix),
            "ngram" | "ngram_partitioned" => Some(Self::NGramPartitioned),
            _ => None,
        }
    }

    /// The canonical configuration name.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bloom => "bloom",
            Self::BinaryFuse => "binary_fuse",
            Self::PrefixSuffix => "prefix_suffix",
            Self::NGramPartitioned => "ngram",
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters persisted alongside a filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Which filter kind the envelope carries
    pub kind: FilterKind,
    /// Target false-positive rate the filter was built for
    pub false_positive_rate: f64,
    /// Whether terms are lowercased before insertion and query
    pub normalize: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::Bloom,
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            normalize: false,
        }
    }
}

/// A probabilistic filter of any supported kind, with value semantics.
///
/// `FilterKind::None` is represented as [`ProbabilisticFilter::None`]: it
/// rejects every query (empty-set semantics). Whether a `None` *envelope*
/// admits or rejects is a pipeline decision, made where the envelope is
/// consumed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbabilisticFilter {
    None,
    Bloom(BloomFilter),
    BinaryFuse(BinaryFuseFilter),
    PrefixSuffix(PrefixSuffixFilter),
    NGramPartitioned(NGramPartitionedFilter),
}

impl ProbabilisticFilter {
    /// Builds a filter of `kind` over a duplicate-free key set in one shot.
    pub fn from_key_set<K: AsRef<[u8]>>(
        kind: FilterKind,
        keys: &[K],
        false_positive_rate: f64,
    ) -> Result<Self> {
        match kind {
            FilterKind::None => Ok(Self::None),
            FilterKind::Bloom => Ok(Self::Bloom(BloomFilter::from_keys(keys, false_positive_rate))),
            FilterKind::BinaryFuse => Ok(Self::BinaryFuse(BinaryFuseFilter::from_keys(
                keys,
                false_positive_rate,
            )?)),
            FilterKind::PrefixSuffix => Ok(Self::PrefixSuffix(PrefixSuffixFilter::from_keys(
                keys,
                false_positive_rate,
            ))),
            FilterKind::NGramPartitioned => Ok(Self::NGramPartitioned(
                NGramPartitionedFilter::from_keys(keys, false_positive_rate)?,
            )),
        }
    }

    /// Creates an empty filter of `kind` sized for streaming insertion.
    ///
    /// Only kinds that support post-construction [`add`](Self::add) qualify;
    /// one-shot kinds return `InvalidConfig`.
    pub fn streaming(
        kind: FilterKind,
        expected_elements: usize,
        false_positive_rate: f64,
    ) -> Result<Self> {
        match kind {
            FilterKind::None => Ok(Self::None),
            FilterKind::Bloom => Ok(Self::Bloom(BloomFilter::new(
                expected_elements,
                false_positive_rate,
            ))),
            FilterKind::PrefixSuffix => Ok(Self::PrefixSuffix(PrefixSuffixFilter::new(
                expected_elements,
                false_positive_rate,
                DEFAULT_AVG_KEY_LEN,
            ))),
            FilterKind::BinaryFuse | FilterKind::NGramPartitioned => {
                Err(SieveError::InvalidConfig(format!(
                    "{kind} filters are built in one shot from a key set"
                )))
            }
        }
    }

    /// The filter's kind tag.
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::None => FilterKind::None,
            Self::Bloom(_) => FilterKind::Bloom,
            Self::BinaryFuse(_) => FilterKind::BinaryFuse,
            Self::PrefixSuffix(_) => FilterKind::PrefixSuffix,
            Self::NGramPartitioned(_) => FilterKind::NGramPartitioned,
        }
    }

    /// Inserts a key into a streaming-capable filter.
    ///
    /// # Panics
    /// Panics on one-shot kinds (binary fuse, n-gram): inserting into an
    /// already-constructed static filter is a programmer error.
    pub fn add(&mut self, value: &[u8]) {
        match self {
            Self::None => {}
            Self::Bloom(filter) => filter.add(value),
            Self::BinaryFuse(filter) => filter.add(value),
            Self::PrefixSuffix(filter) => filter.add(value),
            Self::NGramPartitioned(_) => {
                panic!("NGramPartitionedFilter is static; keys must be supplied at construction")
            }
        }
    }

    /// Tests membership. [`ProbabilisticFilter::None`] rejects everything.
    pub fn possibly_contains(&self, value: &[u8]) -> bool {
        match self {
            Self::None => false,
            Self::Bloom(filter) => filter.possibly_contains(value),
            Self::BinaryFuse(filter) => filter.possibly_contains(value),
            Self::PrefixSuffix(filter) => filter.possibly_contains(value),
            Self::NGramPartitioned(filter) => filter.possibly_contains(value),
        }
    }

    /// True when the filter holds no indexed data.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Bloom(filter) => filter.is_empty(),
            Self::BinaryFuse(filter) => filter.is_empty(),
            Self::PrefixSuffix(filter) => filter.is_empty(),
            Self::NGramPartitioned(filter) => filter.is_empty(),
        }
    }

    /// Heap bytes owned by the filter body.
    pub fn memory_usage(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Bloom(filter) => filter.memory_usage(),
            Self::BinaryFuse(filter) => filter.memory_usage(),
            Self::PrefixSuffix(filter) => filter.memory_usage(),
            Self::NGramPartitioned(filter) => filter.memory_usage(),
        }
    }

    /// Serializes the bare kind-specific body (no kind byte).
    pub fn write_body(&self, out: &mut Vec<u8>) {
        match self {
            Self::None => {}
            Self::Bloom(filter) => filter.write_body(out),
            Self::BinaryFuse(filter) => filter.write_body(out),
            Self::PrefixSuffix(filter) => filter.write_body(out),
            Self::NGramPartitioned(filter) => filter.write_body(out),
        }
    }

    /// Reads a bare body of a known kind.
    pub fn read_body(kind: FilterKind, reader: &mut ByteReader<'_>) -> Result<Self> {
        match kind {
            FilterKind::None => Ok(Self::None),
            FilterKind::Bloom => Ok(Self::Bloom(BloomFilter::read_body(reader)?)),
            FilterKind::BinaryFuse => Ok(Self::BinaryFuse(BinaryFuseFilter::read_body(reader)?)),
            FilterKind::PrefixSuffix => {
                Ok(Self::PrefixSuffix(PrefixSuffixFilter::read_body(reader)?))
            }
            FilterKind::NGramPartitioned => Ok(Self::NGramPartitioned(
                NGramPartitionedFilter::read_body(reader)?,
            )),
        }
    }

    /// Serializes a kind byte followed by the body.
    pub fn write_tagged(&self, out: &mut Vec<u8>) {
        put_u8(out, self.kind().as_u8());
        self.write_body(out);
    }

    /// Reads a tagged filter written by [`write_tagged`](Self::write_tagged).
    pub fn read_tagged(reader: &mut ByteReader<'_>) -> Result<Self> {
        let tag = reader.read_u8()?;
        let kind = FilterKind::from_u8(tag)
            .ok_or_else(|| SieveError::CorruptHeader(format!("unknown filter kind tag {tag}")))?;
        Self::read_body(kind, reader)
    }
}
