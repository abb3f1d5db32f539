//! On-disk filter envelope
//!
//! The envelope frames one serialized filter:
//!
//! ```text
//! Offset | Size | Field
//! -------|------|---------------------------------------------
//! 0      | 4    | magic "CLPF"
//! 4      | 4    | version (u32, currently 1)
//! 8      | 1    | filter kind tag
//! 9      | 1    | flags (bit 0 = normalize)
//! 10     | 2    | reserved (zero)
//! 12     | 8    | target false-positive rate (f64)
//! 20     | 8    | number of indexed elements (u64)
//! 28     | ...  | kind-specific body (absent for kind None)
//! ```
//!
//! All fields little-endian. The body carries no kind byte of its own: the
//! kind lives in this header. Readers reject unknown magic, versions, and
//! kinds as corrupt rather than guessing.

use std::fs;
use std::path::Path;

use crate::error::{Result, SieveError};
use crate::filter::{FilterConfig, FilterKind, ProbabilisticFilter};
use crate::wire::{put_f64, put_u16, put_u32, put_u64, put_u8, ByteReader};

/// Envelope magic bytes.
pub const ENVELOPE_MAGIC: [u8; 4] = *b"CLPF";

/// Current envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Flags bit 0: terms were lowercased before insertion.
pub const FLAG_NORMALIZE: u8 = 0x1;

/// Fixed header length preceding the body.
pub const ENVELOPE_HEADER_SIZE: usize = 28;

/// One filter plus its persisted configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEnvelope {
    /// Persisted filter parameters
    pub config: FilterConfig,
    /// Number of elements the filter was built over
    pub num_elements: u64,
    /// The filter body; [`ProbabilisticFilter::None`] for kind `None`
    pub filter: ProbabilisticFilter,
}

impl FilterEnvelope {
    /// Wraps a filter with its configuration.
    pub fn new(config: FilterConfig, num_elements: u64, filter: ProbabilisticFilter) -> Self {
        Self {
            config,
            num_elements,
            filter,
        }
    }

    /// Builds an envelope of `config.kind` over a duplicate-free key set,
    /// applying `config.normalize` to every key first.
    pub fn build<K: AsRef<str>>(config: FilterConfig, keys: &[K]) -> Result<Self> {
        let filter = if config.normalize {
            let lowered: Vec<String> = keys
                .iter()
                .map(|key| key.as_ref().to_lowercase())
                .collect();
            ProbabilisticFilter::from_key_set(config.kind, &lowered, config.false_positive_rate)?
        } else {
            let raw: Vec<&[u8]> = keys.iter().map(|key| key.as_ref().as_bytes()).collect();
            ProbabilisticFilter::from_key_set(config.kind, &raw, config.false_positive_rate)?
        };
        Ok(Self::new(config, keys.len() as u64, filter))
    }

    /// Serializes header and body into `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ENVELOPE_MAGIC);
        put_u32(out, ENVELOPE_VERSION);
        put_u8(out, self.config.kind.as_u8());
        let mut flags = 0u8;
        if self.config.normalize {
            flags |= FLAG_NORMALIZE;
        }
        put_u8(out, flags);
        put_u16(out, 0);
        put_f64(out, self.config.false_positive_rate);
        put_u64(out, self.num_elements);

        if self.config.kind != FilterKind::None {
            self.filter.write_body(out);
        }
    }

    /// Serializes to a fresh byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_HEADER_SIZE + self.filter.memory_usage());
        self.write(&mut out);
        out
    }

    /// Deserializes an envelope from a fully buffered byte slice.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.read_array::<4>()?;
        if magic != ENVELOPE_MAGIC {
            return Err(SieveError::CorruptHeader(format!(
                "bad filter envelope magic {magic:02x?}"
            )));
        }
        let version = reader.read_u32()?;
        if version != ENVELOPE_VERSION {
            return Err(SieveError::CorruptHeader(format!(
                "unsupported filter envelope version {version}"
            )));
        }

        let kind_tag = reader.read_u8()?;
        let kind = FilterKind::from_u8(kind_tag).ok_or_else(|| {
            SieveError::CorruptHeader(format!("unknown filter kind tag {kind_tag}"))
        })?;
        let flags = reader.read_u8()?;
        let _reserved = reader.read_u16()?;
        let false_positive_rate = reader.read_f64()?;
        let num_elements = reader.read_u64()?;

        let filter = ProbabilisticFilter::read_body(kind, &mut reader)?;

        Ok(Self {
            config: FilterConfig {
                kind,
                false_positive_rate,
                normalize: (flags & FLAG_NORMALIZE) != 0,
            },
            num_elements,
            filter,
        })
    }

    /// Writes the envelope to a file, replacing any existing content.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Reads an envelope file, buffering it fully first.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::read(&bytes)
    }
}
