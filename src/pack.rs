//! Filter pack: a random-access bundle of per-archive filter envelopes
//!
//! A pack concatenates filter envelopes (the *body*), then an index mapping
//! archive ids to `(offset, size)` ranges, then a fixed-size footer that
//! locates the index:
//!
//! ```text
//! +--------------------+  <- body_offset (written as 0)
//! | envelope bytes ... |
//! +--------------------+  <- index_offset
//! | "CLPI" | version   |
//! | entry_count        |
//! | entries ...        |
//! +--------------------+  <- index_offset + index_size
//! | "CLPF" | version   |
//! | body_offset        |
//! | index_offset       |
//! | index_size         |
//! +--------------------+  <- end of file
//! ```
//!
//! Each index entry is `id_len(u8) | id_bytes | offset(u64) | size(u32)`
//! with entry offsets relative to `body_offset`. The footer's `body_offset`
//! is written as zero today but honored on read, leaving room for prepended
//! headers. Builders stream envelopes straight from the manifest files;
//! readers buffer the whole pack and hand out borrowed slices.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, SieveError};
use crate::wire::{put_u32, put_u64, put_u8, ByteReader};

/// Footer magic bytes (shared with the envelope magic; disambiguated by
/// position at end-of-file).
pub const PACK_MAGIC: [u8; 4] = *b"CLPF";

/// Current pack format version.
pub const PACK_VERSION: u32 = 1;

/// Index magic bytes.
pub const INDEX_MAGIC: [u8; 4] = *b"CLPI";

/// Current index format version.
pub const INDEX_VERSION: u32 = 1;

/// Fixed footer length at end-of-file.
pub const PACK_FOOTER_SIZE: usize = 4 + 4 + 8 + 8 + 8;

/// Fixed index header length (magic, version, entry count).
pub const INDEX_HEADER_SIZE: usize = 4 + 4 + 4;

/// One manifest line: which archive the filter belongs to and where the
/// envelope file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub archive_id: String,
    pub filter_path: PathBuf,
}

/// One decoded index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackIndexEntry {
    pub archive_id: String,
    /// Envelope offset relative to the body
    pub offset: u64,
    /// Envelope length in bytes
    pub size: u32,
}

/// Decoded pack footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackFooter {
    pub body_offset: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

/// Summary the CLI reports after building a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackBuildResult {
    pub num_filters: usize,
    pub size: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

/// Parses a pack manifest: one `archive_id<TAB>filter_path` entry per line,
/// `#` comments and blank lines skipped, trailing `\r` stripped.
///
/// Malformed lines are rejected with their line number; an empty manifest
/// is an error.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((archive_id, path)) = line.split_once('\t') else {
            return Err(SieveError::InvalidArgument(format!(
                "invalid manifest line {line_number}: missing tab separator"
            )));
        };
        if archive_id.is_empty() || path.is_empty() {
            return Err(SieveError::InvalidArgument(format!(
                "invalid manifest line {line_number}: empty archive id or path"
            )));
        }

        entries.push(ManifestEntry {
            archive_id: archive_id.to_string(),
            filter_path: PathBuf::from(path),
        });
    }

    if entries.is_empty() {
        return Err(SieveError::InvalidArgument(
            "manifest contains no entries".to_string(),
        ));
    }
    Ok(entries)
}

/// Reads and parses a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let text = fs::read_to_string(path)?;
    parse_manifest(&text)
}

fn encode_index(entries: &[PackIndexEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(INDEX_HEADER_SIZE + entries.len() * 45);
    out.extend_from_slice(&INDEX_MAGIC);
    put_u32(&mut out, INDEX_VERSION);
    put_u32(&mut out, entries.len() as u32);

    for entry in entries {
        let id_bytes = entry.archive_id.as_bytes();
        if id_bytes.len() > u8::MAX as usize {
            return Err(SieveError::InvalidArgument(format!(
                "archive id '{}' is too long to encode",
                entry.archive_id
            )));
        }
        put_u8(&mut out, id_bytes.len() as u8);
        out.extend_from_slice(id_bytes);
        put_u64(&mut out, entry.offset);
        put_u32(&mut out, entry.size);
    }
    Ok(out)
}

fn encode_footer(footer: &PackFooter) -> Vec<u8> {
    let mut out = Vec::with_capacity(PACK_FOOTER_SIZE);
    out.extend_from_slice(&PACK_MAGIC);
    put_u32(&mut out, PACK_VERSION);
    put_u64(&mut out, footer.body_offset);
    put_u64(&mut out, footer.index_offset);
    put_u64(&mut out, footer.index_size);
    out
}

/// Builds a pack at `output_path` from manifest entries, streaming each
/// envelope file verbatim.
///
/// Duplicate archive ids and envelope files larger than `u32::MAX` bytes
/// are rejected. The parent directory is created if needed.
pub fn build_pack(output_path: &Path, entries: &[ManifestEntry]) -> Result<PackBuildResult> {
    if entries.is_empty() {
        return Err(SieveError::InvalidArgument(
            "no filters provided".to_string(),
        ));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    let mut index_entries: Vec<PackIndexEntry> = Vec::with_capacity(entries.len());
    let mut seen_ids: FxHashSet<&str> = FxHashSet::default();
    let mut position = 0u64;

    for entry in entries {
        if !seen_ids.insert(entry.archive_id.as_str()) {
            return Err(SieveError::InvalidArgument(format!(
                "duplicate archive id '{}' in manifest",
                entry.archive_id
            )));
        }

        let mut input = File::open(&entry.filter_path)?;
        let size = input.metadata()?.len();
        if size == 0 {
            return Err(SieveError::InvalidArgument(format!(
                "filter file {} is empty",
                entry.filter_path.display()
            )));
        }
        if size > u64::from(u32::MAX) {
            return Err(SieveError::InvalidArgument(format!(
                "filter file {} is too large for a pack entry",
                entry.filter_path.display()
            )));
        }

        let copied = std::io::copy(&mut input, &mut writer)?;
        if copied != size {
            return Err(SieveError::Truncated(format!(
                "filter file {} changed size during packing",
                entry.filter_path.display()
            )));
        }

        index_entries.push(PackIndexEntry {
            archive_id: entry.archive_id.clone(),
            offset: position,
            size: size as u32,
        });
        position += size;
    }

    let index_offset = position;
    let index_bytes = encode_index(&index_entries)?;
    writer.write_all(&index_bytes)?;

    let footer = PackFooter {
        body_offset: 0,
        index_offset,
        index_size: index_bytes.len() as u64,
    };
    writer.write_all(&encode_footer(&footer))?;
    let size = writer.stream_position()?;
    writer.flush()?;

    info!(
        path = %output_path.display(),
        num_filters = index_entries.len(),
        size,
        "built filter pack"
    );

    Ok(PackBuildResult {
        num_filters: index_entries.len(),
        size,
        index_offset,
        index_size: index_bytes.len() as u64,
    })
}

/// Random-access reader over a fully buffered pack.
///
/// The buffer is read-only after open, so a shared reference may serve
/// concurrent lookups.
#[derive(Debug)]
pub struct PackReader {
    bytes: Vec<u8>,
    footer: PackFooter,
    index: FxHashMap<String, PackIndexEntry>,
}

impl PackReader {
    /// Opens and fully buffers a pack file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_bytes(fs::read(path)?)
    }

    /// Parses a pack from an owned buffer: footer first, then the index,
    /// then every entry range is validated against the body bounds.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let footer = parse_footer(&bytes)?;
        let entries = parse_index(&bytes, &footer)?;

        let mut index = FxHashMap::default();
        for entry in entries {
            let start = footer.body_offset + entry.offset;
            let end = start + u64::from(entry.size);
            if end > footer.index_offset {
                return Err(SieveError::Truncated(format!(
                    "pack entry '{}' range {start}..{end} escapes the body",
                    entry.archive_id
                )));
            }
            if index.insert(entry.archive_id.clone(), entry).is_some() {
                return Err(SieveError::CorruptHeader(
                    "duplicate archive id in pack index".to_string(),
                ));
            }
        }

        Ok(Self {
            bytes,
            footer,
            index,
        })
    }

    /// The decoded footer.
    pub fn footer(&self) -> &PackFooter {
        &self.footer
    }

    /// Number of indexed filters.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True when `archive_id` is present in the index.
    pub fn contains(&self, archive_id: &str) -> bool {
        self.index.contains_key(archive_id)
    }

    /// Borrows the envelope bytes for `archive_id`, or `None` when the
    /// archive has no filter in this pack.
    pub fn entry_bytes(&self, archive_id: &str) -> Option<&[u8]> {
        let entry = self.index.get(archive_id)?;
        let start = (self.footer.body_offset + entry.offset) as usize;
        Some(&self.bytes[start..start + entry.size as usize])
    }

    /// Iterates over indexed archive ids in unspecified order.
    pub fn archive_ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}

fn parse_footer(bytes: &[u8]) -> Result<PackFooter> {
    if bytes.len() < PACK_FOOTER_SIZE {
        return Err(SieveError::Truncated(format!(
            "pack of {} bytes is too small for a footer",
            bytes.len()
        )));
    }

    let mut reader = ByteReader::new(&bytes[bytes.len() - PACK_FOOTER_SIZE..]);
    let magic = reader.read_array::<4>()?;
    if magic != PACK_MAGIC {
        return Err(SieveError::CorruptHeader(format!(
            "bad pack magic {magic:02x?}"
        )));
    }
    let version = reader.read_u32()?;
    if version != PACK_VERSION {
        return Err(SieveError::CorruptHeader(format!(
            "unsupported pack version {version}"
        )));
    }

    let footer = PackFooter {
        body_offset: reader.read_u64()?,
        index_offset: reader.read_u64()?,
        index_size: reader.read_u64()?,
    };

    let footer_start = (bytes.len() - PACK_FOOTER_SIZE) as u64;
    let index_in_bounds = footer
        .index_offset
        .checked_add(footer.index_size)
        .is_some_and(|end| end <= footer_start);
    if footer.body_offset > footer.index_offset || !index_in_bounds {
        return Err(SieveError::Truncated(
            "pack index offsets are out of range".to_string(),
        ));
    }
    Ok(footer)
}

fn parse_index(bytes: &[u8], footer: &PackFooter) -> Result<Vec<PackIndexEntry>> {
    if footer.index_size < INDEX_HEADER_SIZE as u64 {
        return Err(SieveError::Truncated(
            "pack index header is truncated".to_string(),
        ));
    }

    let start = footer.index_offset as usize;
    let end = start + footer.index_size as usize;
    let mut reader = ByteReader::new(&bytes[start..end]);

    let magic = reader.read_array::<4>()?;
    if magic != INDEX_MAGIC {
        return Err(SieveError::CorruptHeader(format!(
            "bad pack index magic {magic:02x?}"
        )));
    }
    let version = reader.read_u32()?;
    if version != INDEX_VERSION {
        return Err(SieveError::CorruptHeader(format!(
            "unsupported pack index version {version}"
        )));
    }

    let entry_count = reader.read_u32()?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let id_len = reader.read_u8()? as usize;
        let id_bytes = reader.read_bytes(id_len)?;
        let archive_id = std::str::from_utf8(id_bytes)
            .map_err(|_| SieveError::CorruptHeader("archive id is not valid UTF-8".to_string()))?
            .to_string();
        let offset = reader.read_u64()?;
        let size = reader.read_u32()?;
        entries.push(PackIndexEntry {
            archive_id,
            offset,
            size,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_shapes() {
        let text = "# archives to pack\n\nA1\tpath/to/a1.filter\r\nA2\tother/a2.filter\n";
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].archive_id, "A1");
        assert_eq!(entries[0].filter_path, PathBuf::from("path/to/a1.filter"));
        assert_eq!(entries[1].archive_id, "A2");
    }

    #[test]
    fn test_manifest_missing_tab_names_line() {
        let err = parse_manifest("A1\tok.filter\nbroken line\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 2"), "unexpected message: {message}");
    }

    #[test]
    fn test_manifest_empty_fields_rejected() {
        assert!(parse_manifest("\tpath\n").is_err());
        assert!(parse_manifest("A1\t\n").is_err());
        assert!(parse_manifest("# only comments\n").is_err());
        assert!(parse_manifest("").is_err());
    }

    #[test]
    fn test_encode_index_rejects_long_ids() {
        let entries = vec![PackIndexEntry {
            archive_id: "x".repeat(256),
            offset: 0,
            size: 1,
        }];
        assert!(matches!(
            encode_index(&entries),
            Err(SieveError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_footer_encode_decode() {
        let footer = PackFooter {
            body_offset: 0,
            index_offset: 123,
            index_size: 45,
        };
        let mut bytes = vec![0u8; 123 + 45];
        bytes.extend_from_slice(&encode_footer(&footer));
        assert_eq!(parse_footer(&bytes).unwrap(), footer);
    }

    #[test]
    fn test_footer_out_of_range_offsets() {
        let footer = PackFooter {
            body_offset: 0,
            index_offset: 1000,
            index_size: 45,
        };
        // File is far too small for the claimed index.
        let mut bytes = vec![0u8; 10];
        bytes.extend_from_slice(&encode_footer(&footer));
        assert!(parse_footer(&bytes).is_err());
    }
}
