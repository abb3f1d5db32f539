//! Logsieve - probabilistic pre-filters for columnar log-archive search
//!
//! A columnar log archive is expensive to search: dictionaries and column
//! streams must be decompressed and scanned before a single record can be
//! matched. Logsieve answers the cheaper question first — *could any record
//! here possibly satisfy this query?* — using compact probabilistic set
//! filters, and prunes the archives, dictionaries, and schemas for which
//! the answer is provably no. Filters admit false positives but never false
//! negatives, so pruning is always safe.
//!
//! # Quick Start
//!
//! ```rust
//! use logsieve::{FilterConfig, FilterEnvelope, FilterKind};
//!
//! // Build a Bloom filter over a dictionary's values and frame it for disk.
//! let config = FilterConfig {
//!     kind: FilterKind::Bloom,
//!     false_positive_rate: 0.07,
//!     normalize: false,
//! };
//! let envelope = FilterEnvelope::build(config, &["alpha", "beta", "gamma"])?;
//!
//! // Round-trip through bytes and query.
//! let restored = FilterEnvelope::read(&envelope.to_bytes())?;
//! assert!(restored.filter.possibly_contains(b"alpha"));
//! # Ok::<(), logsieve::SieveError>(())
//! ```
//!
//! # Features
//!
//! - **Four filter kinds** behind one wrapper: Bloom, static binary fuse,
//!   prefix/suffix (wildcard-aware), and length-partitioned n-gram filters
//! - **On-disk envelope format** with magic, version, and per-filter
//!   configuration
//! - **Filter packs**: many per-archive envelopes in one file with a
//!   random-access index keyed by archive id
//! - **Query-term extraction** from a parsed query AST, reporting exactly
//!   when filters can and cannot act
//! - **Three pruning stages**: pack scan, pre-dictionary check, and
//!   per-schema checks
//!
//! # Pruning at query time
//!
//! ```text
//! query text
//!    |  parse + extract terms
//!    v
//! [Stage A] pack scan ........ prunes whole archives
//!    v
//! [Stage B] dictionary check . skips loading the variable dictionary
//!    v
//! [Stage C] schema checks .... skips loading a schema's column data
//! ```
//!
//! Every stage admits on uncertainty (missing filter, unsupported query,
//! corrupt envelope); only the provably-empty work is removed.

pub mod binary_fuse;
pub mod bitpack;
pub mod bloom;
pub mod dictionary;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod filter;
pub mod hashing;
pub mod ngram;
pub mod pack;
pub mod pipeline;
pub mod policy;
pub mod prefix_suffix;
pub mod query;
pub mod schema_filter;
pub mod wire;

pub use binary_fuse::BinaryFuseFilter;
pub use bloom::BloomFilter;
pub use dictionary::{filter_path_for, DictionaryFilterWriter, FILTER_FILE_SUFFIX};
pub use envelope::{FilterEnvelope, ENVELOPE_MAGIC, ENVELOPE_VERSION};
pub use error::{Result, SieveError};
pub use extract::{extract_conjunctive_terms, TermExtraction};
pub use filter::{FilterConfig, FilterKind, ProbabilisticFilter};
pub use ngram::NGramPartitionedFilter;
pub use pack::{build_pack, read_manifest, PackBuildResult, PackReader};
pub use pipeline::{pre_dictionary_check, scan_pack, ScanOutcome, SchemaFilterCache};
pub use prefix_suffix::PrefixSuffixFilter;
pub use query::{parse_query, Expr};
pub use schema_filter::{SchemaIntColumnFilter, SchemaStringColumnFilter};
