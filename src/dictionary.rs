//! Dictionary companion-filter writer
//!
//! A dictionary writer that wants a pre-check filter records every value it
//! ever observes — including values later displaced elsewhere in the
//! archive — and emits a filter envelope next to the dictionary file on
//! close. Readers can then refute lookups without decompressing the
//! dictionary at all.
//!
//! Construction failures are downgraded rather than propagated: the filter
//! is an optimization, so a failed build writes a `None` envelope and logs
//! a warning instead of failing the ingest.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tracing::{info, warn};

use crate::envelope::FilterEnvelope;
use crate::error::Result;
use crate::filter::{FilterConfig, FilterKind, ProbabilisticFilter};

/// Suffix appended to a dictionary path to name its companion filter.
pub const FILTER_FILE_SUFFIX: &str = ".filter";

/// The companion filter path for a dictionary file.
pub fn filter_path_for(dictionary_path: &Path) -> PathBuf {
    let mut name = dictionary_path.as_os_str().to_os_string();
    name.push(FILTER_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Accumulates dictionary values and writes the companion filter envelope.
#[derive(Debug)]
pub struct DictionaryFilterWriter {
    config: FilterConfig,
    values: FxHashSet<String>,
}

impl DictionaryFilterWriter {
    /// Creates a writer with the given filter configuration. A `None` kind
    /// disables collection entirely.
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            values: FxHashSet::default(),
        }
    }

    /// Records one observed value. No-op when the filter kind is `None`.
    pub fn record(&mut self, value: &str) {
        if self.config.kind == FilterKind::None {
            return;
        }
        if !self.values.contains(value) {
            self.values.insert(value.to_string());
        }
    }

    /// Number of distinct values recorded so far.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Builds the filter over everything recorded and writes the envelope
    /// to `<dictionary_path>.filter`. Returns the envelope path, or `None`
    /// when the kind is `None` and nothing is written.
    ///
    /// A construction failure writes a `None` envelope instead so that the
    /// dictionary stays usable; pre-checks against it will admit.
    pub fn close(self, dictionary_path: &Path) -> Result<Option<PathBuf>> {
        if self.config.kind == FilterKind::None {
            return Ok(None);
        }

        let mut keys: Vec<&str> = self.values.iter().map(String::as_str).collect();
        // Reproducible construction for the one-shot filter kinds.
        keys.sort_unstable();

        let num_elements = keys.len() as u64;
        let envelope = match FilterEnvelope::build(self.config, &keys) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    %error,
                    num_values = keys.len(),
                    "filter construction failed; writing a None envelope"
                );
                FilterEnvelope::new(
                    FilterConfig {
                        kind: FilterKind::None,
                        ..self.config
                    },
                    num_elements,
                    ProbabilisticFilter::None,
                )
            }
        };

        let path = filter_path_for(dictionary_path);
        envelope.write_to_file(&path)?;
        info!(
            path = %path.display(),
            kind = %envelope.config.kind,
            num_values = num_elements,
            size = envelope.filter.memory_usage(),
            "wrote dictionary companion filter"
        );
        Ok(Some(path))
    }
}
