//! Two-level pruning pipeline
//!
//! Three stages, each cheap enough to run before the expensive work it can
//! eliminate, and each falling back to *admit* whenever its filter cannot
//! give a definitive answer — the pipeline may only ever remove provably
//! empty work, never a potential match.
//!
//! - **Stage A** ([`scan_pack`]): bulk pack scan that prunes whole archives
//!   before they are opened.
//! - **Stage B** ([`pre_dictionary_check`]): per-archive check against the
//!   variable dictionary's companion filter, skipping dictionary
//!   decompression when no search term can be present.
//! - **Stage C** ([`SchemaFilterCache`]): per-schema checks on variable
//!   dictionary ids and exact column value sets, skipping a schema's column
//!   data when the query cannot match it.

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::envelope::FilterEnvelope;
use crate::error::Result;
use crate::extract::{collect_var_search_strings, extract_conjunctive_terms};
use crate::filter::{FilterKind, ProbabilisticFilter};
use crate::pack::PackReader;
use crate::query::ast::Expr;
use crate::query::parse_query;
use crate::schema_filter::{SchemaIntColumnFilter, SchemaStringColumnFilter};

/// JSON result of a stage-A pack scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    /// Whether the query shape was usable by the filters
    pub supported: bool,
    /// Why not, when `supported` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Archive ids that may contain a match
    pub passed: Vec<String>,
    /// Number of candidate archives examined
    pub total: usize,
    /// Number of archives pruned by the scan
    pub skipped: usize,
}

impl ScanOutcome {
    fn admit_all(archive_ids: &[String], supported: bool, reason: Option<String>) -> Self {
        Self {
            supported,
            reason,
            passed: archive_ids.to_vec(),
            total: archive_ids.len(),
            skipped: 0,
        }
    }
}

/// Stage A: scans a filter pack and prunes candidate archives.
///
/// Unsupported query shapes and term-free queries admit every candidate
/// (the safe path); archives missing from the pack index admit
/// conservatively; a per-entry envelope that fails to decode admits with a
/// warning. Pack-level corruption (unreadable footer or index) is an error
/// — silently admitting on a corrupt pack would hide real damage.
pub fn scan_pack(pack_path: &Path, archive_ids: &[String], query: &str) -> Result<ScanOutcome> {
    if archive_ids.is_empty() {
        return Ok(ScanOutcome {
            supported: true,
            reason: None,
            passed: Vec::new(),
            total: 0,
            skipped: 0,
        });
    }

    let expr = parse_query(query)?;
    let extraction = extract_conjunctive_terms(&expr);

    // Dedupe while preserving AST order; pre-lowercase once for
    // normalize-flagged envelopes.
    let mut seen = FxHashSet::default();
    let terms: Vec<String> = extraction
        .terms
        .iter()
        .filter(|term| seen.insert(term.as_str().to_string()))
        .cloned()
        .collect();
    let lowered: Vec<String> = terms.iter().map(|term| term.to_lowercase()).collect();

    if !extraction.supported || terms.is_empty() {
        debug!(
            supported = extraction.supported,
            reason = extraction.reason.as_deref().unwrap_or(""),
            "filters cannot act on query; admitting all archives"
        );
        return Ok(ScanOutcome::admit_all(
            archive_ids,
            extraction.supported,
            extraction.reason,
        ));
    }

    let reader = PackReader::open(pack_path)?;

    let mut passed = Vec::with_capacity(archive_ids.len());
    let mut skipped = 0usize;
    for archive_id in archive_ids {
        if archive_admitted(&reader, archive_id, &terms, &lowered) {
            passed.push(archive_id.clone());
        } else {
            skipped += 1;
        }
    }

    info!(
        pack = %pack_path.display(),
        total = archive_ids.len(),
        passed = passed.len(),
        skipped,
        "filter pack scan complete"
    );

    Ok(ScanOutcome {
        supported: true,
        reason: None,
        passed,
        total: archive_ids.len(),
        skipped,
    })
}

fn archive_admitted(
    reader: &PackReader,
    archive_id: &str,
    terms: &[String],
    lowered: &[String],
) -> bool {
    let Some(bytes) = reader.entry_bytes(archive_id) else {
        // Not in the pack: this archive has no filter, so nothing can be
        // ruled out.
        return true;
    };

    let envelope = match FilterEnvelope::read(bytes) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(archive_id, %error, "unreadable filter envelope; admitting archive");
            return true;
        }
    };

    if envelope.config.kind == FilterKind::None {
        return true;
    }

    let terms_to_check = if envelope.config.normalize { lowered } else { terms };
    terms_to_check
        .iter()
        .all(|term| envelope.filter.possibly_contains(term.as_bytes()))
}

/// Stage B: decides whether the variable dictionary must be loaded.
///
/// Returns true when the dictionary load is required (the filter could not
/// refute the query) and false when every search term is provably absent.
pub fn pre_dictionary_check(filter_path: &Path, expr: &Expr, ignore_case: bool) -> bool {
    let envelope = match FilterEnvelope::read_from_file(filter_path) {
        Ok(envelope) => envelope,
        Err(error) => {
            info!(
                path = %filter_path.display(),
                %error,
                "dictionary filter not available; dictionary load required"
            );
            return true;
        }
    };
    if envelope.config.kind == FilterKind::None {
        return true;
    }

    let mut search_strings = FxHashSet::default();
    collect_var_search_strings(expr, &mut search_strings);
    if search_strings.is_empty() {
        debug!("no exact-match search strings; dictionary load required");
        return true;
    }

    if ignore_case {
        debug!("case-insensitive search; filter is case-sensitive, dictionary load required");
        return true;
    }

    let mut passes = 0usize;
    let mut rejects = 0usize;
    for term in &search_strings {
        let probe = if envelope.config.normalize {
            term.to_lowercase()
        } else {
            term.clone()
        };
        if envelope.filter.possibly_contains(probe.as_bytes()) {
            passes += 1;
        } else {
            rejects += 1;
        }
    }

    info!(
        checked = search_strings.len(),
        passes,
        rejects,
        "dictionary pre-check complete"
    );
    passes > 0
}

/// Stage C: per-schema filter cache.
///
/// Holds the filters preloaded for an archive's matched schemas: a
/// probabilistic filter over each schema's variable dictionary ids
/// (decimal-encoded), plus exact int/string column value sets. All checks
/// admit when the relevant filter is absent.
#[derive(Debug, Default)]
pub struct SchemaFilterCache {
    var_id_filters: FxHashMap<i32, ProbabilisticFilter>,
    int_filters: FxHashMap<i32, SchemaIntColumnFilter>,
    string_filters: FxHashMap<i32, SchemaStringColumnFilter>,
}

impl SchemaFilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema's variable-id filter.
    pub fn insert_var_id_filter(&mut self, schema_id: i32, filter: ProbabilisticFilter) {
        self.var_id_filters.insert(schema_id, filter);
    }

    /// Registers a schema's integer column filter.
    pub fn insert_int_filter(&mut self, schema_id: i32, filter: SchemaIntColumnFilter) {
        self.int_filters.insert(schema_id, filter);
    }

    /// Registers a schema's string column filter.
    pub fn insert_string_filter(&mut self, schema_id: i32, filter: SchemaStringColumnFilter) {
        self.string_filters.insert(schema_id, filter);
    }

    /// Checks whether any searched variable id can belong to the schema.
    ///
    /// An empty id set, a missing filter, or a `None` filter admits.
    pub fn var_ids_admitted(&self, schema_id: i32, var_ids: &FxHashSet<u64>) -> bool {
        if var_ids.is_empty() {
            return true;
        }
        let Some(filter) = self.var_id_filters.get(&schema_id) else {
            return true;
        };
        if filter.kind() == FilterKind::None {
            return true;
        }
        var_ids
            .iter()
            .any(|id| filter.possibly_contains(id.to_string().as_bytes()))
    }

    /// Checks one integer equality `(column_id, value)` against the schema.
    pub fn int_value_admitted(&self, schema_id: i32, column_id: i32, value: i64) -> bool {
        match self.int_filters.get(&schema_id) {
            Some(filter) => filter.contains(column_id, value),
            None => true,
        }
    }

    /// Checks one string equality `(column_id, value)` against the schema.
    pub fn string_value_admitted(&self, schema_id: i32, column_id: i32, value: &str) -> bool {
        match self.string_filters.get(&schema_id) {
            Some(filter) => filter.contains(column_id, value),
            None => true,
        }
    }

    /// Full stage-C decision for one schema: the variable-id check must
    /// admit, and every int and string equality must pass. Checks
    /// short-circuit on the first rejection.
    pub fn schema_admitted(
        &self,
        schema_id: i32,
        var_ids: &FxHashSet<u64>,
        int_equalities: &[(i32, i64)],
        string_equalities: &[(i32, &str)],
    ) -> bool {
        if !self.var_ids_admitted(schema_id, var_ids) {
            debug!(schema_id, "schema rejected by variable-id filter");
            return false;
        }
        for &(column_id, value) in int_equalities {
            if !self.int_value_admitted(schema_id, column_id, value) {
                debug!(schema_id, column_id, value, "schema rejected by int column filter");
                return false;
            }
        }
        for &(column_id, value) in string_equalities {
            if !self.string_value_admitted(schema_id, column_id, value) {
                debug!(schema_id, column_id, value, "schema rejected by string column filter");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_id_filter(ids: &[u64]) -> ProbabilisticFilter {
        let keys: Vec<String> = ids.iter().map(u64::to_string).collect();
        ProbabilisticFilter::from_key_set(FilterKind::Bloom, &keys, 0.0001).unwrap()
    }

    fn ids(values: &[u64]) -> FxHashSet<u64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_var_id_check() {
        let mut cache = SchemaFilterCache::new();
        cache.insert_var_id_filter(1, var_id_filter(&[10, 20, 30]));

        assert!(cache.var_ids_admitted(1, &ids(&[20])));
        assert!(cache.var_ids_admitted(1, &ids(&[99, 30])));
        assert!(!cache.var_ids_admitted(1, &ids(&[99])));
        // Empty query id set admits.
        assert!(cache.var_ids_admitted(1, &ids(&[])));
        // Unknown schema admits.
        assert!(cache.var_ids_admitted(2, &ids(&[99])));
    }

    #[test]
    fn test_none_var_id_filter_admits() {
        let mut cache = SchemaFilterCache::new();
        cache.insert_var_id_filter(1, ProbabilisticFilter::None);
        assert!(cache.var_ids_admitted(1, &ids(&[99])));
    }

    #[test]
    fn test_int_check() {
        let mut int_filter = SchemaIntColumnFilter::new();
        for _ in 0..20 {
            int_filter.add_value(5, 200);
            int_filter.add_value(5, 404);
        }
        let mut cache = SchemaFilterCache::new();
        cache.insert_int_filter(1, int_filter);

        assert!(cache.int_value_admitted(1, 5, 404));
        assert!(!cache.int_value_admitted(1, 5, 500));
        // Untracked column and unknown schema admit.
        assert!(cache.int_value_admitted(1, 6, 500));
        assert!(cache.int_value_admitted(2, 5, 500));
    }

    #[test]
    fn test_schema_admitted_combines_checks() {
        let mut int_filter = SchemaIntColumnFilter::new();
        for _ in 0..20 {
            int_filter.add_value(5, 200);
        }
        let mut string_filter = SchemaStringColumnFilter::new();
        for _ in 0..20 {
            string_filter.add_value(7, "GET");
        }

        let mut cache = SchemaFilterCache::new();
        cache.insert_var_id_filter(1, var_id_filter(&[10]));
        cache.insert_int_filter(1, int_filter);
        cache.insert_string_filter(1, string_filter);

        assert!(cache.schema_admitted(1, &ids(&[10]), &[(5, 200)], &[(7, "GET")]));
        assert!(!cache.schema_admitted(1, &ids(&[11]), &[(5, 200)], &[(7, "GET")]));
        assert!(!cache.schema_admitted(1, &ids(&[10]), &[(5, 500)], &[(7, "GET")]));
        assert!(!cache.schema_admitted(1, &ids(&[10]), &[(5, 200)], &[(7, "PUT")]));
        assert!(cache.schema_admitted(1, &ids(&[]), &[], &[]));
    }
}
