//! Stage B and stage C pruning scenarios

mod common;

use common::{create_temp_dir, write_filter_file};
use logsieve::{
    filter_path_for, parse_query, pre_dictionary_check, DictionaryFilterWriter, FilterConfig,
    FilterKind, ProbabilisticFilter, SchemaFilterCache, SchemaIntColumnFilter,
};
use rustc_hash::FxHashSet;
use std::path::Path;

fn dictionary_filter(dir: &Path) -> std::path::PathBuf {
    write_filter_file(
        dir,
        "var.dict.filter",
        FilterKind::Bloom,
        &["apple", "banana"],
        false,
    )
}

#[test]
fn test_dictionary_load_admitted_for_present_term() {
    let dir = create_temp_dir();
    let filter_path = dictionary_filter(dir.path());

    let expr = parse_query(r#"field == "banana""#).unwrap();
    assert!(pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_dictionary_load_skipped_for_absent_term() {
    let dir = create_temp_dir();
    let filter_path = dictionary_filter(dir.path());

    let expr = parse_query(r#"field == "cherry""#).unwrap();
    assert!(!pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_any_passing_term_admits() {
    let dir = create_temp_dir();
    let filter_path = dictionary_filter(dir.path());

    // "cherry" is absent but "apple" may be present; the dictionary is
    // needed to find out.
    let expr = parse_query(r#"a == "cherry" AND b == "apple""#).unwrap();
    assert!(pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_case_insensitive_search_admits() {
    let dir = create_temp_dir();
    let filter_path = dictionary_filter(dir.path());

    // The filter is case-sensitive, so it cannot help here.
    let expr = parse_query(r#"field == "BANANA""#).unwrap();
    assert!(pre_dictionary_check(&filter_path, &expr, true));
}

#[test]
fn test_missing_filter_admits() {
    let dir = create_temp_dir();
    let expr = parse_query(r#"field == "cherry""#).unwrap();
    assert!(pre_dictionary_check(
        &dir.path().join("absent.filter"),
        &expr,
        false
    ));
}

#[test]
fn test_corrupt_filter_admits() {
    let dir = create_temp_dir();
    let path = dir.path().join("var.dict.filter");
    std::fs::write(&path, b"garbage").unwrap();

    let expr = parse_query(r#"field == "cherry""#).unwrap();
    assert!(pre_dictionary_check(&path, &expr, false));
}

#[test]
fn test_wildcard_only_query_admits() {
    let dir = create_temp_dir();
    let filter_path = dictionary_filter(dir.path());

    // No exact-match strings can be extracted from a wildcard literal.
    let expr = parse_query(r#"field == "cher*""#).unwrap();
    assert!(pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_none_envelope_admits() {
    let dir = create_temp_dir();
    let filter_path = write_filter_file(dir.path(), "var.dict.filter", FilterKind::None, &[], false);

    let expr = parse_query(r#"field == "cherry""#).unwrap();
    assert!(pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_or_query_still_prunes_dictionary_load() {
    let dir = create_temp_dir();
    let filter_path = dictionary_filter(dir.path());

    // Stage B collects terms across Or branches: all absent means the
    // dictionary cannot satisfy either side.
    let expr = parse_query(r#"a == "cherry" OR b == "durian""#).unwrap();
    assert!(!pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_producer_written_filter_drives_stage_b() {
    let dir = create_temp_dir();
    let dict_path = dir.path().join("var.dict");

    let mut writer = DictionaryFilterWriter::new(FilterConfig {
        false_positive_rate: common::TEST_FPR,
        ..FilterConfig::default()
    });
    for value in ["apple", "banana", "displaced-value"] {
        writer.record(value);
    }
    let filter_path = writer.close(&dict_path).unwrap().unwrap();
    assert_eq!(filter_path, filter_path_for(&dict_path));

    // Values ever observed pass, including ones later moved elsewhere.
    let expr = parse_query(r#"f == "displaced-value""#).unwrap();
    assert!(pre_dictionary_check(&filter_path, &expr, false));

    let expr = parse_query(r#"f == "never-seen""#).unwrap();
    assert!(!pre_dictionary_check(&filter_path, &expr, false));
}

#[test]
fn test_schema_pruning_end_to_end() {
    // Schema 1 uses variable ids {10, 11} and holds status values {200, 404}
    // in column 3; schema 2 uses ids {20, 21}.
    let keys_schema1: Vec<String> = [10u64, 11].iter().map(u64::to_string).collect();
    let keys_schema2: Vec<String> = [20u64, 21].iter().map(u64::to_string).collect();

    let mut cache = SchemaFilterCache::new();
    cache.insert_var_id_filter(
        1,
        ProbabilisticFilter::from_key_set(FilterKind::Bloom, &keys_schema1, common::TEST_FPR)
            .unwrap(),
    );
    cache.insert_var_id_filter(
        2,
        ProbabilisticFilter::from_key_set(FilterKind::Bloom, &keys_schema2, common::TEST_FPR)
            .unwrap(),
    );

    let mut int_filter = SchemaIntColumnFilter::new();
    for _ in 0..20 {
        int_filter.add_value(3, 200);
        int_filter.add_value(3, 404);
    }
    cache.insert_int_filter(1, int_filter);

    let searched: FxHashSet<u64> = [10u64].into_iter().collect();

    // The query's variable id and status value both exist in schema 1.
    assert!(cache.schema_admitted(1, &searched, &[(3, 404)], &[]));
    // Schema 2 never references variable id 10.
    assert!(!cache.schema_admitted(2, &searched, &[], &[]));
    // Schema 1 has no status 500 anywhere.
    assert!(!cache.schema_admitted(1, &searched, &[(3, 500)], &[]));
    // A schema with no filters loaded admits everything.
    assert!(cache.schema_admitted(3, &searched, &[(3, 500)], &[]));
}
