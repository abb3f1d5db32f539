//! Shared utilities for integration tests

use std::path::{Path, PathBuf};

use logsieve::{FilterConfig, FilterEnvelope, FilterKind};
use tempfile::TempDir;

/// A tight rate so definitely-absent assertions carry no meaningful
/// false-positive odds.
pub const TEST_FPR: f64 = 0.0001;

#[allow(dead_code)]
pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("failed to create test temporary directory")
}

/// Builds a filter envelope file over `keys` and returns its path.
#[allow(dead_code)]
pub fn write_filter_file(
    dir: &Path,
    name: &str,
    kind: FilterKind,
    keys: &[&str],
    normalize: bool,
) -> PathBuf {
    let config = FilterConfig {
        kind,
        false_positive_rate: TEST_FPR,
        normalize,
    };
    let envelope = FilterEnvelope::build(config, keys).expect("failed to build filter envelope");
    let path = dir.join(name);
    envelope
        .write_to_file(&path)
        .expect("failed to write filter envelope");
    path
}

/// Writes a pack manifest with one `archive_id<TAB>path` line per entry.
#[allow(dead_code)]
pub fn write_manifest(dir: &Path, entries: &[(&str, &Path)]) -> PathBuf {
    let mut text = String::from("# test filter manifest\n\n");
    for (archive_id, path) in entries {
        text.push_str(&format!("{archive_id}\t{}\n", path.display()));
    }
    let path = dir.join("manifest.tsv");
    std::fs::write(&path, text).expect("failed to write manifest");
    path
}
