//! End-to-end filter build, serialization, and query scenarios

mod common;

use common::{create_temp_dir, write_filter_file};
use logsieve::{FilterConfig, FilterEnvelope, FilterKind, ProbabilisticFilter};
use rand::{Rng, SeedableRng};

#[test]
fn test_bloom_build_serialize_query() {
    let dir = create_temp_dir();
    let path = write_filter_file(
        dir.path(),
        "dict.filter",
        FilterKind::Bloom,
        &["alpha", "beta", "gamma"],
        false,
    );

    let envelope = FilterEnvelope::read_from_file(&path).unwrap();
    assert_eq!(envelope.config.kind, FilterKind::Bloom);
    assert_eq!(envelope.num_elements, 3);
    assert!(envelope.filter.possibly_contains(b"alpha"));
    assert!(envelope.filter.possibly_contains(b"beta"));
    assert!(envelope.filter.possibly_contains(b"gamma"));
    // "delta" is almost certainly rejected, but a false positive is legal;
    // the hard requirement is only on members.
}

#[test]
fn test_binary_fuse_members_and_non_member_rate() {
    let keys: Vec<String> = (0..64).map(|i| format!("member-{i:03}")).collect();
    let filter = ProbabilisticFilter::from_key_set(FilterKind::BinaryFuse, &keys, 0.01).unwrap();

    for key in &keys {
        assert!(filter.possibly_contains(key.as_bytes()), "false negative for {key}");
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let mut hits = 0usize;
    for _ in 0..1000 {
        let probe: [u8; 16] = rng.gen();
        if filter.possibly_contains(&probe) {
            hits += 1;
        }
    }
    assert!(hits <= 30, "non-member acceptance too high: {hits}/1000");
}

#[test]
fn test_round_trip_answers_identically_for_every_kind() {
    let keys: Vec<String> = (0..128).map(|i| format!("value-{i:04}")).collect();
    let probes: Vec<String> = (0..256).map(|i| format!("probe-{i:04}")).collect();

    for kind in [
        FilterKind::Bloom,
        FilterKind::BinaryFuse,
        FilterKind::PrefixSuffix,
        FilterKind::NGramPartitioned,
    ] {
        let config = FilterConfig {
            kind,
            false_positive_rate: 0.01,
            normalize: false,
        };
        let envelope = FilterEnvelope::build(config, &keys).unwrap();
        let restored = FilterEnvelope::read(&envelope.to_bytes()).unwrap();

        for probe in keys.iter().chain(probes.iter()) {
            assert_eq!(
                envelope.filter.possibly_contains(probe.as_bytes()),
                restored.filter.possibly_contains(probe.as_bytes()),
                "{kind} filter answered differently after round trip for {probe}"
            );
        }
    }
}

#[test]
fn test_empty_filters_reject_after_round_trip() {
    for kind in [
        FilterKind::Bloom,
        FilterKind::BinaryFuse,
        FilterKind::PrefixSuffix,
        FilterKind::NGramPartitioned,
    ] {
        let config = FilterConfig {
            kind,
            false_positive_rate: 0.07,
            normalize: false,
        };
        let envelope = FilterEnvelope::build::<&str>(config, &[]).unwrap();
        let restored = FilterEnvelope::read(&envelope.to_bytes()).unwrap();
        assert!(!restored.filter.possibly_contains(b"anything"), "{kind}");
        assert!(!restored.filter.possibly_contains(b""), "{kind}");
    }
}

#[test]
fn test_normalized_envelope_indexes_lowercase() {
    let config = FilterConfig {
        kind: FilterKind::Bloom,
        false_positive_rate: common::TEST_FPR,
        normalize: true,
    };
    let envelope = FilterEnvelope::build(config, &["NeedLe", "Thread"]).unwrap();
    let restored = FilterEnvelope::read(&envelope.to_bytes()).unwrap();

    assert!(restored.config.normalize);
    assert!(restored.filter.possibly_contains(b"needle"));
    assert!(restored.filter.possibly_contains(b"thread"));
}
