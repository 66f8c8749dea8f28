//! Property-based tests for the transformer invariants.
//!
//! Each property builds a batch from generated values, runs one
//! transformer and checks a relation that must hold for every input:
//!
//! - aggregation conserves records (group sizes) and sums
//! - a single far outlier is always found by z-score and IQR detection
//! - exact deduplication does not depend on batch order
//! - fuzzy deduplication with `keep_first` is idempotent
//! - quality scores stay within `[0, 1]`

use etl_guard::prelude::*;
use etl_guard::transformers::anomaly::statistics::iqr_outliers;
use etl_guard::transformers::{
    Aggregator, AnomalyDetector, Deduplicator, DetectionMethod, MatchMode, QualityScorer,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

fn keyed(rows: &[(u8, i64)]) -> Vec<Record> {
    rows.iter()
        .map(|(k, v)| Record::from_json(json!({"k": format!("g{k}"), "v": v})).unwrap())
        .collect()
}

fn values_of(records: &[Record], field: &str) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get(field).map(ToString::to_string).unwrap_or_default())
        .collect()
}

proptest! {
    #[test]
    fn prop_group_sizes_sum_to_batch_size(
        rows in prop::collection::vec((0u8..6, -1000i64..1000), 1..80)
    ) {
        let mut aggregator = Aggregator::builder()
            .group_by(["k"])
            .aggregate("total", "v", "sum")
            .build()
            .unwrap();
        let out = aggregator.transform_batch(keyed(&rows), None).unwrap();

        let sizes: u64 = out.iter().filter_map(|r| r.metadata.group_size()).sum();
        prop_assert_eq!(sizes, rows.len() as u64);

        let distinct: BTreeSet<u8> = rows.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(out.len(), distinct.len());

        let expected: i64 = rows.iter().map(|(_, v)| v).sum();
        let total: f64 = out
            .iter()
            .filter_map(|r| r.get("total").and_then(FieldValue::as_f64))
            .sum();
        prop_assert!((total - expected as f64).abs() < 1e-6);
    }

    #[test]
    fn prop_zscore_finds_single_outlier(
        n in 11usize..60,
        base in -1000i64..1000,
        delta in prop_oneof![1i64..1_000_000, -1_000_000i64..-1],
        position in any::<prop::sample::Index>()
    ) {
        let at = position.index(n);
        let records: Vec<Record> = (0..n)
            .map(|i| {
                let v = if i == at { base + delta } else { base };
                Record::from_json(json!({"v": v})).unwrap()
            })
            .collect();

        let mut detector = AnomalyDetector::builder()
            .method(DetectionMethod::Statistical)
            .build()
            .unwrap();
        let out = detector.transform_batch(records, None).unwrap();
        let flagged: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, r)| r.metadata.is_anomaly())
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(flagged, vec![at]);
    }

    #[test]
    fn prop_iqr_flags_far_outlier(base in prop::collection::vec(0.0f64..100.0, 4..50)) {
        let mut column: Vec<Option<f64>> = base.iter().copied().map(Some).collect();
        column.push(Some(1e6));
        let flags = iqr_outliers(&column, 1.5).unwrap();
        prop_assert!(flags[flags.len() - 1]);
    }

    #[test]
    fn prop_exact_dedup_is_order_independent(
        rows in prop::collection::vec((0u8..5, 0i64..3), 1..40)
    ) {
        let forward = keyed(&rows);
        let mut reversed = keyed(&rows);
        reversed.reverse();

        let mut dedup = Deduplicator::builder().build().unwrap();
        let a = dedup.transform_batch(forward, None).unwrap();
        let b = dedup.transform_batch(reversed, None).unwrap();

        let as_set = |records: &[Record]| -> BTreeSet<(String, String)> {
            values_of(records, "k").into_iter().zip(values_of(records, "v")).collect()
        };
        prop_assert_eq!(a.len(), b.len());
        prop_assert_eq!(as_set(&a), as_set(&b));

        let distinct: BTreeSet<(u8, i64)> = rows.iter().copied().collect();
        prop_assert_eq!(a.len(), distinct.len());
    }

    #[test]
    fn prop_fuzzy_keep_first_is_idempotent(
        names in prop::collection::vec("[a-c]{1,4}( [a-c]{1,4})?", 1..25)
    ) {
        let records: Vec<Record> = names
            .iter()
            .map(|n| Record::from_json(json!({"name": n})).unwrap())
            .collect();

        let mut dedup = Deduplicator::builder()
            .match_mode(MatchMode::Fuzzy)
            .similarity_threshold(0.8)
            .build()
            .unwrap();
        let once = dedup.transform_batch(records, None).unwrap();
        let first_names = values_of(&once, "name");
        let twice = dedup.transform_batch(once, None).unwrap();
        prop_assert_eq!(values_of(&twice, "name"), first_names);
    }

    #[test]
    fn prop_quality_scores_are_bounded(
        age in prop::option::of(-500i64..500),
        email in prop::option::of("[a-z@.]{0,12}"),
        price in prop::option::of(-1e6f64..1e6)
    ) {
        let record =
            Record::from_json(json!({"age": age, "email": email, "price": price})).unwrap();
        let scorer = QualityScorer::builder().build().unwrap();
        let breakdown = scorer.assess(&record.data).breakdown;
        for score in [
            breakdown.completeness,
            breakdown.validity,
            breakdown.consistency,
            breakdown.overall,
        ] {
            prop_assert!((0.0..=1.0 + 1e-12).contains(&score), "score {}", score);
        }
    }
}
