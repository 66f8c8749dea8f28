//! End-to-end tests chaining several transformers over one batch.

use etl_guard::prelude::*;
use etl_guard::transformers::{
    Aggregator, AnomalyDetector, ColumnRemover, DetectionMethod, MetadataToColumns, NullRemover,
    NullStrategy, QualityScorer, SchemaInferrer, TransformerStats,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn orders() -> Vec<Record> {
    let mut values: Vec<serde_json::Value> = (0..19)
        .map(|i| {
            let region = if i % 2 == 0 { "east" } else { "west" };
            json!({"order_id": i, "region": region, "amount": 50 + i})
        })
        .collect();
    values.push(json!({"order_id": 19, "region": "east", "amount": 5000}));
    values.push(json!({"order_id": null, "region": null, "amount": null}));
    values
        .into_iter()
        .map(|v| Record::from_json(v).unwrap())
        .collect()
}

#[test]
fn test_cleaning_scoring_and_detection_chain() {
    let mut chain: Vec<Box<dyn Transformer>> = vec![
        Box::new(NullRemover::with_strategy(NullStrategy::DropAll)),
        Box::new(QualityScorer::builder().build().unwrap()),
        Box::new(
            AnomalyDetector::builder()
                .method(DetectionMethod::Iqr)
                .numeric_fields(["amount"])
                .build()
                .unwrap(),
        ),
        Box::new(MetadataToColumns::default()),
        Box::new(
            ColumnRemover::builder()
                .prefix("_meta_")
                .keep("_meta_is_anomaly")
                .keep("_meta_quality_score")
                .build()
                .unwrap(),
        ),
    ];

    let output = apply_transformers(orders(), None, &mut chain).unwrap();
    assert_eq!(output.records.len(), 20);
    assert!(output.schema.is_none());

    let flagged: Vec<&Record> = output
        .records
        .iter()
        .filter(|r| r.get("_meta_is_anomaly") == Some(&FieldValue::Bool(true)))
        .collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].get("order_id"), Some(&FieldValue::Integer(19)));

    let columns: Vec<&str> = output.records[0].data.keys().map(String::as_str).collect();
    assert_eq!(
        columns,
        vec!["_meta_is_anomaly", "_meta_quality_score", "amount", "order_id", "region"]
    );

    assert_eq!(chain[0].stats().records_filtered, 1);
    assert_eq!(
        chain[4].get_stats().extra("unique_columns_removed"),
        Some(&json!(5))
    );
}

#[test]
fn test_aggregation_schema_flows_through_chain() {
    let mut chain: Vec<Box<dyn Transformer>> = vec![
        Box::new(NullRemover::with_strategy(NullStrategy::Drop)),
        Box::new(
            Aggregator::builder()
                .group_by(["region"])
                .aggregate("revenue", "amount", "sum")
                .build()
                .unwrap(),
        ),
    ];
    let output = apply_transformers(orders(), None, &mut chain).unwrap();
    assert_eq!(output.records.len(), 2);
    assert_eq!(output.schema.as_ref().unwrap().name, "aggregated_data");
}

#[test]
fn test_inferred_schema_replaces_source_schema() {
    let source = Schema::new("orders", vec![Field::new("amount", FieldType::Integer)]);
    let mut chain: Vec<Box<dyn Transformer>> =
        vec![Box::new(SchemaInferrer::builder().build().unwrap())];
    let output = apply_transformers(orders(), Some(&source), &mut chain).unwrap();
    let schema = output.schema.unwrap();
    assert_eq!(schema.name, "inferred_schema");
    assert_eq!(schema.fields.len(), 3);

    let mut passthrough: Vec<Box<dyn Transformer>> = vec![Box::new(MetadataToColumns::default())];
    let output = apply_transformers(orders(), Some(&source), &mut passthrough).unwrap();
    assert_eq!(output.schema.unwrap().name, "orders");
}

#[derive(Debug)]
struct Lifecycle {
    setups: Arc<AtomicUsize>,
    cleanups: Arc<AtomicUsize>,
    stats: TransformerStats,
}

impl Transformer for Lifecycle {
    fn name(&self) -> &str {
        "Lifecycle"
    }

    fn setup(&mut self) -> Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        Ok(records)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

#[test]
fn test_lifecycle_hooks_run_once_per_transformer() {
    let setups = Arc::new(AtomicUsize::new(0));
    let cleanups = Arc::new(AtomicUsize::new(0));
    let mut chain: Vec<Box<dyn Transformer>> = (0..3)
        .map(|_| {
            Box::new(Lifecycle {
                setups: Arc::clone(&setups),
                cleanups: Arc::clone(&cleanups),
                stats: TransformerStats::default(),
            }) as Box<dyn Transformer>
        })
        .collect();

    apply_transformers(orders(), None, &mut chain).unwrap();
    assert_eq!(setups.load(Ordering::SeqCst), 3);
    assert_eq!(cleanups.load(Ordering::SeqCst), 3);
}

#[test]
fn test_chain_built_from_config() {
    let configs: Vec<TransformerConfig> = serde_json::from_value(json!([
        {"type": "null_remover", "strategy": "drop"},
        {"type": "deduplicator", "match_fields": ["region"]},
        {"type": "metadata_to_columns", "include_quality_breakdown": false, "prefix": "m_"}
    ]))
    .unwrap();
    let mut chain = TransformerConfig::build_all(&configs).unwrap();
    let output = apply_transformers(orders(), None, &mut chain).unwrap();

    assert_eq!(output.records.len(), 2);
    assert!(output.records[0].get("m_quality_score").is_some());
    assert!(output.records[0].get("m_completeness").is_none());
}

#[test]
fn test_failing_transformer_reports_transform_error() {
    let mut chain: Vec<Box<dyn Transformer>> = vec![Box::new(
        AnomalyDetector::builder()
            .method(DetectionMethod::IsolationForest)
            .outlier_model(Box::new(Broken))
            .build()
            .unwrap(),
    )];
    let err = apply_transformers(orders(), None, &mut chain).unwrap_err();
    assert!(matches!(err, EtlError::Transform { .. }));
    assert!(err.to_string().starts_with("Error in AnomalyDetector"));
    assert_eq!(chain[0].stats().errors, 1);
}

#[derive(Debug)]
struct Broken;

impl etl_guard::transformers::OutlierModel for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn fit_predict(&self, _features: &[Vec<f64>], _contamination: f64) -> Result<Vec<bool>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_low_quality_flag_survives_metadata_columns() {
    let records = vec![
        Record::from_json(json!({"age": 200, "email": "bad"})).unwrap(),
        Record::from_json(json!({"age": 30, "email": "ann@example.com"})).unwrap(),
    ];
    let mut chain: Vec<Box<dyn Transformer>> = vec![
        Box::new(
            QualityScorer::builder()
                .min_score(0.9)
                .flag_low_quality(true)
                .build()
                .unwrap(),
        ),
        Box::new(
            AnomalyDetector::builder()
                .method(DetectionMethod::Statistical)
                .build()
                .unwrap(),
        ),
        Box::new(MetadataToColumns::default()),
    ];
    let output = apply_transformers(records, None, &mut chain).unwrap();

    let low = &output.records[0];
    assert_eq!(low.get("_meta_is_anomaly"), Some(&FieldValue::Bool(true)));
    match low.get("_meta_anomaly_reasons") {
        Some(FieldValue::String(reasons)) => assert!(reasons.starts_with("Low quality score")),
        other => panic!("unexpected reasons: {other:?}"),
    }

    let good = &output.records[1];
    assert_eq!(good.get("_meta_is_anomaly"), Some(&FieldValue::Bool(false)));
    assert_eq!(good.get("_meta_anomaly_reasons"), Some(&FieldValue::from("")));
}
