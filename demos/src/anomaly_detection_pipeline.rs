//! Scores a transaction batch, flags outliers and exposes the flags as columns.

use etl_guard::logging::setup::{init_logging, LoggingConfig};
use etl_guard::prelude::*;
use etl_guard::test_fixtures::transactions_with_outlier;
use etl_guard::transformers::{AnomalyDetector, DetectionMethod, MetadataToColumns, QualityScorer};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::development())?;
    println!("=== Anomaly Detection Pipeline ===\n");

    let records = transactions_with_outlier(200, 57, 25_000.0)?;
    println!("Loaded {} transactions", records.len());

    let mut chain: Vec<Box<dyn Transformer>> = vec![
        Box::new(QualityScorer::builder().min_score(0.8).flag_low_quality(true).build()?),
        Box::new(
            AnomalyDetector::builder()
                .method(DetectionMethod::Combined)
                .numeric_fields(["amount", "quantity"])
                .build()?,
        ),
        Box::new(MetadataToColumns::default()),
    ];

    let output = apply_transformers(records, None, &mut chain)?;

    println!("\n=== Flagged Records ===\n");
    for record in output.records.iter().filter(|r| r.metadata.is_anomaly()) {
        println!(
            "{} amount={} reasons: {}",
            record.display_id(),
            record.get("amount").map(ToString::to_string).unwrap_or_default(),
            record.get("_meta_anomaly_reasons").map(ToString::to_string).unwrap_or_default()
        );
    }

    println!("\n=== Statistics ===\n");
    for transformer in &chain {
        println!("{}", serde_json::to_string_pretty(&transformer.get_stats())?);
    }
    Ok(())
}
