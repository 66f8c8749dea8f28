//! Infers a schema from a sample batch and prints it as JSON.

use etl_guard::logging::setup::{init_logging, LoggingConfig};
use etl_guard::prelude::*;
use etl_guard::test_fixtures::schema_sample_batch;
use etl_guard::transformers::SchemaInferrer;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::development())?;
    println!("=== Schema Inference Pipeline ===\n");

    let mut inferrer = SchemaInferrer::builder()
        .confidence_threshold(0.9)
        .enum_threshold(5)
        .build()?;
    let records = inferrer.transform_batch(schema_sample_batch()?, None)?;

    let Some(schema) = records.first().and_then(|r| r.schema.clone()) else {
        println!("No records, no schema");
        return Ok(());
    };

    for field in &schema.fields {
        println!(
            "  {:<12} {:<8} nullable={:<5} confidence={:.2} pattern={}",
            field.name,
            field.field_type,
            field.nullable,
            field.confidence.unwrap_or(0.0),
            field.pattern.as_deref().unwrap_or("-")
        );
    }

    println!("\n{}", serde_json::to_string_pretty(&*schema)?);
    Ok(())
}
