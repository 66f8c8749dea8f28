//! Rolls sales up by region and prints the synthesized schema.

use etl_guard::logging::setup::{init_logging, LoggingConfig};
use etl_guard::prelude::*;
use etl_guard::test_fixtures::sales_batch;
use etl_guard::transformers::{Aggregator, NullRemover, NullStrategy};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::development())?;
    println!("=== Aggregation Pipeline ===\n");

    let mut chain: Vec<Box<dyn Transformer>> = vec![
        Box::new(NullRemover::fill(0.0)),
        Box::new(
            Aggregator::builder()
                .group_by(["region"])
                .aggregate("revenue", "amount", "sum")
                .aggregate("avg_order", "amount", "avg")
                .aggregate("units", "units", "sum")
                .aggregate("products", "product", "list")
                .register_function("orders", FieldType::Integer, |values: &[FieldValue]| {
                    FieldValue::from(values.iter().filter(|v| !v.is_null()).count())
                })
                .aggregate("orders", "amount", "orders")
                .build()?,
        ),
    ];

    let output = apply_transformers(sales_batch()?, None, &mut chain)?;
    for record in &output.records {
        println!(
            "{} (group_size={}): {}",
            record.get("region").map(ToString::to_string).unwrap_or_default(),
            record.metadata.group_size().unwrap_or(0),
            serde_json::Value::from(FieldValue::Object(record.data.clone()))
        );
    }

    if let Some(schema) = output.schema {
        println!("\n=== Output Schema: {} ===\n", schema.name);
        for field in &schema.fields {
            println!(
                "  {:<10} {:<8} {}",
                field.name,
                field.field_type,
                field.description.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}
