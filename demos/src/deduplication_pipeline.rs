//! Removes exact and near duplicates from a customer batch.

use etl_guard::logging::setup::{init_logging, LoggingConfig};
use etl_guard::prelude::*;
use etl_guard::test_fixtures::duplicate_customers;
use etl_guard::transformers::{Deduplicator, MatchMode, MergeStrategy};

fn show(title: &str, records: &[Record]) {
    println!("{title} ({} records)", records.len());
    for record in records {
        println!(
            "  {} {}",
            record.display_id(),
            serde_json::Value::from(FieldValue::Object(record.data.clone()))
        );
    }
    println!();
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::development())?;
    println!("=== Deduplication Pipeline ===\n");

    let records = duplicate_customers()?;
    show("Input", &records);

    let mut exact = Deduplicator::builder().build()?;
    let exact_out = exact.transform_batch(records.clone(), None)?;
    show("Exact match on all fields", &exact_out);

    let mut fuzzy = Deduplicator::builder()
        .match_mode(MatchMode::Fuzzy)
        .match_fields(["email", "name"])
        .similarity_threshold(0.85)
        .merge_strategy(MergeStrategy::KeepLast)
        .build()?;
    let fuzzy_out = fuzzy.transform_batch(records, None)?;
    show("Fuzzy match on email and name, keep last", &fuzzy_out);

    println!("{}", serde_json::to_string_pretty(&fuzzy.get_stats())?);
    Ok(())
}
