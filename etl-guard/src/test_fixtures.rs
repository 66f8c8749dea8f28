//! Record batch fixtures for tests, benches and demos.
//!
//! All fixtures are deterministic: the same call always yields the same
//! batch, so assertions on counts and ids stay stable.

use serde_json::json;

use crate::error::Result;
use crate::record::{Record, RecordMetadata};

/// Builds records from JSON objects, tagging each with `row-{index}`.
pub fn records_from_json<I>(values: I) -> Result<Vec<Record>>
where
    I: IntoIterator<Item = serde_json::Value>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let record = Record::from_json(value)?;
            Ok(record.with_metadata(
                RecordMetadata::new("fixture", "test_fixtures").with_record_id(format!("row-{i}")),
            ))
        })
        .collect()
}

/// Customers with a mix of clean and broken rows.
///
/// Rows 0-4 are complete and valid. Row 5 misses its email, row 6 has an
/// invalid email and an impossible age, row 7 is mostly empty.
pub fn customer_batch() -> Result<Vec<Record>> {
    records_from_json([
        json!({"customer_id": 1, "name": "Ada Lovelace", "email": "ada@example.com",
               "age": 36, "country": "UK"}),
        json!({"customer_id": 2, "name": "Grace Hopper", "email": "grace@example.com",
               "age": 45, "country": "US"}),
        json!({"customer_id": 3, "name": "Alan Turing", "email": "alan@example.com",
               "age": 41, "country": "UK"}),
        json!({"customer_id": 4, "name": "Edsger Dijkstra", "email": "edsger@example.nl",
               "age": 52, "country": "NL"}),
        json!({"customer_id": 5, "name": "Barbara Liskov", "email": "barbara@example.com",
               "age": 38, "country": "US"}),
        json!({"customer_id": 6, "name": "Ken Thompson", "email": null,
               "age": 50, "country": "US"}),
        json!({"customer_id": 7, "name": "Dennis Ritchie", "email": "not-an-email",
               "age": 200, "country": "US"}),
        json!({"customer_id": 8, "name": "", "email": "", "age": null, "country": null}),
    ])
}

/// `n` transactions with amounts near 100 and one outlier at `outlier_index`.
pub fn transactions_with_outlier(
    n: usize,
    outlier_index: usize,
    outlier_amount: f64,
) -> Result<Vec<Record>> {
    records_from_json((0..n).map(|i| {
        let amount = if i == outlier_index {
            outlier_amount
        } else {
            100.0 + (i % 7) as f64 - 3.0
        };
        json!({
            "transaction_id": format!("T{i:04}"),
            "amount": amount,
            "quantity": 1 + (i % 3),
        })
    }))
}

/// Customers with exact and near duplicates.
///
/// Rows 0 and 2 are exact duplicates; row 3 differs from row 1 by a typo
/// in the name.
pub fn duplicate_customers() -> Result<Vec<Record>> {
    records_from_json([
        json!({"email": "ada@example.com", "name": "Ada Lovelace", "city": "London"}),
        json!({"email": "grace@example.com", "name": "Grace Hopper", "city": "Arlington"}),
        json!({"email": "ada@example.com", "name": "Ada Lovelace", "city": "London"}),
        json!({"email": "grace@example.com", "name": "Grace Hoper", "city": "Arlington"}),
        json!({"email": "alan@example.com", "name": "Alan Turing", "city": "Wilmslow"}),
    ])
}

/// Sales rows for group-by tests: three regions, two products.
pub fn sales_batch() -> Result<Vec<Record>> {
    records_from_json([
        json!({"region": "north", "product": "widget", "amount": 120.0, "units": 3}),
        json!({"region": "south", "product": "widget", "amount": 80.0, "units": 2}),
        json!({"region": "north", "product": "gadget", "amount": 200.0, "units": 1}),
        json!({"region": "east", "product": "widget", "amount": null, "units": 5}),
        json!({"region": "south", "product": "gadget", "amount": 45.5, "units": 1}),
        json!({"region": "north", "product": "widget", "amount": 60.0, "units": 2}),
    ])
}

/// Records with typed and patterned fields for schema inference.
pub fn schema_sample_batch() -> Result<Vec<Record>> {
    records_from_json((0..10).map(|i| {
        let score = if i % 2 == 0 { json!(i) } else { json!(i as f64 + 0.5) };
        let plan = if i % 3 == 0 { "pro" } else { "free" };
        let referrer = if i < 4 {
            serde_json::Value::Null
        } else {
            json!("https://example.com/ref")
        };
        json!({
            "user_id": format!("123e4567-e89b-12d3-a456-42661417400{i}"),
            "email": format!("user{i}@example.com"),
            "signup_date": format!("2024-01-{:02}", i + 1),
            "score": score,
            "plan": plan,
            "referrer": referrer,
        })
    }))
}
