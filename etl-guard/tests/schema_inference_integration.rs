//! Integration tests for schema inference.

use etl_guard::prelude::*;
use etl_guard::transformers::{SchemaAccumulator, SchemaInferrer, SchemaInferrerConfig};
use serde_json::json;

fn users() -> Vec<Record> {
    (0..10)
        .map(|i| {
            let score = if i % 2 == 0 { json!(i) } else { json!(i as f64 + 0.5) };
            let plan = if i % 3 == 0 { "pro" } else { "free" };
            let referrer = if i < 4 {
                serde_json::Value::Null
            } else {
                json!("https://example.com/ref")
            };
            Record::from_json(json!({
                "user_id": format!("123e4567-e89b-12d3-a456-42661417400{i}"),
                "email": format!("user{i}@example.com"),
                "signup_date": format!("2024-01-{:02}", i + 1),
                "score": score,
                "plan": plan,
                "referrer": referrer,
            }))
            .unwrap()
        })
        .collect()
}

#[test]
fn test_inferred_fields() {
    let mut inferrer = SchemaInferrer::builder().build().unwrap();
    let out = inferrer.transform_batch(users(), None).unwrap();
    let schema = out[0].schema.as_ref().unwrap();

    let field = |name: &str| schema.get_field(name).unwrap();
    assert_eq!(field("user_id").pattern.as_deref(), Some("uuid"));
    assert_eq!(field("email").pattern.as_deref(), Some("email"));
    assert_eq!(field("signup_date").pattern.as_deref(), Some("date_iso"));
    assert_eq!(field("signup_date").description.as_deref(), Some("ISO date - field: signup_date"));

    let score = field("score");
    assert_eq!(score.field_type, FieldType::Float);
    assert_eq!(score.confidence, Some(1.0));
    assert_eq!(score.min_value, Some(FieldValue::Integer(0)));
    assert_eq!(score.max_value, Some(FieldValue::Float(9.5)));
    assert!(score.pattern.is_none());

    assert_eq!(
        field("plan").enum_values,
        Some(vec!["free".to_string(), "pro".to_string()])
    );

    let referrer = field("referrer");
    assert!(referrer.nullable);
    assert_eq!(referrer.pattern.as_deref(), Some("url"));
    assert_eq!(schema.null_counts.as_ref().unwrap()["referrer"], 4);
    assert_eq!(schema.sample_size, Some(10));
}

#[test]
fn test_int_float_mix_is_float() {
    let mut acc = SchemaAccumulator::new(SchemaInferrerConfig::default()).unwrap();
    acc.ingest(&Record::from_json(json!({"x": 1})).unwrap());
    acc.ingest(&Record::from_json(json!({"x": 2.5})).unwrap());
    let schema = acc.finalize().unwrap();
    let x = schema.get_field("x").unwrap();
    assert_eq!(x.field_type, FieldType::Float);
    assert_eq!(x.confidence, Some(1.0));
}

#[test]
fn test_disabled_features() {
    let mut inferrer = SchemaInferrer::builder()
        .detect_patterns(false)
        .infer_constraints(false)
        .build()
        .unwrap();
    let out = inferrer.transform_batch(users(), None).unwrap();
    let schema = out[0].schema.as_ref().unwrap();
    let email = schema.get_field("email").unwrap();
    assert!(email.pattern.is_none());
    assert!(email.enum_values.is_none());
    assert!(schema.get_field("score").unwrap().min_value.is_none());
    assert_eq!(email.description.as_deref(), Some("String - field: email"));
}

#[test]
fn test_field_order_is_first_seen() {
    let mut acc = SchemaAccumulator::new(SchemaInferrerConfig::default()).unwrap();
    acc.ingest(&Record::from_json(json!({"b": 1, "c": 2})).unwrap());
    acc.ingest(&Record::from_json(json!({"a": 1, "b": 2})).unwrap());
    let schema = acc.finalize().unwrap();
    assert_eq!(schema.field_names(), vec!["b", "c", "a"]);
    // "c" and "a" were each seen once, "b" twice
    assert_eq!(schema.sample_size, Some(1));
}
