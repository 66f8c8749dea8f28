//! # etl-guard - Batch Record Transformers for ETL Pipelines
//!
//! etl-guard is the transform stage of an extract/transform/load pipeline.
//! Sources hand it batches of loosely typed [`Record`](record::Record)s;
//! it annotates, filters, merges or reshapes them before they reach a
//! destination.
//!
//! ## Quick Start
//!
//! ```rust
//! use etl_guard::prelude::*;
//! use etl_guard::transformers::{AnomalyDetector, DetectionMethod, QualityScorer};
//! use serde_json::json;
//!
//! # fn main() -> etl_guard::error::Result<()> {
//! let mut records = Vec::new();
//! for i in 0..20 {
//!     let amount = if i == 7 { 9_000 } else { 100 + i };
//!     records.push(Record::from_json(json!({
//!         "id": i,
//!         "email": format!("user{i}@example.com"),
//!         "amount": amount,
//!     }))?);
//! }
//!
//! let mut chain: Vec<Box<dyn Transformer>> = vec![
//!     Box::new(QualityScorer::builder().min_score(0.7).build()?),
//!     Box::new(AnomalyDetector::builder().method(DetectionMethod::Iqr).build()?),
//! ];
//! let output = apply_transformers(records, None, &mut chain)?;
//!
//! let flagged: Vec<_> = output.records.iter().filter(|r| r.metadata.is_anomaly()).collect();
//! assert_eq!(flagged.len(), 1);
//! assert_eq!(flagged[0].get("id"), Some(&FieldValue::Integer(7)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Transformers
//!
//! - **Quality scoring** (`QualityScorer`): completeness, validity and
//!   consistency sub-scores combined into a weighted score per record.
//! - **Anomaly detection** (`AnomalyDetector`): z-score, IQR, isolation
//!   forest, or a majority vote of the three.
//! - **Deduplication** (`Deduplicator`): exact hashing or embedding-based
//!   fuzzy matching with configurable merge strategies.
//! - **Aggregation** (`Aggregator`): group-by with a pluggable function
//!   registry and a synthesized output schema.
//! - **Schema inference** (`SchemaInferrer`): types, nullability, string
//!   patterns and constraints from observed values.
//! - **Cleaners** (`NullRemover`, `ColumnRemover`) and
//!   `MetadataToColumns` for flat destinations.
//!
//! Transformers are built either directly through their builders or from
//! a tagged [`TransformerConfig`](transformers::TransformerConfig).
//!
//! ## Features
//!
//! - `isolation-forest` (default): built-in seeded isolation forest used by
//!   the `isolation_forest` and `combined` detection methods.
//! - `test-utils`: record batch fixtures for tests and demos.
//!
//! ## Logging
//!
//! All components log through `tracing`. Call
//! [`logging::setup::init_logging`] or install your own subscriber.

pub mod error;
pub mod logging;
pub mod prelude;
pub mod record;
pub mod transformers;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
