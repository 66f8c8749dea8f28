//! Record model flowing between sources, transformers and destinations.
//!
//! A [`Record`] carries a schema-less payload (`data`) plus a metadata side
//! channel. Transformers signal each other through `metadata.custom` using
//! the key names in [`keys`]; ordering those transformers is the caller's
//! responsibility.

pub mod schema;
pub mod value;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use schema::{Field, FieldType, Schema};
pub use value::FieldValue;

use crate::error::{EtlError, Result};

/// Record payload: field name to value, iterated in key order.
pub type RecordData = BTreeMap<String, FieldValue>;

/// Well-known keys of `RecordMetadata::custom`.
pub mod keys {
    pub const IS_ANOMALY: &str = "is_anomaly";
    pub const ANOMALY_METHOD: &str = "anomaly_method";
    pub const ANOMALY_REASONS: &str = "anomaly_reasons";
    pub const ANOMALY_SCORE: &str = "anomaly_score";
    pub const QUALITY_BREAKDOWN: &str = "quality_breakdown";
    pub const QUALITY_ISSUES: &str = "quality_issues";
    pub const GROUP_SIZE: &str = "group_size";
    pub const TRANSFORMATION_TYPE: &str = "transformation_type";
    pub const SCHEMA_INFERRED: &str = "schema_inferred";
}

/// Metadata associated with a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source kind (`csv`, `postgres`, `api`, ...)
    pub source_type: String,
    /// File path, table name, endpoint, ...
    pub source_id: String,
    pub record_id: Option<String>,
    /// Overall quality score in `[0, 1]`, written by the quality scorer
    pub quality_score: Option<f64>,
    pub pipeline_id: String,
    /// Lifecycle stage: `extract`, `transform` or `load`
    pub stage: String,
    pub custom: BTreeMap<String, FieldValue>,
}

impl RecordMetadata {
    pub fn new(source_type: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            source_id: source_id.into(),
            ..Default::default()
        }
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    /// Sets a custom side-channel value.
    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.custom.insert(key.to_string(), value.into());
    }

    /// Reads a custom side-channel value.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.custom.get(key)
    }

    /// Whether an anomaly detector (or the quality scorer) flagged this record.
    pub fn is_anomaly(&self) -> bool {
        self.get(keys::IS_ANOMALY)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false)
    }

    pub fn anomaly_method(&self) -> Option<&str> {
        self.get(keys::ANOMALY_METHOD).and_then(FieldValue::as_str)
    }

    /// Human-readable anomaly reasons, one entry per line of explanation.
    pub fn anomaly_reasons(&self) -> Vec<String> {
        match self.get(keys::ANOMALY_REASONS) {
            Some(FieldValue::Array(items)) => items.iter().map(ToString::to_string).collect(),
            Some(FieldValue::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Quality sub-scores keyed by dimension name, plus `overall`.
    pub fn quality_breakdown(&self) -> Option<BTreeMap<String, f64>> {
        let map = self.get(keys::QUALITY_BREAKDOWN)?.as_object()?;
        Some(
            map.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect(),
        )
    }

    /// Number of input records folded into this (aggregated) record.
    pub fn group_size(&self) -> Option<u64> {
        self.get(keys::GROUP_SIZE)
            .and_then(FieldValue::as_i64)
            .and_then(|v| u64::try_from(v).ok())
    }
}

/// Standardized record format for pipeline data flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: RecordData,
    pub metadata: RecordMetadata,
    /// Schema attached by the last transformer that replaced it
    pub schema: Option<Arc<Schema>>,
    pub extracted_at: Option<DateTime<Utc>>,
    pub transformed_at: Option<DateTime<Utc>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a record from a payload with empty metadata.
    pub fn new(data: RecordData) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// Creates a record from a JSON object.
    ///
    /// Anything other than an object is rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match FieldValue::from(value) {
            FieldValue::Object(map) => Ok(Self::new(map)),
            other => Err(EtlError::record(
                None,
                format!("expected a JSON object, got {}", other.kind()),
            )),
        }
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Gets a payload value by field name.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.data.get(field)
    }

    /// Sets a payload value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.data.insert(field.into(), value.into());
    }

    /// Identifier used in log lines and error messages.
    pub fn display_id(&self) -> &str {
        self.metadata.record_id.as_deref().unwrap_or("<unidentified>")
    }

    /// Stamps the record as having passed through a transformer.
    pub(crate) fn mark_transformed(&mut self) {
        self.transformed_at = Some(Utc::now());
        self.metadata.stage = "transform".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object() {
        let record = Record::from_json(json!({"name": "Ada", "age": 36})).unwrap();
        assert_eq!(record.get("age"), Some(&FieldValue::Integer(36)));
        assert!(record.schema.is_none());
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Record::from_json(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn test_metadata_accessors() {
        let mut meta = RecordMetadata::new("csv", "people.csv");
        assert!(!meta.is_anomaly());

        meta.set(keys::IS_ANOMALY, true);
        meta.set(keys::ANOMALY_METHOD, "iqr");
        meta.set(
            keys::ANOMALY_REASONS,
            vec!["age=200 is out of range".to_string()],
        );
        meta.set(keys::GROUP_SIZE, 4_i64);

        assert!(meta.is_anomaly());
        assert_eq!(meta.anomaly_method(), Some("iqr"));
        assert_eq!(meta.anomaly_reasons(), vec!["age=200 is out of range"]);
        assert_eq!(meta.group_size(), Some(4));
    }

    #[test]
    fn test_mark_transformed() {
        let mut record = Record::default();
        record.mark_transformed();
        assert_eq!(record.metadata.stage, "transform");
        assert!(record.transformed_at.is_some());
    }
}
