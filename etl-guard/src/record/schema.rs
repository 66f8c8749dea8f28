//! Schema descriptors shared between transformers and destinations.
//!
//! A schema is a value. Transformers that change the shape of a batch
//! (aggregation, schema inference) build a fresh one and attach it to their
//! output records instead of patching the incoming schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::value::FieldValue;
use crate::error::EtlError;

/// Supported field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Timestamp,
    Json,
    Array,
}

impl FieldType {
    /// Lowercase wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
            FieldType::Array => "array",
        }
    }

    /// Maps an observed value kind (see [`FieldValue::kind`]) to a field type.
    pub fn from_value_kind(kind: &str) -> FieldType {
        match kind {
            "int" => FieldType::Integer,
            "float" => FieldType::Float,
            "bool" => FieldType::Boolean,
            "list" => FieldType::Array,
            "dict" => FieldType::Json,
            _ => FieldType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "integer" => Ok(FieldType::Integer),
            "float" => Ok(FieldType::Float),
            "boolean" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "datetime" => Ok(FieldType::Datetime),
            "timestamp" => Ok(FieldType::Timestamp),
            "json" => Ok(FieldType::Json),
            "array" => Ok(FieldType::Array),
            other => Err(EtlError::configuration(format!("Unknown field type: {other}"))),
        }
    }
}

/// Schema field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    pub description: Option<String>,
    pub min_value: Option<FieldValue>,
    pub max_value: Option<FieldValue>,
    /// Regex or named pattern the string values follow
    pub pattern: Option<String>,
    pub enum_values: Option<Vec<String>>,
    /// True when the field was produced by inference rather than declared
    pub inferred: bool,
    pub confidence: Option<f64>,
}

impl Field {
    /// Creates a nullable field with no constraints.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            description: None,
            min_value: None,
            max_value: None,
            pattern: None,
            enum_values: None,
            inferred: false,
            confidence: None,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Complete schema definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<Field>,
    pub primary_key: Option<Vec<String>>,
    pub version: String,
    pub inferred: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Number of records the statistics below were computed from
    pub sample_size: Option<u64>,
    pub null_counts: Option<BTreeMap<String, u64>>,
}

impl Schema {
    /// Creates a declared (not inferred) schema.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            primary_key: None,
            version: "1.0".to_string(),
            inferred: false,
            created_at: None,
            sample_size: None,
            null_counts: None,
        }
    }

    pub fn with_primary_key(mut self, key: Vec<String>) -> Self {
        self.primary_key = Some(key);
        self
    }

    pub fn with_inferred(mut self, inferred: bool) -> Self {
        self.inferred = inferred;
        self
    }

    /// Gets a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}
