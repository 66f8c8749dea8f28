//! Schema inference from observed records.
//!
//! [`SchemaAccumulator`] folds records into per-field statistics (type
//! histogram, null count, numeric range, sampled values, string pattern
//! histogram) and turns them into a [`Schema`] on demand. [`SchemaInferrer`]
//! wraps an accumulator as a transformer: it never filters or rewrites
//! data, it only attaches the inferred schema to every record it sees.
//!
//! Statistics accumulate across batches until the transformer's stats are
//! reset, so later batches get a schema computed from everything seen so
//! far.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{Transformer, TransformerStats};
use crate::error::{EtlError, Result};
use crate::record::{keys, Field, FieldType, FieldValue, Record, Schema};

/// Name of the inferred schema.
pub const INFERRED_SCHEMA_NAME: &str = "inferred_schema";

/// A named string format recognized during inference.
#[derive(Debug)]
pub struct StringPattern {
    pub name: &'static str,
    /// Human-readable label used in field descriptions
    pub label: &'static str,
    pub regex: Regex,
}

/// Recognized string formats, checked in order; the first match wins.
pub static PATTERNS: Lazy<Vec<StringPattern>> = Lazy::new(|| {
    let table: [(&str, &str, &str); 9] = [
        ("email", "Email address", r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"),
        ("url", "URL", r"^https?://[^\s]+$"),
        ("ipv4", "IPv4 address", r"^(\d{1,3}\.){3}\d{1,3}$"),
        ("phone_us", "US phone number", r"^\+?1?\s*\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$"),
        ("date_iso", "ISO date", r"^\d{4}-\d{2}-\d{2}$"),
        ("datetime_iso", "ISO datetime", r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}"),
        (
            "uuid",
            "UUID",
            r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
        ),
        ("credit_card", "Credit card number", r"^\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}$"),
        ("ssn", "Social Security Number", r"^\d{3}-\d{2}-\d{4}$"),
    ];
    table
        .into_iter()
        .map(|(name, label, pattern)| StringPattern {
            name,
            label,
            // Hard-coded patterns, known to be valid
            #[allow(clippy::expect_used)]
            regex: Regex::new(pattern).expect("Hard-coded regex pattern should be valid"),
        })
        .collect()
});

/// Name of the first pattern `value` matches.
pub fn detect_pattern(value: &str) -> Option<&'static str> {
    PATTERNS
        .iter()
        .find(|p| p.regex.is_match(value))
        .map(|p| p.name)
}

fn pattern_label(name: &str) -> &str {
    PATTERNS
        .iter()
        .find(|p| p.name == name)
        .map_or(name, |p| p.label)
}

/// Configuration for [`SchemaInferrer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaInferrerConfig {
    /// Maximum number of values sampled per field for enum suggestion
    pub sample_size: usize,
    /// Minimum share of string values a pattern must match
    pub confidence_threshold: f64,
    pub detect_patterns: bool,
    /// Infer numeric min/max and enum values
    pub infer_constraints: bool,
    pub suggest_enums: bool,
    /// Maximum distinct values for an enum suggestion
    pub enum_threshold: usize,
}

impl Default for SchemaInferrerConfig {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            confidence_threshold: 0.8,
            detect_patterns: true,
            infer_constraints: true,
            suggest_enums: true,
            enum_threshold: 10,
        }
    }
}

impl SchemaInferrerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EtlError::configuration(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.sample_size == 0 {
            return Err(EtlError::configuration("sample_size must be at least 1"));
        }
        Ok(())
    }
}

/// Insertion-ordered counter; ties resolve to the first key counted.
#[derive(Debug, Clone, Default)]
struct OrderedCounter {
    entries: Vec<(&'static str, u64)>,
}

impl OrderedCounter {
    fn add(&mut self, key: &'static str) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((key, 1)),
        }
    }

    fn get(&self, key: &str) -> u64 {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map_or(0, |(_, c)| *c)
    }

    fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    fn most_common(&self) -> Option<(&'static str, u64)> {
        let mut best: Option<(&'static str, u64)> = None;
        for &(key, count) in &self.entries {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((key, count));
            }
        }
        best
    }
}

#[derive(Debug, Clone, Default)]
struct FieldStats {
    total: u64,
    nulls: u64,
    types: OrderedCounter,
    samples: Vec<FieldValue>,
    strings: u64,
    patterns: OrderedCounter,
    min: Option<FieldValue>,
    max: Option<FieldValue>,
}

impl FieldStats {
    fn observe(&mut self, value: &FieldValue, config: &SchemaInferrerConfig) {
        self.total += 1;
        if value.is_empty() {
            self.nulls += 1;
            return;
        }

        self.types.add(value.kind());
        if self.samples.len() < config.sample_size {
            self.samples.push(value.clone());
        }

        if let Some(x) = value.as_f64() {
            if self.min.as_ref().and_then(FieldValue::as_f64).map_or(true, |m| x < m) {
                self.min = Some(value.clone());
            }
            if self.max.as_ref().and_then(FieldValue::as_f64).map_or(true, |m| x > m) {
                self.max = Some(value.clone());
            }
        }

        if let Some(s) = value.as_str() {
            self.strings += 1;
            if config.detect_patterns {
                if let Some(pattern) = detect_pattern(s) {
                    self.patterns.add(pattern);
                }
            }
        }
    }
}

/// Accumulates field statistics and produces a schema on demand.
#[derive(Debug, Clone)]
pub struct SchemaAccumulator {
    config: SchemaInferrerConfig,
    fields: Vec<(String, FieldStats)>,
    index: HashMap<String, usize>,
    records_seen: u64,
}

impl SchemaAccumulator {
    pub fn new(config: SchemaInferrerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fields: Vec::new(),
            index: HashMap::new(),
            records_seen: 0,
        })
    }

    /// Folds one record into the statistics.
    pub fn ingest(&mut self, record: &Record) {
        self.records_seen += 1;
        for (name, value) in &record.data {
            let slot = match self.index.get(name) {
                Some(&slot) => slot,
                None => {
                    self.index.insert(name.clone(), self.fields.len());
                    self.fields.push((name.clone(), FieldStats::default()));
                    self.fields.len() - 1
                }
            };
            self.fields[slot].1.observe(value, &self.config);
        }
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Builds a schema from everything ingested so far.
    ///
    /// Returns `None` before the first record.
    pub fn finalize(&self) -> Option<Schema> {
        if self.records_seen == 0 {
            return None;
        }

        let fields: Vec<Field> = self
            .fields
            .iter()
            .map(|(name, stats)| self.infer_field(name, stats))
            .collect();
        let observations: u64 = self.fields.iter().map(|(_, s)| s.total).sum();
        let sample_size = observations.checked_div(self.fields.len() as u64).unwrap_or(0);
        let null_counts: BTreeMap<String, u64> = self
            .fields
            .iter()
            .map(|(name, stats)| (name.clone(), stats.nulls))
            .collect();

        let mut schema = Schema::new(INFERRED_SCHEMA_NAME, fields).with_inferred(true);
        schema.created_at = Some(Utc::now());
        schema.sample_size = Some(sample_size);
        schema.null_counts = Some(null_counts);
        Some(schema)
    }

    pub fn reset(&mut self) {
        self.fields.clear();
        self.index.clear();
        self.records_seen = 0;
    }

    fn infer_field(&self, name: &str, stats: &FieldStats) -> Field {
        let (field_type, confidence) = infer_type(&stats.types);

        let pattern = if field_type == FieldType::String && self.config.detect_patterns {
            self.dominant_pattern(stats)
        } else {
            None
        };

        let mut field = Field::new(name, field_type).with_nullable(stats.nulls > 0);
        if self.config.infer_constraints {
            field.min_value = stats.min.clone();
            field.max_value = stats.max.clone();

            if self.config.suggest_enums && !stats.samples.is_empty() {
                let mut distinct: Vec<String> =
                    stats.samples.iter().map(ToString::to_string).collect();
                distinct.sort();
                distinct.dedup();
                if distinct.len() <= self.config.enum_threshold {
                    field.enum_values = Some(distinct);
                }
            }
        }

        let kind = match pattern {
            Some(p) => pattern_label(p).to_string(),
            None => capitalize(field_type.as_str()),
        };
        field.description = Some(format!("{kind} - field: {name}"));
        field.pattern = pattern.map(str::to_string);
        field.inferred = true;
        field.confidence = Some(confidence);
        field
    }

    fn dominant_pattern(&self, stats: &FieldStats) -> Option<&'static str> {
        if stats.strings == 0 {
            return None;
        }
        let (pattern, count) = stats.patterns.most_common()?;
        let share = count as f64 / stats.strings as f64;
        (share >= self.config.confidence_threshold).then_some(pattern)
    }
}

/// Dominant type and its share of the typed observations.
fn infer_type(types: &OrderedCounter) -> (FieldType, f64) {
    let typed = types.total();
    let Some((kind, count)) = types.most_common() else {
        return (FieldType::String, 0.0);
    };

    let ints = types.get("int");
    let floats = types.get("float");
    if ints > 0 && floats > 0 {
        return (FieldType::Float, (ints + floats) as f64 / typed as f64);
    }
    (FieldType::from_value_kind(kind), count as f64 / typed as f64)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Transformer that attaches an inferred schema to every record.
#[derive(Debug)]
pub struct SchemaInferrer {
    accumulator: SchemaAccumulator,
    stats: TransformerStats,
}

impl SchemaInferrer {
    pub fn new(config: SchemaInferrerConfig) -> Result<Self> {
        Ok(Self {
            accumulator: SchemaAccumulator::new(config)?,
            stats: TransformerStats::default(),
        })
    }

    pub fn builder() -> SchemaInferrerBuilder {
        SchemaInferrerBuilder::default()
    }

    pub fn accumulator(&self) -> &SchemaAccumulator {
        &self.accumulator
    }

    /// Schema computed from every record seen so far.
    pub fn inferred_schema(&self) -> Option<Schema> {
        self.accumulator.finalize()
    }

    #[instrument(skip(self, records), fields(batch_size = records.len()))]
    fn infer_batch(&mut self, mut records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        for record in &records {
            self.accumulator.ingest(record);
        }
        self.stats.records_processed += records.len() as u64;

        let schema = self
            .accumulator
            .finalize()
            .map(Arc::new)
            .ok_or_else(|| EtlError::Internal("no records ingested".to_string()))?;

        for record in &mut records {
            record.schema = Some(Arc::clone(&schema));
            record.metadata.set(keys::SCHEMA_INFERRED, true);
        }

        info!(
            fields = schema.fields.len(),
            records = records.len(),
            "Inferred schema with {} fields from {} records",
            schema.fields.len(),
            records.len()
        );
        Ok(records)
    }
}

impl Transformer for SchemaInferrer {
    fn name(&self) -> &str {
        "SchemaInferrer"
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        self.infer_batch(records).map_err(|e| {
            self.stats.errors += 1;
            EtlError::wrap_transform("SchemaInferrer", e)
        })
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        let mut extras = BTreeMap::new();
        extras.insert(
            "fields_inferred".to_string(),
            serde_json::json!(self.accumulator.field_count()),
        );
        extras
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
        self.accumulator.reset();
    }
}

/// Builder for [`SchemaInferrer`].
#[derive(Debug, Default)]
pub struct SchemaInferrerBuilder {
    config: SchemaInferrerConfig,
}

impl SchemaInferrerBuilder {
    pub fn sample_size(mut self, size: usize) -> Self {
        self.config.sample_size = size;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn detect_patterns(mut self, enable: bool) -> Self {
        self.config.detect_patterns = enable;
        self
    }

    pub fn infer_constraints(mut self, enable: bool) -> Self {
        self.config.infer_constraints = enable;
        self
    }

    pub fn suggest_enums(mut self, enable: bool) -> Self {
        self.config.suggest_enums = enable;
        self
    }

    pub fn enum_threshold(mut self, threshold: usize) -> Self {
        self.config.enum_threshold = threshold;
        self
    }

    pub fn build(self) -> Result<SchemaInferrer> {
        SchemaInferrer::new(self.config)
    }
}
