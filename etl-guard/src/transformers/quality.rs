//! Rule-based data quality scoring.
//!
//! Each record gets three sub-scores in `[0, 1]`:
//!
//! - **completeness**: share of fields holding a non-null, non-empty value
//! - **validity**: per-field sanity checks (string length, email shape,
//!   numeric magnitude)
//! - **consistency**: name-based expectations (`age` in `(0, 150)`,
//!   positive `salary`/`price`, non-negative integer ids, string emails)
//!
//! The overall score is the weighted sum of the three and is written to
//! `metadata.quality_score`; the breakdown goes to
//! `metadata.custom["quality_breakdown"]`.
//!
//! ## Example
//!
//! ```rust
//! use etl_guard::prelude::*;
//! use etl_guard::transformers::QualityScorer;
//! use serde_json::json;
//!
//! # fn main() -> etl_guard::error::Result<()> {
//! let mut scorer = QualityScorer::builder()
//!     .min_score(0.8)
//!     .flag_low_quality(true)
//!     .build()?;
//!
//! let record = Record::from_json(json!({"age": 200, "email": "nobody"}))?;
//! let scored = scorer.transform_batch(vec![record], None)?;
//! assert!(scored[0].metadata.quality_score.unwrap() < 0.8);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use super::{Transformer, TransformerStats};
use crate::error::{EtlError, Result};
use crate::logging::LogConfig;
use crate::record::{keys, FieldValue, Record, RecordData, Schema};

/// Allowed deviation of the weight sum from 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Strings longer than this are treated as corrupted.
const MAX_STRING_LENGTH: usize = 10_000;

/// Strings longer than this get partial validity credit.
const LONG_STRING_LENGTH: usize = 1_000;

/// Numbers whose magnitude exceeds this are treated as corrupted.
const MAX_NUMERIC_MAGNITUDE: f64 = 1e15;

/// Maximum number of issues quoted in a low-quality reason string.
const MAX_REPORTED_ISSUES: usize = 3;

/// Relative weights of the three quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f64,
    pub validity: f64,
    pub consistency: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.4,
            validity: 0.3,
            consistency: 0.3,
        }
    }
}

impl QualityWeights {
    pub fn new(completeness: f64, validity: f64, consistency: f64) -> Self {
        Self {
            completeness,
            validity,
            consistency,
        }
    }

    fn validate(&self) -> Result<()> {
        let parts = [self.completeness, self.validity, self.consistency];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EtlError::configuration(format!(
                "Weights must be finite and non-negative, got {parts:?}"
            )));
        }
        let total: f64 = parts.iter().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EtlError::configuration(format!(
                "Weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

/// Configuration for [`QualityScorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityScorerConfig {
    /// Records scoring below this are "low quality"
    pub min_score: f64,
    /// Drop low-quality records
    pub filter_low_quality: bool,
    /// Mark low-quality records in their payload (ignored when filtering)
    pub flag_low_quality: bool,
    pub weights: QualityWeights,
}

impl Default for QualityScorerConfig {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            filter_low_quality: false,
            flag_low_quality: false,
            weights: QualityWeights::default(),
        }
    }
}

impl QualityScorerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(EtlError::configuration(format!(
                "min_score must be in [0, 1], got {}",
                self.min_score
            )));
        }
        self.weights.validate()
    }
}

/// Sub-scores of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub completeness: f64,
    pub validity: f64,
    pub consistency: f64,
    pub overall: f64,
}

impl QualityBreakdown {
    fn to_field_value(self) -> FieldValue {
        let mut map = BTreeMap::new();
        map.insert("completeness".to_string(), FieldValue::Float(self.completeness));
        map.insert("validity".to_string(), FieldValue::Float(self.validity));
        map.insert("consistency".to_string(), FieldValue::Float(self.consistency));
        map.insert("overall".to_string(), FieldValue::Float(self.overall));
        FieldValue::Object(map)
    }
}

/// Result of scoring a payload: the breakdown plus every failed check.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAssessment {
    pub breakdown: QualityBreakdown,
    /// One entry per failed check, in field order
    pub issues: Vec<String>,
}

/// Transformer that scores each record's quality.
#[derive(Debug)]
pub struct QualityScorer {
    config: QualityScorerConfig,
    log_config: LogConfig,
    stats: TransformerStats,
    score_sum: f64,
    scored_records: u64,
    low_quality_records: u64,
}

impl QualityScorer {
    /// Creates a scorer, validating the configuration.
    pub fn new(config: QualityScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            log_config: LogConfig::default(),
            stats: TransformerStats::default(),
            score_sum: 0.0,
            scored_records: 0,
            low_quality_records: 0,
        })
    }

    pub fn builder() -> QualityScorerBuilder {
        QualityScorerBuilder::default()
    }

    pub fn config(&self) -> &QualityScorerConfig {
        &self.config
    }

    /// Scores a payload without touching any record or counter.
    pub fn assess(&self, data: &RecordData) -> QualityAssessment {
        let mut issues = Vec::new();
        let completeness = score_completeness(data, &mut issues);
        let validity = score_validity(data, &mut issues);
        let consistency = score_consistency(data, &mut issues);
        let weights = &self.config.weights;
        let overall = completeness * weights.completeness
            + validity * weights.validity
            + consistency * weights.consistency;

        QualityAssessment {
            breakdown: QualityBreakdown {
                completeness,
                validity,
                consistency,
                overall,
            },
            issues,
        }
    }

    /// Scores one record.
    ///
    /// Returns `Ok(None)` when the record is filtered out.
    pub fn score(&mut self, mut record: Record) -> Result<Option<Record>> {
        let QualityAssessment { breakdown, issues } = self.assess(&record.data);

        let sub_scores = [
            breakdown.completeness,
            breakdown.validity,
            breakdown.consistency,
            breakdown.overall,
        ];
        if sub_scores.iter().any(|s| !s.is_finite()) {
            return Err(EtlError::record(
                record.metadata.record_id.as_deref(),
                format!("quality score is not finite: {breakdown:?}"),
            ));
        }

        self.score_sum += breakdown.overall;
        self.scored_records += 1;

        record.metadata.quality_score = Some(breakdown.overall);
        record
            .metadata
            .set(keys::QUALITY_BREAKDOWN, breakdown.to_field_value());

        if breakdown.overall < self.config.min_score {
            self.low_quality_records += 1;

            if self.config.filter_low_quality {
                debug!(
                    record_id = record.display_id(),
                    score = breakdown.overall,
                    "Filtered low-quality record"
                );
                self.stats.records_filtered += 1;
                return Ok(None);
            }

            if self.config.flag_low_quality {
                let reason = low_quality_reason(&breakdown, &issues);
                if self.log_config.log_record_details {
                    debug!(
                        record_id = record.display_id(),
                        reason = %self.log_config.truncate(&reason),
                        "Flagged low-quality record"
                    );
                }
                record.set("_meta_is_anomaly", true);
                record.set("_meta_anomaly_reasons", reason);
                record.metadata.set(keys::QUALITY_ISSUES, issues);
            }
        }

        record.mark_transformed();
        self.stats.records_modified += 1;
        self.stats.records_processed += 1;
        Ok(Some(record))
    }

    fn average_score(&self) -> f64 {
        if self.scored_records == 0 {
            0.0
        } else {
            self.score_sum / self.scored_records as f64
        }
    }
}

impl Transformer for QualityScorer {
    fn name(&self) -> &str {
        "QualityScorer"
    }

    #[instrument(skip(self, records, _schema), fields(batch_size = records.len()))]
    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let input = records.len();
        let mut output = Vec::with_capacity(input);
        for record in records {
            match self.score(record) {
                Ok(Some(scored)) => output.push(scored),
                Ok(None) => {}
                Err(e) => {
                    self.stats.errors += 1;
                    return Err(EtlError::wrap_transform(self.name(), e));
                }
            }
        }

        info!(
            input,
            output = output.len(),
            avg_quality_score = self.average_score(),
            "Scored batch"
        );
        if self.log_config.log_stats {
            debug!(
                processed = self.stats.records_processed,
                filtered = self.stats.records_filtered,
                low_quality = self.low_quality_records,
                "QualityScorer counters"
            );
        }
        Ok(output)
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        let mut extras = BTreeMap::new();
        extras.insert(
            "avg_quality_score".to_string(),
            serde_json::json!(self.average_score()),
        );
        extras.insert(
            "low_quality_records".to_string(),
            serde_json::json!(self.low_quality_records),
        );
        extras
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
        self.score_sum = 0.0;
        self.scored_records = 0;
        self.low_quality_records = 0;
    }
}

/// Builder for [`QualityScorer`].
#[derive(Debug, Default)]
pub struct QualityScorerBuilder {
    config: QualityScorerConfig,
    log_config: Option<LogConfig>,
}

impl QualityScorerBuilder {
    pub fn min_score(mut self, min_score: f64) -> Self {
        self.config.min_score = min_score;
        self
    }

    pub fn filter_low_quality(mut self, enabled: bool) -> Self {
        self.config.filter_low_quality = enabled;
        self
    }

    pub fn flag_low_quality(mut self, enabled: bool) -> Self {
        self.config.flag_low_quality = enabled;
        self
    }

    pub fn weights(mut self, weights: QualityWeights) -> Self {
        self.config.weights = weights;
        self
    }

    pub fn log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = Some(log_config);
        self
    }

    pub fn build(self) -> Result<QualityScorer> {
        let mut scorer = QualityScorer::new(self.config)?;
        if let Some(log_config) = self.log_config {
            scorer.log_config = log_config;
        }
        Ok(scorer)
    }
}

fn low_quality_reason(breakdown: &QualityBreakdown, issues: &[String]) -> String {
    let mut reason = format!(
        "Low quality score {:.2} (completeness={:.2}, validity={:.2}, consistency={:.2})",
        breakdown.overall, breakdown.completeness, breakdown.validity, breakdown.consistency
    );
    if !issues.is_empty() {
        let quoted: Vec<&str> = issues
            .iter()
            .take(MAX_REPORTED_ISSUES)
            .map(String::as_str)
            .collect();
        reason.push_str(": ");
        reason.push_str(&quoted.join("; "));
    }
    reason
}

fn mean(checks: &[f64]) -> f64 {
    if checks.is_empty() {
        1.0
    } else {
        checks.iter().sum::<f64>() / checks.len() as f64
    }
}

/// Lowercase alphanumeric tokens of a field name (`"Customer-Age"` → `["customer", "age"]`).
fn name_tokens(key: &str) -> Vec<String> {
    key.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_email_key(key: &str) -> bool {
    key.to_lowercase().contains("email")
}

fn is_id_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower == "id" || lower.ends_with("_id")
}

fn score_completeness(data: &RecordData, issues: &mut Vec<String>) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut complete = 0usize;
    for (key, value) in data {
        if value.is_empty() {
            issues.push(format!("{key}: missing value"));
        } else {
            complete += 1;
        }
    }
    complete as f64 / data.len() as f64
}

fn score_validity(data: &RecordData, issues: &mut Vec<String>) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut checks = Vec::with_capacity(data.len());
    for (key, value) in data {
        if value.is_empty() {
            checks.push(1.0);
            continue;
        }
        match value {
            FieldValue::String(s) => {
                let len = s.chars().count();
                if len > MAX_STRING_LENGTH {
                    issues.push(format!("{key}: string length {len} exceeds {MAX_STRING_LENGTH}"));
                    checks.push(0.0);
                } else if len > LONG_STRING_LENGTH {
                    issues.push(format!("{key}: string length {len} exceeds {LONG_STRING_LENGTH}"));
                    checks.push(0.5);
                } else {
                    checks.push(1.0);
                }

                if is_email_key(key) {
                    if s.contains('@') && s.contains('.') {
                        checks.push(1.0);
                    } else {
                        issues.push(format!("{key}: invalid email format"));
                        checks.push(0.0);
                    }
                }
            }
            FieldValue::Integer(_) | FieldValue::Float(_) => {
                let magnitude = value.as_f64().map(f64::abs).unwrap_or(0.0);
                if magnitude > MAX_NUMERIC_MAGNITUDE {
                    issues.push(format!("{key}: value {value} is implausibly large"));
                    checks.push(0.0);
                } else {
                    checks.push(1.0);
                }
            }
            _ => checks.push(1.0),
        }
    }
    mean(&checks)
}

fn score_consistency(data: &RecordData, issues: &mut Vec<String>) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut checks = Vec::with_capacity(data.len());
    for (key, value) in data {
        if value.is_empty() {
            checks.push(1.0);
            continue;
        }

        let tokens = name_tokens(key);
        let has_token = |t: &str| tokens.iter().any(|tok| tok == t);

        let check = if has_token("age") {
            match value.as_f64() {
                Some(age) if age > 0.0 && age < 150.0 => 1.0,
                _ => {
                    issues.push(format!("{key}: {value} is outside (0, 150)"));
                    0.0
                }
            }
        } else if has_token("salary") || has_token("price") {
            match value.as_f64() {
                Some(amount) if amount > 0.0 => 1.0,
                _ => {
                    issues.push(format!("{key}: {value} is not a positive number"));
                    0.0
                }
            }
        } else if is_id_key(key) {
            match value.as_i64() {
                Some(id) if id >= 0 => 1.0,
                _ => {
                    issues.push(format!("{key}: {value} is not a non-negative integer"));
                    0.5
                }
            }
        } else if is_email_key(key) {
            if value.as_str().is_some() {
                1.0
            } else {
                issues.push(format!("{key}: expected a string, got {}", value.kind()));
                0.0
            }
        } else {
            1.0
        };
        checks.push(check);
    }
    mean(&checks)
}
