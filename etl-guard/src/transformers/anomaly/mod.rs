//! Batch anomaly detection over numeric fields.
//!
//! Detection needs the whole batch: every method compares a record's values
//! against the distribution of the batch it arrived in.
//!
//! | Method | Rule |
//! |--------|------|
//! | `statistical` | `|x - mean| / std > threshold` on any field |
//! | `iqr` | `x` outside `[Q1 - k·IQR, Q3 + k·IQR]` on any field |
//! | `isolation_forest` | top `contamination` share of isolation scores |
//! | `combined` | flagged by at least two of the methods that ran |
//!
//! The isolation forest sits behind [`OutlierModel`]. The built-in
//! [`IsolationForest`](isolation_forest::IsolationForest) is available with
//! the `isolation-forest` feature; any other model can be plugged in with
//! [`AnomalyDetectorBuilder::outlier_model`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use super::{Transformer, TransformerStats};
use crate::error::{EtlError, Result};
use crate::logging::LogConfig;
use crate::record::{keys, FieldValue, Record, Schema};

#[cfg(feature = "isolation-forest")]
pub mod isolation_forest;
pub mod statistics;

use statistics::{iqr_outliers, zscore_outliers, ColumnMoments};

/// Minimum votes a record needs in combined mode.
const COMBINED_MIN_VOTES: usize = 2;

/// Multivariate outlier model used by the `isolation_forest` method.
pub trait OutlierModel: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Fits the model on `features` (one row per record) and flags outliers.
    ///
    /// `contamination` is the expected share of outliers, in `(0, 0.5]`.
    /// The returned vector has one entry per row.
    fn fit_predict(&self, features: &[Vec<f64>], contamination: f64) -> Result<Vec<bool>>;
}

/// Anomaly detection method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Z-score
    #[default]
    Statistical,
    Iqr,
    IsolationForest,
    Combined,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Statistical => "statistical",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::IsolationForest => "isolation_forest",
            DetectionMethod::Combined => "combined",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "statistical" => Ok(DetectionMethod::Statistical),
            "iqr" => Ok(DetectionMethod::Iqr),
            "isolation_forest" => Ok(DetectionMethod::IsolationForest),
            "combined" => Ok(DetectionMethod::Combined),
            other => Err(EtlError::configuration(format!(
                "Invalid method: {other}. Must be one of: \
                 statistical, iqr, isolation_forest, combined"
            ))),
        }
    }
}

/// Configuration for [`AnomalyDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyDetectorConfig {
    pub method: DetectionMethod,
    /// Z-score threshold in standard deviations
    pub threshold: f64,
    /// IQR fence multiplier `k`
    pub iqr_multiplier: f64,
    /// Fields to analyze; `None` uses every numeric field of the first record
    pub numeric_fields: Option<Vec<String>>,
    /// Drop flagged records instead of keeping them
    pub filter_anomalies: bool,
    /// Expected share of outliers for the isolation forest
    pub contamination: f64,
    pub n_estimators: usize,
    pub random_seed: u64,
}

impl Default for AnomalyDetectorConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Statistical,
            threshold: 3.0,
            iqr_multiplier: 1.5,
            numeric_fields: None,
            filter_anomalies: false,
            contamination: 0.1,
            n_estimators: 100,
            random_seed: 42,
        }
    }
}

impl AnomalyDetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(EtlError::configuration(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(EtlError::configuration(format!(
                "iqr_multiplier must be a positive number, got {}",
                self.iqr_multiplier
            )));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(EtlError::configuration(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(EtlError::configuration("n_estimators must be at least 1"));
        }
        Ok(())
    }
}

/// Per-record outcome of a detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Verdict {
    is_anomaly: bool,
    /// Share of executed methods that flagged the record
    score: f64,
}

/// Transformer that flags (or drops) anomalous records.
#[derive(Debug)]
pub struct AnomalyDetector {
    config: AnomalyDetectorConfig,
    model: Option<Box<dyn OutlierModel>>,
    log_config: LogConfig,
    stats: TransformerStats,
    anomalies_detected: u64,
    fields_analyzed: usize,
}

impl AnomalyDetector {
    /// Creates a detector with the built-in outlier model, when compiled in.
    pub fn new(config: AnomalyDetectorConfig) -> Result<Self> {
        let model = default_model(&config);
        Self::with_model(config, model)
    }

    pub fn builder() -> AnomalyDetectorBuilder {
        AnomalyDetectorBuilder::default()
    }

    fn with_model(
        config: AnomalyDetectorConfig,
        model: Option<Box<dyn OutlierModel>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.method == DetectionMethod::IsolationForest && model.is_none() {
            return Err(EtlError::capability_unavailable(
                "outlier_model",
                "the isolation_forest method needs an outlier model; enable the \
                 `isolation-forest` feature or supply one with `outlier_model()`",
            ));
        }
        Ok(Self {
            config,
            model,
            log_config: LogConfig::default(),
            stats: TransformerStats::default(),
            anomalies_detected: 0,
            fields_analyzed: 0,
        })
    }

    pub fn config(&self) -> &AnomalyDetectorConfig {
        &self.config
    }

    /// Whether an outlier model is available to this detector.
    pub fn has_outlier_model(&self) -> bool {
        self.model.is_some()
    }

    /// Flags anomalies in a batch and applies the filter policy.
    #[instrument(
        skip(self, records),
        fields(method = %self.config.method, batch_size = records.len())
    )]
    pub fn detect_batch(&mut self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let columns = self.extract_columns(&records);
        self.fields_analyzed = columns.len();
        let verdicts = self.classify(&columns, records.len())?;
        let method = self.config.method.as_str();

        let input = records.len();
        let mut flagged = 0u64;
        let mut output = Vec::with_capacity(input);
        for (i, (mut record, verdict)) in records.into_iter().zip(verdicts).enumerate() {
            record.metadata.set(keys::IS_ANOMALY, verdict.is_anomaly);
            record.metadata.set(keys::ANOMALY_METHOD, method);
            record.metadata.set(keys::ANOMALY_SCORE, verdict.score);

            if verdict.is_anomaly {
                flagged += 1;
                let reasons = self.reasons(&record, i, &columns);
                if self.log_config.log_record_details {
                    debug!(
                        record_id = record.display_id(),
                        reasons = %self.log_config.truncate(&reasons.join("; ")),
                        "Flagged anomaly"
                    );
                }
                record.metadata.set(keys::ANOMALY_REASONS, reasons);

                if self.config.filter_anomalies {
                    self.stats.records_filtered += 1;
                    continue;
                }
                self.stats.records_modified += 1;
            }

            self.stats.records_processed += 1;
            output.push(record);
        }

        self.anomalies_detected += flagged;
        info!(
            anomalies = flagged,
            input,
            fields = self.fields_analyzed,
            "Detected {} anomalies out of {} records using {} method",
            flagged,
            input,
            method
        );
        if self.log_config.log_stats {
            debug!(
                processed = self.stats.records_processed,
                filtered = self.stats.records_filtered,
                anomalies_detected = self.anomalies_detected,
                "AnomalyDetector counters"
            );
        }
        Ok(output)
    }

    /// Selected numeric columns, sorted by field name.
    fn extract_columns(&self, records: &[Record]) -> Vec<(String, Vec<Option<f64>>)> {
        let mut fields: Vec<String> = match &self.config.numeric_fields {
            Some(explicit) => explicit.clone(),
            None => records[0]
                .data
                .iter()
                .filter(|(_, v)| v.is_numeric())
                .map(|(k, _)| k.clone())
                .collect(),
        };
        fields.sort();
        fields.dedup();

        fields
            .into_iter()
            .map(|field| {
                let column = records
                    .iter()
                    .map(|r| r.get(&field).and_then(FieldValue::as_f64))
                    .collect();
                (field, column)
            })
            .collect()
    }

    fn classify(
        &self,
        columns: &[(String, Vec<Option<f64>>)],
        rows: usize,
    ) -> Result<Vec<Verdict>> {
        let none = vec![
            Verdict {
                is_anomaly: false,
                score: 0.0
            };
            rows
        ];
        if columns.is_empty() {
            warn!(method = %self.config.method, "No numeric fields found for anomaly detection");
            return Ok(none);
        }

        let mut votes: Vec<Vec<bool>> = Vec::new();
        match self.config.method {
            DetectionMethod::Statistical => votes.push(self.detect_zscore(columns, rows)),
            DetectionMethod::Iqr => votes.push(self.detect_iqr(columns, rows)),
            DetectionMethod::IsolationForest => votes.push(self.detect_isolation(columns, rows)?),
            DetectionMethod::Combined => {
                votes.push(self.detect_zscore(columns, rows));
                votes.push(self.detect_iqr(columns, rows));
                if self.model.is_some() {
                    votes.push(self.detect_isolation(columns, rows)?);
                } else {
                    debug!("No outlier model available, combining statistical and iqr only");
                }
            }
        }

        let required = match self.config.method {
            DetectionMethod::Combined => COMBINED_MIN_VOTES,
            _ => 1,
        };
        let executed = votes.len() as f64;
        Ok((0..rows)
            .map(|i| {
                let count = votes.iter().filter(|method| method[i]).count();
                Verdict {
                    is_anomaly: count >= required,
                    score: count as f64 / executed,
                }
            })
            .collect())
    }

    fn detect_zscore(&self, columns: &[(String, Vec<Option<f64>>)], rows: usize) -> Vec<bool> {
        let mut flags = vec![false; rows];
        for (field, column) in columns {
            match zscore_outliers(column, self.config.threshold) {
                Some(field_flags) => merge_flags(&mut flags, &field_flags),
                None => debug!(field = %field, "Skipping field for z-score detection"),
            }
        }
        flags
    }

    fn detect_iqr(&self, columns: &[(String, Vec<Option<f64>>)], rows: usize) -> Vec<bool> {
        let mut flags = vec![false; rows];
        for (field, column) in columns {
            match iqr_outliers(column, self.config.iqr_multiplier) {
                Some(field_flags) => merge_flags(&mut flags, &field_flags),
                None => debug!(field = %field, "Skipping field for IQR detection"),
            }
        }
        flags
    }

    fn detect_isolation(
        &self,
        columns: &[(String, Vec<Option<f64>>)],
        rows: usize,
    ) -> Result<Vec<bool>> {
        let model = self.model.as_ref().ok_or_else(|| {
            EtlError::capability_unavailable("outlier_model", "no outlier model configured")
        })?;
        if rows < 2 {
            return Ok(vec![false; rows]);
        }

        let features = feature_matrix(columns, rows);
        debug!(model = model.name(), samples = rows, "Fitting outlier model");
        let flags = model.fit_predict(&features, self.config.contamination)?;
        if flags.len() != rows {
            return Err(EtlError::Internal(format!(
                "outlier model '{}' returned {} predictions for {rows} rows",
                model.name(),
                flags.len()
            )));
        }
        Ok(flags)
    }

    fn reasons(
        &self,
        record: &Record,
        row: usize,
        columns: &[(String, Vec<Option<f64>>)],
    ) -> Vec<String> {
        let mut reasons = Vec::new();
        for (field, column) in columns {
            let (Some(value), Some(moments)) = (column[row], ColumnMoments::of(column)) else {
                continue;
            };
            let z = moments.z_score(value);
            if z > self.config.threshold {
                let shown = record
                    .get(field)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| value.to_string());
                reasons.push(format!(
                    "{field}={shown} is {z:.2} standard deviations from mean ({:.2})",
                    moments.mean
                ));
            }
        }
        if reasons.is_empty() {
            reasons.push(format!("Anomalous based on {} method", self.config.method));
        }
        reasons
    }
}

fn merge_flags(flags: &mut [bool], field_flags: &[bool]) {
    for (flag, hit) in flags.iter_mut().zip(field_flags) {
        *flag |= *hit;
    }
}

/// Row-major feature matrix with missing values imputed by the column mean.
fn feature_matrix(columns: &[(String, Vec<Option<f64>>)], rows: usize) -> Vec<Vec<f64>> {
    let fills: Vec<f64> = columns
        .iter()
        .map(|(_, column)| {
            let present: Vec<f64> = column.iter().flatten().copied().collect();
            statistics::mean(&present).unwrap_or(0.0)
        })
        .collect();

    (0..rows)
        .map(|i| {
            columns
                .iter()
                .zip(&fills)
                .map(|((_, column), fill)| column[i].unwrap_or(*fill))
                .collect()
        })
        .collect()
}

#[cfg(feature = "isolation-forest")]
fn default_model(config: &AnomalyDetectorConfig) -> Option<Box<dyn OutlierModel>> {
    Some(Box::new(isolation_forest::IsolationForest::new(
        config.n_estimators,
        config.random_seed,
    )))
}

#[cfg(not(feature = "isolation-forest"))]
fn default_model(_config: &AnomalyDetectorConfig) -> Option<Box<dyn OutlierModel>> {
    None
}

impl Transformer for AnomalyDetector {
    fn name(&self) -> &str {
        "AnomalyDetector"
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        self.detect_batch(records).map_err(|e| {
            self.stats.errors += 1;
            EtlError::wrap_transform("AnomalyDetector", e)
        })
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        let mut extras = BTreeMap::new();
        extras.insert(
            "anomalies_detected".to_string(),
            serde_json::json!(self.anomalies_detected),
        );
        extras.insert(
            "fields_analyzed".to_string(),
            serde_json::json!(self.fields_analyzed),
        );
        extras
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
        self.anomalies_detected = 0;
        self.fields_analyzed = 0;
    }
}

/// Builder for [`AnomalyDetector`].
#[derive(Debug, Default)]
pub struct AnomalyDetectorBuilder {
    config: AnomalyDetectorConfig,
    model: Option<Box<dyn OutlierModel>>,
    disable_model: bool,
    log_config: Option<LogConfig>,
}

impl AnomalyDetectorBuilder {
    pub fn method(mut self, method: DetectionMethod) -> Self {
        self.config.method = method;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.config.iqr_multiplier = multiplier;
        self
    }

    pub fn numeric_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.numeric_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_anomalies(mut self, enabled: bool) -> Self {
        self.config.filter_anomalies = enabled;
        self
    }

    pub fn contamination(mut self, contamination: f64) -> Self {
        self.config.contamination = contamination;
        self
    }

    pub fn n_estimators(mut self, n: usize) -> Self {
        self.config.n_estimators = n;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Uses a custom outlier model for the isolation-forest vote.
    pub fn outlier_model(mut self, model: Box<dyn OutlierModel>) -> Self {
        self.model = Some(model);
        self.disable_model = false;
        self
    }

    /// Builds the detector without any outlier model.
    pub fn without_outlier_model(mut self) -> Self {
        self.model = None;
        self.disable_model = true;
        self
    }

    pub fn log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = Some(log_config);
        self
    }

    pub fn config(mut self, config: AnomalyDetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AnomalyDetector> {
        let model = match (self.model, self.disable_model) {
            (Some(model), _) => Some(model),
            (None, true) => None,
            (None, false) => default_model(&self.config),
        };
        let mut detector = AnomalyDetector::with_model(self.config, model)?;
        if let Some(log_config) = self.log_config {
            detector.log_config = log_config;
        }
        Ok(detector)
    }
}
