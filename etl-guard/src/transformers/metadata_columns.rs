//! Copies detector and scorer annotations into payload columns.
//!
//! Destinations that only write `data` (CSV, flat JSON) lose the record
//! metadata. Running this transformer last makes anomaly flags and quality
//! scores visible there.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Transformer, TransformerStats};
use crate::error::Result;
use crate::record::{FieldValue, Record, Schema};

/// Configuration for [`MetadataToColumns`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataToColumnsConfig {
    pub include_anomaly_info: bool,
    pub include_quality_info: bool,
    /// Write completeness, validity and consistency columns
    pub include_quality_breakdown: bool,
    pub prefix: String,
}

impl Default for MetadataToColumnsConfig {
    fn default() -> Self {
        Self {
            include_anomaly_info: true,
            include_quality_info: true,
            include_quality_breakdown: true,
            prefix: "_meta_".to_string(),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Exposes record metadata as prefixed data columns.
#[derive(Debug, Default)]
pub struct MetadataToColumns {
    config: MetadataToColumnsConfig,
    stats: TransformerStats,
}

impl MetadataToColumns {
    pub fn new(config: MetadataToColumnsConfig) -> Self {
        Self {
            config,
            stats: TransformerStats::default(),
        }
    }

    pub fn config(&self) -> &MetadataToColumnsConfig {
        &self.config
    }

    fn column(&self, name: &str) -> String {
        format!("{}{name}", self.config.prefix)
    }

    fn expose(&self, record: &mut Record) {
        if self.config.include_anomaly_info {
            let flag_column = self.column("is_anomaly");
            let method_column = self.column("anomaly_method");
            let reasons_column = self.column("anomaly_reasons");

            // a scorer flag already written to the payload survives
            let flagged_in_data = record.get(&flag_column) == Some(&FieldValue::Bool(true));
            let existing_text = |column: &str| match record.get(column) {
                Some(FieldValue::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            };
            let prior_method = existing_text(&method_column);
            let prior_reasons = existing_text(&reasons_column);

            let flagged_in_metadata = record.metadata.is_anomaly();
            let is_anomaly = flagged_in_metadata || flagged_in_data;
            let (method, reasons) = if is_anomaly {
                let method = record
                    .metadata
                    .anomaly_method()
                    .filter(|_| flagged_in_metadata)
                    .map(str::to_string)
                    .or(prior_method)
                    .unwrap_or_else(|| "unknown".to_string());

                let mut parts: Vec<String> = prior_reasons.into_iter().collect();
                let detected = record.metadata.anomaly_reasons().join("; ");
                if flagged_in_metadata
                    && !detected.is_empty()
                    && !parts.iter().any(|p| p.contains(&detected))
                {
                    parts.push(detected);
                }
                (method, parts.join("; "))
            } else {
                (String::new(), String::new())
            };
            record.set(flag_column, is_anomaly);
            record.set(method_column, method);
            record.set(reasons_column, reasons);
        }

        if self.config.include_quality_info {
            let score = record
                .metadata
                .quality_score
                .map_or(FieldValue::Null, |s| FieldValue::Float(round4(s)));
            record.set(self.column("quality_score"), score);
        }

        if self.config.include_quality_breakdown {
            let breakdown = record.metadata.quality_breakdown().filter(|b| !b.is_empty());
            for dimension in ["completeness", "validity", "consistency"] {
                let value = match &breakdown {
                    Some(b) => FieldValue::Float(round4(b.get(dimension).copied().unwrap_or(0.0))),
                    None => FieldValue::Null,
                };
                record.set(self.column(dimension), value);
            }
        }
    }
}

impl Transformer for MetadataToColumns {
    fn name(&self) -> &str {
        "MetadataToColumns"
    }

    #[instrument(skip(self, records, _schema), fields(batch_size = records.len()))]
    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        let mut output = records;
        for record in &mut output {
            self.expose(record);
            record.mark_transformed();
        }
        let n = output.len() as u64;
        self.stats.records_processed += n;
        self.stats.records_modified += n;
        Ok(output)
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}
