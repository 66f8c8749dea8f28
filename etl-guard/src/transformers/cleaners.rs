//! Record cleaners: null handling and column removal.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use super::{Transformer, TransformerStats};
use crate::error::{EtlError, Result};
use crate::record::{FieldValue, Record, RecordData, Schema};

/// How [`NullRemover`] treats null or empty values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullStrategy {
    /// Drop records holding any null value
    #[default]
    Drop,
    /// Drop records whose values are all null
    DropAll,
    /// Keep the record, remove its null fields
    RemoveFields,
    /// Replace nulls with the configured fill value
    Fill,
}

impl NullStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NullStrategy::Drop => "drop",
            NullStrategy::DropAll => "drop_all",
            NullStrategy::RemoveFields => "remove_fields",
            NullStrategy::Fill => "fill",
        }
    }
}

impl fmt::Display for NullStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NullStrategy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop" => Ok(NullStrategy::Drop),
            "drop_all" => Ok(NullStrategy::DropAll),
            "remove_fields" => Ok(NullStrategy::RemoveFields),
            "fill" => Ok(NullStrategy::Fill),
            other => Err(EtlError::configuration(format!(
                "Invalid strategy: {other}. Must be one of: drop, drop_all, remove_fields, fill"
            ))),
        }
    }
}

/// Configuration for [`NullRemover`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullRemoverConfig {
    pub strategy: NullStrategy,
    /// Replacement used by [`NullStrategy::Fill`]
    pub fill_value: FieldValue,
}

/// Handles null and empty-string values.
#[derive(Debug)]
pub struct NullRemover {
    config: NullRemoverConfig,
    stats: TransformerStats,
}

impl NullRemover {
    pub fn new(config: NullRemoverConfig) -> Self {
        Self {
            config,
            stats: TransformerStats::default(),
        }
    }

    pub fn with_strategy(strategy: NullStrategy) -> Self {
        Self::new(NullRemoverConfig {
            strategy,
            ..Default::default()
        })
    }

    /// Replaces nulls with `fill_value`.
    pub fn fill(fill_value: impl Into<FieldValue>) -> Self {
        Self::new(NullRemoverConfig {
            strategy: NullStrategy::Fill,
            fill_value: fill_value.into(),
        })
    }

    pub fn config(&self) -> &NullRemoverConfig {
        &self.config
    }

    fn clean(&mut self, mut record: Record) -> Option<Record> {
        match self.config.strategy {
            NullStrategy::Drop => {
                if record.data.values().any(FieldValue::is_empty) {
                    return None;
                }
            }
            NullStrategy::DropAll => {
                if record.data.values().all(FieldValue::is_empty) {
                    return None;
                }
            }
            NullStrategy::RemoveFields => {
                record.data.retain(|_, v| !v.is_empty());
                self.stats.records_modified += 1;
            }
            NullStrategy::Fill => {
                for value in record.data.values_mut() {
                    if value.is_empty() {
                        *value = self.config.fill_value.clone();
                    }
                }
                self.stats.records_modified += 1;
            }
        }
        record.mark_transformed();
        Some(record)
    }
}

impl Transformer for NullRemover {
    fn name(&self) -> &str {
        "NullRemover"
    }

    #[instrument(
        skip(self, records, _schema),
        fields(batch_size = records.len(), strategy = %self.config.strategy)
    )]
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
            match self.clean(record) {
                Some(kept) => {
                    self.stats.records_processed += 1;
                    output.push(kept);
                }
                None => self.stats.records_filtered += 1,
            }
        }

        debug!(input, output = output.len(), "Handled null values");
        Ok(output)
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

/// Configuration for [`ColumnRemover`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRemoverConfig {
    /// Exact column names to remove
    pub columns: Vec<String>,
    pub prefix: Option<String>,
    /// Regex matched from the start of the column name
    pub pattern: Option<String>,
    /// Columns that are never removed, whatever else matches
    pub keep_columns: Vec<String>,
}

/// Removes columns by exact name, prefix or regex.
#[derive(Debug)]
pub struct ColumnRemover {
    config: ColumnRemoverConfig,
    columns: BTreeSet<String>,
    keep: BTreeSet<String>,
    pattern: Option<Regex>,
    stats: TransformerStats,
    removed: BTreeSet<String>,
    total_removals: u64,
}

impl ColumnRemover {
    pub fn new(config: ColumnRemoverConfig) -> Result<Self> {
        let pattern = config.pattern.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            columns: config.columns.iter().cloned().collect(),
            keep: config.keep_columns.iter().cloned().collect(),
            pattern,
            config,
            stats: TransformerStats::default(),
            removed: BTreeSet::new(),
            total_removals: 0,
        })
    }

    pub fn builder() -> ColumnRemoverBuilder {
        ColumnRemoverBuilder::default()
    }

    pub fn config(&self) -> &ColumnRemoverConfig {
        &self.config
    }

    pub fn should_remove(&self, column: &str) -> bool {
        if self.keep.contains(column) {
            return false;
        }
        if self.columns.contains(column) {
            return true;
        }
        if self.config.prefix.as_deref().is_some_and(|p| column.starts_with(p)) {
            return true;
        }
        self.pattern
            .as_ref()
            .and_then(|re| re.find(column))
            .is_some_and(|m| m.start() == 0)
    }

    fn strip(&mut self, data: &mut RecordData) -> bool {
        let doomed: Vec<String> = data
            .keys()
            .filter(|column| self.should_remove(column))
            .cloned()
            .collect();
        for column in &doomed {
            data.remove(column);
            self.total_removals += 1;
        }
        let modified = !doomed.is_empty();
        self.removed.extend(doomed);
        modified
    }
}

impl Transformer for ColumnRemover {
    fn name(&self) -> &str {
        "ColumnRemover"
    }

    fn setup(&mut self) -> Result<()> {
        if !self.columns.is_empty() {
            info!(columns = ?self.columns, "Will remove columns");
        }
        if let Some(prefix) = &self.config.prefix {
            info!(prefix = %prefix, except = ?self.keep, "Will remove columns with prefix");
        }
        if let Some(pattern) = &self.pattern {
            info!(pattern = pattern.as_str(), "Will remove columns matching pattern");
        }
        Ok(())
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let mut output = records;
        for record in &mut output {
            if self.strip(&mut record.data) {
                self.stats.records_modified += 1;
            }
            self.stats.records_processed += 1;
        }
        Ok(output)
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.removed.is_empty() {
            info!("No columns removed");
        } else {
            info!(
                unique = self.removed.len(),
                total = self.total_removals,
                columns = ?self.removed,
                "Removed {} unique columns",
                self.removed.len()
            );
        }
        Ok(())
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        let mut extras = BTreeMap::new();
        extras.insert("columns_removed".to_string(), serde_json::json!(self.removed));
        extras.insert(
            "unique_columns_removed".to_string(),
            serde_json::json!(self.removed.len()),
        );
        extras.insert(
            "total_removals".to_string(),
            serde_json::json!(self.total_removals),
        );
        extras
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
        self.removed.clear();
        self.total_removals = 0;
    }
}

/// Builder for [`ColumnRemover`].
#[derive(Debug, Default)]
pub struct ColumnRemoverBuilder {
    config: ColumnRemoverConfig,
}

impl ColumnRemoverBuilder {
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.config.columns.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.pattern = Some(pattern.into());
        self
    }

    pub fn keep(mut self, column: impl Into<String>) -> Self {
        self.config.keep_columns.push(column.into());
        self
    }

    pub fn build(self) -> Result<ColumnRemover> {
        ColumnRemover::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch() -> Vec<Record> {
        vec![
            Record::from_json(json!({"a": 1, "b": "x"})).unwrap(),
            Record::from_json(json!({"a": null, "b": "y"})).unwrap(),
            Record::from_json(json!({"a": null, "b": ""})).unwrap(),
            Record::new(RecordData::new()),
        ]
    }

    #[test]
    fn test_drop_removes_any_null() {
        let mut remover = NullRemover::with_strategy(NullStrategy::Drop);
        let out = remover.transform_batch(batch(), None).unwrap();
        // the empty record has no null values and survives
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("a"), Some(&FieldValue::Integer(1)));
        assert_eq!(remover.stats().records_filtered, 2);
        assert_eq!(remover.stats().records_processed, 2);
    }

    #[test]
    fn test_drop_all_drops_empty_records() {
        let mut remover = NullRemover::with_strategy(NullStrategy::DropAll);
        let out = remover.transform_batch(batch(), None).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].get("b"), Some(&FieldValue::from("y")));
    }

    #[test]
    fn test_remove_fields_and_fill() {
        let mut remover = NullRemover::with_strategy(NullStrategy::RemoveFields);
        let out = remover.transform_batch(batch(), None).unwrap();
        assert_eq!(out[1].data.len(), 1);
        assert!(out[2].data.is_empty());
        assert_eq!(out[0].metadata.stage, "transform");

        let mut filler = NullRemover::fill("unknown");
        let out = filler.transform_batch(batch(), None).unwrap();
        assert_eq!(out[2].get("a"), Some(&FieldValue::from("unknown")));
        assert_eq!(out[2].get("b"), Some(&FieldValue::from("unknown")));
        assert_eq!(filler.stats().records_modified, 4);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("drop_all".parse::<NullStrategy>().unwrap(), NullStrategy::DropAll);
        assert!("purge".parse::<NullStrategy>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_column_remover_rules() {
        let mut remover = ColumnRemover::builder()
            .column("tmp")
            .prefix("_meta_")
            .keep("_meta_quality_score")
            .pattern(r"temp_.*_id$")
            .build()
            .unwrap();

        let record = Record::from_json(json!({
            "id": 1,
            "tmp": true,
            "_meta_is_anomaly": false,
            "_meta_quality_score": 0.9,
            "temp_user_id": 4,
            "my_temp_x_id": 5,
        }))
        .unwrap();
        let out = remover.transform_batch(vec![record], None).unwrap();
        let names: Vec<&str> = out[0].data.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["_meta_quality_score", "id", "my_temp_x_id"]);

        let report = remover.get_stats();
        assert_eq!(
            report.extra("columns_removed"),
            Some(&json!(["_meta_is_anomaly", "temp_user_id", "tmp"]))
        );
        assert_eq!(report.extra("total_removals"), Some(&json!(3)));
        assert_eq!(report.base.records_modified, 1);
        assert!(remover.cleanup().is_ok());
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let err = ColumnRemover::builder().pattern("(unclosed").build().unwrap_err();
        assert!(err.is_configuration());
    }
}
