//! Group-by aggregation.
//!
//! The batch is reduced to one record per distinct combination of the
//! `group_by` values. Each output record carries the aggregations declared
//! in [`AggregatorConfig::aggregations`], keyed by output field name, plus
//! `metadata.custom["group_size"]` with the number of input records folded
//! into it.
//!
//! Aggregation changes the shape of the data, so a fresh schema named
//! `aggregated_data` is synthesized per batch and attached to every output
//! record.
//!
//! ```rust
//! use etl_guard::prelude::*;
//! use etl_guard::transformers::Aggregator;
//! use serde_json::json;
//!
//! # fn main() -> etl_guard::error::Result<()> {
//! let mut aggregator = Aggregator::builder()
//!     .group_by(["region"])
//!     .aggregate("total", "amount", "sum")
//!     .aggregate("orders", "amount", "count")
//!     .build()?;
//!
//! let records = vec![
//!     Record::from_json(json!({"region": "east", "amount": 10}))?,
//!     Record::from_json(json!({"region": "west", "amount": 5}))?,
//!     Record::from_json(json!({"region": "east", "amount": 2.5}))?,
//! ];
//! let out = aggregator.transform_batch(records, None)?;
//! assert_eq!(out.len(), 2);
//! assert_eq!(out[0].get("total"), Some(&FieldValue::Float(12.5)));
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{Transformer, TransformerStats};
use crate::error::{EtlError, Result};
use crate::record::{keys, Field, FieldType, FieldValue, Record, RecordMetadata, Schema};

pub mod functions;

pub use functions::{AggregateFunction, AggregationRegistry};

/// Name of the synthesized output schema.
pub const AGGREGATED_SCHEMA_NAME: &str = "aggregated_data";

/// One aggregation: apply `function` to the values of `field`.
///
/// Both keys are optional at the serde level so a missing key is reported
/// as a configuration error naming the output field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub field: Option<String>,
    pub function: Option<String>,
}

impl AggregationSpec {
    pub fn new(field: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            function: Some(function.into()),
        }
    }
}

/// Configuration for [`Aggregator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub group_by: Vec<String>,
    /// Output field name to aggregation
    pub aggregations: BTreeMap<String, AggregationSpec>,
    /// Copy the group-by values into each output record
    pub keep_group_fields: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            group_by: Vec::new(),
            aggregations: BTreeMap::new(),
            keep_group_fields: true,
        }
    }
}

/// A validated aggregation ready to run.
#[derive(Debug, Clone)]
struct PlannedAggregation {
    output: String,
    source: String,
    function_name: String,
    function: AggregateFunction,
}

/// Transformer that groups records and aggregates each group.
#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    registry: AggregationRegistry,
    plan: Vec<PlannedAggregation>,
    stats: TransformerStats,
    groups_created: u64,
}

impl Aggregator {
    /// Creates an aggregator with the built-in functions.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        Self::with_registry(config, AggregationRegistry::with_builtins())
    }

    /// Creates an aggregator resolving functions from `registry`.
    pub fn with_registry(config: AggregatorConfig, registry: AggregationRegistry) -> Result<Self> {
        let plan = plan_aggregations(&config, &registry)?;
        Ok(Self {
            config,
            registry,
            plan,
            stats: TransformerStats::default(),
            groups_created: 0,
        })
    }

    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AggregationRegistry {
        &self.registry
    }

    /// Reduces a batch to one record per group.
    ///
    /// Group-by field types are taken from `schema`, else from the first
    /// record's schema, else default to string.
    #[instrument(skip(self, records, schema), fields(batch_size = records.len()))]
    pub fn aggregate_batch(
        &mut self,
        records: Vec<Record>,
        schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let source_schema = schema.or(records[0].schema.as_deref());
        let output_schema = Arc::new(self.output_schema(source_schema));

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Vec<FieldValue>, Vec<usize>)> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let key: Vec<FieldValue> = self
                .config
                .group_by
                .iter()
                .map(|field| record.get(field).cloned().unwrap_or_default())
                .collect();
            let canonical = FieldValue::Array(key.clone()).canonical_json();
            match index.get(&canonical) {
                Some(&g) => groups[g].1.push(i),
                None => {
                    index.insert(canonical, groups.len());
                    groups.push((key, vec![i]));
                }
            }
        }

        let output: Vec<Record> = groups
            .into_iter()
            .map(|(key, members)| {
                let group: Vec<&Record> = members.iter().map(|&i| &records[i]).collect();
                self.aggregate_group(key, &group, &output_schema)
            })
            .collect();

        let input = records.len();
        self.stats.records_processed += output.len() as u64;
        self.stats.records_filtered += (input - output.len()) as u64;
        self.groups_created += output.len() as u64;

        info!(
            input,
            groups = output.len(),
            "Aggregated {} records into {} groups",
            input,
            output.len()
        );
        Ok(output)
    }

    fn aggregate_group(
        &self,
        key: Vec<FieldValue>,
        group: &[&Record],
        schema: &Arc<Schema>,
    ) -> Record {
        let template = group[0];
        let mut data = BTreeMap::new();

        if self.config.keep_group_fields {
            for (field, value) in self.config.group_by.iter().zip(key) {
                data.insert(field.clone(), value);
            }
        }

        for planned in &self.plan {
            let values: Vec<FieldValue> = group
                .iter()
                .map(|r| r.get(&planned.source).cloned().unwrap_or_default())
                .collect();
            data.insert(planned.output.clone(), planned.function.apply(&values));
        }

        let mut metadata = RecordMetadata {
            source_type: template.metadata.source_type.clone(),
            source_id: template.metadata.source_id.clone(),
            pipeline_id: template.metadata.pipeline_id.clone(),
            stage: "transform".to_string(),
            ..Default::default()
        };
        metadata.set(keys::GROUP_SIZE, group.len());
        metadata.set(keys::TRANSFORMATION_TYPE, "aggregation");

        Record {
            data,
            metadata,
            schema: Some(Arc::clone(schema)),
            extracted_at: template.extracted_at,
            transformed_at: Some(Utc::now()),
            loaded_at: None,
        }
    }

    /// Synthesizes the schema of the aggregated records.
    pub fn output_schema(&self, source: Option<&Schema>) -> Schema {
        let mut fields = Vec::new();

        if self.config.keep_group_fields {
            for name in &self.config.group_by {
                let field_type = source
                    .and_then(|s| s.get_field(name))
                    .map(|f| f.field_type)
                    .unwrap_or(FieldType::String);
                fields.push(Field::new(name.clone(), field_type));
            }
        }

        for planned in &self.plan {
            fields.push(
                Field::new(planned.output.clone(), planned.function.output_type).with_description(
                    format!("{}({})", planned.function_name, planned.source),
                ),
            );
        }

        let mut schema = Schema::new(AGGREGATED_SCHEMA_NAME, fields).with_inferred(true);
        schema.created_at = Some(Utc::now());
        schema
    }
}

fn plan_aggregations(
    config: &AggregatorConfig,
    registry: &AggregationRegistry,
) -> Result<Vec<PlannedAggregation>> {
    if config.group_by.is_empty() {
        return Err(EtlError::configuration(
            "group_by cannot be empty. Provide at least one field to group by.",
        ));
    }
    if config.aggregations.is_empty() {
        return Err(EtlError::configuration(
            "aggregations cannot be empty. Provide at least one aggregation.",
        ));
    }

    config
        .aggregations
        .iter()
        .map(|(output, spec)| {
            let (Some(source), Some(function_name)) = (&spec.field, &spec.function) else {
                return Err(EtlError::configuration(format!(
                    "Aggregation '{output}' must have 'field' and 'function' keys. Got: {spec:?}"
                )));
            };
            let function = registry.get(function_name).ok_or_else(|| {
                EtlError::configuration(format!(
                    "Unknown aggregation function: {function_name}. Valid functions: {:?}",
                    registry.names()
                ))
            })?;
            Ok(PlannedAggregation {
                output: output.clone(),
                source: source.clone(),
                function_name: function_name.clone(),
                function: function.clone(),
            })
        })
        .collect()
}

impl Transformer for Aggregator {
    fn name(&self) -> &str {
        "Aggregator"
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        self.aggregate_batch(records, schema).map_err(|e| {
            self.stats.errors += 1;
            EtlError::wrap_transform("Aggregator", e)
        })
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        let mut extras = BTreeMap::new();
        extras.insert(
            "groups_created".to_string(),
            serde_json::json!(self.groups_created),
        );
        extras
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
        self.groups_created = 0;
    }
}

/// Builder for [`Aggregator`].
#[derive(Debug, Default)]
pub struct AggregatorBuilder {
    config: AggregatorConfig,
    registry: Option<AggregationRegistry>,
}

impl AggregatorBuilder {
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an aggregation producing `output` from `function(field)`.
    pub fn aggregate(
        mut self,
        output: impl Into<String>,
        field: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        self.config
            .aggregations
            .insert(output.into(), AggregationSpec::new(field, function));
        self
    }

    pub fn keep_group_fields(mut self, keep: bool) -> Self {
        self.config.keep_group_fields = keep;
        self
    }

    /// Registers a custom function on this aggregator's registry.
    pub fn register_function<F>(
        mut self,
        name: impl Into<String>,
        output_type: FieldType,
        func: F,
    ) -> Self
    where
        F: Fn(&[FieldValue]) -> FieldValue + Send + Sync + 'static,
    {
        self.registry
            .get_or_insert_with(AggregationRegistry::with_builtins)
            .register(name, output_type, func);
        self
    }

    pub fn build(self) -> Result<Aggregator> {
        Aggregator::with_registry(self.config, self.registry.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales() -> Vec<Record> {
        [
            ("east", json!(10)),
            ("west", json!(3)),
            ("east", json!(2.5)),
            ("west", json!(null)),
        ]
        .into_iter()
        .map(|(region, amount)| {
            Record::from_json(json!({"region": region, "amount": amount, "rep": "kim"})).unwrap()
        })
        .collect()
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .aggregate("total", "amount", "sum")
            .aggregate("n", "amount", "count")
            .build()
            .unwrap();
        let out = aggregator.aggregate_batch(sales(), None).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("region"), Some(&FieldValue::from("east")));
        assert_eq!(out[0].get("total"), Some(&FieldValue::Float(12.5)));
        assert_eq!(out[1].get("total"), Some(&FieldValue::Float(3.0)));
        assert_eq!(out[1].get("n"), Some(&FieldValue::Integer(2)));
        assert_eq!(out[0].metadata.group_size(), Some(2));
        assert_eq!(
            out[0].metadata.get(keys::TRANSFORMATION_TYPE),
            Some(&FieldValue::from("aggregation"))
        );
    }

    #[test]
    fn test_output_schema_is_shared_and_typed() {
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .aggregate("reps", "rep", "list")
            .aggregate("avg_amount", "amount", "avg")
            .aggregate("distinct_reps", "rep", "count_distinct")
            .build()
            .unwrap();
        let source = Schema::new("sales", vec![Field::new("region", FieldType::Date)]);
        let out = aggregator.aggregate_batch(sales(), Some(&source)).unwrap();

        let schema = out[0].schema.as_ref().unwrap();
        assert!(Arc::ptr_eq(schema, out[1].schema.as_ref().unwrap()));
        assert_eq!(schema.name, "aggregated_data");
        assert!(schema.inferred);
        // BTreeMap order for outputs, group fields first
        assert_eq!(
            schema.field_names(),
            vec!["region", "avg_amount", "distinct_reps", "reps"]
        );
        assert_eq!(schema.get_field("region").unwrap().field_type, FieldType::Date);
        assert_eq!(schema.get_field("reps").unwrap().field_type, FieldType::Json);
        assert_eq!(schema.get_field("distinct_reps").unwrap().field_type, FieldType::Integer);
    }

    #[test]
    fn test_group_type_defaults_to_string() {
        let aggregator = Aggregator::builder()
            .group_by(["region"])
            .aggregate("n", "amount", "count")
            .build()
            .unwrap();
        let schema = aggregator.output_schema(None);
        assert_eq!(schema.fields[0].field_type, FieldType::String);
    }

    #[test]
    fn test_avg_of_all_null_group_is_null() {
        let records = vec![
            Record::from_json(json!({"region": "north", "amount": null})).unwrap(),
            Record::from_json(json!({"region": "north"})).unwrap(),
        ];
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .aggregate("avg_amount", "amount", "avg")
            .build()
            .unwrap();
        let out = aggregator.aggregate_batch(records, None).unwrap();
        assert_eq!(out[0].get("avg_amount"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_drop_group_fields() {
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .keep_group_fields(false)
            .aggregate("n", "amount", "count")
            .build()
            .unwrap();
        let out = aggregator.aggregate_batch(sales(), None).unwrap();
        assert!(out[0].get("region").is_none());
        assert_eq!(out[0].schema.as_ref().unwrap().fields.len(), 1);
    }

    #[test]
    fn test_configuration_errors() {
        let err = Aggregator::builder()
            .aggregate("n", "amount", "count")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("group_by cannot be empty"));

        let err = Aggregator::builder().group_by(["region"]).build().unwrap_err();
        assert!(err.to_string().contains("aggregations cannot be empty"));

        let err = Aggregator::builder()
            .group_by(["region"])
            .aggregate("mid", "amount", "median")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Unknown aggregation function: median"));

        let mut config = AggregatorConfig {
            group_by: vec!["region".to_string()],
            ..Default::default()
        };
        config.aggregations.insert(
            "total".to_string(),
            AggregationSpec {
                field: Some("amount".to_string()),
                function: None,
            },
        );
        let err = Aggregator::new(config).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("must have 'field' and 'function'"));
    }

    #[test]
    fn test_custom_function() {
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .register_function("range", FieldType::Float, |values: &[FieldValue]| {
                let nums: Vec<f64> = values.iter().filter_map(FieldValue::as_f64).collect();
                match (
                    nums.iter().copied().reduce(f64::min),
                    nums.iter().copied().reduce(f64::max),
                ) {
                    (Some(lo), Some(hi)) => FieldValue::Float(hi - lo),
                    _ => FieldValue::Null,
                }
            })
            .aggregate("spread", "amount", "range")
            .build()
            .unwrap();
        let out = aggregator.aggregate_batch(sales(), None).unwrap();
        assert_eq!(out[0].get("spread"), Some(&FieldValue::Float(7.5)));
        assert!(aggregator.registry().contains("range"));
    }

    #[test]
    fn test_stats() {
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .aggregate("n", "amount", "count")
            .build()
            .unwrap();
        aggregator.transform_batch(sales(), None).unwrap();
        let stats = aggregator.get_stats();
        assert_eq!(stats.base.records_processed, 2);
        assert_eq!(stats.base.records_filtered, 2);
        assert_eq!(stats.extra("groups_created"), Some(&json!(2)));
    }

    #[test]
    fn test_null_group_key_forms_its_own_group() {
        let records = vec![
            Record::from_json(json!({"region": null, "amount": 1})).unwrap(),
            Record::from_json(json!({"amount": 2})).unwrap(),
            Record::from_json(json!({"region": "east", "amount": 3})).unwrap(),
        ];
        let mut aggregator = Aggregator::builder()
            .group_by(["region"])
            .aggregate("total", "amount", "sum")
            .build()
            .unwrap();
        let out = aggregator.aggregate_batch(records, None).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("region"), Some(&FieldValue::Null));
        assert_eq!(out[0].get("total"), Some(&FieldValue::Float(3.0)));
    }
}
