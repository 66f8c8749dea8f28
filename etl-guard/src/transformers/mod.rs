//! Batch transformers and the contract they share.
//!
//! Every transformer takes a batch of [`Record`]s and returns a new batch.
//! The output may be shorter (filtering, deduplication), the same length
//! with annotations (scoring, anomaly detection), or a different shape
//! entirely (aggregation).
//!
//! ## Lifecycle
//!
//! A run calls [`Transformer::setup`] once, [`Transformer::transform_batch`]
//! once per batch and [`Transformer::cleanup`] once at the end. The helper
//! [`chain::apply_transformers`] drives that sequence over a list of boxed
//! transformers.
//!
//! ## Statistics
//!
//! Each transformer owns a [`TransformerStats`] block. Counters accumulate
//! across batch calls and are only cleared by [`Transformer::reset_stats`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::Result;
use crate::record::{Record, Schema};

pub mod aggregate;
pub mod anomaly;
pub mod chain;
pub mod cleaners;
pub mod config;
pub mod dedup;
pub mod metadata_columns;
pub mod quality;
pub mod schema_inference;

pub use aggregate::{AggregationRegistry, AggregationSpec, Aggregator, AggregatorConfig};
pub use anomaly::{AnomalyDetector, AnomalyDetectorConfig, DetectionMethod, OutlierModel};
pub use chain::{apply_transformers, resolve_schema, ChainOutput};
pub use cleaners::{
    ColumnRemover, ColumnRemoverConfig, NullRemover, NullRemoverConfig, NullStrategy,
};
pub use config::TransformerConfig;
pub use dedup::{Deduplicator, DeduplicatorConfig, EmbeddingModel, MatchMode, MergeStrategy};
pub use metadata_columns::{MetadataToColumns, MetadataToColumnsConfig};
pub use quality::{QualityScorer, QualityScorerConfig, QualityWeights};
pub use schema_inference::{SchemaAccumulator, SchemaInferrer, SchemaInferrerConfig};

/// Base counters every transformer maintains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerStats {
    pub records_processed: u64,
    pub records_filtered: u64,
    pub records_modified: u64,
    pub errors: u64,
}

impl TransformerStats {
    /// Clears all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot of a transformer's statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub transformer: String,
    #[serde(flatten)]
    pub base: TransformerStats,
    /// Component-specific counters (e.g. `groups_created`)
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl StatsReport {
    /// Looks up a component-specific counter.
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }
}

/// A batch transformation step.
///
/// Implementations must return an empty batch for an empty input without
/// touching their counters, and must report every failure inside
/// `transform_batch` as [`EtlError::Transform`](crate::error::EtlError::Transform)
/// after incrementing `errors`.
pub trait Transformer: Send + Debug {
    /// Stable component name used in logs and errors.
    fn name(&self) -> &str;

    /// Called once before the first batch.
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transforms one batch.
    ///
    /// `schema` is the schema currently in effect for the batch, if any.
    fn transform_batch(&mut self, records: Vec<Record>, schema: Option<&Schema>)
        -> Result<Vec<Record>>;

    /// Called once after the last batch, also after a failed run.
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> &TransformerStats;

    /// Component-specific counters merged into [`Transformer::get_stats`].
    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    /// Base counters plus component extras.
    fn get_stats(&self) -> StatsReport {
        StatsReport {
            transformer: self.name().to_string(),
            base: *self.stats(),
            extras: self.extra_stats(),
        }
    }

    fn reset_stats(&mut self);
}

impl Transformer for Box<dyn Transformer> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn setup(&mut self) -> Result<()> {
        (**self).setup()
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        (**self).transform_batch(records, schema)
    }

    fn cleanup(&mut self) -> Result<()> {
        (**self).cleanup()
    }

    fn stats(&self) -> &TransformerStats {
        (**self).stats()
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        (**self).extra_stats()
    }

    fn get_stats(&self) -> StatsReport {
        (**self).get_stats()
    }

    fn reset_stats(&mut self) {
        (**self).reset_stats()
    }
}
