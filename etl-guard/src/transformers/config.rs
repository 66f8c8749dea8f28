//! Declarative transformer configuration.
//!
//! A pipeline definition lists its transformers as tagged JSON objects:
//!
//! ```
//! use etl_guard::transformers::{Transformer, TransformerConfig};
//!
//! let configs: Vec<TransformerConfig> = serde_json::from_str(
//!     r#"[
//!         {"type": "null_remover", "strategy": "drop_all"},
//!         {"type": "quality_scorer", "min_score": 0.6},
//!         {"type": "anomaly_detector", "method": "iqr"},
//!         {"type": "metadata_to_columns"}
//!     ]"#,
//! )
//! .unwrap();
//! let chain = TransformerConfig::build_all(&configs).unwrap();
//! assert_eq!(chain[1].name(), "QualityScorer");
//! ```

use serde::{Deserialize, Serialize};

use super::{
    AggregatorConfig, Aggregator, AnomalyDetector, AnomalyDetectorConfig, ColumnRemover,
    ColumnRemoverConfig, Deduplicator, DeduplicatorConfig, MetadataToColumns,
    MetadataToColumnsConfig, NullRemover, NullRemoverConfig, QualityScorer, QualityScorerConfig,
    SchemaInferrer, SchemaInferrerConfig, Transformer,
};
use crate::error::{ErrorContext, Result};

/// Configuration of one transformer, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformerConfig {
    QualityScorer(QualityScorerConfig),
    AnomalyDetector(AnomalyDetectorConfig),
    Deduplicator(DeduplicatorConfig),
    Aggregator(AggregatorConfig),
    SchemaInferrer(SchemaInferrerConfig),
    NullRemover(NullRemoverConfig),
    ColumnRemover(ColumnRemoverConfig),
    MetadataToColumns(MetadataToColumnsConfig),
}

impl TransformerConfig {
    /// The `type` tag of this configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformerConfig::QualityScorer(_) => "quality_scorer",
            TransformerConfig::AnomalyDetector(_) => "anomaly_detector",
            TransformerConfig::Deduplicator(_) => "deduplicator",
            TransformerConfig::Aggregator(_) => "aggregator",
            TransformerConfig::SchemaInferrer(_) => "schema_inferrer",
            TransformerConfig::NullRemover(_) => "null_remover",
            TransformerConfig::ColumnRemover(_) => "column_remover",
            TransformerConfig::MetadataToColumns(_) => "metadata_to_columns",
        }
    }

    /// Validates the configuration and constructs the transformer.
    pub fn build(&self) -> Result<Box<dyn Transformer>> {
        let transformer: Box<dyn Transformer> = match self.clone() {
            TransformerConfig::QualityScorer(c) => Box::new(QualityScorer::new(c)?),
            TransformerConfig::AnomalyDetector(c) => Box::new(AnomalyDetector::new(c)?),
            TransformerConfig::Deduplicator(c) => Box::new(Deduplicator::new(c)?),
            TransformerConfig::Aggregator(c) => Box::new(Aggregator::new(c)?),
            TransformerConfig::SchemaInferrer(c) => Box::new(SchemaInferrer::new(c)?),
            TransformerConfig::NullRemover(c) => Box::new(NullRemover::new(c)),
            TransformerConfig::ColumnRemover(c) => Box::new(ColumnRemover::new(c)?),
            TransformerConfig::MetadataToColumns(c) => Box::new(MetadataToColumns::new(c)),
        };
        Ok(transformer)
    }

    /// Builds every configuration in order, failing on the first invalid one.
    pub fn build_all(configs: &[TransformerConfig]) -> Result<Vec<Box<dyn Transformer>>> {
        configs
            .iter()
            .enumerate()
            .map(|(i, config)| {
                config
                    .build()
                    .with_context(|| format!("transformer #{i} ({})", config.kind()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::{DetectionMethod, MatchMode};

    #[test]
    fn test_tagged_deserialization_uses_defaults() {
        let config: TransformerConfig =
            serde_json::from_str(r#"{"type": "anomaly_detector", "method": "iqr"}"#).unwrap();
        match &config {
            TransformerConfig::AnomalyDetector(c) => {
                assert_eq!(c.method, DetectionMethod::Iqr);
                assert_eq!(c.threshold, 3.0);
            }
            other => panic!("unexpected config: {other:?}"),
        }
        assert_eq!(config.build().unwrap().name(), "AnomalyDetector");
    }

    #[test]
    fn test_round_trip_keeps_tag() {
        let config = TransformerConfig::Deduplicator(DeduplicatorConfig {
            match_mode: MatchMode::Fuzzy,
            ..Default::default()
        });
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "deduplicator");
        assert_eq!(json["match_mode"], "fuzzy");
    }

    #[test]
    fn test_invalid_configs_fail_at_build() {
        let bad: Vec<TransformerConfig> = serde_json::from_str(
            r#"[
                {"type": "null_remover"},
                {"type": "aggregator", "group_by": ["k"],
                 "aggregations": {"m": {"field": "v", "function": "median"}}}
            ]"#,
        )
        .unwrap();
        let err = TransformerConfig::build_all(&bad).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("transformer #1 (aggregator)"));

        let fuzzy = TransformerConfig::Deduplicator(DeduplicatorConfig {
            match_mode: MatchMode::Fuzzy,
            embedding_model: None,
            ..Default::default()
        });
        assert!(fuzzy.build().unwrap_err().is_configuration());

        let regex: TransformerConfig =
            serde_json::from_str(r#"{"type": "column_remover", "pattern": "("}"#).unwrap();
        assert!(regex.build().unwrap_err().is_configuration());

        let err = TransformerConfig::build_all(&[regex]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("transformer #0 (column_remover)"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed: std::result::Result<TransformerConfig, _> =
            serde_json::from_str(r#"{"type": "pivot"}"#);
        assert!(parsed.is_err());
    }
}
