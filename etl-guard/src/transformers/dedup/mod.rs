//! Duplicate detection and removal.
//!
//! Two matching modes are supported:
//!
//! - **exact**: records whose selected fields hash to the same SHA-256
//!   digest form a group
//! - **fuzzy**: records are rendered to text, embedded, and greedily
//!   clustered by cosine similarity
//!
//! One survivor per group is kept according to the [`MergeStrategy`].
//! Groups, and therefore survivors, come out in order of first appearance.
//!
//! Greedy clustering is seeded: each unvisited record takes every later
//! unvisited record whose similarity *to the seed* reaches the threshold.
//! Similarity between two non-seed members is never consulted, so a chain
//! `A ~ B ~ C` with `A !~ C` does not pull `C` into `A`'s cluster.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use super::{Transformer, TransformerStats};
use crate::error::{EtlError, Result};
use crate::record::{FieldValue, Record, Schema};

pub mod embedding;

pub use embedding::{EmbeddingModel, HashingEmbedder};

/// Tolerance applied to the similarity threshold.
const SIMILARITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Fuzzy,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Fuzzy => "fuzzy",
        }
    }
}

impl FromStr for MatchMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(MatchMode::Exact),
            "fuzzy" => Ok(MatchMode::Fuzzy),
            other => Err(EtlError::configuration(format!(
                "Invalid match_mode: {other}. Must be one of: 'exact', 'fuzzy'"
            ))),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which record of a duplicate group survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    KeepFirst,
    KeepLast,
    /// Highest `metadata.quality_score` (absent counts as 0.0), earliest on ties
    KeepBestQuality,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::KeepFirst => "keep_first",
            MergeStrategy::KeepLast => "keep_last",
            MergeStrategy::KeepBestQuality => "keep_best_quality",
        }
    }

    /// Picks the survivor among `group` (indices into `records`).
    fn select(&self, group: &[usize], records: &[Record]) -> usize {
        match self {
            MergeStrategy::KeepFirst => group[0],
            MergeStrategy::KeepLast => group[group.len() - 1],
            MergeStrategy::KeepBestQuality => {
                let score = |i: usize| records[i].metadata.quality_score.unwrap_or(0.0);
                let mut best = group[0];
                for &candidate in &group[1..] {
                    if score(candidate) > score(best) {
                        best = candidate;
                    }
                }
                best
            }
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep_first" => Ok(MergeStrategy::KeepFirst),
            "keep_last" => Ok(MergeStrategy::KeepLast),
            "keep_best_quality" => Ok(MergeStrategy::KeepBestQuality),
            other => Err(EtlError::configuration(format!(
                "Invalid merge_strategy: {other}. Must be one of: \
                 'keep_first', 'keep_last', 'keep_best_quality'"
            ))),
        }
    }
}

/// Configuration for [`Deduplicator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicatorConfig {
    pub match_mode: MatchMode,
    /// Fields compared for matching; `None` compares every field
    pub match_fields: Option<Vec<String>>,
    /// Minimum cosine similarity for fuzzy matches, in `[0, 1]`
    pub similarity_threshold: f64,
    pub merge_strategy: MergeStrategy,
    /// Embedding backend for fuzzy mode; `None` means no backend
    pub embedding_model: Option<String>,
}

impl Default for DeduplicatorConfig {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::Exact,
            match_fields: None,
            similarity_threshold: 0.95,
            merge_strategy: MergeStrategy::KeepFirst,
            embedding_model: Some(embedding::HASHING_MODEL.to_string()),
        }
    }
}

impl DeduplicatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(EtlError::configuration(format!(
                "similarity_threshold must be between 0 and 1, got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Transformer that removes duplicate records from a batch.
#[derive(Debug)]
pub struct Deduplicator {
    config: DeduplicatorConfig,
    model: Option<Box<dyn EmbeddingModel>>,
    stats: TransformerStats,
    duplicate_groups: u64,
}

impl Deduplicator {
    /// Creates a deduplicator, resolving the configured embedding backend
    /// when fuzzy matching is selected.
    pub fn new(config: DeduplicatorConfig) -> Result<Self> {
        config.validate()?;
        let model = match (config.match_mode, &config.embedding_model) {
            (MatchMode::Exact, _) => None,
            (MatchMode::Fuzzy, Some(name)) => Some(embedding::resolve_model(name)?),
            (MatchMode::Fuzzy, None) => {
                return Err(EtlError::capability_unavailable(
                    "embedding_model",
                    "fuzzy matching requires an embedding backend",
                ))
            }
        };
        Ok(Self {
            config,
            model,
            stats: TransformerStats::default(),
            duplicate_groups: 0,
        })
    }

    /// Creates a deduplicator with a caller-supplied embedding backend.
    pub fn with_embedding_model(
        mut config: DeduplicatorConfig,
        model: Box<dyn EmbeddingModel>,
    ) -> Result<Self> {
        config.validate()?;
        config.embedding_model = Some(model.name().to_string());
        Ok(Self {
            config,
            model: Some(model),
            stats: TransformerStats::default(),
            duplicate_groups: 0,
        })
    }

    pub fn builder() -> DeduplicatorBuilder {
        DeduplicatorBuilder::default()
    }

    pub fn config(&self) -> &DeduplicatorConfig {
        &self.config
    }

    /// Removes duplicates from a batch.
    #[instrument(
        skip(self, records),
        fields(mode = %self.config.match_mode, batch_size = records.len())
    )]
    pub fn dedupe_batch(&mut self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let groups = match self.config.match_mode {
            MatchMode::Exact => self.exact_groups(&records)?,
            MatchMode::Fuzzy => self.fuzzy_groups(&records)?,
        };

        let input = records.len();
        let survivors: Vec<usize> = groups
            .iter()
            .map(|group| self.config.merge_strategy.select(group, &records))
            .collect();
        let duplicate_groups = groups.iter().filter(|g| g.len() > 1).count() as u64;

        let mut slots: Vec<Option<Record>> = records.into_iter().map(Some).collect();
        let output: Vec<Record> = survivors
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        let removed = (input - output.len()) as u64;
        self.stats.records_processed += output.len() as u64;
        self.stats.records_filtered += removed;
        self.duplicate_groups += duplicate_groups;

        info!(
            input,
            kept = output.len(),
            removed,
            duplicate_groups,
            "Deduplicated batch"
        );
        Ok(output)
    }

    /// Selected `(field, value)` pairs, sorted by field name.
    fn selected_fields<'a>(&self, record: &'a Record) -> Vec<(&'a str, &'a FieldValue)> {
        match &self.config.match_fields {
            Some(fields) => {
                let mut pairs: Vec<(&str, &FieldValue)> = record
                    .data
                    .iter()
                    .filter(|(k, _)| fields.iter().any(|f| f == *k))
                    .map(|(k, v)| (k.as_str(), v))
                    .collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                pairs
            }
            None => record.data.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        }
    }

    /// Stable SHA-256 digest of the record's selected fields.
    pub fn record_hash(&self, record: &Record) -> Result<String> {
        let canonical = serde_json::to_string(&self.selected_fields(record))?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Text rendering used for fuzzy matching: `"key: value"` parts joined by `" | "`.
    pub fn record_text(&self, record: &Record) -> String {
        self.selected_fields(record)
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn exact_groups(&self, records: &[Record]) -> Result<Vec<Vec<usize>>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let hash = self.record_hash(record)?;
            match index.get(&hash) {
                Some(&g) => groups[g].push(i),
                None => {
                    index.insert(hash, groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        Ok(groups)
    }

    fn fuzzy_groups(&self, records: &[Record]) -> Result<Vec<Vec<usize>>> {
        let model = self.model.as_ref().ok_or_else(|| {
            EtlError::capability_unavailable("embedding_model", "no embedding backend configured")
        })?;

        let texts: Vec<String> = records.iter().map(|r| self.record_text(r)).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        debug!(model = model.name(), count = texts.len(), "Generating embeddings");
        let embeddings = model.embed_batch(&text_refs)?;
        if embeddings.len() != texts.len() {
            return Err(EtlError::Internal(format!(
                "embedding model '{}' returned {} vectors for {} texts",
                model.name(),
                embeddings.len(),
                texts.len()
            )));
        }
        let dimension = model.dimension();
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimension) {
            return Err(EtlError::Internal(format!(
                "embedding model '{}' returned a {}-dimensional vector for text {bad}, \
                 expected {dimension}",
                model.name(),
                embeddings[bad].len()
            )));
        }

        let normalized: Vec<Vec<f64>> =
            embeddings.iter().map(|e| embedding::normalize(e)).collect();
        let similarities = similarity_matrix(&texts, &normalized);
        Ok(greedy_clusters(&similarities, self.config.similarity_threshold))
    }
}

/// Full pairwise cosine-similarity matrix. Identical texts score exactly 1.0.
pub fn similarity_matrix(texts: &[String], normalized: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = texts.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let sim = if texts[i] == texts[j] {
                1.0
            } else {
                embedding::cosine(&normalized[i], &normalized[j])
            };
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }
    matrix
}

/// Seeded greedy clustering over a similarity matrix.
pub fn greedy_clusters(similarities: &[Vec<f64>], threshold: f64) -> Vec<Vec<usize>> {
    let n = similarities.len();
    let mut visited = vec![false; n];
    let mut clusters = Vec::new();
    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut cluster = vec![i];
        for j in (i + 1)..n {
            if !visited[j] && similarities[i][j] >= threshold - SIMILARITY_EPSILON {
                visited[j] = true;
                cluster.push(j);
            }
        }
        clusters.push(cluster);
    }
    clusters
}

impl Transformer for Deduplicator {
    fn name(&self) -> &str {
        "Deduplicator"
    }

    fn transform_batch(
        &mut self,
        records: Vec<Record>,
        _schema: Option<&Schema>,
    ) -> Result<Vec<Record>> {
        self.dedupe_batch(records).map_err(|e| {
            self.stats.errors += 1;
            EtlError::wrap_transform("Deduplicator", e)
        })
    }

    fn stats(&self) -> &TransformerStats {
        &self.stats
    }

    fn extra_stats(&self) -> BTreeMap<String, serde_json::Value> {
        let mut extras = BTreeMap::new();
        extras.insert(
            "duplicate_groups".to_string(),
            serde_json::json!(self.duplicate_groups),
        );
        extras
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
        self.duplicate_groups = 0;
    }
}

/// Builder for [`Deduplicator`].
#[derive(Debug, Default)]
pub struct DeduplicatorBuilder {
    config: DeduplicatorConfig,
    model: Option<Box<dyn EmbeddingModel>>,
}

impl DeduplicatorBuilder {
    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.config.match_mode = mode;
        self
    }

    pub fn match_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.match_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.config.merge_strategy = strategy;
        self
    }

    /// Names the embedding backend; `None` leaves fuzzy mode without one.
    pub fn embedding_model(mut self, name: Option<&str>) -> Self {
        self.config.embedding_model = name.map(str::to_string);
        self
    }

    pub fn custom_embedding_model(mut self, model: Box<dyn EmbeddingModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn build(self) -> Result<Deduplicator> {
        match self.model {
            Some(model) => Deduplicator::with_embedding_model(self.config, model),
            None => Deduplicator::new(self.config),
        }
    }
}
