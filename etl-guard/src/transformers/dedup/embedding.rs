//! Text embedding backends for fuzzy deduplication.

use sha2::{Digest, Sha256};
use std::fmt::Debug;

use crate::error::{EtlError, Result};

/// Name of the built-in backend.
pub const HASHING_MODEL: &str = "hashing";

/// Embedding model abstraction.
pub trait EmbeddingModel: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize;
}

impl EmbeddingModel for Box<dyn EmbeddingModel> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word token and each character trigram is hashed into one
/// of `dimension` signed buckets. Texts sharing most of their tokens and
/// character runs end up with a high cosine similarity, which is enough
/// to catch typos, reordered fields and casing differences without a
/// trained model.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    const TOKEN_WEIGHT: f32 = 1.0;
    const TRIGRAM_WEIGHT: f32 = 0.5;

    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EtlError::configuration(
                "embedding dimension must be at least 1",
            ));
        }
        Ok(Self { dimension })
    }

    fn add_feature(&self, vector: &mut [f32], kind: u8, feature: &str, weight: f32) {
        let mut hasher = Sha256::new();
        hasher.update([kind]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();

        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dimension;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn name(&self) -> &str {
        HASHING_MODEL
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dimension];
        let lower = text.to_lowercase();

        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            self.add_feature(&mut vector, b't', token, Self::TOKEN_WEIGHT);
        }

        let chars: Vec<char> = format!("  {lower} ").chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            self.add_feature(&mut vector, b'c', &trigram, Self::TRIGRAM_WEIGHT);
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Resolves a backend by name.
pub fn resolve_model(name: &str) -> Result<Box<dyn EmbeddingModel>> {
    match name {
        HASHING_MODEL => Ok(Box::new(HashingEmbedder::default())),
        other => Err(EtlError::capability_unavailable(
            "embedding_model",
            format!(
                "unknown embedding model '{other}'; use '{HASHING_MODEL}' or supply a backend with \
                 Deduplicator::with_embedding_model"
            ),
        )),
    }
}

/// L2-normalizes a vector in `f64`. Zero vectors stay zero.
pub fn normalize(vector: &[f32]) -> Vec<f64> {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v).powi(2))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|v| f64::from(*v) / norm).collect()
}

/// Dot product of two normalized vectors.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
