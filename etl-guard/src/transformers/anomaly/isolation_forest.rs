//! Seeded Isolation Forest (Liu, Ting & Zhou, 2008).
//!
//! Anomalies are "few and different", so random axis-aligned splits isolate
//! them in fewer steps than normal points. The forest averages the path
//! length of each point over `n_estimators` random trees, each grown on a
//! subsample of at most 256 rows, and turns it into a score in `(0, 1]`:
//!
//! ```text
//! s(x) = 2 ^ (-E[h(x)] / c(ψ))
//! ```
//!
//! where `c(ψ)` is the average path length of an unsuccessful BST search
//! over `ψ` points. The `contamination` fraction of rows with the highest
//! scores is flagged.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::statistics::{percentile_sorted, sorted};
use super::OutlierModel;
use crate::error::{EtlError, Result};

/// Default subsample size per tree.
pub const DEFAULT_MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn path_length(&self, row: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_GAMMA;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation Forest outlier model.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    seed: u64,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            max_samples: DEFAULT_MAX_SAMPLES,
            seed,
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(2);
        self
    }

    /// Anomaly score of every row, in `(0, 1]`.
    pub fn score_samples(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        let n = features.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let width = features[0].len();
        if let Some(bad) = features.iter().position(|row| row.len() != width) {
            return Err(EtlError::Internal(format!(
                "feature row {bad} has {} columns, expected {width}",
                features[bad].len()
            )));
        }

        let sample_size = self.max_samples.min(n);
        let normalizer = average_path_length(sample_size);
        if normalizer == 0.0 {
            return Ok(vec![0.5; n]);
        }
        let depth_limit = (sample_size as f64).log2().ceil() as usize;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut total_path = vec![0.0; n];
        for _ in 0..self.n_estimators {
            let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
            let tree = grow(features, sample, 0, depth_limit, &mut rng);
            for (i, row) in features.iter().enumerate() {
                total_path[i] += tree.path_length(row, 0);
            }
        }

        let trees = self.n_estimators as f64;
        Ok(total_path
            .into_iter()
            .map(|path| 2f64.powf(-(path / trees) / normalizer))
            .collect())
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(100, 42)
    }
}

impl OutlierModel for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn fit_predict(&self, features: &[Vec<f64>], contamination: f64) -> Result<Vec<bool>> {
        let scores = self.score_samples(features)?;
        if scores.len() < 2 {
            return Ok(vec![false; scores.len()]);
        }
        let threshold = percentile_sorted(&sorted(&scores), 100.0 * (1.0 - contamination))
            .unwrap_or(f64::INFINITY);
        Ok(scores.iter().map(|s| *s > threshold).collect())
    }
}

fn grow(
    features: &[Vec<f64>],
    rows: Vec<usize>,
    depth: usize,
    depth_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= depth_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // only features that still vary within a finite range can split this node
    let width = features[rows[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = features[r][feature];
                (lo.min(v), hi.max(v))
            });
            (lo.is_finite() && hi.is_finite() && hi > lo).then_some((feature, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = splittable[rng.random_range(0..splittable.len())];
    // convex combination, since hi - lo can overflow for opposite-signed bounds
    let u: f64 = rng.random();
    let threshold = (lo * (1.0 - u) + hi * u).clamp(lo, hi);
    let (left, right): (Vec<usize>, Vec<usize>) = rows
        .into_iter()
        .partition(|&r| features[r][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(features, left, depth + 1, depth_limit, rng)),
        right: Box::new(grow(features, right, depth + 1, depth_limit, rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_outlier() -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![10.0 + (i % 5) as f64 * 0.1, 20.0 + (i % 7) as f64 * 0.1])
            .collect();
        rows.push(vec![500.0, -300.0]);
        rows
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!(c256 > 10.0 && c256 < 11.0);
    }

    #[test]
    fn test_outlier_gets_highest_score() {
        let forest = IsolationForest::default();
        let scores = forest.score_samples(&clustered_with_outlier()).unwrap();
        let (best, _) = scores
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, s)| if *s > acc.1 { (i, *s) } else { acc });
        assert_eq!(best, 50);
        assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_fit_predict_flags_outlier() {
        let forest = IsolationForest::new(100, 42);
        let flags = forest.fit_predict(&clustered_with_outlier(), 0.02).unwrap();
        assert!(flags[50]);
        assert!(flags.iter().filter(|f| **f).count() <= 2);
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let data = clustered_with_outlier();
        let a = IsolationForest::new(20, 7).score_samples(&data).unwrap();
        let b = IsolationForest::new(20, 7).score_samples(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_data_flags_nothing() {
        let data = vec![vec![1.0, 1.0]; 10];
        let flags = IsolationForest::default().fit_predict(&data, 0.1).unwrap();
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn test_extreme_and_infinite_values_do_not_panic() {
        let data: Vec<Vec<f64>> = [1.0, 2.0, 3.0, 1.5e308, -1.5e308, f64::INFINITY]
            .iter()
            .map(|v| vec![*v, 1.0])
            .collect();
        let scores = IsolationForest::new(20, 42).score_samples(&data).unwrap();
        assert_eq!(scores.len(), 6);
        assert!(scores.iter().all(|s| s.is_finite()));

        let wide: Vec<Vec<f64>> = [1.0, 2.0, 3.0, f64::MAX, f64::MIN]
            .iter()
            .map(|v| vec![*v])
            .collect();
        let flags = IsolationForest::new(20, 42).fit_predict(&wide, 0.2).unwrap();
        assert_eq!(flags.len(), 5);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let data = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(IsolationForest::default().score_samples(&data).is_err());
    }
}
