//! Univariate statistics and the two distribution-based detectors.
//!
//! Both detectors work on one column at a time. A column is a slice of
//! `Option<f64>`, one slot per record, `None` where the record has no
//! numeric value; statistics are computed over the `Some` values only.

use std::cmp::Ordering;

/// Minimum number of values the z-score detector needs.
pub const MIN_ZSCORE_VALUES: usize = 3;

/// Minimum number of values the IQR detector needs.
pub const MIN_IQR_VALUES: usize = 4;

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in `[0, 100]`. `sorted` must be sorted ascending.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Sorts a copy of the values ascending.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut copy = values.to_vec();
    copy.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    copy
}

/// Mean and population standard deviation of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMoments {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

impl ColumnMoments {
    /// Computes moments over the present values of a column.
    ///
    /// Returns `None` when the column has fewer than three values or zero
    /// spread, i.e. when a z-score is undefined.
    pub fn of(column: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        if present.len() < MIN_ZSCORE_VALUES {
            return None;
        }
        let mean = mean(&present)?;
        let std = population_std(&present)?;
        if std == 0.0 || !std.is_finite() {
            return None;
        }
        Some(Self {
            mean,
            std,
            count: present.len(),
        })
    }

    pub fn z_score(&self, value: f64) -> f64 {
        ((value - self.mean) / self.std).abs()
    }
}

/// Interquartile fences of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Computes `[Q1 - k·IQR, Q3 + k·IQR]` over the present values.
    ///
    /// Returns `None` with fewer than four values or a zero IQR.
    pub fn of(column: &[Option<f64>], multiplier: f64) -> Option<Self> {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        if present.len() < MIN_IQR_VALUES {
            return None;
        }
        let sorted = sorted(&present);
        let q1 = percentile_sorted(&sorted, 25.0)?;
        let q3 = percentile_sorted(&sorted, 75.0)?;
        let iqr = q3 - q1;
        if iqr == 0.0 {
            return None;
        }
        Some(Self {
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Flags every row whose z-score exceeds `threshold`.
///
/// Returns `None` when the column was skipped.
pub fn zscore_outliers(column: &[Option<f64>], threshold: f64) -> Option<Vec<bool>> {
    let moments = ColumnMoments::of(column)?;
    Some(
        column
            .iter()
            .map(|v| v.is_some_and(|x| moments.z_score(x) > threshold))
            .collect(),
    )
}

/// Flags every row outside the IQR fences.
///
/// Returns `None` when the column was skipped.
pub fn iqr_outliers(column: &[Option<f64>], multiplier: f64) -> Option<Vec<bool>> {
    let bounds = IqrBounds::of(column, multiplier)?;
    Some(
        column
            .iter()
            .map(|v| v.is_some_and(|x| !bounds.contains(x)))
            .collect(),
    )
}
