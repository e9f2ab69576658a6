//! Metrics comparing the pseudobulk profiles (per-feature aggregate) of two point clouds.

use ndarray::{Array1, ArrayView2, Axis};

use crate::distance::Aggregation;
use crate::testing::correlation::{kendall_tau_b, pearson, spearman};

/// Per-feature aggregate of the rows of `x`.
pub fn pseudobulk(x: ArrayView2<'_, f64>, aggregation: Aggregation) -> Array1<f64> {
    match aggregation {
        Aggregation::Mean => x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(x.ncols(), f64::NAN)),
        Aggregation::Median => x.map_axis(Axis(0), |column| {
            let mut values = column.to_vec();
            median(&mut values)
        }),
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn profiles(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    agg: Aggregation,
) -> (Vec<f64>, Vec<f64>) {
    (pseudobulk(x, agg).to_vec(), pseudobulk(y, agg).to_vec())
}

fn squared_error_sum(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(p, q)| (p - q) * (p - q)).sum()
}

pub fn euclidean(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, agg: Aggregation) -> f64 {
    let (a, b) = profiles(x, y, agg);
    squared_error_sum(&a, &b).sqrt()
}

pub fn mean_squared_error(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, agg: Aggregation) -> f64 {
    let (a, b) = profiles(x, y, agg);
    squared_error_sum(&a, &b) / a.len() as f64
}

pub fn root_mean_squared_error(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    agg: Aggregation,
) -> f64 {
    mean_squared_error(x, y, agg).sqrt()
}

pub fn mean_absolute_error(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    agg: Aggregation,
) -> f64 {
    let (a, b) = profiles(x, y, agg);
    a.iter().zip(&b).map(|(p, q)| (p - q).abs()).sum::<f64>() / a.len() as f64
}

pub fn pearson_distance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, agg: Aggregation) -> f64 {
    let (a, b) = profiles(x, y, agg);
    1.0 - pearson(&a, &b)
}

pub fn spearman_distance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, agg: Aggregation) -> f64 {
    let (a, b) = profiles(x, y, agg);
    1.0 - spearman(&a, &b)
}

pub fn kendall_tau_distance(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    agg: Aggregation,
) -> f64 {
    let (a, b) = profiles(x, y, agg);
    1.0 - kendall_tau_b(&a, &b)
}

/// `1 - cos(a, b)` of the two profiles; `NaN` when either profile is the zero vector.
pub fn cosine_distance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, agg: Aggregation) -> f64 {
    let (a, b) = profiles(x, y, agg);
    let dot: f64 = a.iter().zip(&b).map(|(p, q)| p * q).sum();
    let norm_a: f64 = a.iter().map(|p| p * p).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|q| q * q).sum::<f64>().sqrt();
    let denom = norm_a * norm_b;
    if denom == 0.0 {
        return f64::NAN;
    }
    (1.0 - dot / denom).max(0.0)
}

/// `1 - R²` of the second profile as a prediction of the first.
pub fn r2_distance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, agg: Aggregation) -> f64 {
    let (truth, predicted) = profiles(x, y, agg);
    let mean = truth.iter().sum::<f64>() / truth.len() as f64;
    let ss_res = squared_error_sum(&truth, &predicted);
    let ss_tot: f64 = truth.iter().map(|t| (t - mean) * (t - mean)).sum();

    if ss_tot == 0.0 {
        // Constant truth: perfect only when the prediction matches exactly
        return if ss_res == 0.0 { 0.0 } else { 1.0 };
    }
    ss_res / ss_tot
}
