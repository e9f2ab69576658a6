use crate::matrix::FeatureMatrix;
use crate::testing::TestResult;
use crate::testing::utils::{rank_average, tie_group_sizes};
use ndarray::Axis;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;

pub fn wilcoxon_matrix_groups(
    matrix: &FeatureMatrix,
    group1_indices: &[usize],
    group2_indices: &[usize],
    tie_correct: bool,
) -> anyhow::Result<Vec<TestResult<f64>>> {
    if group1_indices.is_empty() || group2_indices.is_empty() {
        return Err(anyhow::anyhow!("Group indices cannot be empty"));
    }

    let dense = matrix.to_dense();
    let group1 = dense.select(Axis(0), group1_indices);
    let group2 = dense.select(Axis(0), group2_indices);

    let results: Vec<_> = (0..dense.ncols())
        .into_par_iter()
        .map(|feature| {
            let x: Vec<f64> = group1.column(feature).to_vec();
            let y: Vec<f64> = group2.column(feature).to_vec();
            let result = rank_sum_z(&x, &y, tie_correct);
            if result.statistic.is_nan() {
                TestResult::new(0.0, 1.0)
            } else {
                result
            }
        })
        .collect();

    Ok(results)
}

/// Wilcoxon rank-sum test of `x` against `y`, reported as a signed z-score.
///
/// Positive scores mean `x` tends to rank above `y`. The p-value is two-sided under the
/// normal approximation.
pub fn rank_sum_z(x: &[f64], y: &[f64], tie_correct: bool) -> TestResult<f64> {
    let nx = x.len();
    let ny = y.len();

    if nx == 0 || ny == 0 {
        return TestResult::new(f64::NAN, 1.0); // Insufficient data
    }

    let mut combined: Vec<f64> = Vec::with_capacity(nx + ny);
    combined.extend_from_slice(x);
    combined.extend_from_slice(y);

    let ranks = rank_average(&combined);
    let rank_sum_x: f64 = ranks[..nx].iter().sum();

    let n1 = nx as f64;
    let n2 = ny as f64;
    let n = n1 + n2;

    let mut variance = n1 * n2 * (n + 1.0) / 12.0;
    if tie_correct {
        let ties: f64 = tie_group_sizes(&combined)
            .into_iter()
            .map(|t| {
                let t = t as f64;
                t * t * t - t
            })
            .sum();
        variance *= 1.0 - ties / (n * n * n - n);
    }

    let z = (rank_sum_x - n1 * (n + 1.0) / 2.0) / variance.sqrt();
    let p_value = if z.is_nan() {
        f64::NAN
    } else {
        erfc(z.abs() / SQRT_2)
    };

    TestResult::new(z, p_value)
}
