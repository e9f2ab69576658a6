//! Parametric two-group tests over every feature of an observation matrix.
//!
//! The per-feature statistics are accumulated in a single pass over the rows, so sparse
//! matrices only touch stored entries.

use crate::matrix::FeatureMatrix;
use crate::testing::utils::accumulate_feature_statistics;
use crate::testing::{TTestType, TestResult};
use statrs::function::beta::beta_reg;

/// Perform t-tests on all features comparing two groups of observations.
///
/// # Arguments
///
/// * `matrix` - Observation matrix (cells × features)
/// * `group1_indices` - Row indices of the tested group
/// * `group2_indices` - Row indices of the reference group
/// * `test_type` - Which t-test variant to run
///
/// # Returns
///
/// One `TestResult` per feature. Undefined statistics (zero variance in both groups)
/// are reported as a score of 0 with p-value 1.
pub fn t_test_matrix_groups(
    matrix: &FeatureMatrix,
    group1_indices: &[usize],
    group2_indices: &[usize],
    test_type: TTestType,
) -> anyhow::Result<Vec<TestResult<f64>>> {
    if group1_indices.is_empty() || group2_indices.is_empty() {
        return Err(anyhow::anyhow!("Group indices cannot be empty"));
    }

    let n1 = group1_indices.len() as f64;
    let n2 = group2_indices.len() as f64;
    let (group1_sums, group1_sum_squares) = accumulate_feature_statistics(matrix, group1_indices);
    let (group2_sums, group2_sum_squares) = accumulate_feature_statistics(matrix, group2_indices);

    let results = (0..matrix.ncols())
        .map(|feature| {
            let result = t_test_from_sums(
                group1_sums[feature],
                group1_sum_squares[feature],
                n1,
                group2_sums[feature],
                group2_sum_squares[feature],
                n2,
                test_type,
            );
            sanitize(result)
        })
        .collect();

    Ok(results)
}

/// Perform a t-test comparing two samples.
pub fn t_test(x: &[f64], y: &[f64], test_type: TTestType) -> TestResult<f64> {
    let sum_x: f64 = x.iter().sum();
    let sum_sq_x: f64 = x.iter().map(|v| v * v).sum();
    let sum_y: f64 = y.iter().sum();
    let sum_sq_y: f64 = y.iter().map(|v| v * v).sum();
    t_test_from_sums(
        sum_x,
        sum_sq_x,
        x.len() as f64,
        sum_y,
        sum_sq_y,
        y.len() as f64,
        test_type,
    )
}

/// Perform a t-test using precomputed summary statistics.
///
/// Variances use the unbiased (n - 1) estimator. For
/// [`TTestType::OverestimatedVariance`] the reference group's variance is kept but its
/// size is replaced by the tested group's size, inflating the reference contribution.
pub fn t_test_from_sums(
    sum1: f64,
    sum_sq1: f64,
    n1: f64,
    sum2: f64,
    sum_sq2: f64,
    n2: f64,
    test_type: TTestType,
) -> TestResult<f64> {
    if n1 < 2.0 || n2 < 2.0 {
        return TestResult::new(f64::NAN, f64::NAN);
    }

    let mean1 = sum1 / n1;
    let mean2 = sum2 / n2;

    // Guard tiny negative variances from cancellation
    let var1 = ((sum_sq1 - sum1 * sum1 / n1) / (n1 - 1.0)).max(0.0);
    let var2 = ((sum_sq2 - sum2 * sum2 / n2) / (n2 - 1.0)).max(0.0);

    let mean_diff = mean1 - mean2;

    let (t_stat, df) = match test_type {
        TTestType::Student => {
            let pooled_var = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0);
            let std_err = (pooled_var * (1.0 / n1 + 1.0 / n2)).sqrt();
            (mean_diff / std_err, n1 + n2 - 2.0)
        }
        TTestType::Welch | TTestType::OverestimatedVariance => {
            let n2_eff = if test_type == TTestType::OverestimatedVariance {
                n1
            } else {
                n2
            };
            let term1 = var1 / n1;
            let term2 = var2 / n2_eff;
            let combined_var = term1 + term2;
            let t = mean_diff / combined_var.sqrt();

            // Welch-Satterthwaite equation for degrees of freedom
            let df = combined_var * combined_var
                / (term1 * term1 / (n1 - 1.0) + term2 * term2 / (n2_eff - 1.0));
            (t, df)
        }
    };

    TestResult::new(t_stat, t_test_p_value(t_stat, df)).with_degrees_of_freedom(df)
}

/// Two-sided p-value of a t statistic, via the regularised incomplete beta function.
fn t_test_p_value(t_stat: f64, df: f64) -> f64 {
    if t_stat.is_nan() || df.is_nan() {
        return f64::NAN;
    }
    if t_stat.is_infinite() {
        return 0.0;
    }
    if df <= 0.0 || df.is_infinite() {
        // Normal limit
        return statrs::function::erf::erfc(t_stat.abs() / std::f64::consts::SQRT_2);
    }

    let x = df / (df + t_stat * t_stat);
    beta_reg(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

fn sanitize(result: TestResult<f64>) -> TestResult<f64> {
    let statistic = if result.statistic.is_nan() { 0.0 } else { result.statistic };
    let p_value = if result.p_value.is_nan() { 1.0 } else { result.p_value };
    TestResult {
        statistic,
        p_value,
        degrees_of_freedom: result.degrees_of_freedom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn clearly_different_groups() {
        // [1, 2, 3] vs [7, 8, 9]: t = -7.348, df = 4, p ≈ 0.00183
        let result = t_test(&[1.0, 2.0, 3.0], &[7.0, 8.0, 9.0], TTestType::Student);
        assert_relative_eq!(result.statistic, -7.348469228349534, epsilon = 1e-9);
        assert_relative_eq!(result.p_value, 0.001826, epsilon = 1e-5);
    }

    #[test]
    fn welch_matches_student_for_equal_sizes_and_variances() {
        let student = t_test(&[1.0, 2.0, 3.0, 4.0], &[2.0, 3.0, 4.0, 5.0], TTestType::Student);
        let welch = t_test(&[1.0, 2.0, 3.0, 4.0], &[2.0, 3.0, 4.0, 5.0], TTestType::Welch);
        assert_relative_eq!(student.statistic, welch.statistic, epsilon = 1e-12);
        assert_relative_eq!(student.p_value, welch.p_value, epsilon = 1e-9);
        assert_relative_eq!(welch.degrees_of_freedom.unwrap(), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn overestimated_variance_shrinks_the_statistic() {
        // Small group vs large reference: reference variance counts as if from 3 cells
        let x = [5.0, 6.0, 7.0];
        let y: Vec<f64> = (0..30).map(|i| (i % 5) as f64).collect();
        let welch = t_test(&x, &y, TTestType::Welch);
        let over = t_test(&x, &y, TTestType::OverestimatedVariance);
        assert!(over.statistic.abs() < welch.statistic.abs());
        assert!(over.p_value > welch.p_value);
    }

    #[test]
    fn identical_constant_groups_score_zero() {
        let m = FeatureMatrix::from(array![
            [5.0, 1.0],
            [5.0, 2.0],
            [5.0, 3.0],
            [5.0, 9.0],
            [5.0, 8.0],
            [5.0, 7.0]
        ]);
        let results = t_test_matrix_groups(&m, &[0, 1, 2], &[3, 4, 5], TTestType::Welch).unwrap();
        assert_eq!(results[0].statistic, 0.0);
        assert_eq!(results[0].p_value, 1.0);
        assert!(results[1].statistic < -5.0);
        assert!(results[1].p_value < 0.01);
    }

    #[test]
    fn empty_groups_are_rejected() {
        let m = FeatureMatrix::from(array![[1.0], [2.0]]);
        assert!(t_test_matrix_groups(&m, &[], &[0, 1], TTestType::Welch).is_err());
    }
}
