use crate::matrix::FeatureMatrix;
use crate::testing::utils::accumulate_feature_statistics;

const LOG_FOLD_PSEUDO_COUNT: f64 = 1e-9;

/// log2 fold change between two group means of log1p-normalised expression.
///
/// Means are mapped back to linear scale with `expm1` before taking the ratio.
pub fn log2_fold_change_from_means(mean_group: f64, mean_reference: f64) -> f64 {
    let group = mean_group.exp_m1() + LOG_FOLD_PSEUDO_COUNT;
    let reference = mean_reference.exp_m1() + LOG_FOLD_PSEUDO_COUNT;
    (group / reference).log2()
}

/// Calculate log2 fold changes for every feature between two row groups
pub fn log2_fold_changes(
    matrix: &FeatureMatrix,
    group_rows: &[usize],
    reference_rows: &[usize],
) -> anyhow::Result<Vec<f64>> {
    if group_rows.is_empty() || reference_rows.is_empty() {
        return Err(anyhow::anyhow!("Group indices cannot be empty"));
    }

    let (group_sums, _) = accumulate_feature_statistics(matrix, group_rows);
    let (reference_sums, _) = accumulate_feature_statistics(matrix, reference_rows);
    let n_group = group_rows.len() as f64;
    let n_reference = reference_rows.len() as f64;

    Ok(group_sums
        .iter()
        .zip(&reference_sums)
        .map(|(&g, &r)| log2_fold_change_from_means(g / n_group, r / n_reference))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::{CooMatrix, CsrMatrix};

    fn create_test_matrix() -> FeatureMatrix {
        // Rows 0..3 are the group, 3..6 the reference, stored sparsely.
        // Feature 0: ln(1+x) of 3 vs 1 fold, feature 1: equal, feature 2: absent in group
        let rows = vec![0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 3, 4, 5];
        let cols = vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 2, 2, 2];
        let l4 = 4.0_f64.ln();
        let l2 = 2.0_f64.ln();
        let vals = vec![l4, l4, l4, l2, l2, l2, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let coo = CooMatrix::try_from_triplets(6, 3, rows, cols, vals).unwrap();
        FeatureMatrix::from(CsrMatrix::from(&coo))
    }

    #[test]
    fn test_log2_fold_change() {
        let matrix = create_test_matrix();
        let lfc = log2_fold_changes(&matrix, &[0, 1, 2], &[3, 4, 5]).unwrap();

        // expm1(ln 4) = 3, expm1(ln 2) = 1
        assert_abs_diff_eq!(lfc[0], 3.0_f64.log2(), epsilon = 1e-6);
        assert_abs_diff_eq!(lfc[1], 0.0, epsilon = 1e-9);
        // Absent in the group: only the pseudo count remains
        assert!(lfc[2] < -20.0);
    }

    #[test]
    fn test_empty_groups() {
        let matrix = create_test_matrix();
        assert!(log2_fold_changes(&matrix, &[], &[3, 4, 5]).is_err());
        assert!(log2_fold_changes(&matrix, &[0, 1, 2], &[]).is_err());
    }
}
