use crate::error::{PerturbationError, Result};
use crate::matrix::{FeatureMatrix, GroupLabel};
use crate::testing::effect::log2_fold_changes;
use crate::testing::utils::label_indices;
use crate::testing::{
    CorrectionMethod, MultipleTestResults, RankedFeatures, TTestType, TestMethod, TestResult,
};

pub mod parametric;

pub mod nonparametric;

pub trait MatrixStatTests {
    fn t_test(
        &self,
        group1_indices: &[usize],
        group2_indices: &[usize],
        test_type: TTestType,
    ) -> anyhow::Result<Vec<TestResult<f64>>>;

    fn wilcoxon_test(
        &self,
        group1_indices: &[usize],
        group2_indices: &[usize],
        tie_correct: bool,
    ) -> anyhow::Result<Vec<TestResult<f64>>>;

    /// Test every feature of `group1` against `group2` and correct for multiple testing.
    fn differential_expression(
        &self,
        group1_indices: &[usize],
        group2_indices: &[usize],
        test_method: TestMethod,
        correction: CorrectionMethod,
    ) -> anyhow::Result<MultipleTestResults>;
}

impl MatrixStatTests for FeatureMatrix {
    fn t_test(
        &self,
        group1_indices: &[usize],
        group2_indices: &[usize],
        test_type: TTestType,
    ) -> anyhow::Result<Vec<TestResult<f64>>> {
        parametric::t_test_matrix_groups(self, group1_indices, group2_indices, test_type)
    }

    fn wilcoxon_test(
        &self,
        group1_indices: &[usize],
        group2_indices: &[usize],
        tie_correct: bool,
    ) -> anyhow::Result<Vec<TestResult<f64>>> {
        nonparametric::wilcoxon_matrix_groups(self, group1_indices, group2_indices, tie_correct)
    }

    fn differential_expression(
        &self,
        group1_indices: &[usize],
        group2_indices: &[usize],
        test_method: TestMethod,
        correction: CorrectionMethod,
    ) -> anyhow::Result<MultipleTestResults> {
        let results = match test_method {
            TestMethod::TTest(test_type) => self.t_test(group1_indices, group2_indices, test_type)?,
            TestMethod::Wilcoxon { tie_correct } => {
                self.wilcoxon_test(group1_indices, group2_indices, tie_correct)?
            }
        };

        let statistics: Vec<_> = results.iter().map(|r| r.statistic).collect();
        let p_values: Vec<_> = results.iter().map(|r| r.p_value).collect();
        let adjusted_p_values = correction.adjust(&p_values)?;
        let effect_sizes = log2_fold_changes(self, group1_indices, group2_indices)?;

        Ok(MultipleTestResults::new(statistics, p_values)
            .with_adjusted_p_values(adjusted_p_values)
            .with_effect_sizes(effect_sizes))
    }
}

/// Rank the features of the rows labelled `group` against the rows labelled `reference`.
///
/// `labels` carries one tag per row of `matrix`. The returned ranking lists features by
/// decreasing score together with their raw and adjusted p-values.
pub fn rank_features_groups(
    matrix: &FeatureMatrix,
    labels: &[GroupLabel],
    group: GroupLabel,
    reference: GroupLabel,
    test_method: TestMethod,
    correction: CorrectionMethod,
) -> Result<RankedFeatures> {
    if labels.len() != matrix.nrows() {
        return Err(PerturbationError::shape("group labels", matrix.nrows(), labels.len()));
    }

    let group_rows = label_indices(labels, group);
    let reference_rows = label_indices(labels, reference);
    if group_rows.is_empty() || reference_rows.is_empty() {
        return Err(PerturbationError::InvalidInput(format!(
            "both '{group}' and '{reference}' need at least one observation"
        )));
    }

    tracing::debug!(
        group = %group,
        reference = %reference,
        n_group = group_rows.len(),
        n_reference = reference_rows.len(),
        n_features = matrix.ncols(),
        "ranking features"
    );

    let results = matrix
        .differential_expression(&group_rows, &reference_rows, test_method, correction)
        .map_err(|e| PerturbationError::InvalidInput(e.to_string()))?;
    Ok(results.ranked())
}
