use std::collections::HashSet;

use crate::error::{PerturbationError, Result};
use crate::matrix::{FeatureMatrix, GroupLabel};
use crate::metrics::ensure_same_features;
use crate::testing::correlation::{pearson, spearman};
use crate::testing::inference::rank_features_groups;
use crate::testing::{CorrectionMethod, FeatureSeries, RankedFeatures, TestMethod};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeOptions {
    pub method: TestMethod,
    pub correction: CorrectionMethod,
    /// Size of the top-ranked feature sets whose overlap is measured
    pub shared_top: usize,
}

impl Default for DeOptions {
    fn default() -> Self {
        DeOptions {
            method: TestMethod::default(),
            correction: CorrectionMethod::default(),
            shared_top: 100,
        }
    }
}

impl DeOptions {
    pub fn with_method(mut self, method: TestMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_correction(mut self, correction: CorrectionMethod) -> Self {
        self.correction = correction;
        self
    }

    pub fn with_shared_top(mut self, shared_top: usize) -> Self {
        self.shared_top = shared_top;
        self
    }
}

/// Agreement between the X-vs-control and Y-vs-control differential-expression results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeComparison {
    /// Overlap of the two top-`shared_top` feature sets, in `[0, 1]`
    pub shared_top_genes: f64,
    /// Pearson correlation of the per-feature scores
    pub scores_corr: f64,
    /// Pearson correlation of the per-feature adjusted p-values
    pub pvals_adj_corr: f64,
    /// Spearman correlation of the per-feature ranks
    pub scores_ranks_corr: f64,
}

fn rank_against_control(
    group: &FeatureMatrix,
    control: &FeatureMatrix,
    options: &DeOptions,
) -> Result<RankedFeatures> {
    let joint = FeatureMatrix::vstack(&[group, control])?;
    let labels: Vec<GroupLabel> = std::iter::repeat_n(GroupLabel::Comp, group.nrows())
        .chain(std::iter::repeat_n(GroupLabel::Ctrl, control.nrows()))
        .collect();
    rank_features_groups(
        &joint,
        &labels,
        GroupLabel::Comp,
        GroupLabel::Ctrl,
        options.method,
        options.correction,
    )
}

/// Compare the differential-expression results of real (`x`) and simulated (`y`)
/// perturbations, each ranked against the control `c`.
///
/// `shared_top` is clamped to the number of features.
pub fn compare_de(
    x: &FeatureMatrix,
    y: &FeatureMatrix,
    c: &FeatureMatrix,
    options: &DeOptions,
) -> Result<DeComparison> {
    ensure_same_features(&[("X", x), ("Y", y), ("C", c)])?;
    let n_vars = x.ncols();
    let shared_top = options.shared_top.min(n_vars);
    if shared_top == 0 {
        return Err(PerturbationError::InvalidInput(format!(
            "shared_top must be positive (requested {}, {} features)",
            options.shared_top, n_vars
        )));
    }
    tracing::debug!(
        n_x = x.nrows(),
        n_y = y.nrows(),
        n_c = c.nrows(),
        n_vars,
        shared_top,
        "compare_de"
    );

    let ranked_x = rank_against_control(x, c, options)?;
    let ranked_y = rank_against_control(y, c, options)?;

    let top_x: HashSet<usize> = ranked_x.top(shared_top).iter().copied().collect();
    let shared = ranked_y
        .top(shared_top)
        .iter()
        .filter(|f| top_x.contains(f))
        .count();

    let FeatureSeries {
        scores: scores_x,
        pvals_adj: pvals_adj_x,
        ranks: ranks_x,
    } = ranked_x.by_feature();
    let FeatureSeries {
        scores: scores_y,
        pvals_adj: pvals_adj_y,
        ranks: ranks_y,
    } = ranked_y.by_feature();

    Ok(DeComparison {
        shared_top_genes: shared as f64 / shared_top as f64,
        scores_corr: pearson(&scores_x, &scores_y),
        pvals_adj_corr: pearson(&pvals_adj_x, &pvals_adj_y),
        scores_ranks_corr: spearman(&ranks_x, &ranks_y),
    })
}
