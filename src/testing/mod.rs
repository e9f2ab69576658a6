//! Univariate statistics backing the differential-expression comparison.
//!
//! Every test here compares one group of observations against a reference group
//! feature by feature, the way marker-gene ranking does in single-cell toolkits.

pub mod correction;
pub mod correlation;
pub mod effect;
pub mod inference;

pub mod utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMethod {
    TTest(TTestType),
    /// Wilcoxon rank-sum test reported as a z-score
    Wilcoxon { tie_correct: bool },
}

impl Default for TestMethod {
    fn default() -> Self {
        TestMethod::TTest(TTestType::Welch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TTestType {
    Student, // Equal variance
    Welch,   // Unequal variance
    /// Welch test with the reference group's size replaced by the tested group's size
    OverestimatedVariance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrectionMethod {
    #[default]
    BenjaminiHochberg,
    Bonferroni,
}

impl CorrectionMethod {
    pub fn adjust(&self, p_values: &[f64]) -> anyhow::Result<Vec<f64>> {
        match self {
            CorrectionMethod::BenjaminiHochberg => {
                correction::benjamini_hochberg_correction(p_values)
            }
            CorrectionMethod::Bonferroni => correction::bonferroni_correction(p_values),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (t-statistic or rank-sum z-score)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
    /// Degrees of freedom (for parametric inference)
    pub degrees_of_freedom: Option<T>,
}

impl<T> TestResult<T> {
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            degrees_of_freedom: None,
        }
    }

    pub fn with_degrees_of_freedom(mut self, df: T) -> Self {
        self.degrees_of_freedom = Some(df);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MultipleTestResults {
    /// Test statistics for each feature, in feature order
    pub statistics: Vec<f64>,
    /// Raw (unadjusted) p-values
    pub p_values: Vec<f64>,
    /// Adjusted p-values (after multiple testing correction)
    pub adjusted_p_values: Option<Vec<f64>>,
    /// log2 fold changes of the tested group over the reference
    pub effect_sizes: Option<Vec<f64>>,
}

impl MultipleTestResults {
    pub fn new(statistics: Vec<f64>, p_values: Vec<f64>) -> Self {
        MultipleTestResults {
            statistics,
            p_values,
            adjusted_p_values: None,
            effect_sizes: None,
        }
    }

    pub fn with_adjusted_p_values(mut self, adjusted_p_values: Vec<f64>) -> Self {
        self.adjusted_p_values = Some(adjusted_p_values);
        self
    }

    pub fn with_effect_sizes(mut self, effect_sizes: Vec<f64>) -> Self {
        self.effect_sizes = Some(effect_sizes);
        self
    }

    pub fn n_features(&self) -> usize {
        self.statistics.len()
    }

    /// Feature indices ordered by decreasing statistic. Ties keep feature order.
    pub fn ranking(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.statistics.len()).collect();
        indices.sort_by(|&a, &b| self.statistics[b].total_cmp(&self.statistics[a]));
        indices
    }

    /// Reorder every per-feature series into ranking order.
    pub fn ranked(&self) -> RankedFeatures {
        let order = self.ranking();
        let pick = |values: &[f64]| order.iter().map(|&i| values[i]).collect::<Vec<_>>();
        let pvals_adj = self
            .adjusted_p_values
            .as_deref()
            .map(pick)
            .unwrap_or_else(|| pick(&self.p_values));
        let logfoldchanges = self
            .effect_sizes
            .as_deref()
            .map(pick)
            .unwrap_or_else(|| vec![f64::NAN; order.len()]);

        RankedFeatures {
            scores: pick(&self.statistics),
            pvals: pick(&self.p_values),
            pvals_adj,
            logfoldchanges,
            names: order,
        }
    }
}

/// Result of ranking features for one group against a reference, best feature first.
#[derive(Debug, Clone)]
pub struct RankedFeatures {
    /// Feature (column) indices in ranking order
    pub names: Vec<usize>,
    pub scores: Vec<f64>,
    pub pvals: Vec<f64>,
    pub pvals_adj: Vec<f64>,
    pub logfoldchanges: Vec<f64>,
}

impl RankedFeatures {
    pub fn top(&self, n: usize) -> &[usize] {
        &self.names[..n.min(self.names.len())]
    }

    /// Per-feature series restored to column order, with each feature's 1-based rank.
    pub fn by_feature(&self) -> FeatureSeries {
        let n = self.names.len();
        let mut series = FeatureSeries {
            scores: vec![f64::NAN; n],
            pvals_adj: vec![f64::NAN; n],
            ranks: vec![f64::NAN; n],
        };
        for (position, &feature) in self.names.iter().enumerate() {
            series.scores[feature] = self.scores[position];
            series.pvals_adj[feature] = self.pvals_adj[position];
            series.ranks[feature] = (position + 1) as f64;
        }
        series
    }
}

#[derive(Debug, Clone)]
pub struct FeatureSeries {
    pub scores: Vec<f64>,
    pub pvals_adj: Vec<f64>,
    pub ranks: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_is_descending_by_statistic() {
        let results =
            MultipleTestResults::new(vec![0.5, 3.0, -1.0, 2.0], vec![0.5, 0.01, 0.9, 0.05]);
        assert_eq!(results.ranking(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn ranked_series_round_trip_to_feature_order() {
        let results = MultipleTestResults::new(vec![0.5, 3.0, -1.0], vec![0.5, 0.01, 0.9])
            .with_adjusted_p_values(vec![0.6, 0.03, 0.9]);
        let ranked = results.ranked();
        assert_eq!(ranked.names, vec![1, 0, 2]);
        assert_eq!(ranked.top(2), &[1, 0]);
        assert_eq!(ranked.top(10).len(), 3);

        let series = ranked.by_feature();
        assert_eq!(series.scores, vec![0.5, 3.0, -1.0]);
        assert_eq!(series.pvals_adj, vec![0.6, 0.03, 0.9]);
        assert_eq!(series.ranks, vec![2.0, 1.0, 3.0]);
    }
}
