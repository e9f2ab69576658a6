use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::distance::{Distance, MetricParams};
use crate::error::{PerturbationError, Result};
use crate::matrix::FeatureMatrix;
use crate::metrics::ensure_same_features;
use crate::scaling::MinMaxScaler;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Compare the data as given
    #[default]
    Simple,
    /// Min-max scale `pert` and `pred` with a scaler fitted on the reference data first
    Scaled,
}

impl FromStr for ComparisonMode {
    type Err = PerturbationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(ComparisonMode::Simple),
            "scaled" => Ok(ComparisonMode::Scaled),
            other => Err(PerturbationError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonMode::Simple => f.write_str("simple"),
            ComparisonMode::Scaled => f.write_str("scaled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistOptions {
    pub metric: String,
    pub mode: ComparisonMode,
    pub metric_params: MetricParams,
    /// Fit the scaler on `pert` and `ctrl` together instead of `ctrl` alone
    pub fit_to_pert_and_ctrl: bool,
}

impl Default for DistOptions {
    fn default() -> Self {
        DistOptions {
            metric: "euclidean".to_string(),
            mode: ComparisonMode::Simple,
            metric_params: MetricParams::default(),
            fit_to_pert_and_ctrl: false,
        }
    }
}

impl DistOptions {
    pub fn with_metric(mut self, metric: &str) -> Self {
        self.metric = metric.to_string();
        self
    }

    pub fn with_mode(mut self, mode: ComparisonMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_metric_params(mut self, params: MetricParams) -> Self {
        self.metric_params = params;
        self
    }

    pub fn with_fit_to_pert_and_ctrl(mut self, fit_to_pert_and_ctrl: bool) -> Self {
        self.fit_to_pert_and_ctrl = fit_to_pert_and_ctrl;
        self
    }
}

/// `metric(pert, pred) / metric(ctrl, pred)`: how far the prediction is from the real
/// perturbation relative to how far it is from control. Lower is better.
///
/// In [`ComparisonMode::Scaled`] mode `pert` and `pred` are min-max scaled first; `ctrl`
/// is left as given.
pub fn compare_dist(
    pert: &FeatureMatrix,
    pred: &FeatureMatrix,
    ctrl: &FeatureMatrix,
    options: &DistOptions,
) -> Result<f64> {
    let distance =
        Distance::new(&options.metric, None, None)?.with_params(options.metric_params.clone())?;
    ensure_same_features(&[("pert", pert), ("pred", pred), ("ctrl", ctrl)])?;
    tracing::debug!(
        metric = %options.metric,
        mode = %options.mode,
        n_pert = pert.nrows(),
        n_pred = pred.nrows(),
        n_ctrl = ctrl.nrows(),
        "compare_dist"
    );

    let (pert, pred): (Cow<'_, FeatureMatrix>, Cow<'_, FeatureMatrix>) = match options.mode {
        ComparisonMode::Simple => (Cow::Borrowed(pert), Cow::Borrowed(pred)),
        ComparisonMode::Scaled => {
            let scaler = if options.fit_to_pert_and_ctrl {
                MinMaxScaler::fit(&FeatureMatrix::vstack(&[pert, ctrl])?)?
            } else {
                MinMaxScaler::fit(ctrl)?
            };
            (Cow::Owned(scaler.transform(pert)?), Cow::Owned(scaler.transform(pred)?))
        }
    };

    let d1 = distance.metric_fct(&pert, &pred)?;
    let d2 = distance.metric_fct(ctrl, &pred)?;
    Ok(d1 / d2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn parses_modes() {
        assert_eq!("simple".parse::<ComparisonMode>().unwrap(), ComparisonMode::Simple);
        assert_eq!("scaled".parse::<ComparisonMode>().unwrap(), ComparisonMode::Scaled);
        let err = "fancy".parse::<ComparisonMode>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown mode 'fancy'. Please choose simple or scaled.");
    }

    #[test]
    fn simple_ratio_of_profile_distances() {
        let pert = FeatureMatrix::from(array![[2.0, 0.0], [4.0, 0.0]]); // mean (3, 0)
        let pred = FeatureMatrix::from(array![[3.0, 4.0]]);
        let ctrl = FeatureMatrix::from(array![[0.0, 0.0]]);
        // |(3,0)-(3,4)| / |(0,0)-(3,4)| = 4 / 5
        let score = compare_dist(&pert, &pred, &ctrl, &DistOptions::default()).unwrap();
        assert_abs_diff_eq!(score, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn scaled_mode_rescales_pert_and_pred_only() {
        let pert = FeatureMatrix::from(array![[10.0, 100.0]]);
        let pred = FeatureMatrix::from(array![[5.0, 50.0]]);
        let ctrl = FeatureMatrix::from(array![[0.0, 0.0], [10.0, 100.0]]);
        let options = DistOptions::default()
            .with_metric("mean_absolute_error")
            .with_mode(ComparisonMode::Scaled);
        // Scaled: pert (1, 1), pred (0.5, 0.5); ctrl stays at mean (5, 50)
        let score = compare_dist(&pert, &pred, &ctrl, &options).unwrap();
        assert_abs_diff_eq!(score, 0.5 / 27.0, epsilon = 1e-12);

        let union = options.with_fit_to_pert_and_ctrl(true);
        assert_abs_diff_eq!(
            compare_dist(&pert, &pred, &ctrl, &union).unwrap(),
            0.5 / 27.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn configuration_errors_come_first() {
        let a = FeatureMatrix::from(array![[1.0, 2.0]]);
        let b = FeatureMatrix::from(array![[1.0]]);
        assert!(matches!(
            compare_dist(&a, &a, &a, &DistOptions::default().with_metric("nope")),
            Err(PerturbationError::UnknownMetric(_))
        ));
        assert!(matches!(
            compare_dist(&a, &b, &a, &DistOptions::default()),
            Err(PerturbationError::ShapeMismatch { .. })
        ));
        let bad_params =
            DistOptions::default().with_metric_params(MetricParams::new().with("gamma", 1.0));
        assert!(matches!(
            compare_dist(&a, &a, &a, &bad_params),
            Err(PerturbationError::Configuration(_))
        ));
    }
}
