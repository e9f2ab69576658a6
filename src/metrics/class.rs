use crate::classifier::{Classifier, LogisticRegression};
use crate::error::{PerturbationError, Result};
use crate::matrix::{FeatureMatrix, GroupLabel};
use crate::metrics::ensure_same_features;

/// Train `clf` (a [`LogisticRegression`] when `None`) to tell `x` from `c`, then report the
/// fraction of `y` it calls perturbed, relative to its accuracy on `x` and capped at 1.
pub fn compare_class(
    x: &FeatureMatrix,
    y: &FeatureMatrix,
    c: &FeatureMatrix,
    clf: Option<&mut dyn Classifier>,
) -> Result<f64> {
    ensure_same_features(&[("X", x), ("Y", y), ("C", c)])?;
    for (name, matrix) in [("X", x), ("Y", y), ("C", c)] {
        if matrix.nrows() == 0 {
            return Err(PerturbationError::InvalidInput(format!("{name} has no observations")));
        }
    }
    tracing::debug!(n_x = x.nrows(), n_y = y.nrows(), n_c = c.nrows(), "compare_class");

    let mut default_clf = LogisticRegression::default();
    let clf: &mut dyn Classifier = match clf {
        Some(clf) => clf,
        None => &mut default_clf,
    };

    let n_x = x.nrows();
    let training = FeatureMatrix::vstack(&[x, c])?;
    let labels: Vec<GroupLabel> = std::iter::repeat_n(GroupLabel::Comp, n_x)
        .chain(std::iter::repeat_n(GroupLabel::Ctrl, c.nrows()))
        .collect();
    clf.fit(&training, &labels)?;

    let simulated_score = clf.score(y, &vec![GroupLabel::Comp; y.nrows()])?;
    let real_score = clf.score(x, &labels[..n_x])?;
    // f64::min ignores a NaN ratio
    Ok(f64::min(1.0, simulated_score / real_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn cloud(rows: usize, center: f64, phase: usize) -> FeatureMatrix {
        Array2::from_shape_fn((rows, 3), |(r, f)| {
            center + (((r + phase) * 5 + f * 2) % 7) as f64 * 0.1
        })
        .into()
    }

    struct AlwaysComp;

    impl Classifier for AlwaysComp {
        fn fit(&mut self, _features: &FeatureMatrix, _labels: &[GroupLabel]) -> anyhow::Result<()> {
            Ok(())
        }

        fn score(&self, _features: &FeatureMatrix, labels: &[GroupLabel]) -> anyhow::Result<f64> {
            let hits = labels.iter().filter(|l| **l == GroupLabel::Comp).count();
            Ok(hits as f64 / labels.len() as f64)
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn fit(&mut self, _features: &FeatureMatrix, _labels: &[GroupLabel]) -> anyhow::Result<()> {
            anyhow::bail!("solver exploded")
        }

        fn score(&self, _features: &FeatureMatrix, _labels: &[GroupLabel]) -> anyhow::Result<f64> {
            Ok(0.0)
        }
    }

    /// Scores zero on `rows` observations and perfectly on anything else.
    struct FailsOn {
        rows: usize,
    }

    impl Classifier for FailsOn {
        fn fit(&mut self, _features: &FeatureMatrix, _labels: &[GroupLabel]) -> anyhow::Result<()> {
            Ok(())
        }

        fn score(&self, features: &FeatureMatrix, _labels: &[GroupLabel]) -> anyhow::Result<f64> {
            Ok(if features.nrows() == self.rows { 0.0 } else { 1.0 })
        }
    }

    #[test]
    fn zero_real_accuracy_clamps_to_one() {
        let x = cloud(4, 1.0, 0);
        let y = cloud(5, 1.0, 2);
        // 1 / 0
        let mut clf = FailsOn { rows: 4 };
        assert_eq!(compare_class(&x, &y, &x, Some(&mut clf)).unwrap(), 1.0);
        // 0 / 0
        let mut clf = FailsOn { rows: 5 };
        let same_size = cloud(5, 1.0, 1);
        assert_eq!(compare_class(&same_size, &y, &same_size, Some(&mut clf)).unwrap(), 1.0);
    }

    #[test]
    fn simulated_like_real_scores_one() {
        let x = cloud(20, 5.0, 0);
        let y = cloud(15, 5.0, 3);
        let c = cloud(20, 0.0, 1);
        assert_eq!(compare_class(&x, &y, &c, None).unwrap(), 1.0);
    }

    #[test]
    fn simulated_like_control_scores_zero() {
        let x = cloud(20, 5.0, 0);
        let y = cloud(15, 0.0, 3);
        let c = cloud(20, 0.0, 1);
        assert_eq!(compare_class(&x, &y, &c, None).unwrap(), 0.0);
    }

    #[test]
    fn accepts_custom_classifiers() {
        let x = cloud(4, 1.0, 0);
        let mut clf = AlwaysComp;
        assert_eq!(compare_class(&x, &x, &x, Some(&mut clf)).unwrap(), 1.0);

        let mut broken = Broken;
        let err = compare_class(&x, &x, &x, Some(&mut broken)).unwrap_err();
        assert!(matches!(err, PerturbationError::Classifier(_)));
        assert!(err.to_string().contains("solver exploded"));
    }

    #[test]
    fn rejects_bad_inputs() {
        let x = cloud(4, 1.0, 0);
        let narrow: FeatureMatrix = Array2::<f64>::zeros((4, 2)).into();
        assert!(matches!(
            compare_class(&x, &narrow, &x, None),
            Err(PerturbationError::ShapeMismatch { .. })
        ));
        let empty: FeatureMatrix = Array2::<f64>::zeros((0, 3)).into();
        assert!(matches!(
            compare_class(&x, &empty, &x, None),
            Err(PerturbationError::InvalidInput(_))
        ));
    }
}
