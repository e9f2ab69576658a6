//! Binary classifiers used to score how separable two groups of observations are.

use anyhow::{Context, anyhow, bail};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView1};

use crate::matrix::{FeatureMatrix, GroupLabel};

/// A trainable binary classifier over rows of a [`FeatureMatrix`].
///
/// Implementations report their own failures through `anyhow`; comparison routines wrap them
/// in [`crate::error::PerturbationError::Classifier`].
pub trait Classifier {
    fn fit(&mut self, features: &FeatureMatrix, labels: &[GroupLabel]) -> anyhow::Result<()>;

    /// Mean accuracy on `features` against `labels`.
    fn score(&self, features: &FeatureMatrix, labels: &[GroupLabel]) -> anyhow::Result<f64>;
}

#[derive(Debug, Clone)]
struct FittedModel {
    /// `classes[1]` is the positive class
    classes: [GroupLabel; 2],
    intercept: f64,
    weights: Vec<f64>,
}

/// L2-penalised logistic regression fitted by Newton iterations (IRLS).
///
/// Minimises `½‖w‖² + C·Σ log-loss`; the intercept is not penalised.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Inverse regularisation strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    model: Option<FittedModel>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        LogisticRegression {
            c: 1.0,
            max_iter: 100,
            tol: 1e-6,
            model: None,
        }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        LogisticRegression {
            c,
            ..LogisticRegression::default()
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Fitted `(intercept, weights)`, if any.
    pub fn coefficients(&self) -> Option<(f64, &[f64])> {
        self.model.as_ref().map(|m| (m.intercept, m.weights.as_slice()))
    }

    /// Predicted class of every row.
    pub fn predict(&self, features: &FeatureMatrix) -> anyhow::Result<Vec<GroupLabel>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("logistic regression must be fitted before predicting"))?;
        if features.ncols() != model.weights.len() {
            bail!(
                "predict: model has {} features, input has {}",
                model.weights.len(),
                features.ncols()
            );
        }

        let x = features.to_dense();
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let eta = model.intercept
                    + row.iter().zip(&model.weights).map(|(v, w)| v * w).sum::<f64>();
                if eta > 0.0 { model.classes[1] } else { model.classes[0] }
            })
            .collect())
    }

    fn linear_predictor(beta: &DVector<f64>, row: ArrayView1<'_, f64>) -> f64 {
        beta[0] + row.iter().enumerate().map(|(j, v)| beta[j + 1] * v).sum::<f64>()
    }

    fn newton(&self, x: &Array2<f64>, y: &[f64]) -> anyhow::Result<DVector<f64>> {
        let (n, d) = x.dim();
        let dim = d + 1;
        let lambda = 1.0 / self.c;
        let mut beta = DVector::<f64>::zeros(dim);

        for iteration in 0..self.max_iter {
            let mut gradient = DVector::<f64>::zeros(dim);
            let mut hessian = DMatrix::<f64>::zeros(dim, dim);
            for i in 0..n {
                let row = x.row(i);
                let p = sigmoid(Self::linear_predictor(&beta, row));
                let residual = p - y[i];
                let w = p * (1.0 - p);
                let design = |j: usize| if j == 0 { 1.0 } else { row[j - 1] };
                for a in 0..dim {
                    let xa = design(a);
                    gradient[a] += residual * xa;
                    for b in a..dim {
                        hessian[(a, b)] += w * xa * design(b);
                    }
                }
            }
            for a in 0..dim {
                for b in 0..a {
                    hessian[(a, b)] = hessian[(b, a)];
                }
            }
            for j in 1..dim {
                gradient[j] += lambda * beta[j];
                hessian[(j, j)] += lambda;
            }
            // Keeps the intercept row positive definite when every probability saturates
            hessian[(0, 0)] += 1e-10;

            let step = hessian
                .cholesky()
                .ok_or_else(|| {
                    anyhow!("Hessian is not positive definite at iteration {iteration}")
                })?
                .solve(&gradient);
            beta -= &step;

            if step.amax() < self.tol {
                tracing::debug!(iterations = iteration + 1, "logistic regression converged");
                return Ok(beta);
            }
        }

        tracing::warn!(
            max_iter = self.max_iter,
            "logistic regression did not converge; increase max_iter"
        );
        Ok(beta)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, features: &FeatureMatrix, labels: &[GroupLabel]) -> anyhow::Result<()> {
        if features.nrows() != labels.len() {
            bail!(
                "fit: {} observations but {} labels",
                features.nrows(),
                labels.len()
            );
        }
        let mut classes: Vec<GroupLabel> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let classes: [GroupLabel; 2] = match classes.as_slice() {
            [negative, positive] => [*negative, *positive],
            other => bail!(
                "logistic regression needs exactly two classes, got {}",
                other.len()
            ),
        };

        let y: Vec<f64> = labels
            .iter()
            .map(|l| if *l == classes[1] { 1.0 } else { 0.0 })
            .collect();
        let x = features.to_dense();
        let beta = self.newton(&x, &y).context("fitting logistic regression")?;

        self.model = Some(FittedModel {
            classes,
            intercept: beta[0],
            weights: beta.iter().skip(1).copied().collect(),
        });
        Ok(())
    }

    fn score(&self, features: &FeatureMatrix, labels: &[GroupLabel]) -> anyhow::Result<f64> {
        if features.nrows() != labels.len() {
            bail!(
                "score: {} observations but {} labels",
                features.nrows(),
                labels.len()
            );
        }
        if labels.is_empty() {
            bail!("score: no observations");
        }
        let predictions = self.predict(features)?;
        let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
        Ok(correct as f64 / labels.len() as f64)
    }
}
