//! Metrics over all observation pairs of two point clouds.

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::distance::registry::MetricParams;
use crate::error::{PerturbationError, Result};

#[inline]
fn squared_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum()
}

/// Mean of `f(x_i, y_j)` over all pairs, rows of `x` processed in parallel.
fn mean_over_pairs<F>(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, f: F) -> f64
where
    F: Fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64 + Sync,
{
    // Row totals are summed sequentially so the result does not depend on scheduling
    let row_totals: Vec<f64> = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let xi = x.row(i);
            y.rows().into_iter().map(|yj| f(xi, yj)).sum::<f64>()
        })
        .collect();
    row_totals.iter().sum::<f64>() / (x.nrows() * y.nrows()) as f64
}

/// Mean Euclidean distance between every observation of `x` and every observation of `y`.
pub fn mean_pairwise(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> f64 {
    mean_over_pairs(x, y, |a, b| squared_euclidean(a, b).sqrt())
}

/// Energy distance: `2·E‖x−y‖ − E‖x−x'‖ − E‖y−y'‖`.
pub fn edistance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> f64 {
    let delta = mean_pairwise(x, y);
    let sigma_x = mean_pairwise(x, x);
    let sigma_y = mean_pairwise(y, y);
    2.0 * delta - sigma_x - sigma_y
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Polynomial { degree: f64, gamma: f64, coef0: f64 },
}

impl Kernel {
    pub fn from_params(params: &MetricParams) -> Result<Self> {
        let gamma = params.float("gamma", 1.0)?;
        match params.text("kernel", "linear")? {
            "linear" => Ok(Kernel::Linear),
            "rbf" => Ok(Kernel::Rbf { gamma }),
            "poly" => Ok(Kernel::Polynomial {
                degree: params.float("degree", 2.0)?,
                gamma,
                coef0: params.float("coef0", 0.0)?,
            }),
            other => Err(PerturbationError::Configuration(format!(
                "unknown MMD kernel '{other}', expected linear, rbf or poly"
            ))),
        }
    }

    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match *self {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf { gamma } => (-gamma * squared_euclidean(a, b)).exp(),
            Kernel::Polynomial { degree, gamma, coef0 } => (gamma * a.dot(&b) + coef0).powf(degree),
        }
    }
}

/// Maximum mean discrepancy: `E k(x,x') + E k(y,y') − 2·E k(x,y)`.
pub fn mmd(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, kernel: &Kernel) -> f64 {
    let k = |a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>| kernel.evaluate(a, b);
    mean_over_pairs(x, x, k) + mean_over_pairs(y, y, k) - 2.0 * mean_over_pairs(x, y, k)
}
