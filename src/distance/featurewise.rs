//! Pseudo-distances averaging a univariate comparison over every feature.

use ndarray::{ArrayView1, ArrayView2};

pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Mean and population standard deviation of one column.
fn moments(column: ArrayView1<'_, f64>) -> (f64, f64) {
    let n = column.len() as f64;
    let mean = column.sum() / n;
    let var = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Mean over features of the Gaussian KL divergence `KL(x_f ‖ y_f)`.
///
/// `epsilon` is added to both standard deviations so constant features stay finite.
pub fn kl_divergence(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, epsilon: f64) -> f64 {
    let n_features = x.ncols();
    let total: f64 = (0..n_features)
        .map(|f| {
            let (x_mean, x_std) = moments(x.column(f));
            let (y_mean, y_std) = moments(y.column(f));
            let x_std = x_std + epsilon;
            let y_std = y_std + epsilon;
            let spread = x_std * x_std + (x_mean - y_mean).powi(2);
            (y_std / x_std).ln() + spread / (2.0 * y_std * y_std) - 0.5
        })
        .sum();
    total / n_features as f64
}

/// Mean over features of the absolute Welch t statistic.
pub fn t_test_distance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, epsilon: f64) -> f64 {
    let n1 = x.nrows() as f64;
    let n2 = y.nrows() as f64;
    let n_features = x.ncols();

    let total: f64 = (0..n_features)
        .map(|f| {
            let (m1, s1) = moments(x.column(f));
            let (m2, s2) = moments(y.column(f));
            // Unbiased variances
            let v1 = s1 * s1 * n1 / (n1 - 1.0) + epsilon;
            let v2 = s2 * s2 * n2 / (n2 - 1.0) + epsilon;
            ((m1 - m2) / (v1 / n1 + v2 / n2).sqrt()).abs()
        })
        .sum();
    total / n_features as f64
}

/// Two-sample Kolmogorov-Smirnov statistic `sup |F_x − F_y|`.
pub fn ks_statistic(x: &[f64], y: &[f64]) -> f64 {
    let mut a = x.to_vec();
    let mut b = y.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n, m) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut sup: f64 = 0.0;
    while i < a.len() && j < b.len() {
        // Step past every copy of the smallest remaining value in both samples
        let value = a[i].min(b[j]);
        while i < a.len() && a[i] <= value {
            i += 1;
        }
        while j < b.len() && b[j] <= value {
            j += 1;
        }
        sup = sup.max((i as f64 / n - j as f64 / m).abs());
    }
    sup
}

/// Mean over features of the two-sample KS statistic.
pub fn ks_test_distance(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> f64 {
    let n_features = x.ncols();
    let total: f64 = (0..n_features)
        .map(|f| ks_statistic(&x.column(f).to_vec(), &y.column(f).to_vec()))
        .sum();
    total / n_features as f64
}
