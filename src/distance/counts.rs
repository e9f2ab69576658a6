//! Count-aware pseudo-distance: negative binomial negative log-likelihood.

use ndarray::{ArrayView1, ArrayView2};
use statrs::function::gamma::ln_gamma;

use crate::error::{PerturbationError, Result};

pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Dispersion used when a feature shows no overdispersion (NB tends to Poisson).
const POISSON_THETA: f64 = 1e8;

/// Means below this are treated as background when a fit is degenerate.
const DEGENERATE_MEAN_CUTOFF: f64 = 10.0;

const INTEGER_TOLERANCE: f64 = 1e-6;

fn validate_counts(values: ArrayView2<'_, f64>, which: &str) -> Result<()> {
    match values
        .iter()
        .find(|v| !v.is_finite() || **v < 0.0 || (**v - v.round()).abs() > INTEGER_TOLERANCE)
    {
        Some(bad) => Err(PerturbationError::InvalidInput(format!(
            "nb_nll only works for raw counts, found {bad} in {which}"
        ))),
        None => Ok(()),
    }
}

/// Method-of-moments negative binomial fit `(mu, theta)` of one feature.
fn fit_moments(column: ArrayView1<'_, f64>) -> (f64, f64) {
    let n = column.len() as f64;
    let mu = column.sum() / n;
    let var = column.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / n;
    let theta = if var > mu { mu * mu / (var - mu) } else { POISSON_THETA };
    (mu, theta)
}

fn mean_log_likelihood(y: ArrayView1<'_, f64>, mu: f64, theta: f64, epsilon: f64) -> f64 {
    let log_theta_mu = (theta + mu + epsilon).ln();
    let size_term = theta * ((theta + epsilon).ln() - log_theta_mu);
    let mean_term = (mu + epsilon).ln() - log_theta_mu;
    let ln_gamma_theta = ln_gamma(theta);

    let total: f64 = y
        .iter()
        .map(|&count| {
            size_term + count * mean_term + ln_gamma(count + theta)
                - ln_gamma_theta
                - ln_gamma(count + 1.0)
        })
        .sum();
    total / y.len() as f64
}

/// Negative mean log-likelihood of the counts in `y` under per-feature negative binomials
/// fitted to the counts in `x`.
///
/// Features whose fit is degenerate (zero mean in `x`) contribute nothing when both groups are
/// lowly expressed there, and make the result `NaN` otherwise.
pub fn negative_binomial_nll(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    epsilon: f64,
) -> Result<f64> {
    validate_counts(x, "x")?;
    validate_counts(y, "y")?;

    let n_features = x.ncols();
    let mut total = 0.0;
    for f in 0..n_features {
        let (mu, theta) = fit_moments(x.column(f));
        if mu == 0.0 {
            let y_mean = y.column(f).sum() / y.nrows() as f64;
            if y_mean < DEGENERATE_MEAN_CUTOFF {
                continue;
            }
            tracing::debug!(feature = f, y_mean, "degenerate negative binomial fit");
            return Ok(f64::NAN);
        }
        total += mean_log_likelihood(y.column(f), mu, theta, epsilon);
    }
    Ok(-total / n_features as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn rejects_non_counts() {
        let x = array![[1.0, 2.5]];
        let y = array![[1.0, 2.0]];
        assert!(matches!(
            negative_binomial_nll(x.view(), y.view(), DEFAULT_EPSILON),
            Err(PerturbationError::InvalidInput(_))
        ));
        let negative = array![[-1.0, 2.0]];
        assert!(negative_binomial_nll(y.view(), negative.view(), DEFAULT_EPSILON).is_err());
    }

    #[test]
    fn poisson_limit_matches_poisson_likelihood() {
        // Equal mean and variance fall back to the Poisson dispersion
        let x = array![[1.0], [3.0]];
        let y = array![[2.0]];
        let (mu, theta) = fit_moments(x.column(0));
        assert_eq!(mu, 2.0);
        assert_eq!(theta, POISSON_THETA);

        let poisson_ll = 2.0 * 2.0_f64.ln() - 2.0 - ln_gamma(3.0);
        let nll = negative_binomial_nll(x.view(), y.view(), 0.0).unwrap();
        assert_relative_eq!(nll, -poisson_ll, epsilon = 1e-4);
    }

    #[test]
    fn silent_features_are_skipped() {
        let x = array![[0.0, 4.0], [0.0, 6.0]];
        let y = array![[1.0, 5.0], [0.0, 5.0]];
        let nll = negative_binomial_nll(x.view(), y.view(), DEFAULT_EPSILON).unwrap();
        assert!(nll.is_finite() && nll > 0.0);

        let loud = array![[50.0, 5.0], [60.0, 5.0]];
        assert!(negative_binomial_nll(x.view(), loud.view(), DEFAULT_EPSILON).unwrap().is_nan());
    }

    #[test]
    fn better_fitting_counts_score_lower() {
        let x = array![[4.0], [6.0], [5.0], [5.0]];
        let close = array![[5.0], [5.0]];
        let far = array![[40.0], [45.0]];
        let close_nll = negative_binomial_nll(x.view(), close.view(), DEFAULT_EPSILON).unwrap();
        let far_nll = negative_binomial_nll(x.view(), far.view(), DEFAULT_EPSILON).unwrap();
        assert!(close_nll < far_nll);
    }
}
