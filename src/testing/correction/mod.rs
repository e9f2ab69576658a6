//! Multiple testing correction applied to the per-feature p-values of a DE ranking.

use anyhow::{Result, anyhow};

fn validate_p_values(p_values: &[f64]) -> Result<()> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

/// Apply Bonferroni correction to p-values
///
/// Multiplies each p-value by the number of tests, capping at 1.0.
///
/// # Example
/// ```
/// use single_perturbation::testing::correction::bonferroni_correction;
/// let adjusted = bonferroni_correction(&[0.01, 0.03, 0.05]).unwrap();
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// ```
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len() as f64;
    Ok(p_values.iter().map(|&p| (p * n).min(1.0)).collect())
}

/// Apply the Benjamini-Hochberg step-up procedure controlling the false discovery rate
///
/// # Example
/// ```
/// use single_perturbation::testing::correction::benjamini_hochberg_correction;
/// let adjusted = benjamini_hochberg_correction(&[0.01, 0.03, 0.05]).unwrap();
/// assert!((adjusted[2] - 0.05).abs() < 1e-12);
/// ```
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    // Walk from the largest p-value down, carrying the running minimum
    let mut adjusted = vec![0.0; n];
    let mut current_min: f64 = 1.0;
    for (position, &feature) in order.iter().enumerate().rev() {
        let rank = (position + 1) as f64;
        let candidate = (p_values[feature] * n as f64 / rank).min(1.0);
        current_min = current_min.min(candidate);
        adjusted[feature] = current_min;
    }

    Ok(adjusted)
}
