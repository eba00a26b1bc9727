//! # Covariate balance diagnostics
//!
//! Weighted summaries used to check whether weighting has balanced the
//! covariate distributions between treatment arms. Rows whose weight is
//! missing (NaN) or non-positive are skipped, so the combined-weight column
//! — undefined on censored rows — can be passed straight through.

use crate::input::{Cohort, CohortError};

/// Balance summary for one covariate.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateBalance {
    pub covariate: String,
    pub mean_treated: f64,
    pub mean_untreated: f64,
    /// Signed standardized mean difference (treated minus untreated).
    pub standardized_difference: f64,
}

fn usable(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

/// Weighted mean over rows with usable weights; NaN when no weight mass
/// remains.
#[must_use]
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut mass = 0.0;
    for (value, weight) in values.iter().zip(weights) {
        if usable(*weight) {
            sum += value * weight;
            mass += weight;
        }
    }
    if mass > 0.0 { sum / mass } else { f64::NAN }
}

/// Weighted variance over rows with usable weights; NaN when no weight mass
/// remains.
#[must_use]
pub fn weighted_variance(values: &[f64], weights: &[f64]) -> f64 {
    let mean = weighted_mean(values, weights);
    if mean.is_nan() {
        return f64::NAN;
    }
    let mut sum = 0.0;
    let mut mass = 0.0;
    for (value, weight) in values.iter().zip(weights) {
        if usable(*weight) {
            let centered = value - mean;
            sum += weight * centered * centered;
            mass += weight;
        }
    }
    sum / mass
}

/// Kish effective sample size of a weight vector: `(sum w)^2 / sum w^2`.
#[must_use]
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for weight in weights {
        if usable(*weight) {
            sum += weight;
            sum_sq += weight * weight;
        }
    }
    if sum_sq > 0.0 { sum * sum / sum_sq } else { 0.0 }
}

/// Standardized mean difference between two weighted samples, pooling the
/// arm variances. Zero when both arms are constant at the same value.
#[must_use]
pub fn standardized_difference(
    values_treated: &[f64],
    weights_treated: &[f64],
    values_untreated: &[f64],
    weights_untreated: &[f64],
) -> f64 {
    let mean_treated = weighted_mean(values_treated, weights_treated);
    let mean_untreated = weighted_mean(values_untreated, weights_untreated);
    let var_treated = weighted_variance(values_treated, weights_treated);
    let var_untreated = weighted_variance(values_untreated, weights_untreated);
    let pooled = ((var_treated + var_untreated) / 2.0).sqrt();
    if pooled > 0.0 {
        (mean_treated - mean_untreated) / pooled
    } else {
        0.0
    }
}

/// Per-covariate balance between treatment arms, optionally weighted.
///
/// With `weights: None` every row counts with weight 1, giving the
/// before-weighting table; passing a derived weight column gives the
/// after-weighting table.
///
/// # Errors
///
/// Returns `CohortError` if a column is missing, the treatment indicator is
/// not binary, or the weight vector length does not match the cohort.
pub fn covariate_balance(
    cohort: &Cohort,
    covariates: &[&str],
    treatment_column: &str,
    weights: Option<&[f64]>,
) -> Result<Vec<CovariateBalance>, CohortError> {
    let n = cohort.n_rows();
    let treatment = cohort.binary_column(treatment_column)?;
    if let Some(weights) = weights
        && weights.len() != n
    {
        return Err(CohortError::WeightLengthMismatch {
            len: weights.len(),
            rows: n,
        });
    }

    let row_weight =
        |row: usize| -> f64 { weights.map_or(1.0, |weights| weights[row]) };

    let mut rows = Vec::with_capacity(covariates.len());
    for name in covariates {
        let values = cohort.column(name)?;
        let mut treated_values = Vec::new();
        let mut treated_weights = Vec::new();
        let mut untreated_values = Vec::new();
        let mut untreated_weights = Vec::new();
        for row in 0..n {
            if treatment[row] == 1.0 {
                treated_values.push(values[row]);
                treated_weights.push(row_weight(row));
            } else {
                untreated_values.push(values[row]);
                untreated_weights.push(row_weight(row));
            }
        }

        rows.push(CovariateBalance {
            covariate: (*name).to_owned(),
            mean_treated: weighted_mean(&treated_values, &treated_weights),
            mean_untreated: weighted_mean(&untreated_values, &untreated_weights),
            standardized_difference: standardized_difference(
                &treated_values,
                &treated_weights,
                &untreated_values,
                &untreated_weights,
            ),
        });
    }
    Ok(rows)
}
