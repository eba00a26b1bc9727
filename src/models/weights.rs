/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Inverse-probability weight derivation for treatment and censoring models.
//
// Created on: 14 Mar 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Observation weights
//!
//! Fits the auxiliary treatment and censoring models over the full cohort
//! and derives per-observation weights: the propensity score, the inverse
//! probability of treatment weight (IPTW), the standardized mortality ratio
//! weight (SMRW), the inverse probability of censoring weight (IPCW), and
//! their product. The combined weight is defined only for uncensored rows
//! and is stored as NaN elsewhere.

use faer::Mat;
use thiserror::Error;

use crate::input::{Cohort, CohortError, ModelSpec};
use crate::models::FitOptions;
use crate::models::logistic::{LogisticError, LogisticModel, fit_logistic};

/// Weighting scheme applied to the treatment arm contrast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreatmentWeighting {
    /// IPTW: reweight both arms toward the source population.
    #[default]
    InverseProbability,
    /// SMRW: reweight the untreated arm toward the treated arm.
    StandardizedMortalityRatio,
}

/// Errors returned during weight derivation.
#[derive(Debug, Error)]
pub enum WeightError {
    #[error("invalid cohort or model specification: {0}")]
    Cohort(#[from] CohortError),
    #[error("auxiliary model fit failed: {0}")]
    Logistic(#[from] LogisticError),
    #[error("fitted probability {probability} at row {row} leaves the weight undefined")]
    DegenerateProbability { row: usize, probability: f64 },
    #[error("weight inputs must have matching lengths ({expected} vs {found})")]
    InputLengthMismatch { expected: usize, found: usize },
    #[error("indicator at row {row} must be 0 or 1")]
    NonBinaryIndicator { row: usize },
}

/// Derived per-observation weight columns.
#[derive(Debug, Clone)]
pub struct CohortWeights {
    scheme: TreatmentWeighting,
    propensity: Vec<f64>,
    iptw: Vec<f64>,
    smrw: Vec<f64>,
    uncensored_probability: Vec<f64>,
    ipcw: Vec<f64>,
    combined: Vec<f64>,
}

impl CohortWeights {
    /// Derive weights from already-predicted probabilities.
    ///
    /// Every probability must lie strictly inside (0, 1); a value of exactly
    /// 0 or 1 produces an infinite or undefined weight and is rejected. This
    /// covers the SMRW boundary as well: an untreated row whose propensity
    /// reaches 1 is an error, never silently truncated.
    ///
    /// # Errors
    ///
    /// Returns `WeightError` on length mismatches, non-binary indicators, or
    /// degenerate probabilities.
    pub fn from_probabilities(
        propensity: &[f64],
        uncensored_probability: &[f64],
        treatment: &[f64],
        uncensored: &[f64],
        scheme: TreatmentWeighting,
    ) -> Result<Self, WeightError> {
        Self::derive(
            propensity,
            uncensored_probability,
            treatment,
            uncensored,
            scheme,
            true,
        )
    }

    fn derive(
        propensity: &[f64],
        uncensored_probability: &[f64],
        treatment: &[f64],
        uncensored: &[f64],
        scheme: TreatmentWeighting,
        censoring_fitted: bool,
    ) -> Result<Self, WeightError> {
        let n = propensity.len();
        for other in [uncensored_probability.len(), treatment.len(), uncensored.len()] {
            if other != n {
                return Err(WeightError::InputLengthMismatch {
                    expected: n,
                    found: other,
                });
            }
        }

        let mut iptw = Vec::with_capacity(n);
        let mut smrw = Vec::with_capacity(n);
        let mut ipcw = Vec::with_capacity(n);
        let mut combined = Vec::with_capacity(n);

        for row in 0..n {
            let a = treatment[row];
            let c = uncensored[row];
            if a != 0.0 && a != 1.0 {
                return Err(WeightError::NonBinaryIndicator { row });
            }
            if c != 0.0 && c != 1.0 {
                return Err(WeightError::NonBinaryIndicator { row });
            }

            let p = propensity[row];
            if !(p > 0.0 && p < 1.0) {
                return Err(WeightError::DegenerateProbability {
                    row,
                    probability: p,
                });
            }
            let q = uncensored_probability[row];
            if censoring_fitted && !(q > 0.0 && q < 1.0) {
                return Err(WeightError::DegenerateProbability {
                    row,
                    probability: q,
                });
            }

            let treatment_weight = if a == 1.0 { 1.0 / p } else { 1.0 / (1.0 - p) };
            iptw.push(treatment_weight);
            let ratio_weight = if a == 1.0 { 1.0 } else { p / (1.0 - p) };
            smrw.push(ratio_weight);

            let selected = match scheme {
                TreatmentWeighting::InverseProbability => treatment_weight,
                TreatmentWeighting::StandardizedMortalityRatio => ratio_weight,
            };

            if c == 1.0 {
                ipcw.push(1.0 / q);
                combined.push(selected / q);
            } else {
                ipcw.push(0.0);
                combined.push(f64::NAN);
            }
        }

        Ok(Self {
            scheme,
            propensity: propensity.to_vec(),
            iptw,
            smrw,
            uncensored_probability: uncensored_probability.to_vec(),
            ipcw,
            combined,
        })
    }

    #[must_use]
    pub const fn scheme(&self) -> TreatmentWeighting {
        self.scheme
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.propensity.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.propensity.is_empty()
    }

    #[must_use]
    pub fn propensity(&self) -> &[f64] {
        &self.propensity
    }

    #[must_use]
    pub fn iptw(&self) -> &[f64] {
        &self.iptw
    }

    #[must_use]
    pub fn smrw(&self) -> &[f64] {
        &self.smrw
    }

    #[must_use]
    pub fn uncensored_probability(&self) -> &[f64] {
        &self.uncensored_probability
    }

    #[must_use]
    pub fn ipcw(&self) -> &[f64] {
        &self.ipcw
    }

    /// Combined weight column; NaN marks censored rows, where the combined
    /// weight is undefined.
    #[must_use]
    pub fn combined(&self) -> &[f64] {
        &self.combined
    }

    /// Combined weight for one row, `None` when the row is censored.
    #[must_use]
    pub fn combined_weight(&self, row: usize) -> Option<f64> {
        let value = *self.combined.get(row)?;
        value.is_finite().then_some(value)
    }

    /// Attach the derived columns to a widened copy of the cohort.
    ///
    /// The input cohort is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `CohortError` if the lengths do not match the cohort or one of
    /// the derived column names already exists.
    pub fn augment(&self, cohort: &Cohort) -> Result<Cohort, CohortError> {
        if self.len() != cohort.n_rows() {
            return Err(CohortError::WeightLengthMismatch {
                len: self.len(),
                rows: cohort.n_rows(),
            });
        }
        let augmented = cohort
            .clone()
            .with_column("propensity", self.propensity.clone())
            .with_column("iptw", self.iptw.clone())
            .with_column("smrw", self.smrw.clone())
            .with_column("uncensored_prob", self.uncensored_probability.clone())
            .with_column("ipcw", self.ipcw.clone())
            .with_column("combined_weight", self.combined.clone());
        augmented.validate()?;
        Ok(augmented)
    }
}

/// Outputs of the weight-derivation stage.
#[derive(Debug, Clone)]
pub struct WeightFit {
    /// Derived weight columns.
    pub weights: CohortWeights,
    /// Fitted treatment-assignment model.
    pub treatment_fit: LogisticModel,
    /// Fitted censoring model; `None` when the cohort has no censoring and
    /// the stage was skipped (the uncensored probability is definitionally 1).
    pub censoring_fit: Option<LogisticModel>,
    /// IRLS iterations used by the treatment model.
    pub iterations_treatment: usize,
    /// IRLS iterations used by the censoring model (0 when skipped).
    pub iterations_censoring: usize,
}

/// Fit both auxiliary models on the full cohort and derive all weights.
///
/// Both models are fit over every row: treatment assignment is assumed to
/// operate before censoring, and the censoring model needs the censored rows
/// to see its zeros.
///
/// # Errors
///
/// Returns `WeightError` if the cohort or specifications are invalid, an
/// auxiliary fit fails, or a fitted probability is degenerate.
pub fn compute_weights(
    cohort: &Cohort,
    treatment_model: &ModelSpec,
    censoring_model: &ModelSpec,
    treatment_column: &str,
    censoring_column: &str,
    scheme: TreatmentWeighting,
    options: FitOptions,
) -> Result<WeightFit, WeightError> {
    cohort.validate()?;
    let n = cohort.n_rows();
    let treatment = cohort.binary_column(treatment_column)?;
    let uncensored = cohort.binary_column(censoring_column)?;

    let x_treatment = treatment_model.design_matrix(cohort)?;
    let y_treatment = Mat::from_fn(n, 1, |i, _| treatment[i]);
    let (treatment_fit, iterations_treatment) =
        fit_logistic(&x_treatment, &y_treatment, options)?;
    let propensity_mat = treatment_fit.predict_probability(&x_treatment);
    let propensity: Vec<f64> = (0..n).map(|i| propensity_mat[(i, 0)]).collect();

    let censoring_observed = uncensored.iter().any(|&value| value == 0.0);
    let (censoring_fit, iterations_censoring, uncensored_probability) = if censoring_observed {
        let x_censoring = censoring_model.design_matrix(cohort)?;
        let y_censoring = Mat::from_fn(n, 1, |i, _| uncensored[i]);
        let (fit, iterations) = fit_logistic(&x_censoring, &y_censoring, options)?;
        let q_mat = fit.predict_probability(&x_censoring);
        let q: Vec<f64> = (0..n).map(|i| q_mat[(i, 0)]).collect();
        (Some(fit), iterations, q)
    } else {
        log::debug!("no censoring observed; censoring weights fixed at 1");
        (None, 0, vec![1.0; n])
    };

    let weights = CohortWeights::derive(
        &propensity,
        &uncensored_probability,
        treatment,
        uncensored,
        scheme,
        censoring_observed,
    )?;
    log::debug!(
        "derived weights for {n} rows ({} uncensored)",
        weights.combined.iter().filter(|w| w.is_finite()).count()
    );

    Ok(WeightFit {
        weights,
        treatment_fit,
        censoring_fit,
        iterations_treatment,
        iterations_censoring,
    })
}
