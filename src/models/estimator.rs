/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Weighted outcome estimator: treatment model, censoring model, weighted GEE.
//
// Created on: 15 Mar 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Weighted estimator
//!
//! The end-to-end estimation pipeline: fit the treatment-assignment model,
//! fit the censoring model, derive combined weights, and fit the weighted
//! `outcome ~ treatment` regression with a robust variance clustered on the
//! subject identifier. The returned value exposes the marginal treatment
//! contrast with its robust standard error and confidence interval.
//!
//! The estimate targets the marginal causal contrast only under the usual
//! identification conditions: both auxiliary models correctly specified,
//! positivity of the treatment and censoring probabilities, and no
//! unmeasured confounding given the included covariates. No doubly-robust
//! property is claimed.

use faer::Mat;
use thiserror::Error;

use crate::inference::{ConfidenceInterval, normal_quantile};
use crate::input::{Cohort, CohortError, ModelSpec};
use crate::models::FitOptions;
use crate::models::logistic::LogisticModel;
use crate::models::outcome::{Family, GeeModel, GeeReport, Link, OutcomeError, fit_gee_independence};
use crate::models::weights::{CohortWeights, TreatmentWeighting, WeightError, compute_weights};
use crate::utils;

/// Configuration record for one estimator invocation.
#[derive(Debug, Clone)]
pub struct EstimatorSpec {
    /// Covariates predicting treatment assignment.
    pub treatment_model: ModelSpec,
    /// Covariates predicting the uncensoring indicator.
    pub censoring_model: ModelSpec,
    /// Binary treatment indicator column.
    pub treatment_column: String,
    /// Binary uncensoring indicator column (1 = observed).
    pub censoring_column: String,
    /// Outcome column; may be NaN on censored rows.
    pub outcome_column: String,
    /// Distribution family for the outcome regression.
    pub family: Family,
    /// Link function for the outcome regression.
    pub link: Link,
    /// Treatment weighting scheme (IPTW or SMRW).
    pub weighting: TreatmentWeighting,
}

impl EstimatorSpec {
    /// Spec with intercept-only auxiliary models and a gaussian identity
    /// outcome regression (an additive contrast).
    pub fn new(
        treatment_column: impl Into<String>,
        censoring_column: impl Into<String>,
        outcome_column: impl Into<String>,
    ) -> Self {
        Self {
            treatment_model: ModelSpec::intercept_only(),
            censoring_model: ModelSpec::intercept_only(),
            treatment_column: treatment_column.into(),
            censoring_column: censoring_column.into(),
            outcome_column: outcome_column.into(),
            family: Family::Gaussian,
            link: Link::Identity,
            weighting: TreatmentWeighting::default(),
        }
    }

    #[must_use]
    pub fn with_treatment_model(mut self, model: ModelSpec) -> Self {
        self.treatment_model = model;
        self
    }

    #[must_use]
    pub fn with_censoring_model(mut self, model: ModelSpec) -> Self {
        self.censoring_model = model;
        self
    }

    #[must_use]
    pub fn with_family(mut self, family: Family, link: Link) -> Self {
        self.family = family;
        self.link = link;
        self
    }

    #[must_use]
    pub fn with_weighting(mut self, weighting: TreatmentWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Reject unsupported family/link pairs before any fitting.
    ///
    /// # Errors
    ///
    /// Returns `OutcomeError::UnsupportedLink` for an unrecognized pair.
    pub const fn validate(&self) -> Result<(), OutcomeError> {
        if self.family.supports(self.link) {
            Ok(())
        } else {
            Err(OutcomeError::UnsupportedLink {
                family: self.family,
                link: self.link,
            })
        }
    }
}

/// Errors returned by the estimation pipeline.
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("invalid cohort or specification: {0}")]
    Specification(#[from] CohortError),
    #[error("weight derivation failed: {0}")]
    Weight(#[from] WeightError),
    #[error("weighted outcome fit failed: {0}")]
    Outcome(#[from] OutcomeError),
    #[error("no uncensored rows remain for the outcome fit")]
    NoUncensoredRows,
}

/// Fitted weighted estimate with everything needed for downstream reporting.
#[derive(Debug, Clone)]
pub struct WeightedEstimate {
    /// Weighted outcome regression over `[intercept, treatment]`.
    pub outcome_model: GeeModel,
    /// Robust inference for the outcome regression.
    pub report: GeeReport,
    /// Derived per-observation weights.
    pub weights: CohortWeights,
    /// Fitted treatment-assignment model.
    pub treatment_fit: LogisticModel,
    /// Fitted censoring model, `None` when the cohort has no censoring.
    pub censoring_fit: Option<LogisticModel>,
    /// IRLS iterations for the treatment model.
    pub iterations_treatment: usize,
    /// IRLS iterations for the censoring model (0 when skipped).
    pub iterations_censoring: usize,
    /// Uncensored rows entering the outcome fit.
    pub n_rows_used: usize,
}

impl WeightedEstimate {
    /// Intercept of the weighted outcome regression.
    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.outcome_model.beta[(0, 0)]
    }

    /// Coefficient on the treatment indicator: the marginal contrast on the
    /// link scale.
    #[must_use]
    pub fn treatment_coefficient(&self) -> f64 {
        self.outcome_model.beta[(1, 0)]
    }

    /// Robust (sandwich) standard error of the treatment coefficient.
    #[must_use]
    pub fn treatment_standard_error(&self) -> f64 {
        self.report.se[(1, 0)]
    }

    /// Wald confidence interval for the treatment coefficient at level
    /// `1 - alpha`.
    #[must_use]
    pub fn treatment_confidence_interval(&self, alpha: f64) -> ConfidenceInterval {
        let z = normal_quantile(1.0 - alpha / 2.0);
        let estimate = self.treatment_coefficient();
        let se = self.treatment_standard_error();
        ConfidenceInterval {
            lower: z.mul_add(-se, estimate),
            upper: z.mul_add(se, estimate),
        }
    }
}

/// Run the full weighted-estimation pipeline.
///
/// Fits the treatment and censoring models over the full cohort, derives the
/// combined weight, and fits the weighted `outcome ~ treatment` regression on
/// the uncensored rows with one robust-variance cluster per subject. Censored
/// rows are excluded from the outcome fit entirely, not down-weighted; their
/// outcome values may be NaN.
///
/// # Errors
///
/// Returns `EstimatorError` if validation fails (including duplicate subject
/// ids), a fitted probability is degenerate, or a model fit does not
/// converge.
///
/// # Examples
///
/// ```
/// use propensity_models::{Cohort, EstimatorSpec, FitOptions, estimate_weighted_outcome};
///
/// let n = 20;
/// let treated: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
/// let uncensored: Vec<f64> = (0..n).map(|i| if i % 5 == 0 { 0.0 } else { 1.0 }).collect();
/// let outcome: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 3.0 } else { 2.0 }).collect();
/// let cohort = Cohort::new((0..20u64).collect())
///     .with_column("treated", treated)
///     .with_column("uncensored", uncensored)
///     .with_column("outcome", outcome);
///
/// let spec = EstimatorSpec::new("treated", "uncensored", "outcome");
/// let estimate = estimate_weighted_outcome(&cohort, &spec, FitOptions::default()).expect("fit");
///
/// assert!((estimate.treatment_coefficient() - 1.0).abs() < 1e-6);
/// ```
pub fn estimate_weighted_outcome(
    cohort: &Cohort,
    spec: &EstimatorSpec,
    options: FitOptions,
) -> Result<WeightedEstimate, EstimatorError> {
    spec.validate()?;
    cohort.validate()?;
    cohort.ensure_unique_subject_ids()?;

    let weight_fit = compute_weights(
        cohort,
        &spec.treatment_model,
        &spec.censoring_model,
        &spec.treatment_column,
        &spec.censoring_column,
        spec.weighting,
        options,
    )?;

    let treatment = cohort.binary_column(&spec.treatment_column)?;
    let uncensored = cohort.binary_column(&spec.censoring_column)?;
    let outcome = cohort.column(&spec.outcome_column)?;

    let kept: Vec<usize> = (0..cohort.n_rows())
        .filter(|&row| uncensored[row] == 1.0)
        .collect();
    if kept.is_empty() {
        return Err(EstimatorError::NoUncensoredRows);
    }
    for &row in &kept {
        if !outcome[row].is_finite() {
            return Err(CohortError::NonFiniteOutcome {
                column: spec.outcome_column.clone(),
                row,
            }
            .into());
        }
    }

    let combined = weight_fit.weights.combined();
    let x = Mat::from_fn(kept.len(), 2, |r, j| {
        if j == 0 { 1.0 } else { treatment[kept[r]] }
    });
    let y = Mat::from_fn(kept.len(), 1, |r, _| outcome[kept[r]]);
    let w = Mat::from_fn(kept.len(), 1, |r, _| combined[kept[r]]);
    let clusters = utils::select_ids(cohort.subject_ids(), &kept);

    let (outcome_model, report) =
        fit_gee_independence(&x, &y, &w, &clusters, spec.family, spec.link, options)?;
    log::info!(
        "weighted outcome fit used {} of {} rows across {} clusters",
        kept.len(),
        cohort.n_rows(),
        report.cluster_count
    );

    Ok(WeightedEstimate {
        outcome_model,
        report,
        weights: weight_fit.weights,
        treatment_fit: weight_fit.treatment_fit,
        censoring_fit: weight_fit.censoring_fit,
        iterations_treatment: weight_fit.iterations_treatment,
        iterations_censoring: weight_fit.iterations_censoring,
        n_rows_used: kept.len(),
    })
}
