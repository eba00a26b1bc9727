#![forbid(unsafe_code)]

//! # `propensity_models`
//!
//! Propensity-score weighting estimators for cohort analyses: inverse
//! probability of treatment weighting (IPTW), standardized mortality ratio
//! weighting (SMRW), inverse probability of censoring weighting (IPCW), and
//! a weighted outcome regression with robust (sandwich) variance clustered
//! on the subject identifier.
//!
//! The crate grew out of epidemiological teaching analyses, but the API is
//! intentionally domain-agnostic: any cohort with a binary exposure, an
//! observation indicator, and baseline covariates fits.
//!
//! The workflow is a straight pipeline: fit a logistic treatment model, fit
//! a logistic censoring model, derive per-row weights, check covariate
//! balance, and fit the weighted `outcome ~ treatment` contrast under a
//! chosen family and link.

pub mod balance;
pub mod inference;
pub mod input;
pub mod models;
pub mod simulate;
pub mod utils;

pub use balance::{
    CovariateBalance, covariate_balance, effective_sample_size, standardized_difference,
    weighted_mean, weighted_variance,
};

pub use inference::{
    ConfidenceInterval, normal_quantile, wald_confidence_intervals, wald_p_values,
};

pub use input::{Cohort, CohortError, ModelSpec};

pub use models::FitOptions;

pub use models::estimator::{
    EstimatorError, EstimatorSpec, WeightedEstimate, estimate_weighted_outcome,
};

pub use models::logistic::{LogisticError, LogisticModel, fit_logistic};

pub use models::outcome::{
    Family, GeeModel, GeeReport, Link, OutcomeError, fit_gee_independence,
};

pub use models::weights::{
    CohortWeights, TreatmentWeighting, WeightError, WeightFit, compute_weights,
};

pub use simulate::{SimulationOptions, simulate_cohort};
