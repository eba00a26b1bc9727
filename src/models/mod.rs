//! # Models
//!
//! Fitting routines for the weighting workflow: the auxiliary logistic
//! models, per-observation weight derivation, the weighted outcome
//! regression with robust variance, and the estimator gluing them together.

pub mod estimator;
pub mod logistic;
pub mod outcome;
pub mod weights;

/// Tuning parameters shared by the IRLS fitting stages.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Maximum number of IRLS iterations per model.
    pub max_iter: usize,
    /// Convergence tolerance on coefficient changes.
    pub tolerance: f64,
    /// Lower bound on IRLS working weights.
    pub min_weight: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tolerance: 1e-8,
            min_weight: 1e-6,
        }
    }
}
