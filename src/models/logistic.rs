//! # Logistic regression
//!
//! Binomial GLM with logit link, fit by iteratively reweighted least
//! squares. Used for the auxiliary treatment-assignment and censoring
//! models, which only need coefficients and a probability-prediction
//! surface.

use faer::Mat;
use thiserror::Error;

use crate::models::FitOptions;
use crate::utils::{self, SolveError};

/// Errors returned by logistic model fitting.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LogisticError {
    #[error("design matrix must have at least one column")]
    EmptyDesign,
    #[error("response must be a single column matrix")]
    InvalidResponseShape,
    #[error("design matrix rows ({rows}) must match response length ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("response must contain only 0 or 1 (row {row})")]
    NonBinaryResponse { row: usize },
    #[error("design matrix contains non-finite values")]
    NonFiniteDesign,
    #[error("model failed to converge within {max_iter} iterations")]
    NonConvergence { max_iter: usize },
    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// Fitted logistic model coefficients.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    /// Coefficients, one row per design-matrix column.
    pub beta: Mat<f64>,
}

impl LogisticModel {
    /// Predicted probabilities for each row of `x`.
    #[must_use]
    pub fn predict_probability(&self, x: &Mat<f64>) -> Mat<f64> {
        let eta = x * &self.beta;
        utils::map_mat(&eta, |value| 1.0 / (1.0 + (-value).exp()))
    }
}

/// Fit a logistic regression by IRLS.
///
/// Returns the fitted model and the number of iterations used.
///
/// # Errors
///
/// Returns `LogisticError` if inputs are malformed or the solver fails to
/// converge within `options.max_iter` iterations.
///
/// # Examples
///
/// ```
/// use faer::Mat;
/// use propensity_models::{FitOptions, fit_logistic};
///
/// let x = Mat::from_fn(4, 1, |_i, _j| 1.0);
/// let y = Mat::from_fn(4, 1, |i, _| if i == 0 { 0.0 } else { 1.0 });
/// let (model, _iterations) = fit_logistic(&x, &y, FitOptions::default()).expect("fit");
///
/// // Intercept-only fit recovers the logit of the response mean.
/// assert!((model.beta[(0, 0)] - 3.0f64.ln()).abs() < 1e-6);
/// ```
pub fn fit_logistic(
    x: &Mat<f64>,
    y: &Mat<f64>,
    options: FitOptions,
) -> Result<(LogisticModel, usize), LogisticError> {
    if x.ncols() == 0 {
        return Err(LogisticError::EmptyDesign);
    }
    if y.ncols() != 1 {
        return Err(LogisticError::InvalidResponseShape);
    }
    if x.nrows() != y.nrows() {
        return Err(LogisticError::DimensionMismatch {
            rows: x.nrows(),
            len: y.nrows(),
        });
    }
    if !utils::matrix_is_finite(x) {
        return Err(LogisticError::NonFiniteDesign);
    }
    for row in 0..y.nrows() {
        let value = y[(row, 0)];
        if value != 0.0 && value != 1.0 {
            return Err(LogisticError::NonBinaryResponse { row });
        }
    }

    let mut beta = Mat::<f64>::zeros(x.ncols(), 1);
    for iteration in 0..options.max_iter {
        let eta = x * &beta;
        let p = utils::map_mat(&eta, |value| 1.0 / (1.0 + (-value).exp()));
        let variance = Mat::from_fn(p.nrows(), 1, |i, _| {
            (p[(i, 0)] * (1.0 - p[(i, 0)])).max(options.min_weight)
        });
        let z = Mat::from_fn(eta.nrows(), 1, |i, _| {
            eta[(i, 0)] + (y[(i, 0)] - p[(i, 0)]) / variance[(i, 0)]
        });

        let xtwx = utils::weighted_xtx(x, &variance);
        let xtwz = utils::weighted_xtz(x, &variance, &z);
        let beta_next = utils::solve_linear_system(&xtwx, &xtwz)?;

        if utils::max_abs_diff(&beta_next, &beta) < options.tolerance {
            log::debug!(
                "logistic fit converged after {} iterations",
                iteration + 1
            );
            return Ok((LogisticModel { beta: beta_next }, iteration + 1));
        }
        beta = beta_next;
    }

    Err(LogisticError::NonConvergence {
        max_iter: options.max_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn idx_to_f64(idx: usize) -> f64 {
        f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
    }

    #[test]
    fn intercept_only_fit_recovers_logit_of_mean() {
        let n = 10;
        let x = Mat::from_fn(n, 1, |_i, _j| 1.0);
        // 7 of 10 events: beta = logit(0.7).
        let y = Mat::from_fn(n, 1, |i, _| if i < 7 { 1.0 } else { 0.0 });
        let (model, iterations) = fit_logistic(&x, &y, FitOptions::default()).expect("fit");
        assert!(iterations > 0);
        assert_relative_eq!(
            model.beta[(0, 0)],
            (0.7f64 / 0.3).ln(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn predictions_match_fitted_mean() {
        let n = 8;
        let x = Mat::from_fn(n, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(n, 1, |i, _| if i % 2 == 0 { 1.0 } else { 0.0 });
        let (model, _) = fit_logistic(&x, &y, FitOptions::default()).expect("fit");
        let p = model.predict_probability(&x);
        for i in 0..n {
            assert_relative_eq!(p[(i, 0)], 0.5, epsilon = 1e-8);
        }
    }

    #[test]
    fn fit_with_covariate_separates_groups() {
        let n = 40;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) / 10.0 });
        // Event probability rises with the covariate.
        let y = Mat::from_fn(n, 1, |i, _| if i % 4 == 0 || i >= 20 { 1.0 } else { 0.0 });
        let (model, _) = fit_logistic(&x, &y, FitOptions::default()).expect("fit");
        assert!(model.beta[(1, 0)] > 0.0);
        let p = model.predict_probability(&x);
        assert!(p[(n - 1, 0)] > p[(1, 0)]);
    }

    #[test]
    fn rejects_non_binary_response() {
        let x = Mat::from_fn(3, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(3, 1, |i, _| if i == 2 { 0.5 } else { 1.0 });
        let err = fit_logistic(&x, &y, FitOptions::default())
            .expect_err("fractional response should fail");
        assert_eq!(err, LogisticError::NonBinaryResponse { row: 2 });
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let x = Mat::from_fn(3, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(2, 1, |_i, _| 1.0);
        let err = fit_logistic(&x, &y, FitOptions::default())
            .expect_err("row mismatch should fail");
        assert_eq!(err, LogisticError::DimensionMismatch { rows: 3, len: 2 });
    }

    #[test]
    fn rejects_empty_design() {
        let x = Mat::<f64>::zeros(3, 0);
        let y = Mat::from_fn(3, 1, |_i, _| 1.0);
        let err = fit_logistic(&x, &y, FitOptions::default())
            .expect_err("empty design should fail");
        assert_eq!(err, LogisticError::EmptyDesign);
    }

    #[test]
    fn reports_non_convergence_when_iterations_run_out() {
        let n = 12;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) });
        let y = Mat::from_fn(n, 1, |i, _| if i < 6 { 0.0 } else { 1.0 });
        let options = FitOptions {
            max_iter: 1,
            tolerance: 1e-12,
            ..FitOptions::default()
        };
        let err = fit_logistic(&x, &y, options).expect_err("one iteration cannot converge");
        assert_eq!(err, LogisticError::NonConvergence { max_iter: 1 });
    }
}
