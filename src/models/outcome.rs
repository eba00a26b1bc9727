/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Weighted outcome regression with working-independence robust variance.
//
// Created on: 14 Mar 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Weighted outcome models
//!
//! Fits a weighted generalized linear model by IRLS and pairs it with a
//! cluster-robust sandwich covariance, i.e. a generalized estimating
//! equation under a working-independence correlation structure. With one
//! cluster per subject this is the variance estimator that accounts for
//! weighting-induced inflation in the final outcome fit.

use std::collections::HashMap;
use std::fmt;

use faer::Mat;
use thiserror::Error;

use crate::models::FitOptions;
use crate::utils::{self, SolveError};

/// Exponential-family distribution for the outcome regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Gaussian,
    Binomial,
    Poisson,
}

/// Link function for the outcome regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Identity,
    Logit,
    Log,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gaussian => write!(f, "gaussian"),
            Self::Binomial => write!(f, "binomial"),
            Self::Poisson => write!(f, "poisson"),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Logit => write!(f, "logit"),
            Self::Log => write!(f, "log"),
        }
    }
}

impl Family {
    /// Recognized family/link pairs; anything else is rejected eagerly.
    #[must_use]
    pub const fn supports(self, link: Link) -> bool {
        matches!(
            (self, link),
            (Self::Gaussian, Link::Identity | Link::Log)
                | (Self::Binomial, Link::Logit | Link::Log | Link::Identity)
                | (Self::Poisson, Link::Log | Link::Identity)
        )
    }

    fn variance(self, mu: f64) -> f64 {
        match self {
            Self::Gaussian => 1.0,
            Self::Binomial => mu * (1.0 - mu),
            Self::Poisson => mu,
        }
    }

    fn outcome_in_domain(self, value: f64) -> bool {
        match self {
            Self::Gaussian => true,
            Self::Binomial => (0.0..=1.0).contains(&value),
            Self::Poisson => value >= 0.0,
        }
    }
}

impl Link {
    fn inverse(self, eta: f64) -> f64 {
        match self {
            Self::Identity => eta,
            Self::Logit => 1.0 / (1.0 + (-eta).exp()),
            Self::Log => eta.exp(),
        }
    }

    /// Derivative of the mean with respect to the linear predictor.
    fn mu_eta(self, eta: f64) -> f64 {
        match self {
            Self::Identity => 1.0,
            Self::Logit => {
                let mu = 1.0 / (1.0 + (-eta).exp());
                mu * (1.0 - mu)
            }
            Self::Log => eta.exp(),
        }
    }
}

/// Errors returned by the weighted outcome fit.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("the {family} family does not support the {link} link")]
    UnsupportedLink { family: Family, link: Link },
    #[error("design matrix must have at least one column")]
    EmptyDesign,
    #[error("outcome must be a single column matrix")]
    InvalidOutcomeShape,
    #[error("design matrix rows ({rows}) must match outcome length ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("weights must be a single column matrix with the same number of rows as outcome")]
    InvalidWeightShape,
    #[error("cluster labels length ({labels}) must match outcome rows ({rows})")]
    InvalidClusterLength { labels: usize, rows: usize },
    #[error("inputs contain non-finite values")]
    NonFiniteInput,
    #[error("weights must be strictly positive")]
    NonPositiveWeights,
    #[error("outcome value at row {row} is outside the {family} family domain")]
    OutcomeOutsideDomain { family: Family, row: usize },
    #[error("model failed to converge within {max_iter} iterations")]
    NonConvergence { max_iter: usize },
    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// Fitted weighted outcome model.
#[derive(Debug, Clone)]
pub struct GeeModel {
    /// Coefficients, one row per design-matrix column.
    pub beta: Mat<f64>,
    pub family: Family,
    pub link: Link,
}

impl GeeModel {
    /// Predicted means for each row of `x`.
    #[must_use]
    pub fn predict_mean(&self, x: &Mat<f64>) -> Mat<f64> {
        let eta = x * &self.beta;
        utils::map_mat(&eta, |value| self.link.inverse(value))
    }
}

/// Inference outputs for a weighted outcome fit.
#[derive(Debug, Clone)]
pub struct GeeReport {
    /// IRLS iterations used.
    pub iterations: usize,
    /// Robust (sandwich) standard errors per coefficient.
    pub se: Mat<f64>,
    /// Robust covariance matrix of the coefficients.
    pub covariance: Mat<f64>,
    /// Number of distinct clusters the meat was accumulated over.
    pub cluster_count: usize,
}

/// Fit a weighted GLM with a working-independence cluster-robust covariance.
///
/// `weights` are held fixed through the IRLS iterations (inverse-probability
/// weights, not frequency counts); `clusters` groups the robust-variance
/// score contributions, one cluster per subject in the weighting workflow.
///
/// # Errors
///
/// Returns `OutcomeError` if the family/link pair is unsupported, inputs are
/// malformed, or the solver fails to converge.
pub fn fit_gee_independence(
    x: &Mat<f64>,
    y: &Mat<f64>,
    weights: &Mat<f64>,
    clusters: &[u64],
    family: Family,
    link: Link,
    options: FitOptions,
) -> Result<(GeeModel, GeeReport), OutcomeError> {
    if !family.supports(link) {
        return Err(OutcomeError::UnsupportedLink { family, link });
    }
    if x.ncols() == 0 {
        return Err(OutcomeError::EmptyDesign);
    }
    if y.ncols() != 1 {
        return Err(OutcomeError::InvalidOutcomeShape);
    }
    if x.nrows() != y.nrows() {
        return Err(OutcomeError::DimensionMismatch {
            rows: x.nrows(),
            len: y.nrows(),
        });
    }
    if weights.ncols() != 1 || weights.nrows() != y.nrows() {
        return Err(OutcomeError::InvalidWeightShape);
    }
    if clusters.len() != y.nrows() {
        return Err(OutcomeError::InvalidClusterLength {
            labels: clusters.len(),
            rows: y.nrows(),
        });
    }
    if !utils::matrix_is_finite(x)
        || !utils::matrix_is_finite(y)
        || !utils::matrix_is_finite(weights)
    {
        return Err(OutcomeError::NonFiniteInput);
    }
    if (0..weights.nrows()).any(|i| weights[(i, 0)] <= 0.0) {
        return Err(OutcomeError::NonPositiveWeights);
    }
    for row in 0..y.nrows() {
        if !family.outcome_in_domain(y[(row, 0)]) {
            return Err(OutcomeError::OutcomeOutsideDomain { family, row });
        }
    }

    let mut beta = Mat::<f64>::zeros(x.ncols(), 1);
    if link == Link::Log {
        let mean = utils::mean_column(y);
        if mean > 0.0 {
            beta[(0, 0)] = mean.ln();
        }
    }

    let mut iterations = 0;
    loop {
        if iterations == options.max_iter {
            return Err(OutcomeError::NonConvergence {
                max_iter: options.max_iter,
            });
        }
        iterations += 1;

        let eta = x * &beta;
        let working = working_terms(&eta, y, weights, family, link, options);
        let xtwx = utils::weighted_xtx(x, &working.w);
        let xtwz = utils::weighted_xtz(x, &working.w, &working.z);
        let beta_next = utils::solve_linear_system(&xtwx, &xtwz)?;

        let converged = utils::max_abs_diff(&beta_next, &beta) < options.tolerance;
        beta = beta_next;
        if converged {
            break;
        }
    }
    log::debug!("weighted {family}/{link} fit converged after {iterations} iterations");

    let eta = x * &beta;
    let working = working_terms(&eta, y, weights, family, link, options);
    let bread = utils::weighted_xtx(x, &working.w);
    let (meat, cluster_count) = cluster_meat(x, &working.score, clusters);
    let covariance = utils::sandwich_covariance(&bread, &meat)?;
    let se = utils::diag_sqrt(&covariance);

    Ok((
        GeeModel { beta, family, link },
        GeeReport {
            iterations,
            se,
            covariance,
            cluster_count,
        },
    ))
}

struct WorkingTerms {
    /// IRLS weights: prior * (dmu/deta)^2 / V(mu).
    w: Mat<f64>,
    /// Working response on the linear-predictor scale.
    z: Mat<f64>,
    /// Per-row score residual: prior * (y - mu) * (dmu/deta) / V(mu).
    score: Mat<f64>,
}

fn working_terms(
    eta: &Mat<f64>,
    y: &Mat<f64>,
    weights: &Mat<f64>,
    family: Family,
    link: Link,
    options: FitOptions,
) -> WorkingTerms {
    let n = eta.nrows();
    let mut w = Mat::<f64>::zeros(n, 1);
    let mut z = Mat::<f64>::zeros(n, 1);
    let mut score = Mat::<f64>::zeros(n, 1);
    for i in 0..n {
        let mu = link.inverse(eta[(i, 0)]);
        let deriv = link.mu_eta(eta[(i, 0)]).max(options.min_weight);
        let variance = family.variance(mu).max(options.min_weight);
        let prior = weights[(i, 0)];
        w[(i, 0)] = prior * deriv * deriv / variance;
        z[(i, 0)] = eta[(i, 0)] + (y[(i, 0)] - mu) / deriv;
        score[(i, 0)] = prior * (y[(i, 0)] - mu) * deriv / variance;
    }
    WorkingTerms { w, z, score }
}

fn cluster_meat(x: &Mat<f64>, score: &Mat<f64>, clusters: &[u64]) -> (Mat<f64>, usize) {
    let p = x.ncols();
    let mut cluster_sums: HashMap<u64, Mat<f64>> = HashMap::new();
    for i in 0..x.nrows() {
        let entry = cluster_sums
            .entry(clusters[i])
            .or_insert_with(|| Mat::zeros(p, 1));
        for col in 0..p {
            entry[(col, 0)] += x[(i, col)] * score[(i, 0)];
        }
    }

    let cluster_count = cluster_sums.len();
    let mut meat = Mat::<f64>::zeros(p, p);
    for (_, sum) in cluster_sums {
        for i in 0..p {
            for j in 0..p {
                meat[(i, j)] += sum[(i, 0)] * sum[(j, 0)];
            }
        }
    }
    (meat, cluster_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn idx_to_f64(idx: usize) -> f64 {
        f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
    }

    fn unit_weights(n: usize) -> Mat<f64> {
        Mat::from_fn(n, 1, |_, _| 1.0)
    }

    fn singleton_clusters(n: usize) -> Vec<u64> {
        (0..n).map(|i| u64::try_from(i).unwrap_or(u64::MAX)).collect()
    }

    #[test]
    fn gaussian_identity_recovers_exact_linear_data() {
        let n = 10;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) });
        let y = Mat::from_fn(n, 1, |i, _| 2.0f64.mul_add(idx_to_f64(i), 1.0));
        let (model, report) = fit_gee_independence(
            &x,
            &y,
            &unit_weights(n),
            &singleton_clusters(n),
            Family::Gaussian,
            Link::Identity,
            FitOptions::default(),
        )
        .expect("fit");
        assert_relative_eq!(model.beta[(0, 0)], 1.0, epsilon = 1e-8);
        assert_relative_eq!(model.beta[(1, 0)], 2.0, epsilon = 1e-8);
        assert_eq!(report.cluster_count, n);
        // Residuals are zero, so the sandwich variance collapses.
        assert!(report.se[(1, 0)] < 1e-8);
    }

    #[test]
    fn weighted_intercept_fit_is_the_weighted_mean() {
        let x = Mat::from_fn(2, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(2, 1, |i, _| if i == 0 { 0.0 } else { 10.0 });
        let w = Mat::from_fn(2, 1, |i, _| if i == 0 { 3.0 } else { 1.0 });
        let (model, _) = fit_gee_independence(
            &x,
            &y,
            &w,
            &[1, 2],
            Family::Gaussian,
            Link::Identity,
            FitOptions::default(),
        )
        .expect("fit");
        assert_relative_eq!(model.beta[(0, 0)], 2.5, epsilon = 1e-8);
    }

    #[test]
    fn robust_se_matches_hand_computed_sandwich() {
        // Intercept-only gaussian fit: bread = n, meat = sum of squared
        // residuals, var = meat / n^2.
        let x = Mat::from_fn(2, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(2, 1, |i, _| if i == 0 { 1.0 } else { 3.0 });
        let (model, report) = fit_gee_independence(
            &x,
            &y,
            &unit_weights(2),
            &[10, 20],
            Family::Gaussian,
            Link::Identity,
            FitOptions::default(),
        )
        .expect("fit");
        assert_relative_eq!(model.beta[(0, 0)], 2.0, epsilon = 1e-10);
        assert_relative_eq!(report.covariance[(0, 0)], 0.5, epsilon = 1e-10);
        assert_relative_eq!(report.se[(0, 0)], 0.5f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn binomial_logit_matches_logistic_module() {
        let n = 30;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) / 10.0 });
        let y = Mat::from_fn(n, 1, |i, _| if i % 3 == 0 || i > 20 { 1.0 } else { 0.0 });
        let (gee, _) = fit_gee_independence(
            &x,
            &y,
            &unit_weights(n),
            &singleton_clusters(n),
            Family::Binomial,
            Link::Logit,
            FitOptions::default(),
        )
        .expect("gee fit");
        let (logit, _) =
            crate::models::logistic::fit_logistic(&x, &y, FitOptions::default()).expect("logit");
        assert_relative_eq!(gee.beta[(0, 0)], logit.beta[(0, 0)], epsilon = 1e-6);
        assert_relative_eq!(gee.beta[(1, 0)], logit.beta[(1, 0)], epsilon = 1e-6);
    }

    #[test]
    fn poisson_log_recovers_exact_log_linear_data() {
        let n = 12;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) / 6.0 });
        let y = Mat::from_fn(n, 1, |i, _| {
            0.3f64.mul_add(idx_to_f64(i) / 6.0, 0.5).exp()
        });
        let (model, _) = fit_gee_independence(
            &x,
            &y,
            &unit_weights(n),
            &singleton_clusters(n),
            Family::Poisson,
            Link::Log,
            FitOptions::default(),
        )
        .expect("fit");
        assert_relative_eq!(model.beta[(0, 0)], 0.5, epsilon = 1e-6);
        assert_relative_eq!(model.beta[(1, 0)], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn shared_cluster_labels_reduce_cluster_count() {
        let n = 6;
        let x = Mat::from_fn(n, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(n, 1, |i, _| idx_to_f64(i));
        let clusters = vec![1, 1, 2, 2, 3, 3];
        let (_, report) = fit_gee_independence(
            &x,
            &y,
            &unit_weights(n),
            &clusters,
            Family::Gaussian,
            Link::Identity,
            FitOptions::default(),
        )
        .expect("fit");
        assert_eq!(report.cluster_count, 3);
    }

    #[test]
    fn rejects_unsupported_family_link_pair() {
        let x = Mat::from_fn(2, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(2, 1, |_i, _| 1.0);
        let err = fit_gee_independence(
            &x,
            &y,
            &unit_weights(2),
            &[1, 2],
            Family::Gaussian,
            Link::Logit,
            FitOptions::default(),
        )
        .expect_err("gaussian-logit should be rejected");
        assert_eq!(
            err,
            OutcomeError::UnsupportedLink {
                family: Family::Gaussian,
                link: Link::Logit,
            }
        );
    }

    #[test]
    fn rejects_non_positive_weights() {
        let x = Mat::from_fn(2, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(2, 1, |_i, _| 1.0);
        let w = Mat::from_fn(2, 1, |i, _| if i == 0 { 1.0 } else { 0.0 });
        let err = fit_gee_independence(
            &x,
            &y,
            &w,
            &[1, 2],
            Family::Gaussian,
            Link::Identity,
            FitOptions::default(),
        )
        .expect_err("zero weight should fail");
        assert_eq!(err, OutcomeError::NonPositiveWeights);
    }

    #[test]
    fn rejects_outcome_outside_binomial_domain() {
        let x = Mat::from_fn(2, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(2, 1, |i, _| if i == 0 { 0.0 } else { 2.0 });
        let err = fit_gee_independence(
            &x,
            &y,
            &unit_weights(2),
            &[1, 2],
            Family::Binomial,
            Link::Logit,
            FitOptions::default(),
        )
        .expect_err("outcome above 1 should fail for binomial");
        assert_eq!(
            err,
            OutcomeError::OutcomeOutsideDomain {
                family: Family::Binomial,
                row: 1,
            }
        );
    }

    #[test]
    fn rejects_cluster_length_mismatch() {
        let x = Mat::from_fn(3, 1, |_i, _j| 1.0);
        let y = Mat::from_fn(3, 1, |_i, _| 1.0);
        let err = fit_gee_independence(
            &x,
            &y,
            &unit_weights(3),
            &[1, 2],
            Family::Gaussian,
            Link::Identity,
            FitOptions::default(),
        )
        .expect_err("cluster mismatch should fail");
        assert_eq!(err, OutcomeError::InvalidClusterLength { labels: 2, rows: 3 });
    }
}
