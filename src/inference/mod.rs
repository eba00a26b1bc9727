//! Wald-type inference helpers for fitted weighted models.

use faer::Mat;
use statrs::distribution::{ContinuousCDF, Normal};

/// Confidence interval for a coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Standard-normal quantile; NaN if `p` is outside (0, 1).
#[must_use]
pub fn normal_quantile(p: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| normal.inverse_cdf(p))
}

/// Compute Wald confidence intervals from a covariance matrix.
#[must_use]
pub fn wald_confidence_intervals(
    beta: &Mat<f64>,
    covariance: &Mat<f64>,
    alpha: f64,
) -> Vec<ConfidenceInterval> {
    let z = normal_quantile(1.0 - alpha / 2.0);
    let mut intervals = Vec::with_capacity(beta.nrows());
    for i in 0..beta.nrows() {
        let se = covariance[(i, i)].max(0.0).sqrt();
        intervals.push(ConfidenceInterval {
            lower: z.mul_add(-se, beta[(i, 0)]),
            upper: z.mul_add(se, beta[(i, 0)]),
        });
    }
    intervals
}

/// Two-sided Wald p-values from a covariance matrix.
///
/// A coefficient with zero (or negative, after clamping) variance yields NaN.
#[must_use]
pub fn wald_p_values(beta: &Mat<f64>, covariance: &Mat<f64>) -> Vec<f64> {
    let mut p_values = Vec::with_capacity(beta.nrows());
    for i in 0..beta.nrows() {
        let se = covariance[(i, i)].max(0.0).sqrt();
        if se > 0.0 {
            let z = (beta[(i, 0)] / se).abs();
            let tail = Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| 1.0 - normal.cdf(z));
            p_values.push(2.0 * tail);
        } else {
            p_values.push(f64::NAN);
        }
    }
    p_values
}
