/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra utilities for weighted model fitting.
//
// Created on: 12 Mar 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared helpers for solving linear systems, accumulating weighted
//! cross-products, and working with faer matrices.

use faer::Mat;
use faer::prelude::Solve;
use thiserror::Error;

/// Error returned when a linear solve produces a non-finite solution.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("linear solve failed")]
pub struct SolveError;

/// # Errors
///
/// Returns `SolveError` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, SolveError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(SolveError);
    }
    Ok(solution)
}

#[must_use]
pub fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut max = 0.0;
    for i in 0..a.nrows() {
        let diff = (a[(i, 0)] - b[(i, 0)]).abs();
        if diff > max {
            max = diff;
        }
    }
    max
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

#[must_use]
pub fn mean_column(vector: &Mat<f64>) -> f64 {
    let mut sum = 0.0;
    for i in 0..vector.nrows() {
        sum += vector[(i, 0)];
    }
    sum / f64::from(u32::try_from(vector.nrows()).unwrap_or(u32::MAX))
}

#[must_use]
pub fn select_rows(matrix: &Mat<f64>, indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(indices.len(), matrix.ncols(), |i, j| matrix[(indices[i], j)])
}

#[must_use]
pub fn select_values(vector: &Mat<f64>, indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(indices.len(), 1, |i, _| vector[(indices[i], 0)])
}

#[must_use]
pub fn select_ids(ids: &[u64], indices: &[usize]) -> Vec<u64> {
    indices.iter().map(|idx| ids[*idx]).collect()
}

#[must_use]
pub fn map_mat(values: &Mat<f64>, f: impl Fn(f64) -> f64) -> Mat<f64> {
    Mat::from_fn(values.nrows(), values.ncols(), |i, j| f(values[(i, j)]))
}

/// Accumulate `X' W X` for a diagonal weight vector.
#[must_use]
pub fn weighted_xtx(x: &Mat<f64>, weights: &Mat<f64>) -> Mat<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let mut xtx = Mat::<f64>::zeros(p, p);
    for i in 0..n {
        let w = weights[(i, 0)];
        for col_i in 0..p {
            let wxi = w * x[(i, col_i)];
            for col_j in 0..p {
                xtx[(col_i, col_j)] += wxi * x[(i, col_j)];
            }
        }
    }
    xtx
}

/// Accumulate `X' W z` for a diagonal weight vector.
#[must_use]
pub fn weighted_xtz(x: &Mat<f64>, weights: &Mat<f64>, z: &Mat<f64>) -> Mat<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let mut xtz = Mat::<f64>::zeros(p, 1);
    for i in 0..n {
        let wz = weights[(i, 0)] * z[(i, 0)];
        for col in 0..p {
            xtz[(col, 0)] += x[(i, col)] * wz;
        }
    }
    xtz
}

#[must_use]
pub fn diag_sqrt(covariance: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(covariance.nrows(), 1, |i, _| {
        covariance[(i, i)].max(0.0).sqrt()
    })
}

/// Invert an information matrix to obtain a model-based covariance.
///
/// # Errors
///
/// Returns `SolveError` if the information matrix is singular.
pub fn covariance_from_information(information: &Mat<f64>) -> Result<Mat<f64>, SolveError> {
    let identity = Mat::<f64>::identity(information.nrows(), information.ncols());
    solve_linear_system(information, &identity)
}

/// Compute `B^-1 M B^-T` for a bread matrix `B` and meat matrix `M`.
///
/// # Errors
///
/// Returns `SolveError` if the bread matrix is singular.
pub fn sandwich_covariance(bread: &Mat<f64>, meat: &Mat<f64>) -> Result<Mat<f64>, SolveError> {
    let left = solve_linear_system(bread, meat)?;
    let bread_t = transpose_owned(bread);
    let left_t = transpose_owned(&left);
    let cov_t = solve_linear_system(&bread_t, &left_t)?;
    Ok(transpose_owned(&cov_t))
}

fn transpose_owned(matrix: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(matrix.ncols(), matrix.nrows(), |i, j| matrix[(j, i)])
}
