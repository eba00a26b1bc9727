//! # Cohort inputs
//!
//! Defines the column-oriented cohort container consumed by the weighting
//! estimators, plus the structured model specification resolved against the
//! cohort schema at call time.
//!
//! # Examples
//!
//! ```
//! use propensity_models::Cohort;
//!
//! let cohort = Cohort::new(vec![1, 2, 3])
//!     .with_column("treated", vec![1.0, 0.0, 1.0])
//!     .with_column("age", vec![61.0, 58.0, 64.0]);
//!
//! assert!(cohort.validate().is_ok());
//! assert_eq!(cohort.n_rows(), 3);
//! ```
//!
//! ```
//! use propensity_models::{Cohort, ModelSpec};
//!
//! let cohort = Cohort::new(vec![1, 2]).with_column("age", vec![61.0, 58.0]);
//! let spec = ModelSpec::with_covariates(["age", "sex"]);
//!
//! assert!(spec.design_matrix(&cohort).is_err());
//! ```

use faer::Mat;
use thiserror::Error;

/// Errors returned when validating cohorts or resolving model specifications.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CohortError {
    #[error("cohort must contain at least one row")]
    EmptyCohort,
    #[error("column {column} has {len} values but the cohort has {rows} rows")]
    ColumnLengthMismatch {
        column: String,
        len: usize,
        rows: usize,
    },
    #[error("column {column} is defined more than once")]
    DuplicateColumn { column: String },
    #[error("column {column} is missing from the cohort")]
    MissingColumn { column: String },
    #[error("model specification resolves to an empty design matrix")]
    EmptyDesign,
    #[error("covariate {column} contains a non-finite value at row {row}")]
    NonFiniteCovariate { column: String, row: usize },
    #[error("indicator column {column} must contain only 0 or 1 (row {row})")]
    NonBinaryIndicator { column: String, row: usize },
    #[error("outcome column {column} contains a non-finite value at uncensored row {row}")]
    NonFiniteOutcome { column: String, row: usize },
    #[error("subject id {id} appears more than once")]
    DuplicateSubjectId { id: u64 },
    #[error("weights length ({len}) must match cohort rows ({rows})")]
    WeightLengthMismatch { len: usize, rows: usize },
}

/// Immutable cohort extract: one subject id per row plus named numeric columns.
///
/// Columns may contain NaN where a value is genuinely undefined (an outcome on
/// a censored row); finiteness is enforced where a value is consumed, not at
/// construction.
#[derive(Debug, Clone)]
pub struct Cohort {
    subject_ids: Vec<u64>,
    columns: Vec<(String, Vec<f64>)>,
}

impl Cohort {
    #[must_use]
    pub const fn new(subject_ids: Vec<u64>) -> Self {
        Self {
            subject_ids,
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.push((name.into(), values));
        self
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.subject_ids.len()
    }

    #[must_use]
    pub fn subject_ids(&self) -> &[u64] {
        &self.subject_ids
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(column, _)| column == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(column, _)| column.as_str())
    }

    /// Look up a column by name.
    ///
    /// # Errors
    ///
    /// Returns `CohortError::MissingColumn` if no column carries `name`.
    pub fn column(&self, name: &str) -> Result<&[f64], CohortError> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
            .ok_or_else(|| CohortError::MissingColumn {
                column: name.to_owned(),
            })
    }

    /// Look up an indicator column and check every value is exactly 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns `CohortError::MissingColumn` or `CohortError::NonBinaryIndicator`.
    pub fn binary_column(&self, name: &str) -> Result<&[f64], CohortError> {
        let values = self.column(name)?;
        for (row, value) in values.iter().enumerate() {
            if *value != 0.0 && *value != 1.0 {
                return Err(CohortError::NonBinaryIndicator {
                    column: name.to_owned(),
                    row,
                });
            }
        }
        Ok(values)
    }

    /// Validate row counts and column-name uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `CohortError` if the cohort is empty, a column length differs
    /// from the subject-id count, or a column name repeats.
    pub fn validate(&self) -> Result<(), CohortError> {
        let rows = self.n_rows();
        if rows == 0 {
            return Err(CohortError::EmptyCohort);
        }
        for (index, (name, values)) in self.columns.iter().enumerate() {
            if values.len() != rows {
                return Err(CohortError::ColumnLengthMismatch {
                    column: name.clone(),
                    len: values.len(),
                    rows,
                });
            }
            if self.columns[..index].iter().any(|(other, _)| other == name) {
                return Err(CohortError::DuplicateColumn {
                    column: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check the subject-id column contains no duplicates.
    ///
    /// Robust variance with one cluster per subject relies on this.
    ///
    /// # Errors
    ///
    /// Returns `CohortError::DuplicateSubjectId` naming the first repeated id.
    pub fn ensure_unique_subject_ids(&self) -> Result<(), CohortError> {
        let mut seen = std::collections::HashSet::with_capacity(self.subject_ids.len());
        for id in &self.subject_ids {
            if !seen.insert(*id) {
                return Err(CohortError::DuplicateSubjectId { id: *id });
            }
        }
        Ok(())
    }
}

/// Structured model specification: covariate names plus an intercept flag.
///
/// Replaces the symbolic formula of the analysis scripts this crate grew out
/// of; resolution against the cohort schema happens at call time and fails
/// fast when a covariate is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    covariates: Vec<String>,
    intercept: bool,
}

impl ModelSpec {
    /// Intercept-only specification, modelling complete randomization.
    #[must_use]
    pub const fn intercept_only() -> Self {
        Self {
            covariates: Vec::new(),
            intercept: true,
        }
    }

    /// Specification with the named covariates and an intercept.
    #[must_use]
    pub fn with_covariates<I, S>(covariates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            covariates: covariates.into_iter().map(Into::into).collect(),
            intercept: true,
        }
    }

    #[must_use]
    pub fn without_intercept(mut self) -> Self {
        self.intercept = false;
        self
    }

    #[must_use]
    pub fn covariates(&self) -> &[String] {
        &self.covariates
    }

    #[must_use]
    pub const fn has_intercept(&self) -> bool {
        self.intercept
    }

    /// Number of design-matrix columns this specification produces.
    #[must_use]
    pub fn term_count(&self) -> usize {
        self.covariates.len() + usize::from(self.intercept)
    }

    /// Resolve the specification into a design matrix over the cohort.
    ///
    /// # Errors
    ///
    /// Returns `CohortError::EmptyDesign` for a spec with no terms,
    /// `CohortError::MissingColumn` for an unresolved covariate, and
    /// `CohortError::NonFiniteCovariate` if a referenced value is NaN or
    /// infinite.
    pub fn design_matrix(&self, cohort: &Cohort) -> Result<Mat<f64>, CohortError> {
        if self.term_count() == 0 {
            return Err(CohortError::EmptyDesign);
        }
        let mut resolved = Vec::with_capacity(self.covariates.len());
        for name in &self.covariates {
            let values = cohort.column(name)?;
            for (row, value) in values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(CohortError::NonFiniteCovariate {
                        column: name.clone(),
                        row,
                    });
                }
            }
            resolved.push(values);
        }

        let offset = usize::from(self.intercept);
        Ok(Mat::from_fn(cohort.n_rows(), self.term_count(), |i, j| {
            if self.intercept && j == 0 {
                1.0
            } else {
                resolved[j - offset][i]
            }
        }))
    }
}
