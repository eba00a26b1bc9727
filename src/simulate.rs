//! # Cohort simulation
//!
//! Seeded generator for the semi-synthetic cohorts the weighting estimators
//! are taught against: a continuous severity score and a binary comorbidity
//! flag confound both treatment assignment and a linear outcome, and an
//! optional censoring process depends on severity and treatment. Censored
//! rows carry a NaN outcome — the value is never observed.

use rand::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::input::Cohort;

/// Parameters of the generative process.
#[derive(Debug, Clone, Copy)]
pub struct SimulationOptions {
    /// Number of subjects.
    pub n: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// True additive treatment effect on the outcome.
    pub treatment_effect: f64,
    /// Scale of the confounder effects on the treatment log-odds.
    pub confounding_strength: f64,
    /// Scale of the confounder effects on the outcome mean.
    pub outcome_confounding: f64,
    /// Scale of the censoring dependence on severity and treatment;
    /// 0 disables censoring entirely.
    pub censoring_strength: f64,
    /// Standard deviation of the outcome noise.
    pub outcome_noise: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            n: 5_000,
            seed: 42,
            treatment_effect: 1.0,
            confounding_strength: 0.8,
            outcome_confounding: 1.2,
            censoring_strength: 0.5,
            outcome_noise: 1.0,
        }
    }
}

/// Generate a cohort with columns `severity`, `comorbidity`, `treated`,
/// `uncensored`, and `outcome` (NaN where censored).
#[must_use]
pub fn simulate_cohort(options: &SimulationOptions) -> Cohort {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let n = options.n;

    let mut severity = Vec::with_capacity(n);
    let mut comorbidity = Vec::with_capacity(n);
    let mut treated = Vec::with_capacity(n);
    let mut uncensored = Vec::with_capacity(n);
    let mut outcome = Vec::with_capacity(n);

    for _ in 0..n {
        let severity_i = standard_normal_draw(&mut rng);
        let comorbidity_i = if rng.random_range(0.0..1.0) < 0.3 {
            1.0
        } else {
            0.0
        };

        let treatment_logit = options.confounding_strength.mul_add(
            0.6f64.mul_add(comorbidity_i, severity_i),
            -0.4,
        );
        let treated_i = if rng.random_range(0.0..1.0) < expit(treatment_logit) {
            1.0
        } else {
            0.0
        };

        let outcome_mean = options.treatment_effect.mul_add(
            treated_i,
            options
                .outcome_confounding
                .mul_add(0.8f64.mul_add(comorbidity_i, severity_i), 2.0),
        );
        let outcome_i = options
            .outcome_noise
            .mul_add(standard_normal_draw(&mut rng), outcome_mean);

        let uncensored_i = if options.censoring_strength > 0.0 {
            let censoring_logit = options
                .censoring_strength
                .mul_add(-0.5f64.mul_add(treated_i, 0.8 * severity_i), 2.2);
            if rng.random_range(0.0..1.0) < expit(censoring_logit) {
                1.0
            } else {
                0.0
            }
        } else {
            1.0
        };

        severity.push(severity_i);
        comorbidity.push(comorbidity_i);
        treated.push(treated_i);
        uncensored.push(uncensored_i);
        outcome.push(if uncensored_i == 1.0 {
            outcome_i
        } else {
            f64::NAN
        });
    }

    let subject_ids = (0..n).map(|i| u64::try_from(i).unwrap_or(u64::MAX)).collect();
    Cohort::new(subject_ids)
        .with_column("severity", severity)
        .with_column("comorbidity", comorbidity)
        .with_column("treated", treated)
        .with_column("uncensored", uncensored)
        .with_column("outcome", outcome)
}

fn expit(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

fn standard_normal_draw(rng: &mut StdRng) -> f64 {
    let uniform = rng.random_range(f64::EPSILON..1.0);
    Normal::new(0.0, 1.0).map_or(0.0, |normal| normal.inverse_cdf(uniform))
}
