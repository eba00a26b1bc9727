use approx::assert_relative_eq;
use propensity_models::{
    Cohort, FitOptions, ModelSpec, SimulationOptions, TreatmentWeighting, compute_weights,
    covariate_balance, effective_sample_size, simulate_cohort,
};

#[test]
fn intercept_only_models_on_a_balanced_cohort_give_constant_weights() {
    // Hand-computed reference: 2 treated of 4 gives propensity 0.5 and an
    // inverse-probability weight of exactly 2 in both arms.
    let cohort = Cohort::new(vec![1, 2, 3, 4])
        .with_column("treated", vec![1.0, 1.0, 0.0, 0.0])
        .with_column("uncensored", vec![1.0, 1.0, 1.0, 1.0]);

    let fit = compute_weights(
        &cohort,
        &ModelSpec::intercept_only(),
        &ModelSpec::intercept_only(),
        "treated",
        "uncensored",
        TreatmentWeighting::InverseProbability,
        FitOptions::default(),
    )
    .expect("weights");

    for row in 0..4 {
        assert_relative_eq!(fit.weights.propensity()[row], 0.5, epsilon = 1e-6);
        assert_relative_eq!(fit.weights.iptw()[row], 2.0, epsilon = 1e-6);
        assert_relative_eq!(fit.weights.combined()[row], 2.0, epsilon = 1e-6);
    }
}

#[test]
fn weighting_balances_covariates_on_a_large_cohort() {
    let cohort = simulate_cohort(&SimulationOptions {
        n: 100_000,
        seed: 2_026,
        censoring_strength: 0.0,
        ..SimulationOptions::default()
    });

    let covariates = ["severity", "comorbidity"];
    let before =
        covariate_balance(&cohort, &covariates, "treated", None).expect("balance before");
    // The generative process confounds: imbalance must be visible before
    // weighting.
    assert!(before[0].standardized_difference.abs() > 0.1);

    let fit = compute_weights(
        &cohort,
        &ModelSpec::with_covariates(covariates),
        &ModelSpec::intercept_only(),
        "treated",
        "uncensored",
        TreatmentWeighting::InverseProbability,
        FitOptions::default(),
    )
    .expect("weights");

    let after = covariate_balance(
        &cohort,
        &covariates,
        "treated",
        Some(fit.weights.combined()),
    )
    .expect("balance after");
    for row in &after {
        assert!(
            row.standardized_difference.abs() < 0.1,
            "covariate {} not balanced: smd {}",
            row.covariate,
            row.standardized_difference
        );
    }
}

#[test]
fn treated_weights_standardize_to_the_cohort_size() {
    let cohort = simulate_cohort(&SimulationOptions {
        n: 100_000,
        seed: 2_026,
        censoring_strength: 0.0,
        ..SimulationOptions::default()
    });

    let fit = compute_weights(
        &cohort,
        &ModelSpec::with_covariates(["severity", "comorbidity"]),
        &ModelSpec::intercept_only(),
        "treated",
        "uncensored",
        TreatmentWeighting::InverseProbability,
        FitOptions::default(),
    )
    .expect("weights");

    let treated = cohort.column("treated").expect("treated");
    let weight_sum: f64 = (0..cohort.n_rows())
        .filter(|&row| treated[row] == 1.0)
        .map(|row| fit.weights.iptw()[row])
        .sum();

    // Sum of 1 / propensity over the treated approximates n.
    let n = 100_000.0;
    assert!((weight_sum - n).abs() / n < 0.05);
}

#[test]
fn effective_sample_size_shrinks_under_weighting() {
    let cohort = simulate_cohort(&SimulationOptions {
        n: 20_000,
        seed: 5,
        censoring_strength: 0.0,
        ..SimulationOptions::default()
    });

    let fit = compute_weights(
        &cohort,
        &ModelSpec::with_covariates(["severity", "comorbidity"]),
        &ModelSpec::intercept_only(),
        "treated",
        "uncensored",
        TreatmentWeighting::InverseProbability,
        FitOptions::default(),
    )
    .expect("weights");

    let ess = effective_sample_size(fit.weights.combined());
    assert!(ess > 0.0);
    assert!(ess < 20_000.0);
}

#[test]
fn smrw_leaves_the_treated_arm_unweighted() {
    let cohort = simulate_cohort(&SimulationOptions {
        n: 5_000,
        seed: 31,
        censoring_strength: 0.0,
        ..SimulationOptions::default()
    });

    let fit = compute_weights(
        &cohort,
        &ModelSpec::with_covariates(["severity", "comorbidity"]),
        &ModelSpec::intercept_only(),
        "treated",
        "uncensored",
        TreatmentWeighting::StandardizedMortalityRatio,
        FitOptions::default(),
    )
    .expect("weights");

    let treated = cohort.column("treated").expect("treated");
    for row in 0..cohort.n_rows() {
        if treated[row] == 1.0 {
            assert_relative_eq!(fit.weights.smrw()[row], 1.0);
            assert_relative_eq!(fit.weights.combined()[row], 1.0);
        } else {
            let p = fit.weights.propensity()[row];
            assert_relative_eq!(
                fit.weights.smrw()[row],
                p / (1.0 - p),
                epsilon = 1e-12
            );
        }
    }
}

#[test]
fn ipcw_reweights_the_uncensored_toward_the_full_cohort() {
    let cohort = simulate_cohort(&SimulationOptions {
        n: 50_000,
        seed: 13,
        censoring_strength: 1.0,
        ..SimulationOptions::default()
    });

    let fit = compute_weights(
        &cohort,
        &ModelSpec::with_covariates(["severity", "comorbidity"]),
        &ModelSpec::with_covariates(["severity", "treated"]),
        "treated",
        "uncensored",
        TreatmentWeighting::InverseProbability,
        FitOptions::default(),
    )
    .expect("weights");

    // Sum of 1 / P(uncensored) over uncensored rows approximates n.
    let uncensored = cohort.column("uncensored").expect("uncensored");
    let ipcw_sum: f64 = (0..cohort.n_rows())
        .filter(|&row| uncensored[row] == 1.0)
        .map(|row| fit.weights.ipcw()[row])
        .sum();
    let n = 50_000.0;
    assert!((ipcw_sum - n).abs() / n < 0.05);
}
