use propensity_models::{
    EstimatorSpec, FitOptions, ModelSpec, SimulationOptions, covariate_balance,
    effective_sample_size, estimate_weighted_outcome, simulate_cohort,
};

fn main() {
    env_logger::init();

    let options = SimulationOptions {
        n: 10_000,
        ..SimulationOptions::default()
    };
    let cohort = simulate_cohort(&options);
    let covariates = ["severity", "comorbidity"];

    let before = covariate_balance(&cohort, &covariates, "treated", None).expect("balance");
    println!("covariate balance before weighting:");
    for row in &before {
        println!(
            "  {:<12} treated {:+.3}  untreated {:+.3}  smd {:+.3}",
            row.covariate, row.mean_treated, row.mean_untreated, row.standardized_difference
        );
    }

    let spec = EstimatorSpec::new("treated", "uncensored", "outcome")
        .with_treatment_model(ModelSpec::with_covariates(covariates))
        .with_censoring_model(ModelSpec::with_covariates(["severity", "treated"]));
    let estimate =
        estimate_weighted_outcome(&cohort, &spec, FitOptions::default()).expect("estimate");

    let after = covariate_balance(
        &cohort,
        &covariates,
        "treated",
        Some(estimate.weights.combined()),
    )
    .expect("balance");
    println!("covariate balance after weighting:");
    for row in &after {
        println!(
            "  {:<12} treated {:+.3}  untreated {:+.3}  smd {:+.3}",
            row.covariate, row.mean_treated, row.mean_untreated, row.standardized_difference
        );
    }

    let interval = estimate.treatment_confidence_interval(0.05);
    println!(
        "treatment effect: {:.3} (robust SE {:.3}, 95% CI {:.3} to {:.3})",
        estimate.treatment_coefficient(),
        estimate.treatment_standard_error(),
        interval.lower,
        interval.upper
    );
    println!(
        "rows used: {} of {}, effective sample size {:.1}",
        estimate.n_rows_used,
        cohort.n_rows(),
        effective_sample_size(estimate.weights.combined())
    );
}
