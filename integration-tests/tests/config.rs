use approx::assert_relative_eq;
use integration_tests::mechanics::oscillator;
use serde::Deserialize;
use strata_core::Stage;
use strata_solvers::transient::merson::{Config, MersonIntegrator, Norm, Phase, StepOutcome};

/// A run description as a user would write it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Scenario {
    end_time: f64,
    stiffness: f64,
    integrator: Config,
}

const SCENARIO: &str = r#"
end_time = 2.0
stiffness = 4.0

[integrator]
rel_tol = 1e-8
abs_tol = 1e-10
norm = "rms"
final_time = 1.5
return_stage = "Report"
"#;

#[test]
fn loads_integrator_config_from_toml() {
    let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
    let config = scenario.integrator;

    assert_eq!(config.rel_tol, 1e-8);
    assert_eq!(config.norm, Norm::Rms);
    assert_eq!(config.final_time, Some(1.5));
    assert_eq!(config.return_stage, Stage::Report);
    assert_eq!(config.safety, Config::default().safety);
    assert_eq!(config.initial_step, None);
    assert!(config.validate().is_ok());

    let (system, _) = oscillator(1.0, scenario.stiffness, 0.0, 1.0);
    let mut integrator = MersonIntegrator::new(&system, config).unwrap();
    integrator.initialize(system.default_state().unwrap()).unwrap();

    let outcome = integrator.step_to(scenario.end_time).unwrap();

    assert_eq!(outcome, StepOutcome::TimeLimitReached);
    assert_eq!(integrator.phase(), Phase::Completed);
    let state = integrator.advanced_state().unwrap();
    assert_eq!(state.time(), 1.5);
    assert_relative_eq!(state.q()[0], (3.0_f64).cos(), epsilon = 1e-6);
}

#[test]
fn empty_table_uses_defaults() {
    let scenario: Scenario =
        toml::from_str("end_time = 1.0\nstiffness = 1.0\n[integrator]\n").unwrap();
    assert_eq!(scenario.integrator, Config::default());
}

#[test]
fn rejects_unknown_settings() {
    let text = "end_time = 1.0\nstiffness = 1.0\n[integrator]\nrtol = 1e-6\n";
    let err = toml::from_str::<Scenario>(text).unwrap_err();
    assert!(err.to_string().contains("rtol"), "{err}");
}

#[test]
fn invalid_values_fail_validation() {
    let text = "end_time = 1.0\nstiffness = 1.0\n[integrator]\nmin_shrink = 2.0\n";
    let scenario: Scenario = toml::from_str(text).unwrap();

    let (system, _) = oscillator(1.0, scenario.stiffness, 0.0, 1.0);
    let err = MersonIntegrator::new(&system, scenario.integrator).unwrap_err();
    assert!(err.to_string().contains("min_shrink"), "{err}");
}

#[test]
fn config_round_trips_through_json() {
    let config = Config {
        max_step: 0.25,
        initial_step: Some(0.01),
        norm: Norm::Rms,
        ..Config::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains(r#""norm":"rms""#), "{json}");
    assert!(json.contains(r#""return_stage":"Acceleration""#), "{json}");

    let back: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
