use approx::assert_relative_eq;
use integration_tests::mechanics::{MASS, oscillator};
use strata_core::{Checkpoint, Stage, StateError};
use strata_solvers::transient::merson::{Config, MersonIntegrator};

fn tight() -> Config {
    Config {
        rel_tol: 1e-10,
        abs_tol: 1e-12,
        ..Config::default()
    }
}

#[test]
fn resumes_from_a_json_checkpoint() {
    let (system, handles) = oscillator(1.0, 4.0, 0.2, 1.0);

    let mut reference = MersonIntegrator::new(&system, tight()).unwrap();
    reference
        .initialize(system.default_state().unwrap())
        .unwrap();
    reference.step_to(1.0).unwrap();

    let saved = reference.advanced_state().unwrap().checkpoint();
    let json = serde_json::to_string(&saved).unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["time"], 1.0);
    assert_eq!(value["discrete"][0], 1.0);
    assert_eq!(value["z"].as_array().map(Vec::len), Some(0));

    let loaded: Checkpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, saved);

    let mut state = system.default_state().unwrap();
    state.restore(&loaded).unwrap();
    assert_eq!(state.time(), 1.0);
    assert!(state.valid_through() < Stage::Model);
    assert_eq!(state.discrete(handles.mass, MASS).unwrap(), 1.0);

    let mut resumed = MersonIntegrator::new(&system, tight()).unwrap();
    resumed.initialize(state).unwrap();
    resumed.step_to(3.0).unwrap();
    reference.step_to(3.0).unwrap();

    let expected = reference.advanced_state().unwrap().y();
    let actual = resumed.advanced_state().unwrap().y();
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(a, e, epsilon = 1e-8);
    }
}

#[test]
fn checkpoint_excludes_cached_results() {
    let (system, _) = oscillator(1.0, 4.0, 0.0, 1.0);
    let state = system.default_state().unwrap();
    system.realize(&state, Stage::Report).unwrap();

    let checkpoint = state.checkpoint();
    let mut restored = system.default_state().unwrap();
    restored.restore(&checkpoint).unwrap();

    assert!(restored.derivatives().is_none());
    assert_eq!(
        system.derivatives(&restored).unwrap(),
        state.derivatives().unwrap()
    );
}

#[test]
fn rejects_checkpoint_from_another_layout() {
    let (system, _) = oscillator(1.0, 4.0, 0.0, 1.0);
    let mut state = system.default_state().unwrap();

    let mut checkpoint = state.checkpoint();
    checkpoint.q.push(0.0);
    checkpoint.time = 5.0;

    let err = state.restore(&checkpoint).unwrap_err();
    assert!(matches!(
        err,
        StateError::SizeMismatch {
            what: "q",
            expected: 1,
            actual: 2
        }
    ));
    assert_eq!(state.time(), 0.0);
    assert!(state.is_realized(Stage::Topology));
}
