use approx::assert_relative_eq;
use integration_tests::mechanics::{MASS, oscillator};
use strata_core::{RealizeContext, RealizeResult, Stage, State};
use strata_observers::{StepLogger, StepRecorder};
use strata_solvers::transient::merson::{
    Config, Direction, Event, EventTrigger, MersonIntegrator, StepOutcome,
};

fn report_config() -> Config {
    Config {
        rel_tol: 1e-9,
        abs_tol: 1e-12,
        return_stage: Stage::Report,
        ..Config::default()
    }
}

#[test]
fn undamped_motion_follows_cosine_and_conserves_energy() {
    // omega = sqrt(8 / 2) = 2
    let (system, handles) = oscillator(2.0, 8.0, 0.0, 1.0);
    let mut integrator = MersonIntegrator::new(&system, report_config()).unwrap();
    integrator.initialize(system.default_state().unwrap()).unwrap();

    let outcome = integrator.step_to_observed(3.0, StepLogger).unwrap();
    assert_eq!(outcome, StepOutcome::Reached);

    let state = integrator.advanced_state().unwrap();
    assert_relative_eq!(state.q()[0], (6.0_f64).cos(), epsilon = 1e-7);
    assert_relative_eq!(state.u()[0], -2.0 * (6.0_f64).sin(), epsilon = 1e-7);
    assert_relative_eq!(handles.energy(state).unwrap(), 4.0, max_relative = 1e-7);
}

#[test]
fn damping_dissipates_energy_every_step() {
    let (system, handles) = oscillator(1.0, 4.0, 0.5, 1.0);
    let mut integrator = MersonIntegrator::new(&system, report_config()).unwrap();
    integrator.initialize(system.default_state().unwrap()).unwrap();

    let mut energies = Vec::new();
    integrator
        .step_to_observed(5.0, |event: &Event<'_>| {
            if let Event::Accepted { state, .. } = event {
                energies.push(handles.energy(state).unwrap());
            }
            None
        })
        .unwrap();

    assert!(energies.len() > 10);
    for pair in energies.windows(2) {
        assert!(pair[1] < pair[0], "energy grew from {} to {}", pair[0], pair[1]);
    }
}

#[test]
fn generator_forces_shift_the_equilibrium() {
    let (mut system, handles) = oscillator(1.0, 4.0, 4.0, 0.0);
    system
        .register_stage_generator(
            handles.mass,
            Stage::Dynamics,
            |ctx: &mut RealizeContext<'_>| -> RealizeResult {
                ctx.contribute(2.0_f64);
                Ok(())
            },
        )
        .unwrap();
    assert!(!system.is_topology_realized());
    let state = system.realize_topology().unwrap();

    let mut integrator = MersonIntegrator::new(&system, Config::default()).unwrap();
    integrator.initialize(state).unwrap();
    integrator.step_to(20.0).unwrap();

    // Critically damped, settling at F / k.
    let state = integrator.advanced_state().unwrap();
    assert_relative_eq!(state.q()[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(state.u()[0], 0.0, epsilon = 1e-6);
    assert_eq!(
        state
            .contributions::<f64>(handles.mass, Stage::Dynamics)
            .len(),
        1
    );
}

#[test]
fn stops_at_turning_point() {
    let (system, _) = oscillator(2.0, 8.0, 0.0, 1.0);
    let mut integrator = MersonIntegrator::new(&system, report_config()).unwrap();
    integrator
        .add_trigger(EventTrigger::new(
            "turning_point",
            Direction::Rising,
            Stage::Velocity,
            |state: &State| state.u()[0],
        ))
        .unwrap();
    integrator.initialize(system.default_state().unwrap()).unwrap();

    let mut recorder = StepRecorder::new();
    let outcome = integrator.step_to_observed(3.0, &mut recorder).unwrap();

    let StepOutcome::EventTriggered { time, triggers } = outcome else {
        panic!("expected the turning point, got {outcome:?}");
    };
    assert_relative_eq!(time, std::f64::consts::FRAC_PI_2, epsilon = 1e-7);
    assert_eq!(triggers, ["turning_point"]);

    let state = integrator.advanced_state().unwrap();
    assert_relative_eq!(state.q()[0], -1.0, epsilon = 1e-7);
    assert!(state.is_realized(Stage::Report));
    assert!(recorder.accepted() > 0);

    assert_eq!(integrator.step_to(3.0).unwrap(), StepOutcome::Reached);
}

#[test]
fn heavier_mass_slows_the_motion() {
    let (system, handles) = oscillator(1.0, 4.0, 0.0, 1.0);
    let mut state = system.default_state().unwrap();
    state.set_discrete(handles.mass, MASS, 4.0).unwrap();
    assert!(state.valid_through() < Stage::Instance);

    let mut integrator = MersonIntegrator::new(&system, report_config()).unwrap();
    integrator.initialize(state).unwrap();
    integrator.step_to(1.0).unwrap();

    // omega = sqrt(4 / 4) = 1
    let state = integrator.advanced_state().unwrap();
    assert_relative_eq!(state.q()[0], (1.0_f64).cos(), epsilon = 1e-7);
}
