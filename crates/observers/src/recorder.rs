use strata_core::Observer;

use crate::traits::{CanStopEarly, HasAcceptance, HasErrorNorm, HasStepSize, HasTime};

/// One recorded step attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    /// Time reported with the attempt.
    ///
    /// The start of a rejected attempt, or where the solver stands after an
    /// accepted one.
    pub time: f64,
    pub step: f64,
    pub error: f64,
    pub accepted: bool,
}

/// Records every step attempt in memory.
///
/// Pass `&mut recorder` as the observer to keep the records after the solver
/// returns. With [`stop_after`](Self::stop_after), the recorder also stops
/// the solver once that many steps have been accepted.
#[derive(Debug, Clone, Default)]
pub struct StepRecorder {
    records: Vec<StepRecord>,
    accepted: usize,
    stop_after: Option<usize>,
}

impl StepRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder that stops the solver after `accepted` steps.
    #[must_use]
    pub fn stop_after(accepted: usize) -> Self {
        Self {
            stop_after: Some(accepted),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Number of accepted attempts recorded.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Number of rejected attempts recorded.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.records.len() - self.accepted
    }

    /// Forgets every record. The stop limit is kept.
    pub fn clear(&mut self) {
        self.records.clear();
        self.accepted = 0;
    }
}

impl<E, A> Observer<E, A> for &mut StepRecorder
where
    E: HasTime + HasStepSize + HasErrorNorm + HasAcceptance,
    A: CanStopEarly,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        let (Some(step), Some(error), Some(accepted)) =
            (event.step_size(), event.error_norm(), event.accepted())
        else {
            return None;
        };

        self.records.push(StepRecord {
            time: event.time(),
            step,
            error,
            accepted,
        });
        if !accepted {
            return None;
        }

        self.accepted += 1;
        match self.stop_after {
            Some(limit) if self.accepted >= limit => Some(A::stop_early()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{any::Any, f64::consts::FRAC_PI_2};

    use approx::assert_relative_eq;
    use strata_core::{
        Allocation, LayoutError, RealizeContext, RealizeResult, Stage, State, Subsystem, System,
    };
    use strata_solvers::transient::merson::{
        Action, Config, Direction, EventTrigger, MersonIntegrator, StepOutcome,
    };

    // --- Test fixtures ---

    /// `x'' = -x` starting at rest from `x = 1`.
    #[derive(Debug, Clone)]
    struct Pendulum;

    impl Subsystem for Pendulum {
        fn name(&self) -> &str {
            "pendulum"
        }

        fn allocate(&self, alloc: &mut Allocation) -> Result<(), LayoutError> {
            alloc.add_q(&[1.0])?;
            alloc.add_u(&[0.0])?;
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn Subsystem> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn realize_acceleration(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
            let x = ctx.q()?[0];
            let v = ctx.u()?[0];
            ctx.set_qdot(&[v])?;
            ctx.set_udot(&[-x])?;
            Ok(())
        }
    }

    /// A step attempt from a solver with its own acceptance rule.
    struct Attempt {
        error: f64,
        accepted: bool,
    }

    impl HasTime for Attempt {
        fn time(&self) -> f64 {
            0.0
        }
    }

    impl HasStepSize for Attempt {
        fn step_size(&self) -> Option<f64> {
            Some(0.1)
        }
    }

    impl HasErrorNorm for Attempt {
        fn error_norm(&self) -> Option<f64> {
            Some(self.error)
        }
    }

    impl HasAcceptance for Attempt {
        fn accepted(&self) -> Option<bool> {
            Some(self.accepted)
        }
    }

    fn pendulum() -> System {
        let mut system = System::new("pendulum");
        system.add_subsystem(Pendulum);
        system.realize_topology().unwrap();
        system
    }

    // --- Tests ---

    #[test]
    fn records_every_attempt() {
        let system = pendulum();
        let config = Config {
            initial_step: Some(1.0),
            ..Config::default()
        };
        let mut integrator = MersonIntegrator::new(&system, config).unwrap();
        integrator.initialize(system.default_state().unwrap()).unwrap();

        let mut recorder = StepRecorder::new();
        let outcome = integrator.step_to_observed(2.0, &mut recorder).unwrap();

        assert_eq!(outcome, StepOutcome::Reached);
        let stats = integrator.statistics();
        assert_eq!(recorder.records().len(), stats.attempts);
        assert_eq!(recorder.accepted(), stats.accepted);
        assert_eq!(recorder.rejected(), stats.rejected);
        assert!(recorder.rejected() > 0, "a unit first step should be rejected");

        let last = recorder.records().last().unwrap();
        assert!(last.accepted);
        assert_relative_eq!(last.time, 2.0);
    }

    #[test]
    fn stops_after_accepted_steps() {
        let system = pendulum();
        let config = Config {
            initial_step: Some(0.01),
            max_step: 0.01,
            ..Config::default()
        };
        let mut integrator = MersonIntegrator::new(&system, config).unwrap();
        integrator.initialize(system.default_state().unwrap()).unwrap();

        let mut recorder = StepRecorder::stop_after(5);
        let outcome = integrator.step_to_observed(1.0, &mut recorder).unwrap();

        assert_eq!(outcome, StepOutcome::StoppedByObserver);
        assert_eq!(recorder.accepted(), 5);
        assert_relative_eq!(integrator.time().unwrap(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn ignores_triggered_events() {
        let system = pendulum();
        let mut integrator = MersonIntegrator::new(&system, Config::default()).unwrap();
        integrator
            .add_trigger(EventTrigger::new(
                "crossing",
                Direction::Falling,
                Stage::Position,
                |state: &State| state.q()[0],
            ))
            .unwrap();
        integrator.initialize(system.default_state().unwrap()).unwrap();

        let mut recorder = StepRecorder::new();
        let outcome = integrator.step_to_observed(3.0, &mut recorder).unwrap();

        let StepOutcome::EventTriggered { time, .. } = outcome else {
            panic!("expected an event, got {outcome:?}");
        };
        assert_relative_eq!(time, FRAC_PI_2, epsilon = 1e-6);
        assert_eq!(recorder.records().len(), integrator.statistics().attempts);
        assert_relative_eq!(recorder.records().last().unwrap().time, time);
    }

    #[test]
    fn acceptance_comes_from_the_event() {
        let mut recorder = StepRecorder::stop_after(2);
        let mut observer = &mut recorder;
        let mut observe = |error: f64, accepted: bool| -> Option<Action> {
            observer.observe(&Attempt { error, accepted })
        };

        assert_eq!(observe(1.5, true), None);
        assert_eq!(observe(0.2, false), None);
        assert_eq!(observe(3.0, true), Some(Action::StopEarly));

        assert_eq!(recorder.records().len(), 3);
        assert_eq!(recorder.accepted(), 2);
        assert_eq!(recorder.rejected(), 1);
        assert!(!recorder.records()[1].accepted);

        recorder.clear();
        assert_eq!(recorder.accepted(), 0);
        assert!(recorder.records().is_empty());
    }
}
