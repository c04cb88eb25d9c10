use strata_core::Observer;
use strata_solvers::transient::merson::Event;

/// Reports every integrator step through `tracing`.
///
/// Accepted and rejected attempts are logged at `debug`, triggered events at
/// `info`. The logger never stops the integrator.
///
/// ```rust,no_run
/// # use strata_core::System;
/// # use strata_solvers::transient::merson::{Config, MersonIntegrator};
/// # fn run(system: &System) -> Result<(), Box<dyn std::error::Error>> {
/// use strata_observers::StepLogger;
///
/// let mut integrator = MersonIntegrator::new(system, Config::default())?;
/// integrator.initialize(system.default_state()?)?;
/// integrator.step_to_observed(10.0, StepLogger)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StepLogger;

impl<A> Observer<Event<'_>, A> for StepLogger {
    fn observe(&mut self, event: &Event<'_>) -> Option<A> {
        match *event {
            Event::Accepted {
                time, step, error, ..
            } => tracing::debug!(time, step, error, "step accepted"),
            Event::Rejected { time, step, error } => {
                tracing::debug!(time, step, error, "step rejected");
            }
            Event::Triggered { time, triggers } => {
                tracing::info!(time, ?triggers, "event triggered");
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use strata_core::{Stage, State, System};
    use strata_solvers::transient::merson::Action;

    #[test]
    fn never_stops() {
        let mut system = System::new("empty");
        let state: State = system.realize_topology().unwrap();
        system.realize(&state, Stage::Acceleration).unwrap();

        let triggers = ["impact".to_string()];
        let events = [
            Event::Accepted {
                time: 1.0,
                step: 0.1,
                error: 0.5,
                state: &state,
            },
            Event::Rejected {
                time: 1.0,
                step: 0.2,
                error: 3.0,
            },
            Event::Triggered {
                time: 1.05,
                triggers: &triggers,
            },
        ];

        let mut logger = StepLogger;
        for event in &events {
            let action: Option<Action> = logger.observe(event);
            assert!(action.is_none());
        }
    }
}
