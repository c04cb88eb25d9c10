use strata_core::State;

/// Event emitted by the Merson integrator at every step-attempt boundary.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A step passed the error test and was committed.
    ///
    /// `time` and `state` are where the integrator now stands, which is
    /// earlier than the end of the attempt when an event trigger fired.
    Accepted {
        time: f64,
        step: f64,
        error: f64,
        state: &'a State,
    },

    /// A step failed the error test. Nothing was committed, and `time` is
    /// still the start of the attempt.
    Rejected { time: f64, step: f64, error: f64 },

    /// One or more triggers crossed zero and the integrator stopped there.
    Triggered { time: f64, triggers: &'a [String] },
}

impl Event<'_> {
    /// Simulation time this event refers to.
    #[must_use]
    pub fn time(&self) -> f64 {
        match self {
            Event::Accepted { time, .. }
            | Event::Rejected { time, .. }
            | Event::Triggered { time, .. } => *time,
        }
    }

    /// Size of the attempted step, if this event is a step attempt.
    #[must_use]
    pub fn step_size(&self) -> Option<f64> {
        match self {
            Event::Accepted { step, .. } | Event::Rejected { step, .. } => Some(*step),
            Event::Triggered { .. } => None,
        }
    }

    /// Error norm of the attempt, if this event is a step attempt.
    #[must_use]
    pub fn error(&self) -> Option<f64> {
        match self {
            Event::Accepted { error, .. } | Event::Rejected { error, .. } => Some(*error),
            Event::Triggered { .. } => None,
        }
    }
}
