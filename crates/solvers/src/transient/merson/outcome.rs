use std::fmt;

/// How a call to `step_to` ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The requested target time was reached.
    Reached,

    /// The configured final time was reached before the target.
    TimeLimitReached,

    /// Triggers crossed zero at `time`, where the integrator stopped.
    EventTriggered { time: f64, triggers: Vec<String> },

    /// An observer stopped the integrator at a step-attempt boundary.
    StoppedByObserver,
}

/// Lifecycle of an integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Stepping,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Initialized => "initialized",
            Phase::Stepping => "stepping",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        })
    }
}

/// Work counters since the last call to `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub attempts: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub derivative_evaluations: usize,
    pub events: usize,
}
