use std::{fmt, sync::Arc};

use strata_core::{Stage, State};

/// Which zero crossings of a trigger function count as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// From negative to zero or positive.
    Rising,
    /// From positive to zero or negative.
    Falling,
    /// Either of the above.
    Either,
}

impl Direction {
    /// Detects a crossing between two consecutive trigger values.
    ///
    /// Returns the factor that turns the trigger into a function going from
    /// negative to non-negative across the crossing.
    pub(super) fn crossing(self, before: f64, after: f64) -> Option<f64> {
        let rising = before < 0.0 && after >= 0.0;
        let falling = before > 0.0 && after <= 0.0;
        match self {
            Direction::Rising => rising.then_some(1.0),
            Direction::Falling => falling.then_some(-1.0),
            Direction::Either if rising => Some(1.0),
            Direction::Either if falling => Some(-1.0),
            Direction::Either => None,
        }
    }
}

type TriggerFn = dyn Fn(&State) -> f64 + Send + Sync;

/// A scalar function of State whose zero crossings stop integration.
///
/// The integrator realizes the State through `stage` before calling the
/// function, so it may read any cache entry up to that stage.
#[derive(Clone)]
pub struct EventTrigger {
    name: String,
    direction: Direction,
    stage: Stage,
    function: Arc<TriggerFn>,
}

impl EventTrigger {
    /// Creates a trigger.
    pub fn new<F>(name: impl Into<String>, direction: Direction, stage: Stage, function: F) -> Self
    where
        F: Fn(&State) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            direction,
            stage,
            function: Arc::new(function),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Evaluates the trigger on a State already realized through its stage.
    pub(super) fn evaluate(&self, state: &State) -> f64 {
        (self.function)(state)
    }
}

impl fmt::Debug for EventTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTrigger")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}
