//! Capability traits for cross-solver observers.
//!
//! These traits abstract over solver-specific event and action types, enabling
//! observers to work generically across different solvers.
//!
//! # Event traits
//!
//! - [`HasTime`]: events that refer to a simulation time
//! - [`HasStepSize`]: events that may describe a step attempt
//! - [`HasErrorNorm`]: events that may carry a step error norm
//! - [`HasAcceptance`]: events that may report whether a step was accepted
//!
//! # Action traits
//!
//! - [`CanStopEarly`]: actions that can signal early termination
//!
//! # Example
//!
//! ```rust
//! use strata_core::Observer;
//! use strata_observers::traits::{CanStopEarly, HasStepSize};
//!
//! /// Gives up once the step size collapses.
//! struct StepFloor {
//!     min: f64,
//! }
//!
//! impl<E: HasStepSize, A: CanStopEarly> Observer<E, A> for StepFloor {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         match event.step_size() {
//!             Some(step) if step < self.min => Some(A::stop_early()),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use strata_solvers::{equation::bisection, transient::merson};

/// An event that refers to a simulation time.
pub trait HasTime {
    fn time(&self) -> f64;
}

/// An event that may describe a step attempt.
pub trait HasStepSize {
    /// Returns the attempted step size, or `None` if this event is not a step
    /// attempt.
    fn step_size(&self) -> Option<f64>;
}

/// An event that may carry the error norm of a step attempt.
pub trait HasErrorNorm {
    fn error_norm(&self) -> Option<f64>;
}

/// An event that may report the verdict on a step attempt.
pub trait HasAcceptance {
    /// Returns `Some(true)` for an accepted attempt, `Some(false)` for a
    /// rejected one, and `None` if this event is not a step attempt.
    fn accepted(&self) -> Option<bool>;
}

/// An action type that can signal early termination.
pub trait CanStopEarly {
    /// Returns the action that stops the solver early.
    fn stop_early() -> Self;
}

// --- merson::Event ---

impl HasTime for merson::Event<'_> {
    fn time(&self) -> f64 {
        merson::Event::time(self)
    }
}

impl HasStepSize for merson::Event<'_> {
    fn step_size(&self) -> Option<f64> {
        merson::Event::step_size(self)
    }
}

impl HasErrorNorm for merson::Event<'_> {
    fn error_norm(&self) -> Option<f64> {
        self.error()
    }
}

impl HasAcceptance for merson::Event<'_> {
    fn accepted(&self) -> Option<bool> {
        match self {
            merson::Event::Accepted { .. } => Some(true),
            merson::Event::Rejected { .. } => Some(false),
            merson::Event::Triggered { .. } => None,
        }
    }
}

// --- CanStopEarly impls ---

impl CanStopEarly for bisection::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}

impl CanStopEarly for merson::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}
