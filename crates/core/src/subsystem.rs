//! The per-stage modeling interface composed by a [`System`](crate::System).
//!
//! A [`Subsystem`] contributes variables to the State layout and one realize
//! hook per stage. Hooks read the State and lower-stage cache through a
//! [`RealizeContext`] and write only to the subsystem's own cache slot for the
//! stage being realized. They never see a `&mut State`, so they cannot change
//! State inputs.
//!
//! [`StageGenerator`]s extend a subsystem without implementing the trait:
//! they are registered with the System for a specific stage and run right after
//! the subsystem's own hook for that stage.

use std::{any::Any, error::Error as StdError, fmt};

use thiserror::Error;

use crate::{Allocation, LayoutError, RealizeContext, Stage, state::StateError};

/// Position of a subsystem within its System.
///
/// Subsystems refer back to their System only through this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsystemIndex(usize);

impl SubsystemIndex {
    /// Creates an index from its raw position.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw position.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubsystemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors reported by subsystem hooks and generators.
#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("{0}")]
    Message(String),

    #[error("computation failed")]
    Computation(#[source] Box<dyn StdError + Send + Sync>),
}

impl SubsystemError {
    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wraps a foreign error raised by a computation.
    pub fn computation<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Computation(Box::new(err))
    }
}

/// Cache access that violates the stage ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("{requested} cache is not available while realizing {current}")]
    NotYetRealized { requested: Stage, current: Stage },

    #[error(
        "subsystem {requested} realizes {stage} after subsystem {current}, its cache is not available yet"
    )]
    LaterSubsystem {
        requested: SubsystemIndex,
        current: SubsystemIndex,
        stage: Stage,
    },

    #[error("no {stage} cache entry of the requested type for subsystem {subsystem}")]
    Missing {
        subsystem: SubsystemIndex,
        stage: Stage,
    },

    #[error("derivatives can only be written while realizing Velocity through Acceleration, not {stage}")]
    DerivativeStage { stage: Stage },

    #[error("expected {expected} derivative values, got {actual}")]
    DerivativeSize { expected: usize, actual: usize },
}

/// Result type returned by realize hooks and generators.
pub type RealizeResult = Result<(), SubsystemError>;

/// A unit of modeling logic with one realize hook per stage.
///
/// Every hook defaults to doing nothing. A hook for stage `k` runs only when
/// the State is valid through `k - 1`, and must be a pure function of the
/// State's variables and lower-stage cache.
///
/// Implementations must be deep-copyable through [`clone_box`](Self::clone_box),
/// which usually is `Box::new(self.clone())`.
pub trait Subsystem: Any + Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Version string reported alongside the name in realization failures.
    fn version(&self) -> &str {
        "0.0.1"
    }

    /// Declares this subsystem's state variables.
    ///
    /// Called once each time the System realizes its topology.
    ///
    /// # Errors
    ///
    /// Returns an error if a declaration is invalid.
    fn allocate(&self, _alloc: &mut Allocation) -> Result<(), LayoutError> {
        Ok(())
    }

    /// Returns an independent deep copy of this subsystem.
    fn clone_box(&self) -> Box<dyn Subsystem>;

    /// Upcast used for typed access to a concrete subsystem.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast used for typed access to a concrete subsystem.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Sets up topology-level cache. Reads only the subsystem's own structure.
    fn realize_topology(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Reads Model-stage discrete variables and writes model-level cache.
    fn realize_model(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Reads Instance-stage discrete variables and writes instance-level cache.
    fn realize_instance(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Reads the time and writes time-dependent cache.
    fn realize_time(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Reads `q` and writes position-level cache.
    fn realize_position(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Reads `u` and writes velocity-level cache.
    fn realize_velocity(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Computes forces and other dynamics cache from lower stages.
    fn realize_dynamics(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Writes this subsystem's `qdot`, `udot`, and `zdot`.
    fn realize_acceleration(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }

    /// Caches output-only quantities. Nothing else in the System may depend on them.
    fn realize_report(&self, _ctx: &mut RealizeContext<'_>) -> RealizeResult {
        Ok(())
    }
}

/// Dispatches to the hook for `ctx.stage()`.
pub(crate) fn dispatch(subsystem: &dyn Subsystem, ctx: &mut RealizeContext<'_>) -> RealizeResult {
    match ctx.stage() {
        Stage::Empty => Ok(()),
        Stage::Topology => subsystem.realize_topology(ctx),
        Stage::Model => subsystem.realize_model(ctx),
        Stage::Instance => subsystem.realize_instance(ctx),
        Stage::Time => subsystem.realize_time(ctx),
        Stage::Position => subsystem.realize_position(ctx),
        Stage::Velocity => subsystem.realize_velocity(ctx),
        Stage::Dynamics => subsystem.realize_dynamics(ctx),
        Stage::Acceleration => subsystem.realize_acceleration(ctx),
        Stage::Report => subsystem.realize_report(ctx),
    }
}

impl Clone for Box<dyn Subsystem> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

/// An extra per-stage contribution attached to a subsystem.
///
/// Generators run with the same [`RealizeContext`] as the subsystem they are
/// attached to, after its hook for the registered stage, and typically publish
/// results through [`RealizeContext::contribute`].
///
/// Closures implement this trait automatically when they are `Clone`.
pub trait StageGenerator: Send + Sync {
    /// Produces this generator's contribution for the current stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the contribution cannot be computed.
    fn generate(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult;

    /// Returns an independent copy of this generator.
    fn clone_box(&self) -> Box<dyn StageGenerator>;
}

/// Blanket implementation for generator closures.
impl<F> StageGenerator for F
where
    F: Fn(&mut RealizeContext<'_>) -> RealizeResult + Clone + Send + Sync + 'static,
{
    fn generate(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
        self(ctx)
    }

    fn clone_box(&self) -> Box<dyn StageGenerator> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn StageGenerator> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}
