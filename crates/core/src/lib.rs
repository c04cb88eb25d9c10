//! Core types for staged simulation with Strata.
//!
//! A [`System`] is an ordered list of [`Subsystem`]s. Every piece of computed
//! data lives in the cache of a [`State`], grouped by [`Stage`]. Realizing a
//! State through a stage runs each subsystem's hook for every stage that is
//! not valid yet, in ascending order, and changing a State input invalidates
//! the stage it belongs to along with every stage above it.
//!
//! - [`Stage`]: the ordered realization ladder, and [`StageMap`] for
//!   per-stage storage
//! - [`State`]: time, continuous and discrete variables, and the staged cache
//! - [`Subsystem`] and [`StageGenerator`]: per-stage modeling hooks
//! - [`RealizeContext`]: what a hook may read and write while realizing
//! - [`System`]: subsystem composition and realization
//! - [`Checkpoint`]: persisted State variables
//! - [`Observer`]: receives solver events and optionally returns control actions
//!
//! # Features
//!
//! - `serde`: derives `Serialize`/`Deserialize` for [`Stage`] and [`Checkpoint`].

mod checkpoint;
mod context;
mod error;
mod layout;
mod observer;
mod stage;
mod state;
mod subsystem;
mod system;

pub use checkpoint::Checkpoint;
pub use context::RealizeContext;
pub use error::{Error, Precondition};
pub use layout::{
    Allocation, DiscreteIndex, DiscreteVariable, LayoutError, StateLayout, SubsystemSlots,
};
pub use observer::Observer;
pub use stage::{ParseStageError, Stage, StageMap};
pub use state::{State, StateError};
pub use subsystem::{
    CacheError, RealizeResult, StageGenerator, Subsystem, SubsystemError, SubsystemIndex,
};
pub use system::System;
