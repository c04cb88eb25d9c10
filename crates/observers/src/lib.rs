//! Reusable observers for Strata solvers.
//!
//! This crate provides [`Observer`] implementations and capability traits that
//! work across the solvers in `strata-solvers`.
//!
//! - [`traits`]: Capability traits for cross-solver observers
//!   ([`HasTime`], [`HasStepSize`], [`HasErrorNorm`], [`HasAcceptance`],
//!   [`CanStopEarly`])
//! - [`StepLogger`]: reports integrator steps through `tracing`
//! - [`StepRecorder`]: keeps every step attempt in memory
//!
//! [`Observer`]: strata_core::Observer
//! [`HasTime`]: traits::HasTime
//! [`HasStepSize`]: traits::HasStepSize
//! [`HasErrorNorm`]: traits::HasErrorNorm
//! [`HasAcceptance`]: traits::HasAcceptance
//! [`CanStopEarly`]: traits::CanStopEarly

pub mod traits;

mod logger;
mod recorder;

pub use logger::StepLogger;
pub use recorder::{StepRecord, StepRecorder};
