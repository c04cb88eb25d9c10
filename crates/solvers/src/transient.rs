//! Time integration of a [`System`](strata_core::System).
//!
//! # Solvers
//!
//! - [`merson`]: adaptive Runge–Kutta–Merson with dense output and events

pub mod merson;
