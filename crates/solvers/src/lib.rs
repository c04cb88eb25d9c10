//! Numerical solvers for Strata systems.
//!
//! - [`equation`]: scalar root finding
//! - [`transient`]: adaptive time integration of a [`System`]
//!
//! Every solver reports progress through an [`Observer`], which can also stop
//! it early. The `*_unobserved` variants and `()` observer skip that.
//!
//! [`System`]: strata_core::System
//! [`Observer`]: strata_core::Observer

pub mod equation;
pub mod transient;
