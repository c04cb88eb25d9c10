//! Solvers for scalar equations `f(x) = 0`.
//!
//! # Solvers
//!
//! - [`bisection`]: guaranteed convergence on a bracketed interval

pub mod bisection;
