//! Bisection search for the sign change of a scalar function.
//!
//! Given two points where `f` has opposite signs, the search halves the
//! interval between them until it is at most `width_tol` wide. Zero counts as
//! non-negative, so the result separates the last point where `f < 0` from the
//! first known point where `f >= 0`. This makes the search suitable both for
//! roots and for finding when a monitored quantity first reaches a threshold.
//!
//! # Observer Events
//!
//! The solver emits one [`Event`] per midpoint evaluation. Observers can
//! return [`Action::StopEarly`] to halt with the current bracket.

mod bracket;
mod config;
mod error;
mod event;
mod solution;

pub use bracket::{Bracket, BracketError};
pub use config::Config;
pub use error::Error;
pub use event::{Action, Event};
pub use solution::{Solution, Status};

use std::error::Error as StdError;

use strata_core::Observer;

/// Narrows `ends` around a sign change of `f`.
///
/// The endpoints may be given in either order.
///
/// # Errors
///
/// Returns an error if the config or endpoints are invalid, `f` has the same
/// sign at both ends, `f` fails, or `f` returns a non-finite value.
pub fn solve<F, E, Obs>(
    mut f: F,
    ends: [f64; 2],
    config: &Config,
    mut observer: Obs,
) -> Result<Solution, Error>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: StdError + Send + Sync + 'static,
    Obs: Observer<Event, Action>,
{
    config
        .validate()
        .map_err(|reason| Error::InvalidConfig { reason })?;
    bracket::check_ends(ends)?;

    let [a, b] = ends;
    let fa = evaluate(&mut f, a)?;
    let fb = evaluate(&mut f, b)?;
    let mut bracket = Bracket::new(a, fa, b, fb)?;

    let mut iters = 0;
    loop {
        if bracket.width() <= config.width_tol {
            return Ok(Solution::new(Status::Converged, &bracket, iters));
        }
        let Some(x) = bracket.split() else {
            return Ok(Solution::new(Status::Converged, &bracket, iters));
        };
        if iters == config.max_iters {
            return Ok(Solution::new(Status::MaxIters, &bracket, iters));
        }

        iters += 1;
        let value = evaluate(&mut f, x)?;
        bracket.narrow(x, value);

        let event = Event {
            iter: iters,
            x,
            value,
            bracket: bracket.ordered(),
        };
        if let Some(Action::StopEarly) = observer.observe(&event) {
            return Ok(Solution::new(Status::StoppedByObserver, &bracket, iters));
        }
    }
}

/// Runs bisection without observation.
///
/// # Errors
///
/// Returns the errors of [`solve`].
pub fn solve_unobserved<F, E>(f: F, ends: [f64; 2], config: &Config) -> Result<Solution, Error>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: StdError + Send + Sync + 'static,
{
    solve(f, ends, config, ())
}

fn evaluate<F, E>(f: &mut F, x: f64) -> Result<f64, Error>
where
    F: FnMut(f64) -> Result<f64, E>,
    E: StdError + Send + Sync + 'static,
{
    let value = f(x).map_err(|err| Error::Function {
        x,
        source: Box::new(err),
    })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NonFinite { x, value })
    }
}
