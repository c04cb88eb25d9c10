use std::error::Error as StdError;

use thiserror::Error;

use super::Phase;

/// Errors that end an integration.
///
/// Every error except [`Error::InvalidPhase`], [`Error::InvalidTarget`],
/// [`Error::InvalidConfig`], and [`Error::OutsideDenseSpan`] puts the
/// integrator in [`Phase::Failed`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "cannot meet accuracy at t = {time} with the minimum step size {step} (error norm {error})"
    )]
    AccuracyNotMet { time: f64, step: f64, error: f64 },

    #[error("system evaluation failed at t = {time} (step size {step})")]
    Derivative {
        time: f64,
        step: f64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("could not localize event {trigger:?} near t = {time} (bracket width {width})")]
    EventLocalization {
        trigger: String,
        time: f64,
        width: f64,
    },

    #[error("operation not allowed while the integrator is {phase}")]
    InvalidPhase { phase: Phase },

    #[error("invalid target time {target} at t = {time}")]
    InvalidTarget { target: f64, time: f64 },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },

    #[error("t = {time} is outside the last step [{start}, {end}]")]
    OutsideDenseSpan { time: f64, start: f64, end: f64 },
}

impl Error {
    pub(crate) fn derivative<E: StdError + Send + Sync + 'static>(
        time: f64,
        step: f64,
        err: E,
    ) -> Self {
        Self::Derivative {
            time,
            step,
            source: Box::new(err),
        }
    }

    /// Returns true if this error ends the integration.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AccuracyNotMet { .. } | Self::Derivative { .. } | Self::EventLocalization { .. }
        )
    }
}
