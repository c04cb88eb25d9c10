use std::error::Error as StdError;

use thiserror::Error;

use super::BracketError;

/// Errors that prevent a bisection search from finishing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },

    #[error("invalid bracket: {0}")]
    InvalidBracket(#[from] BracketError),

    #[error("function evaluation failed at x = {x}")]
    Function {
        x: f64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("function returned {value} at x = {x}")]
    NonFinite { x: f64, value: f64 },
}
