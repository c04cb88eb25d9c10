use super::Bracket;

/// How a bisection search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The bracket is within `width_tol`, or cannot be split further.
    Converged,
    /// Hit `max_iters` first.
    MaxIters,
    StoppedByObserver,
}

/// The result of a bisection search.
///
/// `x` is the end of the final bracket where the function is zero or
/// positive, so it always lies on or past the sign change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    pub status: Status,
    pub x: f64,
    /// Function value at `x`.
    pub value: f64,
    /// Final bracket in ascending order.
    pub bracket: [f64; 2],
    /// Evaluations after the two endpoints.
    pub iters: usize,
}

impl Solution {
    pub(super) fn new(status: Status, bracket: &Bracket, iters: usize) -> Self {
        Self {
            status,
            x: bracket.above(),
            value: bracket.above_value(),
            bracket: bracket.ordered(),
            iters,
        }
    }

    /// Width of the final bracket.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.bracket[1] - self.bracket[0]
    }
}
