use thiserror::Error;

/// Reasons a pair of endpoints cannot start a bisection.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum BracketError {
    #[error("non-finite endpoint")]
    NonFinite,

    #[error("endpoints are equal")]
    ZeroWidth,

    #[error("no sign change between f({a}) = {fa} and f({b}) = {fb}")]
    NoSignChange { a: f64, b: f64, fa: f64, fb: f64 },
}

/// Checks that `ends` can be bisected before anything is evaluated.
pub(super) fn check_ends([a, b]: [f64; 2]) -> Result<(), BracketError> {
    if !a.is_finite() || !b.is_finite() {
        return Err(BracketError::NonFinite);
    }
    #[allow(clippy::float_cmp)]
    if a == b {
        return Err(BracketError::ZeroWidth);
    }
    Ok(())
}

/// An interval known to contain a sign change.
///
/// The two ends are tracked by side rather than by position: `below` is
/// where the function is negative, `above` where it is zero or positive.
/// Either may be the larger of the two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    below: f64,
    above: f64,
    above_value: f64,
}

impl Bracket {
    /// Orients the ends `a` and `b` by the signs of `fa` and `fb`.
    ///
    /// # Errors
    ///
    /// Returns [`BracketError::NoSignChange`] if both values are negative or
    /// both are non-negative.
    pub(super) fn new(a: f64, fa: f64, b: f64, fb: f64) -> Result<Self, BracketError> {
        match (fa < 0.0, fb < 0.0) {
            (true, false) => Ok(Self {
                below: a,
                above: b,
                above_value: fb,
            }),
            (false, true) => Ok(Self {
                below: b,
                above: a,
                above_value: fa,
            }),
            _ => Err(BracketError::NoSignChange { a, b, fa, fb }),
        }
    }

    /// The end where the function is negative.
    #[must_use]
    pub fn below(&self) -> f64 {
        self.below
    }

    /// The end where the function is zero or positive.
    #[must_use]
    pub fn above(&self) -> f64 {
        self.above
    }

    /// Function value at [`above`](Self::above).
    #[must_use]
    pub fn above_value(&self) -> f64 {
        self.above_value
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        (self.above - self.below).abs()
    }

    /// Both ends in ascending order.
    #[must_use]
    pub fn ordered(&self) -> [f64; 2] {
        if self.below < self.above {
            [self.below, self.above]
        } else {
            [self.above, self.below]
        }
    }

    /// Midpoint strictly between the ends, or `None` once the ends are
    /// adjacent floats.
    pub(super) fn split(&self) -> Option<f64> {
        let mid = self.below + 0.5 * (self.above - self.below);
        let [lo, hi] = self.ordered();
        (lo < mid && mid < hi).then_some(mid)
    }

    /// Moves the end on the same side as `value` to `x`.
    pub(super) fn narrow(&mut self, x: f64, value: f64) {
        if value < 0.0 {
            self.below = x;
        } else {
            self.above = x;
            self.above_value = value;
        }
    }
}
