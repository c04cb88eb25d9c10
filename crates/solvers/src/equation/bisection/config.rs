/// Stopping rules for a bisection search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Largest number of function evaluations after the two endpoints.
    pub max_iters: usize,
    /// The search converges once the bracket is at most this wide.
    pub width_tol: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 100,
            width_tol: 1e-12,
        }
    }
}

impl Config {
    /// Validates the width tolerance.
    ///
    /// # Errors
    ///
    /// Returns an error if `width_tol` is negative or not finite.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.width_tol.is_finite() || self.width_tol < 0.0 {
            return Err("width_tol must be finite and non-negative");
        }
        Ok(())
    }
}
