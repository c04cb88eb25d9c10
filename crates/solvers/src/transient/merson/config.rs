use strata_core::Stage;

/// How per-component error ratios are reduced to one error norm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Norm {
    /// Largest ratio.
    #[default]
    Max,
    /// Root mean square of the ratios.
    Rms,
}

/// Configuration for the Merson integrator.
///
/// The error of component `i` is weighted by
/// `abs_tol + rel_tol * max(|y_i(t)|, |y_i(t + h)|)`, and a step is accepted
/// when the norm of the weighted errors is at most one.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct Config {
    pub rel_tol: f64,
    pub abs_tol: f64,
    /// Smallest step the error test may shrink to. Steps shortened to land
    /// on a target time may be smaller.
    pub min_step: f64,
    pub max_step: f64,
    /// First trial step; estimated from the initial derivatives when `None`.
    pub initial_step: Option<f64>,
    /// Safety factor applied to every step-size prediction.
    pub safety: f64,
    /// Largest factor by which one step may grow the next.
    pub max_growth: f64,
    /// Smallest factor by which one attempt may shrink the next.
    pub min_shrink: f64,
    pub norm: Norm,
    /// Integration never passes this time when set.
    pub final_time: Option<f64>,
    /// Width below which an event crossing counts as localized.
    pub event_time_tol: f64,
    pub event_max_iters: usize,
    /// Stage every returned State is realized through.
    pub return_stage: Stage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-9,
            min_step: 1e-12,
            max_step: f64::INFINITY,
            initial_step: None,
            safety: 0.9,
            max_growth: 5.0,
            min_shrink: 0.1,
            norm: Norm::Max,
            final_time: None,
            event_time_tol: 1e-10,
            event_max_iters: 100,
            return_stage: Stage::Acceleration,
        }
    }
}

impl Config {
    /// Validates tolerances, step bounds, and control factors.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.rel_tol.is_finite() || self.rel_tol < 0.0 {
            return Err("rel_tol must be finite and non-negative");
        }
        if !self.abs_tol.is_finite() || self.abs_tol < 0.0 {
            return Err("abs_tol must be finite and non-negative");
        }
        #[allow(clippy::float_cmp)]
        if self.rel_tol == 0.0 && self.abs_tol == 0.0 {
            return Err("rel_tol and abs_tol cannot both be zero");
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return Err("min_step must be finite and positive");
        }
        if self.max_step.is_nan() || self.max_step < self.min_step {
            return Err("max_step must be at least min_step");
        }
        if let Some(h) = self.initial_step
            && (!h.is_finite() || h <= 0.0)
        {
            return Err("initial_step must be finite and positive");
        }
        if !(self.safety > 0.0 && self.safety <= 1.0) {
            return Err("safety must be in (0, 1]");
        }
        if !self.max_growth.is_finite() || self.max_growth < 1.0 {
            return Err("max_growth must be finite and at least 1");
        }
        if !(self.min_shrink > 0.0 && self.min_shrink < 1.0) {
            return Err("min_shrink must be in (0, 1)");
        }
        if self.final_time.is_some_and(|t| !t.is_finite()) {
            return Err("final_time must be finite");
        }
        if !self.event_time_tol.is_finite() || self.event_time_tol <= 0.0 {
            return Err("event_time_tol must be finite and positive");
        }
        if self.event_max_iters == 0 {
            return Err("event_max_iters must be at least 1");
        }
        if self.return_stage < Stage::Acceleration {
            return Err("return_stage must be Acceleration or Report");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let cases = [
            Config {
                rel_tol: 0.0,
                abs_tol: 0.0,
                ..Config::default()
            },
            Config {
                min_step: 1.0,
                max_step: 0.5,
                ..Config::default()
            },
            Config {
                initial_step: Some(-1.0),
                ..Config::default()
            },
            Config {
                min_shrink: 1.0,
                ..Config::default()
            },
            Config {
                return_stage: Stage::Dynamics,
                ..Config::default()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }
}
