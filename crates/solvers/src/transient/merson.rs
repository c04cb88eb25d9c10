//! Adaptive Runge–Kutta–Merson integration of a [`System`].
//!
//! # Algorithm
//!
//! Each step attempt uses five derivative evaluations, the first of which is
//! the derivative already realized at the start of the step:
//!
//! ```text
//! k1 = f(t,       y)
//! k2 = f(t + h/3, y + h/3 k1)
//! k3 = f(t + h/3, y + h/6 (k1 + k2))
//! k4 = f(t + h/2, y + h/8 (k1 + 3 k3))
//! k5 = f(t + h,   y + h/2 (k1 - 3 k3 + 4 k4))
//!
//! y4 = y + h/6 (k1 + 4 k4 + k5)          fourth order, committed
//! y3 = y + h/2 (k1 - 3 k3 + 4 k4)        third order, embedded
//! ```
//!
//! The local error estimate of component `i` is `|y4_i - y3_i| / 5`. Weighted
//! by `abs_tol + rel_tol * max(|y_i|, |y4_i|)` and reduced by the configured
//! [`Norm`], it gives the error norm `err`. A step is accepted iff
//! `err <= 1`, and the next trial step is
//!
//! ```text
//! h_new = h * clamp(safety * (1/err)^(1/5), min_shrink, max_growth)
//! ```
//!
//! clipped to `[min_step, max_step]`. A rejection at the minimum step size is
//! a terminal [`Error::AccuracyNotMet`].
//!
//! Steps are shortened to land exactly on the target time; the preferred step
//! size survives such a shortened step.
//!
//! # Dense output and events
//!
//! After every accepted step, [`MersonIntegrator::interpolate`] evaluates a
//! cubic Hermite interpolant anywhere within the step. Each [`EventTrigger`]
//! is then checked for a sign change across the step. Crossings are
//! localized by bisection on the interpolant, and the integrator stops just
//! past the earliest one and returns [`StepOutcome::EventTriggered`].
//!
//! # Observer Events
//!
//! Observers see an [`Event`] at every step-attempt boundary and can return
//! [`Action::StopEarly`] to stop there.
//!
//! # Borrowing
//!
//! The integrator borrows its [`System`] for its whole lifetime, so the
//! System's topology cannot change while an integration is in progress.

mod action;
mod config;
mod dense;
mod error;
mod event;
mod outcome;
mod trigger;


pub use action::Action;
pub use config::{Config, Norm};
pub use error::Error;
pub use event::Event;
pub use outcome::{Phase, StepOutcome, Statistics};
pub use trigger::{Direction, EventTrigger};

use strata_core::{Observer, Stage, State, System};

use crate::equation::bisection;

use dense::Dense;

/// Order of the committed solution.
const ORDER: i32 = 4;

/// Adaptive Runge–Kutta–Merson integrator.
///
/// Owns its State exclusively between [`initialize`](Self::initialize) and
/// [`into_state`](Self::into_state).
#[derive(Debug)]
pub struct MersonIntegrator<'s> {
    system: &'s System,
    config: Config,
    triggers: Vec<EventTrigger>,
    phase: Phase,
    state: Option<State>,
    /// Derivative of `state`, reused as `k1` of the next step.
    ydot: Vec<f64>,
    /// Trigger values at `state`.
    trigger_values: Vec<f64>,
    /// Preferred size of the next attempt.
    step_size: f64,
    dense: Option<Dense>,
    stats: Statistics,
}

/// Result of one step attempt.
struct Trial {
    y: Vec<f64>,
    error: f64,
}

impl<'s> MersonIntegrator<'s> {
    /// Creates an integrator for `system`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(system: &'s System, config: Config) -> Result<Self, Error> {
        config
            .validate()
            .map_err(|reason| Error::InvalidConfig { reason })?;

        Ok(Self {
            system,
            config,
            triggers: Vec::new(),
            phase: Phase::Uninitialized,
            state: None,
            ydot: Vec::new(),
            trigger_values: Vec::new(),
            step_size: config.initial_step.unwrap_or(config.min_step),
            dense: None,
            stats: Statistics::default(),
        })
    }

    /// Adds an event trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if the integrator is initialized and the trigger
    /// cannot be evaluated at the current State.
    pub fn add_trigger(&mut self, trigger: EventTrigger) -> Result<(), Error> {
        if let Some(state) = &self.state {
            let value = trigger_value(self.system, &trigger, state, 0.0)?;
            self.trigger_values.push(value);
        }
        self.triggers.push(trigger);
        Ok(())
    }

    /// Takes ownership of `state` and prepares to step from its time.
    ///
    /// The State is realized through the configured return stage. Any earlier
    /// integration, including a failed one, is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Derivative`] if the State cannot be realized, which
    /// leaves the integrator [`Phase::Failed`], or [`Error::InvalidTarget`]
    /// if its time is not finite.
    pub fn initialize(&mut self, state: State) -> Result<(), Error> {
        self.phase = Phase::Uninitialized;
        self.state = None;
        self.dense = None;
        self.stats = Statistics::default();

        match self.prepare(state) {
            Ok(()) => {
                self.phase = Phase::Initialized;
                tracing::debug!(
                    time = self.time(),
                    step = self.step_size,
                    triggers = self.triggers.len(),
                    "integrator initialized"
                );
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn prepare(&mut self, state: State) -> Result<(), Error> {
        let time = state.time();
        if !time.is_finite() {
            return Err(Error::InvalidTarget { target: time, time });
        }

        let ydot = derivatives(self.system, &state, 0.0)?;
        self.stats.derivative_evaluations += 1;
        realize(self.system, &state, self.config.return_stage, 0.0)?;

        self.trigger_values = self
            .triggers
            .iter()
            .map(|trigger| trigger_value(self.system, trigger, &state, 0.0))
            .collect::<Result<_, _>>()?;

        self.step_size = match self.config.initial_step {
            Some(h) => h.clamp(self.config.min_step, self.config.max_step),
            None => self.estimate_initial_step(&state, &ydot)?,
        };
        self.ydot = ydot;
        self.state = Some(state);
        Ok(())
    }

    /// Advances to `target`, stopping early at events or the final time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] unless the integrator is initialized and
    /// has not failed, [`Error::InvalidTarget`] if `target` is not finite or
    /// lies in the past, and a terminal error if a step fails.
    pub fn step_to(&mut self, target: f64) -> Result<StepOutcome, Error> {
        self.step_to_observed(target, ())
    }

    /// Advances to `target` while reporting every step attempt to `observer`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`step_to`](Self::step_to).
    pub fn step_to_observed<Obs>(
        &mut self,
        target: f64,
        mut observer: Obs,
    ) -> Result<StepOutcome, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        match self.phase {
            Phase::Uninitialized | Phase::Failed => {
                return Err(Error::InvalidPhase { phase: self.phase });
            }
            Phase::Completed => return Ok(StepOutcome::TimeLimitReached),
            Phase::Initialized | Phase::Stepping => {}
        }

        let time = self.time().unwrap_or(f64::NAN);
        if !target.is_finite() || target < time {
            return Err(Error::InvalidTarget { target, time });
        }

        self.advance(target, &mut observer)
            .map_err(|err| self.fail(err))
    }

    fn advance<Obs>(&mut self, target: f64, observer: &mut Obs) -> Result<StepOutcome, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let (end, limited) = match self.config.final_time {
            Some(final_time) if final_time <= target => (final_time, true),
            _ => (target, false),
        };

        loop {
            let state = self.current()?;
            let time = state.time();
            if time >= end {
                if limited {
                    self.phase = Phase::Completed;
                    return Ok(StepOutcome::TimeLimitReached);
                }
                return Ok(StepOutcome::Reached);
            }

            let preferred = self.step_size;
            let remaining = end - time;
            let (step, lands) = if preferred >= remaining {
                (remaining, true)
            } else {
                (preferred, false)
            };

            let trial = self.attempt(state, step)?;
            self.stats.attempts += 1;
            self.stats.derivative_evaluations += 4;

            if trial.error <= 1.0 {
                let landing = lands.then_some(end);
                if let Some(outcome) = self.accept(trial, step, landing, preferred, observer)? {
                    return Ok(outcome);
                }
                continue;
            }

            self.stats.rejected += 1;
            tracing::debug!(time, step, error = trial.error, "rejected step");

            if step <= self.config.min_step {
                return Err(Error::AccuracyNotMet {
                    time,
                    step,
                    error: trial.error,
                });
            }
            self.step_size = (step * self.step_factor(trial.error)).max(self.config.min_step);

            let event = Event::Rejected {
                time,
                step,
                error: trial.error,
            };
            if let Some(Action::StopEarly) = observer.observe(&event) {
                return Ok(StepOutcome::StoppedByObserver);
            }
        }
    }

    /// Computes the Merson solution and its error norm for a step of size `h`.
    fn attempt(&self, state: &State, h: f64) -> Result<Trial, Error> {
        let t = state.time();
        let y = state.y();
        let k1 = self.ydot.as_slice();

        let mut scratch = state.clone();
        let mut eval = |dt: f64, y: &[f64]| -> Result<Vec<f64>, Error> {
            scratch.set_time(t + dt);
            scratch
                .set_y(y)
                .map_err(|err| Error::derivative(t + dt, h, err))?;
            derivatives(self.system, &scratch, h)
        };

        let k2 = eval(h / 3.0, &combine(y, &[(h / 3.0, k1)]))?;
        let k3 = eval(h / 3.0, &combine(y, &[(h / 6.0, k1), (h / 6.0, &k2[..])]))?;
        let k4 = eval(h / 2.0, &combine(y, &[(h / 8.0, k1), (3.0 * h / 8.0, &k3[..])]))?;
        let y3 = combine(y, &[(h / 2.0, k1), (-1.5 * h, &k3[..]), (2.0 * h, &k4[..])]);
        let k5 = eval(h, &y3)?;
        let y4 = combine(y, &[(h / 6.0, k1), (2.0 * h / 3.0, &k4[..]), (h / 6.0, &k5[..])]);

        let error = self.error_norm(y, &y4, &y3);
        Ok(Trial { y: y4, error })
    }

    /// Commits an accepted trial, then handles events and observation.
    ///
    /// Returns `Some` if stepping should stop here.
    fn accept<Obs>(
        &mut self,
        trial: Trial,
        step: f64,
        landing: Option<f64>,
        preferred: f64,
        observer: &mut Obs,
    ) -> Result<Option<StepOutcome>, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let state = self.current()?;
        let t0 = state.time();
        let t1 = landing.unwrap_or(t0 + step);
        let y0 = state.y().to_vec();

        // Nothing is committed until the new State is fully realized.
        let mut next = state.clone();
        next.set_time(t1);
        next.set_y(&trial.y).map_err(|err| Error::derivative(t1, step, err))?;
        let ydot = derivatives(self.system, &next, step)?;
        realize(self.system, &next, self.config.return_stage, step)?;
        self.state = Some(next);

        let f0 = std::mem::replace(&mut self.ydot, ydot.clone());
        self.dense = Some(Dense::new(t0, y0, f0, t1, trial.y, ydot));
        self.stats.accepted += 1;
        self.stats.derivative_evaluations += 1;
        self.phase = Phase::Stepping;

        // A step shortened to land on the target keeps the preferred size.
        self.step_size = if landing.is_some() && step < preferred {
            preferred
        } else {
            (step * self.step_factor(trial.error)).clamp(self.config.min_step, self.config.max_step)
        };

        tracing::debug!(time = t1, step, error = trial.error, "accepted step");

        let triggered = self.locate_event(t0, t1, step)?;

        let state = self.current()?;
        let accepted = Event::Accepted {
            time: state.time(),
            step,
            error: trial.error,
            state,
        };
        let stop = matches!(observer.observe(&accepted), Some(Action::StopEarly));

        if let Some((time, triggers)) = triggered {
            let event = Event::Triggered {
                time,
                triggers: &triggers,
            };
            // The integrator stops at the event regardless of the action.
            let _ = observer.observe(&event);
            return Ok(Some(StepOutcome::EventTriggered { time, triggers }));
        }

        Ok(stop.then_some(StepOutcome::StoppedByObserver))
    }

    /// Checks every trigger across `[t0, t1]` and moves the State back to the
    /// earliest crossing, if any.
    ///
    /// Returns the crossing time and the names of every trigger that has
    /// crossed by then.
    fn locate_event(
        &mut self,
        t0: f64,
        t1: f64,
        step: f64,
    ) -> Result<Option<(f64, Vec<String>)>, Error> {
        if self.triggers.is_empty() {
            return Ok(None);
        }

        let state = self.current()?;
        let after = self
            .triggers
            .iter()
            .map(|trigger| trigger_value(self.system, trigger, state, step))
            .collect::<Result<Vec<_>, _>>()?;

        let mut crossings = Vec::new();
        let mut earliest = f64::INFINITY;
        for (index, trigger) in self.triggers.iter().enumerate() {
            let before = self.trigger_values[index];
            if let Some(sign) = trigger.direction().crossing(before, after[index]) {
                let time = self.localize(trigger, sign, t0, t1)?;
                earliest = earliest.min(time);
                crossings.push((index, sign));
            }
        }

        if crossings.is_empty() {
            self.trigger_values = after;
            return Ok(None);
        }

        let values = if earliest < t1 {
            let moved = self.state_at(earliest, Stage::Acceleration)?;
            let values = self
                .triggers
                .iter()
                .map(|trigger| trigger_value(self.system, trigger, &moved, step))
                .collect::<Result<Vec<_>, _>>()?;
            realize(self.system, &moved, self.config.return_stage, step)?;

            self.ydot = derivatives(self.system, &moved, step)?;
            self.state = Some(moved);
            if let Some(dense) = self.dense.as_mut() {
                dense.truncate(earliest);
            }
            values
        } else {
            after
        };

        let names: Vec<String> = crossings
            .iter()
            .filter(|&&(index, sign)| sign * values[index] >= 0.0)
            .map(|&(index, _)| self.triggers[index].name().to_string())
            .collect();

        self.trigger_values = values;
        self.stats.events += 1;
        tracing::debug!(time = earliest, triggers = ?names, "event triggered");

        Ok(Some((earliest, names)))
    }

    /// Bisects `sign * trigger` on the interpolant over `[t0, t1]`.
    ///
    /// Returns the end of the final bracket where the crossing has already
    /// happened.
    fn localize(&self, trigger: &EventTrigger, sign: f64, t0: f64, t1: f64) -> Result<f64, Error> {
        let config = bisection::Config {
            max_iters: self.config.event_max_iters,
            width_tol: self.config.event_time_tol,
        };
        let localization_failed = |time: f64, width: f64| {
            tracing::warn!(trigger = trigger.name(), time, width, "event localization failed");
            Error::EventLocalization {
                trigger: trigger.name().to_string(),
                time,
                width,
            }
        };

        let f = |t: f64| -> Result<f64, Error> {
            let state = self.state_at(t, trigger.stage())?;
            Ok(sign * trigger.evaluate(&state))
        };

        match bisection::solve_unobserved(f, [t0, t1], &config) {
            Ok(solution) if solution.status == bisection::Status::Converged => Ok(solution.x),
            Ok(solution) => Err(localization_failed(solution.x, solution.width())),
            Err(bisection::Error::Function { x, source }) => match source.downcast::<Error>() {
                Ok(err) => Err(*err),
                Err(source) => Err(Error::Derivative {
                    time: x,
                    step: t1 - t0,
                    source,
                }),
            },
            Err(_) => Err(localization_failed(t1, t1 - t0)),
        }
    }

    // --- Accessors ---

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current simulation time, once initialized.
    #[must_use]
    pub fn time(&self) -> Option<f64> {
        self.state.as_ref().map(State::time)
    }

    /// Size of the next step attempt.
    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Counters since the last [`initialize`](Self::initialize).
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// The State at the current time, realized through the return stage.
    #[must_use]
    pub fn advanced_state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// Gives up the integrator and returns its State.
    #[must_use]
    pub fn into_state(self) -> Option<State> {
        self.state
    }

    /// Interpolated continuous variables at `t` within the last accepted step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] before the first accepted step and
    /// [`Error::OutsideDenseSpan`] if `t` lies outside that step.
    pub fn interpolate(&self, t: f64) -> Result<Vec<f64>, Error> {
        let dense = self.dense_covering(t)?;
        Ok(dense.eval(t))
    }

    /// Interpolated State at `t` within the last accepted step, realized
    /// through the return stage.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`interpolate`](Self::interpolate), or
    /// [`Error::Derivative`] if the State cannot be realized.
    pub fn interpolated_state(&self, t: f64) -> Result<State, Error> {
        self.state_at(t, self.config.return_stage)
    }

    // --- Helpers ---

    fn current(&self) -> Result<&State, Error> {
        self.state
            .as_ref()
            .ok_or(Error::InvalidPhase { phase: self.phase })
    }

    fn dense_covering(&self, t: f64) -> Result<&Dense, Error> {
        let dense = self
            .dense
            .as_ref()
            .ok_or(Error::InvalidPhase { phase: self.phase })?;
        if dense.contains(t) {
            Ok(dense)
        } else {
            Err(Error::OutsideDenseSpan {
                time: t,
                start: dense.start(),
                end: dense.end(),
            })
        }
    }

    fn state_at(&self, t: f64, stage: Stage) -> Result<State, Error> {
        let dense = self.dense_covering(t)?;
        let span = dense.end() - dense.start();

        let mut state = self.current()?.clone();
        state.set_time(t);
        state
            .set_y(&dense.eval(t))
            .map_err(|err| Error::derivative(t, span, err))?;
        realize(self.system, &state, stage, span)?;
        Ok(state)
    }

    fn error_norm(&self, y0: &[f64], y4: &[f64], y3: &[f64]) -> f64 {
        let ratios = y0.iter().zip(y4).zip(y3).map(|((&y0, &y4), &y3)| {
            let estimate = (y4 - y3).abs() / 5.0;
            let weight = self.config.abs_tol + self.config.rel_tol * y0.abs().max(y4.abs());
            if estimate == 0.0 {
                0.0
            } else {
                estimate / weight
            }
        });

        match self.config.norm {
            // NaN must survive the reduction.
            Norm::Max => ratios.fold(0.0, |max, r| if r.is_nan() || r > max { r } else { max }),
            Norm::Rms => rms(ratios, y0.len()),
        }
    }

    fn step_factor(&self, error: f64) -> f64 {
        if !error.is_finite() {
            return self.config.min_shrink;
        }
        if error <= 0.0 {
            return self.config.max_growth;
        }
        let exponent = -1.0 / f64::from(ORDER + 1);
        (self.config.safety * error.powf(exponent))
            .clamp(self.config.min_shrink, self.config.max_growth)
    }

    /// Estimates a first step from the size of `y`, `y'`, and `y''`.
    ///
    /// Takes one explicit Euler probe step to estimate the second derivative.
    fn estimate_initial_step(&mut self, state: &State, f0: &[f64]) -> Result<f64, Error> {
        let Config {
            abs_tol,
            rel_tol,
            min_step,
            max_step,
            ..
        } = self.config;
        let y0 = state.y();
        let weights: Vec<f64> = y0.iter().map(|y| abs_tol + rel_tol * y.abs()).collect();
        let weighted = |v: &[f64]| {
            let ratios = v.iter().zip(&weights).map(|(v, w)| if *v == 0.0 { 0.0 } else { v / w });
            rms(ratios, v.len())
        };

        let d0 = weighted(y0);
        let d1 = weighted(f0);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(max_step);

        let mut probe = state.clone();
        probe.set_time(state.time() + h0);
        probe
            .set_y(&combine(y0, &[(h0, f0)]))
            .map_err(|err| Error::derivative(state.time(), h0, err))?;
        let f1 = derivatives(self.system, &probe, h0)?;
        self.stats.derivative_evaluations += 1;

        let difference: Vec<f64> = f1.iter().zip(f0).map(|(a, b)| a - b).collect();
        let d2 = weighted(&difference) / h0;

        let scale = d1.max(d2);
        let h1 = if scale <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / scale).powf(1.0 / f64::from(ORDER + 1))
        };

        let h = (100.0 * h0).min(h1);
        Ok(if h.is_finite() && h > 0.0 {
            h.clamp(min_step, max_step)
        } else {
            min_step
        })
    }

    fn fail(&mut self, err: Error) -> Error {
        if err.is_terminal() {
            self.phase = Phase::Failed;
            tracing::warn!(error = %err, "integration failed");
        }
        err
    }
}

/// Returns `y + sum(c * k)`.
fn combine(y: &[f64], terms: &[(f64, &[f64])]) -> Vec<f64> {
    let mut out = y.to_vec();
    for &(c, k) in terms {
        for (o, k) in out.iter_mut().zip(k) {
            *o += c * k;
        }
    }
    out
}

fn rms(values: impl Iterator<Item = f64>, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let sum: f64 = values.map(|v| v * v).sum();
    #[allow(clippy::cast_precision_loss)]
    let len = len as f64;
    (sum / len).sqrt()
}

fn derivatives(system: &System, state: &State, step: f64) -> Result<Vec<f64>, Error> {
    system
        .derivatives(state)
        .map_err(|err| Error::derivative(state.time(), step, err))
}

fn realize(system: &System, state: &State, stage: Stage, step: f64) -> Result<(), Error> {
    system
        .realize(state, stage)
        .map_err(|err| Error::derivative(state.time(), step, err))
}

fn trigger_value(
    system: &System,
    trigger: &EventTrigger,
    state: &State,
    step: f64,
) -> Result<f64, Error> {
    realize(system, state, trigger.stage(), step)?;
    Ok(trigger.evaluate(state))
}
