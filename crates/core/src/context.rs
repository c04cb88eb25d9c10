use std::{any::Any, sync::Arc};

use crate::{
    CacheError, DiscreteIndex, Stage, State, SubsystemIndex, state::StateError,
};

/// Execution context passed to realize hooks and stage generators.
///
/// A context is bound to one State, one stage, and one subsystem. It gives
/// read access to the State and to cache entries that are already final, and
/// write access only to the current subsystem's slot for the current stage.
///
/// # Cache visibility
///
/// - Any subsystem's entry at a stage below the current one is readable.
/// - At the current stage, entries of subsystems with a lower index are
///   readable, since they were realized earlier in the same pass. The current
///   subsystem's own entry is readable once written (generators rely on this).
/// - Anything else fails with a [`CacheError`].
pub struct RealizeContext<'a> {
    state: &'a State,
    stage: Stage,
    subsystem: SubsystemIndex,
}

impl<'a> RealizeContext<'a> {
    pub(crate) fn new(state: &'a State, stage: Stage, subsystem: SubsystemIndex) -> Self {
        Self {
            state,
            stage,
            subsystem,
        }
    }

    /// The State being realized.
    pub fn state(&self) -> &'a State {
        self.state
    }

    /// The stage being realized.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The subsystem this context belongs to.
    pub fn subsystem(&self) -> SubsystemIndex {
        self.subsystem
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.state.time()
    }

    /// This subsystem's position-like variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the subsystem is not in the State's layout.
    pub fn q(&self) -> Result<&'a [f64], StateError> {
        self.state.subsystem_q(self.subsystem)
    }

    /// This subsystem's velocity-like variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the subsystem is not in the State's layout.
    pub fn u(&self) -> Result<&'a [f64], StateError> {
        self.state.subsystem_u(self.subsystem)
    }

    /// This subsystem's auxiliary continuous variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the subsystem is not in the State's layout.
    pub fn z(&self) -> Result<&'a [f64], StateError> {
        self.state.subsystem_z(self.subsystem)
    }

    /// One of this subsystem's discrete variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable does not exist.
    pub fn discrete(&self, index: DiscreteIndex) -> Result<f64, StateError> {
        self.state.discrete(self.subsystem, index)
    }

    /// Reads a cache entry that is final at this point of the realize pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not visible yet (see the type docs) or
    /// holds no value of type `T`.
    pub fn cache<T: Any + Send + Sync>(
        &self,
        subsystem: SubsystemIndex,
        stage: Stage,
    ) -> Result<Arc<T>, CacheError> {
        self.check_visible(subsystem, stage)?;
        self.state
            .raw_cache(subsystem, stage)
            .and_then(|value| value.downcast().ok())
            .ok_or(CacheError::Missing { subsystem, stage })
    }

    /// Reads this subsystem's own cache entry for `stage`.
    ///
    /// # Errors
    ///
    /// Returns an error if `stage` is above the current one or holds no `T`.
    pub fn own_cache<T: Any + Send + Sync>(&self, stage: Stage) -> Result<Arc<T>, CacheError> {
        self.cache(self.subsystem, stage)
    }

    /// Reads generator contributions that are final at this point of the pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not visible yet.
    pub fn contributions<T: Any + Send + Sync>(
        &self,
        subsystem: SubsystemIndex,
        stage: Stage,
    ) -> Result<Vec<Arc<T>>, CacheError> {
        self.check_visible(subsystem, stage)?;
        Ok(self.state.raw_contributions(subsystem, stage))
    }

    /// Stores this subsystem's result for the current stage, replacing any
    /// earlier value from the same pass.
    pub fn set_cache<T: Any + Send + Sync>(&mut self, value: T) {
        self.state
            .store_cache(self.subsystem, self.stage, Arc::new(value));
    }

    /// Appends a contribution for the current stage.
    pub fn contribute<T: Any + Send + Sync>(&mut self, value: T) {
        self.state
            .push_contribution(self.subsystem, self.stage, Arc::new(value));
    }

    /// Writes this subsystem's share of `dq/dt`.
    ///
    /// # Errors
    ///
    /// Returns an error outside Velocity..=Acceleration or on a size mismatch.
    pub fn set_qdot(&mut self, values: &[f64]) -> Result<(), CacheError> {
        let range = self.state.slot_range(self.subsystem, |s| &s.q);
        self.write_derivatives(range, values)
    }

    /// Writes this subsystem's share of `du/dt`.
    ///
    /// # Errors
    ///
    /// Returns an error outside Velocity..=Acceleration or on a size mismatch.
    pub fn set_udot(&mut self, values: &[f64]) -> Result<(), CacheError> {
        let range = self.state.slot_range(self.subsystem, |s| &s.u);
        self.write_derivatives(range, values)
    }

    /// Writes this subsystem's share of `dz/dt`.
    ///
    /// # Errors
    ///
    /// Returns an error outside Velocity..=Acceleration or on a size mismatch.
    pub fn set_zdot(&mut self, values: &[f64]) -> Result<(), CacheError> {
        let range = self.state.slot_range(self.subsystem, |s| &s.z);
        self.write_derivatives(range, values)
    }

    fn write_derivatives(
        &self,
        range: Result<std::ops::Range<usize>, StateError>,
        values: &[f64],
    ) -> Result<(), CacheError> {
        if !(Stage::Velocity..=Stage::Acceleration).contains(&self.stage) {
            return Err(CacheError::DerivativeStage { stage: self.stage });
        }
        let range = range.unwrap_or(0..0);
        if range.len() != values.len() {
            return Err(CacheError::DerivativeSize {
                expected: range.len(),
                actual: values.len(),
            });
        }
        self.state.write_derivatives(range, values);
        Ok(())
    }

    fn check_visible(&self, subsystem: SubsystemIndex, stage: Stage) -> Result<(), CacheError> {
        if stage > self.stage {
            return Err(CacheError::NotYetRealized {
                requested: stage,
                current: self.stage,
            });
        }
        if stage == self.stage && subsystem > self.subsystem {
            return Err(CacheError::LaterSubsystem {
                requested: subsystem,
                current: self.subsystem,
                stage,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Allocation, StateLayout};

    fn state_with(subsystems: usize) -> State {
        let allocations: Vec<_> = (0..subsystems)
            .map(|_| {
                let mut alloc = Allocation::default();
                alloc.add_q(&[0.0]).unwrap();
                alloc.add_u(&[0.0]).unwrap();
                alloc
            })
            .collect();
        State::new(Arc::new(StateLayout::from_allocations(&allocations)), 1)
    }

    #[test]
    fn reads_lower_stage_of_any_subsystem() {
        let state = state_with(2);
        state.store_cache(SubsystemIndex::new(1), Stage::Model, Arc::new(3.0_f64));

        let ctx = RealizeContext::new(&state, Stage::Instance, SubsystemIndex::new(0));
        let value = ctx.cache::<f64>(SubsystemIndex::new(1), Stage::Model).unwrap();
        assert_eq!(*value, 3.0);
    }

    #[test]
    fn rejects_higher_stage_and_later_subsystem() {
        let state = state_with(2);
        let ctx = RealizeContext::new(&state, Stage::Position, SubsystemIndex::new(0));

        assert_eq!(
            ctx.cache::<f64>(SubsystemIndex::new(0), Stage::Velocity)
                .unwrap_err(),
            CacheError::NotYetRealized {
                requested: Stage::Velocity,
                current: Stage::Position
            }
        );
        assert!(matches!(
            ctx.cache::<f64>(SubsystemIndex::new(1), Stage::Position),
            Err(CacheError::LaterSubsystem { .. })
        ));
    }

    #[test]
    fn own_entry_is_visible_after_writing() {
        let state = state_with(1);
        let mut ctx = RealizeContext::new(&state, Stage::Time, SubsystemIndex::new(0));

        assert!(matches!(
            ctx.own_cache::<u8>(Stage::Time),
            Err(CacheError::Missing { .. })
        ));
        ctx.set_cache(7_u8);
        assert_eq!(*ctx.own_cache::<u8>(Stage::Time).unwrap(), 7);
    }

    #[test]
    fn derivatives_are_stage_and_size_checked() {
        let state = state_with(2);
        let mut ctx = RealizeContext::new(&state, Stage::Position, SubsystemIndex::new(1));
        assert!(matches!(
            ctx.set_qdot(&[1.0]),
            Err(CacheError::DerivativeStage { .. })
        ));

        let mut ctx = RealizeContext::new(&state, Stage::Acceleration, SubsystemIndex::new(1));
        assert!(matches!(
            ctx.set_udot(&[1.0, 2.0]),
            Err(CacheError::DerivativeSize {
                expected: 1,
                actual: 2
            })
        ));
        ctx.set_qdot(&[1.5]).unwrap();
        ctx.set_udot(&[2.5]).unwrap();

        state.mark_realized(Stage::Topology);
        for stage in Stage::range_inclusive(Stage::Model, Stage::Acceleration) {
            state.mark_realized(stage);
        }
        assert_eq!(state.derivatives(), Some(vec![0.0, 1.5, 0.0, 2.5]));
    }

    #[test]
    fn contributions_keep_production_order() {
        let state = state_with(1);
        let mut ctx = RealizeContext::new(&state, Stage::Report, SubsystemIndex::new(0));
        ctx.contribute("first");
        ctx.contribute(2_i32);
        ctx.contribute("second");

        let strings = ctx
            .contributions::<&'static str>(SubsystemIndex::new(0), Stage::Report)
            .unwrap();
        let strings: Vec<_> = strings.iter().map(|s| **s).collect();
        assert_eq!(strings, vec!["first", "second"]);
    }
}
