//! Simulation state: variables plus a staged, lazily filled cache.
//!
//! A [`State`] behaves like a value. Its inputs (time, continuous variables,
//! discrete variables) change only through `&mut self` methods, and every such
//! write invalidates the stage the input belongs to along with every stage
//! above it.
//!
//! The cache is interior-mutable: [`System::realize`](crate::System::realize)
//! fills it through `&State`. Cached values are stored behind [`Arc`] and
//! never mutated after they are written, so a cloned State shares realized
//! results with its source without aliasing anything mutable. Because the
//! cache uses [`RefCell`], a State is `Send` but not `Sync`.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    ops::Range,
    sync::Arc,
};

use thiserror::Error;

use crate::{
    DiscreteIndex, Stage, StageMap, StateLayout, SubsystemIndex, checkpoint::Checkpoint,
};

pub(crate) type CacheValue = Arc<dyn Any + Send + Sync>;

/// Errors from accessing or writing State variables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("expected {expected} {what} values, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("subsystem {0} is not part of this state's layout")]
    UnknownSubsystem(SubsystemIndex),

    #[error("subsystem {subsystem} has no discrete variable {}", .index.get())]
    UnknownDiscrete {
        subsystem: SubsystemIndex,
        index: DiscreteIndex,
    },
}

#[derive(Clone, Default)]
struct CacheSlot {
    value: Option<CacheValue>,
    contributions: Vec<CacheValue>,
}

#[derive(Clone)]
struct Cache {
    slots: StageMap<Vec<CacheSlot>>,
    ydot: Vec<f64>,
}

/// Time, variables, and staged cache for one configuration of a System.
#[derive(Clone)]
pub struct State {
    layout: Arc<StateLayout>,
    topology: u64,
    time: f64,
    y: Vec<f64>,
    discrete: Vec<f64>,
    valid_through: Cell<Stage>,
    cache: RefCell<Cache>,
}

impl State {
    /// Creates a State with default values for `layout`, valid through nothing.
    ///
    /// `topology` identifies the topology realization the State belongs to.
    pub(crate) fn new(layout: Arc<StateLayout>, topology: u64) -> Self {
        let subsystems = layout.subsystem_count();
        let y = layout.default_y().to_vec();
        let discrete = layout
            .discrete_variables()
            .iter()
            .map(|var| var.default)
            .collect();
        let cache = Cache {
            slots: StageMap::from_fn(|_| vec![CacheSlot::default(); subsystems]),
            ydot: vec![0.0; y.len()],
        };

        Self {
            layout,
            topology,
            time: 0.0,
            y,
            discrete,
            valid_through: Cell::new(Stage::Empty),
            cache: RefCell::new(cache),
        }
    }

    /// The variable layout this State was built with.
    #[must_use]
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub(crate) fn topology(&self) -> u64 {
        self.topology
    }

    // --- Validity ---

    /// The highest stage whose cache is currently valid.
    #[must_use]
    pub fn valid_through(&self) -> Stage {
        self.valid_through.get()
    }

    /// Returns true if the State is valid through `stage`.
    #[must_use]
    pub fn is_realized(&self, stage: Stage) -> bool {
        self.valid_through.get() >= stage
    }

    /// Invalidates `stage` and every stage above it.
    ///
    /// The valid-through marker drops to `stage.prev()` unless it is already
    /// lower. Cached results below `stage` are kept. Invalidating
    /// [`Stage::Empty`] is treated as invalidating [`Stage::Topology`].
    pub fn invalidate(&mut self, stage: Stage) {
        self.discard_from(stage.max(Stage::LOWEST));
    }

    fn discard_from(&self, stage: Stage) {
        if self.valid_through.get() >= stage {
            self.valid_through.set(stage.prev());
        }
        let mut cache = self.cache.borrow_mut();
        for row in cache.slots.iter_from_mut(stage) {
            row.iter_mut().for_each(|slot| *slot = CacheSlot::default());
        }
    }

    /// Marks `stage` valid once every subsystem has realized it.
    pub(crate) fn mark_realized(&self, stage: Stage) {
        debug_assert_eq!(self.valid_through.get().next(), Some(stage));
        self.valid_through.set(stage);
    }

    /// Drops any partial results for `stage` before it is recomputed.
    pub(crate) fn clear_stage(&self, stage: Stage) {
        let mut cache = self.cache.borrow_mut();
        cache.slots[stage]
            .iter_mut()
            .for_each(|slot| *slot = CacheSlot::default());
        if stage == Stage::Velocity {
            cache.ydot.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    // --- Time and continuous variables ---

    /// Current simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Sets the time, invalidating [`Stage::Time`] and above.
    pub fn set_time(&mut self, time: f64) {
        self.discard_from(Stage::Time);
        self.time = time;
    }

    /// Number of continuous variables.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.y.len()
    }

    /// Number of position-like variables.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.layout.nq()
    }

    /// Number of velocity-like variables.
    #[must_use]
    pub fn nu(&self) -> usize {
        self.layout.nu()
    }

    /// Number of auxiliary continuous variables.
    #[must_use]
    pub fn nz(&self) -> usize {
        self.layout.nz()
    }

    /// All continuous variables, `y = [q | u | z]`.
    #[must_use]
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Position-like variables.
    #[must_use]
    pub fn q(&self) -> &[f64] {
        &self.y[self.q_range()]
    }

    /// Velocity-like variables.
    #[must_use]
    pub fn u(&self) -> &[f64] {
        &self.y[self.u_range()]
    }

    /// Auxiliary continuous variables.
    #[must_use]
    pub fn z(&self) -> &[f64] {
        &self.y[self.z_range()]
    }

    /// Mutable access to all continuous variables.
    ///
    /// Invalidates [`Stage::Position`] and above.
    pub fn update_y(&mut self) -> &mut [f64] {
        self.discard_from(Stage::Position);
        &mut self.y
    }

    /// Mutable access to position-like variables.
    ///
    /// Invalidates [`Stage::Position`] and above.
    pub fn update_q(&mut self) -> &mut [f64] {
        self.discard_from(Stage::Position);
        let range = self.q_range();
        &mut self.y[range]
    }

    /// Mutable access to velocity-like variables.
    ///
    /// Invalidates [`Stage::Velocity`] and above.
    pub fn update_u(&mut self) -> &mut [f64] {
        self.discard_from(Stage::Velocity);
        let range = self.u_range();
        &mut self.y[range]
    }

    /// Mutable access to auxiliary continuous variables.
    ///
    /// Invalidates [`Stage::Dynamics`] and above.
    pub fn update_z(&mut self) -> &mut [f64] {
        self.discard_from(Stage::Dynamics);
        let range = self.z_range();
        &mut self.y[range]
    }

    /// Replaces all continuous variables.
    ///
    /// Invalidates [`Stage::Position`] and above.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SizeMismatch`] if `y` has the wrong length.
    pub fn set_y(&mut self, y: &[f64]) -> Result<(), StateError> {
        if y.len() != self.y.len() {
            return Err(StateError::SizeMismatch {
                what: "continuous",
                expected: self.y.len(),
                actual: y.len(),
            });
        }
        self.update_y().copy_from_slice(y);
        Ok(())
    }

    /// A subsystem's position-like variables.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSubsystem`] if the subsystem is not in the layout.
    pub fn subsystem_q(&self, subsystem: SubsystemIndex) -> Result<&[f64], StateError> {
        let range = self.slot_range(subsystem, |s| &s.q)?;
        Ok(&self.y[range])
    }

    /// A subsystem's velocity-like variables.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSubsystem`] if the subsystem is not in the layout.
    pub fn subsystem_u(&self, subsystem: SubsystemIndex) -> Result<&[f64], StateError> {
        let range = self.slot_range(subsystem, |s| &s.u)?;
        Ok(&self.y[range])
    }

    /// A subsystem's auxiliary continuous variables.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSubsystem`] if the subsystem is not in the layout.
    pub fn subsystem_z(&self, subsystem: SubsystemIndex) -> Result<&[f64], StateError> {
        let range = self.slot_range(subsystem, |s| &s.z)?;
        Ok(&self.y[range])
    }

    /// Mutable access to a subsystem's position-like variables.
    ///
    /// Invalidates [`Stage::Position`] and above.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSubsystem`] if the subsystem is not in the layout.
    pub fn update_subsystem_q(
        &mut self,
        subsystem: SubsystemIndex,
    ) -> Result<&mut [f64], StateError> {
        let range = self.slot_range(subsystem, |s| &s.q)?;
        self.discard_from(Stage::Position);
        Ok(&mut self.y[range])
    }

    /// Mutable access to a subsystem's velocity-like variables.
    ///
    /// Invalidates [`Stage::Velocity`] and above.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSubsystem`] if the subsystem is not in the layout.
    pub fn update_subsystem_u(
        &mut self,
        subsystem: SubsystemIndex,
    ) -> Result<&mut [f64], StateError> {
        let range = self.slot_range(subsystem, |s| &s.u)?;
        self.discard_from(Stage::Velocity);
        Ok(&mut self.y[range])
    }

    /// Mutable access to a subsystem's auxiliary continuous variables.
    ///
    /// Invalidates [`Stage::Dynamics`] and above.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSubsystem`] if the subsystem is not in the layout.
    pub fn update_subsystem_z(
        &mut self,
        subsystem: SubsystemIndex,
    ) -> Result<&mut [f64], StateError> {
        let range = self.slot_range(subsystem, |s| &s.z)?;
        self.discard_from(Stage::Dynamics);
        Ok(&mut self.y[range])
    }

    fn q_range(&self) -> Range<usize> {
        0..self.layout.nq()
    }

    fn u_range(&self) -> Range<usize> {
        let nq = self.layout.nq();
        nq..nq + self.layout.nu()
    }

    fn z_range(&self) -> Range<usize> {
        let start = self.layout.nq() + self.layout.nu();
        start..start + self.layout.nz()
    }

    pub(crate) fn slot_range(
        &self,
        subsystem: SubsystemIndex,
        pick: impl FnOnce(&crate::layout::SubsystemSlots) -> &Range<usize>,
    ) -> Result<Range<usize>, StateError> {
        self.layout
            .slots(subsystem)
            .map(|slots| pick(slots).clone())
            .ok_or(StateError::UnknownSubsystem(subsystem))
    }

    // --- Discrete variables ---

    /// All discrete variables, in layout order.
    #[must_use]
    pub fn discrete_values(&self) -> &[f64] {
        &self.discrete
    }

    /// Reads a subsystem's discrete variable.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownDiscrete`] if the variable does not exist.
    pub fn discrete(
        &self,
        subsystem: SubsystemIndex,
        index: DiscreteIndex,
    ) -> Result<f64, StateError> {
        let position = self.discrete_position(subsystem, index)?;
        Ok(self.discrete[position])
    }

    /// Writes a subsystem's discrete variable.
    ///
    /// Invalidates the stage the variable was declared with, and above.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownDiscrete`] if the variable does not exist.
    pub fn set_discrete(
        &mut self,
        subsystem: SubsystemIndex,
        index: DiscreteIndex,
        value: f64,
    ) -> Result<(), StateError> {
        let position = self.discrete_position(subsystem, index)?;
        let stage = self.layout.discrete_variables()[position].invalidates;
        self.discard_from(stage);
        self.discrete[position] = value;
        Ok(())
    }

    fn discrete_position(
        &self,
        subsystem: SubsystemIndex,
        index: DiscreteIndex,
    ) -> Result<usize, StateError> {
        self.layout
            .discrete_position(subsystem, index)
            .ok_or(StateError::UnknownDiscrete { subsystem, index })
    }

    // --- Cache ---

    /// Returns a subsystem's cached value for a realized stage.
    ///
    /// Returns `None` if the stage is not realized, the subsystem stored
    /// nothing there, or the stored value is not a `T`.
    #[must_use]
    pub fn cache<T: Any + Send + Sync>(
        &self,
        subsystem: SubsystemIndex,
        stage: Stage,
    ) -> Option<Arc<T>> {
        if !self.is_realized(stage) {
            return None;
        }
        self.raw_cache(subsystem, stage)?.downcast().ok()
    }

    /// Returns the generator contributions of type `T` for a realized stage.
    ///
    /// Contributions are returned in the order they were produced.
    #[must_use]
    pub fn contributions<T: Any + Send + Sync>(
        &self,
        subsystem: SubsystemIndex,
        stage: Stage,
    ) -> Vec<Arc<T>> {
        if !self.is_realized(stage) {
            return Vec::new();
        }
        self.raw_contributions(subsystem, stage)
    }

    /// Returns the realized time derivative of `y`.
    ///
    /// Returns `None` unless the State is realized through [`Stage::Acceleration`].
    #[must_use]
    pub fn derivatives(&self) -> Option<Vec<f64>> {
        self.is_realized(Stage::Acceleration)
            .then(|| self.derivatives_unchecked())
    }

    pub(crate) fn derivatives_unchecked(&self) -> Vec<f64> {
        self.cache.borrow().ydot.clone()
    }

    pub(crate) fn raw_cache(&self, subsystem: SubsystemIndex, stage: Stage) -> Option<CacheValue> {
        let cache = self.cache.borrow();
        cache.slots[stage].get(subsystem.get())?.value.clone()
    }

    pub(crate) fn raw_contributions<T: Any + Send + Sync>(
        &self,
        subsystem: SubsystemIndex,
        stage: Stage,
    ) -> Vec<Arc<T>> {
        let cache = self.cache.borrow();
        cache.slots[stage]
            .get(subsystem.get())
            .map(|slot| {
                slot.contributions
                    .iter()
                    .filter_map(|value| Arc::clone(value).downcast().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn store_cache(&self, subsystem: SubsystemIndex, stage: Stage, value: CacheValue) {
        let mut cache = self.cache.borrow_mut();
        if let Some(slot) = cache.slots[stage].get_mut(subsystem.get()) {
            slot.value = Some(value);
        }
    }

    pub(crate) fn push_contribution(
        &self,
        subsystem: SubsystemIndex,
        stage: Stage,
        value: CacheValue,
    ) {
        let mut cache = self.cache.borrow_mut();
        if let Some(slot) = cache.slots[stage].get_mut(subsystem.get()) {
            slot.contributions.push(value);
        }
    }

    pub(crate) fn write_derivatives(&self, range: Range<usize>, values: &[f64]) {
        self.cache.borrow_mut().ydot[range].copy_from_slice(values);
    }

    // --- Persistence ---

    /// Captures time and all variables. The cache is not included.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            time: self.time,
            q: self.q().to_vec(),
            u: self.u().to_vec(),
            z: self.z().to_vec(),
            discrete: self.discrete.clone(),
        }
    }

    /// Restores time and all variables from a checkpoint.
    ///
    /// Invalidates [`Stage::Model`] and above; the cache is rebuilt on the
    /// next realization.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SizeMismatch`] if the checkpoint was taken from
    /// a State with a different layout. The State is unchanged in that case.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), StateError> {
        let expect = |what, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(StateError::SizeMismatch {
                    what,
                    expected,
                    actual,
                })
            }
        };
        expect("q", self.nq(), checkpoint.q.len())?;
        expect("u", self.nu(), checkpoint.u.len())?;
        expect("z", self.nz(), checkpoint.z.len())?;
        expect("discrete", self.discrete.len(), checkpoint.discrete.len())?;

        self.discard_from(Stage::Model);
        self.time = checkpoint.time;
        let (nq, nu) = (self.nq(), self.nu());
        self.y[..nq].copy_from_slice(&checkpoint.q);
        self.y[nq..nq + nu].copy_from_slice(&checkpoint.u);
        self.y[nq + nu..].copy_from_slice(&checkpoint.z);
        self.discrete.copy_from_slice(&checkpoint.discrete);
        Ok(())
    }
}

impl Default for State {
    /// An empty State with no layout and nothing realized.
    ///
    /// It cannot be realized against any System; obtain usable States from
    /// [`System::default_state`](crate::System::default_state).
    fn default() -> Self {
        Self::new(Arc::new(StateLayout::from_allocations(&[])), 0)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("time", &self.time)
            .field("q", &self.q())
            .field("u", &self.u())
            .field("z", &self.z())
            .field("discrete", &self.discrete)
            .field("valid_through", &self.valid_through.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::Allocation;

    fn state() -> State {
        let mut alloc = Allocation::default();
        alloc.add_q(&[1.0, 2.0]).unwrap();
        alloc.add_u(&[3.0]).unwrap();
        alloc.add_z(&[4.0]).unwrap();
        alloc.add_discrete(Stage::Instance, 5.0).unwrap();
        let layout = StateLayout::from_allocations(&[alloc]);
        State::new(Arc::new(layout), 1)
    }

    /// Pretends every stage through `stage` was realized, storing a marker.
    fn fake_realize(state: &State, stage: Stage) {
        for s in Stage::range_inclusive(state.valid_through().next().unwrap(), stage) {
            state.store_cache(SubsystemIndex::new(0), s, Arc::new(s.index()));
            state.mark_realized(s);
        }
    }

    #[test]
    fn starts_with_defaults_and_nothing_valid() {
        let state = state();
        assert_eq!(state.q(), &[1.0, 2.0]);
        assert_eq!(state.u(), &[3.0]);
        assert_eq!(state.z(), &[4.0]);
        assert_eq!(state.discrete_values(), &[5.0]);
        assert_eq!(state.valid_through(), Stage::Empty);
    }

    #[test]
    fn each_input_invalidates_its_own_stage_and_above() {
        let cases: [(Stage, fn(&mut State)); 5] = [
            (Stage::Time, |s| s.set_time(1.0)),
            (Stage::Position, |s| s.update_q()[0] = 0.5),
            (Stage::Velocity, |s| s.update_u()[0] = 0.5),
            (Stage::Dynamics, |s| s.update_z()[0] = 0.5),
            (Stage::Instance, |s| {
                s.set_discrete(SubsystemIndex::new(0), DiscreteIndex::new(0), 9.0)
                    .unwrap();
            }),
        ];

        for (stage, mutate) in cases {
            let mut state = state();
            fake_realize(&state, Stage::Report);
            mutate(&mut state);

            assert_eq!(state.valid_through(), stage.prev(), "writing {stage}");
            let sub = SubsystemIndex::new(0);
            for below in Stage::range_inclusive(Stage::Topology, stage.prev()) {
                assert!(state.cache::<usize>(sub, below).is_some());
            }
            for above in Stage::range_inclusive(stage, Stage::Report) {
                assert!(state.raw_cache(sub, above).is_none());
            }
        }
    }

    #[test]
    fn invalidation_never_raises_the_marker() {
        let mut state = state();
        fake_realize(&state, Stage::Model);
        state.invalidate(Stage::Dynamics);
        assert_eq!(state.valid_through(), Stage::Model);
    }

    #[test]
    fn invalidating_empty_clears_topology() {
        let mut state = state();
        fake_realize(&state, Stage::Velocity);
        state.invalidate(Stage::Empty);
        assert_eq!(state.valid_through(), Stage::Empty);
    }

    #[test]
    fn cache_is_hidden_until_realized() {
        let state = state();
        let sub = SubsystemIndex::new(0);
        state.store_cache(sub, Stage::Topology, Arc::new(42_u32));

        assert!(state.cache::<u32>(sub, Stage::Topology).is_none());
        state.mark_realized(Stage::Topology);
        assert_eq!(state.cache::<u32>(sub, Stage::Topology).as_deref(), Some(&42));
        assert!(state.cache::<f64>(sub, Stage::Topology).is_none());
    }

    #[test]
    fn set_y_checks_length() {
        let mut state = state();
        assert_eq!(
            state.set_y(&[0.0; 3]),
            Err(StateError::SizeMismatch {
                what: "continuous",
                expected: 4,
                actual: 3
            })
        );
        state.set_y(&[0.0, 0.1, 0.2, 0.3]).unwrap();
        assert_relative_eq!(state.u()[0], 0.2);
    }

    #[test]
    fn unknown_discrete_is_an_error() {
        let state = state();
        let err = state
            .discrete(SubsystemIndex::new(0), DiscreteIndex::new(3))
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownDiscrete { .. }));
    }

    #[test]
    fn clones_do_not_share_later_cache_writes() {
        let state = state();
        fake_realize(&state, Stage::Model);
        let mut copy = state.clone();

        copy.invalidate(Stage::Model);
        assert!(state.cache::<usize>(SubsystemIndex::new(0), Stage::Model).is_some());
        assert!(copy.cache::<usize>(SubsystemIndex::new(0), Stage::Model).is_none());
    }

    #[test]
    fn checkpoint_restores_variables_and_drops_cache() {
        let mut original = state();
        original.set_time(2.5);
        original.update_z()[0] = -1.0;
        let checkpoint = original.checkpoint();

        let mut restored = state();
        fake_realize(&restored, Stage::Acceleration);
        restored.restore(&checkpoint).unwrap();

        assert_relative_eq!(restored.time(), 2.5);
        assert_eq!(restored.y(), original.y());
        assert_eq!(restored.valid_through(), Stage::Topology);
    }

    #[test]
    fn restore_rejects_mismatched_layout() {
        let mut state = state();
        let mut checkpoint = state.checkpoint();
        checkpoint.u.push(0.0);

        assert!(matches!(
            state.restore(&checkpoint),
            Err(StateError::SizeMismatch { what: "u", .. })
        ));
    }
}
