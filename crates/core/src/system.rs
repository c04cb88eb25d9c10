//! Ordered composition of subsystems and stage-by-stage realization.
//!
//! # Realization
//!
//! [`System::realize`] brings a [`State`] valid through a requested stage. It
//! computes only the stages that are not valid yet, in ascending order. For
//! each stage every subsystem's hook runs in insertion order, each followed by
//! the generators registered for it at that stage, before the next stage
//! starts. The first failure aborts the pass and identifies the subsystem and
//! stage; stages completed before the failure stay valid.
//!
//! # Topology
//!
//! Adding subsystems, changing their topology-level data, and registering
//! generators all invalidate the System topology. [`System::realize_topology`]
//! rebuilds the State layout and the default State. States created before
//! that are rejected by [`System::realize`], because every cached stage may
//! depend on the topology.
//!
//! Topology-changing operations take `&mut self`. Anything that borrows the
//! System for a longer computation, such as an integrator, therefore excludes
//! them for its whole lifetime.


use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    Allocation, Error, Precondition, RealizeContext, Stage, StageGenerator, StageMap, State,
    StateLayout, Subsystem, SubsystemError, SubsystemIndex, subsystem::dispatch,
};

/// Source of topology identities, unique across every System in the process.
static NEXT_TOPOLOGY: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct Entry {
    subsystem: Box<dyn Subsystem>,
    generators: StageMap<Vec<Box<dyn StageGenerator>>>,
}

/// An ordered set of subsystems realized together against States.
///
/// A System never owns a working State. Any number of States can be realized
/// against the same System, each independently.
pub struct System {
    name: String,
    entries: Vec<Entry>,
    default_state: Option<Mutex<State>>,
    topology_version: u64,
    topology: u64,
}

impl System {
    /// Creates an empty System.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            default_state: None,
            topology_version: 0,
            topology: 0,
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a subsystem and returns its index.
    ///
    /// Later subsystems may read the same-stage results of earlier ones.
    /// This is a topology change.
    pub fn add_subsystem<S: Subsystem>(&mut self, subsystem: S) -> SubsystemIndex {
        self.invalidate_topology();
        self.entries.push(Entry {
            subsystem: Box::new(subsystem),
            generators: StageMap::default(),
        });
        SubsystemIndex::new(self.entries.len() - 1)
    }

    /// Number of subsystems.
    #[must_use]
    pub fn subsystem_count(&self) -> usize {
        self.entries.len()
    }

    /// Name of the subsystem at `index`, if any.
    #[must_use]
    pub fn subsystem_name(&self, index: SubsystemIndex) -> Option<&str> {
        self.entries
            .get(index.get())
            .map(|entry| entry.subsystem.name())
    }

    /// Returns the subsystem at `index` as its concrete type.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no such subsystem or it is not an `S`.
    pub fn subsystem<S: Subsystem>(&self, index: SubsystemIndex) -> Result<&S, Error> {
        let entry = self.entry(index)?;
        entry
            .subsystem
            .as_any()
            .downcast_ref()
            .ok_or(Error::SubsystemType {
                index,
                expected: std::any::type_name::<S>(),
            })
    }

    /// Applies a topology-level change to the subsystem at `index`.
    ///
    /// Use this to add permanent structure to a subsystem, such as fixed
    /// geometry or extra bodies. The System topology is invalidated whether
    /// or not `change` actually modifies anything.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no such subsystem or it is not an `S`.
    pub fn add_topological_contribution<S: Subsystem, R>(
        &mut self,
        index: SubsystemIndex,
        change: impl FnOnce(&mut S) -> R,
    ) -> Result<R, Error> {
        let entry = self
            .entries
            .get_mut(index.get())
            .ok_or(Error::UnknownSubsystem(index))?;
        let subsystem = entry
            .subsystem
            .as_any_mut()
            .downcast_mut::<S>()
            .ok_or(Error::SubsystemType {
                index,
                expected: std::any::type_name::<S>(),
            })?;
        let result = change(subsystem);
        self.invalidate_topology();
        Ok(result)
    }

    /// Registers a generator to run after the subsystem's own `stage` hook.
    ///
    /// Generators for the same subsystem and stage run in registration order.
    /// This is a topology change.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no such subsystem or `stage` is
    /// [`Stage::Empty`].
    pub fn register_stage_generator<G: StageGenerator + 'static>(
        &mut self,
        index: SubsystemIndex,
        stage: Stage,
        generator: G,
    ) -> Result<(), Error> {
        if stage == Stage::Empty {
            return Err(Error::GeneratorStage(stage));
        }
        let entry = self
            .entries
            .get_mut(index.get())
            .ok_or(Error::UnknownSubsystem(index))?;
        entry.generators[stage].push(Box::new(generator));
        self.invalidate_topology();
        Ok(())
    }

    /// Number of generators registered for a subsystem at a stage.
    #[must_use]
    pub fn generator_count(&self, index: SubsystemIndex, stage: Stage) -> usize {
        self.entries
            .get(index.get())
            .map_or(0, |entry| entry.generators[stage].len())
    }

    // --- Topology ---

    /// Returns true if the topology is realized and unchanged since.
    #[must_use]
    pub fn is_topology_realized(&self) -> bool {
        self.default_state.is_some()
    }

    /// Counts topology realizations of this System.
    #[must_use]
    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    /// Builds the State layout, realizes the Topology stage, and returns a
    /// copy of the new default State.
    ///
    /// # Errors
    ///
    /// Returns an error if a subsystem declares an invalid layout or fails to
    /// realize its topology. The topology stays unrealized in that case.
    pub fn realize_topology(&mut self) -> Result<State, Error> {
        self.invalidate_topology();
        self.topology_version += 1;
        self.topology = NEXT_TOPOLOGY.fetch_add(1, Ordering::Relaxed);

        let allocations = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut alloc = Allocation::default();
                entry
                    .subsystem
                    .allocate(&mut alloc)
                    .map_err(|source| Error::Layout {
                        index: SubsystemIndex::new(i),
                        name: entry.subsystem.name().to_string(),
                        source,
                    })?;
                Ok(alloc)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let layout = Arc::new(StateLayout::from_allocations(&allocations));
        let state = State::new(layout, self.topology);
        self.realize_stage(&state, Stage::Topology)?;
        state.mark_realized(Stage::Topology);

        tracing::debug!(
            system = %self.name,
            version = self.topology_version,
            subsystems = self.entries.len(),
            ny = state.ny(),
            "realized topology"
        );

        self.default_state = Some(Mutex::new(state.clone()));
        Ok(state)
    }

    /// Returns a copy of the default State, valid through Topology.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StagePrecondition`] if the topology is not realized.
    pub fn default_state(&self) -> Result<State, Error> {
        let default = self.realized_default(Stage::Topology)?;
        let state = default
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(state)
    }

    fn realized_default(&self, requested: Stage) -> Result<&Mutex<State>, Error> {
        self.default_state
            .as_ref()
            .ok_or(Error::StagePrecondition {
                requested,
                reason: if self.topology_version == 0 {
                    Precondition::TopologyNotRealized
                } else {
                    Precondition::TopologyStale
                },
            })
    }

    fn invalidate_topology(&mut self) {
        if self.default_state.take().is_some() {
            tracing::trace!(system = %self.name, "topology invalidated");
        }
    }

    // --- Realization ---

    /// Brings `state` valid through `stage`.
    ///
    /// Stages already valid are not recomputed, so realizing the same stage
    /// twice without an intervening change does no work the second time.
    ///
    /// # Errors
    ///
    /// - [`Error::StagePrecondition`] if the System topology is not realized,
    ///   `state` was built for another topology, or its Topology stage was
    ///   invalidated. These are never corrected automatically.
    /// - [`Error::Subsystem`] if a hook or generator fails.
    pub fn realize(&self, state: &State, stage: Stage) -> Result<(), Error> {
        if stage == Stage::Empty {
            return Ok(());
        }
        self.check_preconditions(state, stage)?;

        let Some(first) = state.valid_through().next() else {
            return Ok(());
        };
        for next in Stage::range_inclusive(first, stage) {
            self.realize_stage(state, next)?;
            state.mark_realized(next);
            tracing::trace!(system = %self.name, stage = %next, "realized stage");
        }
        Ok(())
    }

    /// Realizes `state` through Acceleration and returns `dy/dt`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`System::realize`].
    pub fn derivatives(&self, state: &State) -> Result<Vec<f64>, Error> {
        self.realize(state, Stage::Acceleration)?;
        Ok(state.derivatives_unchecked())
    }

    fn check_preconditions(&self, state: &State, requested: Stage) -> Result<(), Error> {
        self.realized_default(requested)?;

        let violation = if state.topology() != self.topology {
            Some(Precondition::StaleState)
        } else if !state.is_realized(Stage::Topology) {
            Some(Precondition::StateTopologyInvalid)
        } else {
            None
        };

        match violation {
            Some(reason) => Err(Error::StagePrecondition { requested, reason }),
            None => Ok(()),
        }
    }

    fn realize_stage(&self, state: &State, stage: Stage) -> Result<(), Error> {
        state.clear_stage(stage);

        for (i, entry) in self.entries.iter().enumerate() {
            let index = SubsystemIndex::new(i);
            let mut ctx = RealizeContext::new(state, stage, index);

            dispatch(entry.subsystem.as_ref(), &mut ctx)
                .map_err(|source| self.subsystem_error(index, stage, source))?;

            for generator in &entry.generators[stage] {
                generator
                    .generate(&mut ctx)
                    .map_err(|source| self.subsystem_error(index, stage, source))?;
            }
        }
        Ok(())
    }

    fn subsystem_error(
        &self,
        index: SubsystemIndex,
        stage: Stage,
        source: SubsystemError,
    ) -> Error {
        let (name, version) = self
            .entries
            .get(index.get())
            .map(|entry| (entry.subsystem.name(), entry.subsystem.version()))
            .unwrap_or_default();
        tracing::debug!(
            system = %self.name,
            subsystem = %name,
            version = %version,
            stage = %stage,
            error = %source,
            "subsystem failed to realize stage"
        );
        Error::Subsystem {
            index,
            name: name.to_string(),
            version: version.to_string(),
            stage,
            source,
        }
    }

    fn entry(&self, index: SubsystemIndex) -> Result<&Entry, Error> {
        self.entries
            .get(index.get())
            .ok_or(Error::UnknownSubsystem(index))
    }
}

impl Clone for System {
    /// Deep-copies every subsystem and generator.
    ///
    /// The copy shares no mutable data with the original. States realized
    /// against one remain valid against the other until either realizes its
    /// topology again.
    fn clone(&self) -> Self {
        let default_state = self.default_state.as_ref().map(|state| {
            Mutex::new(
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            )
        });
        Self {
            name: self.name.clone(),
            entries: self.entries.clone(),
            default_state,
            topology_version: self.topology_version,
            topology: self.topology,
        }
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.entries.iter().map(|e| e.subsystem.name()).collect();
        f.debug_struct("System")
            .field("name", &self.name)
            .field("subsystems", &names)
            .field("topology_version", &self.topology_version)
            .field("topology_realized", &self.is_topology_realized())
            .finish()
    }
}
