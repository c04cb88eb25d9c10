use std::ops::Range;

use thiserror::Error;

use crate::{Stage, SubsystemIndex};

/// Index of a discrete variable, local to the subsystem that declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscreteIndex(usize);

impl DiscreteIndex {
    /// Creates an index from its raw position.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw position.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

/// Errors that can occur while declaring state variables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("discrete variable must invalidate Model or a later stage, got {stage}")]
    DiscreteStage { stage: Stage },

    #[error("non-finite default value for {kind} variable {index}")]
    NonFiniteDefault { kind: &'static str, index: usize },
}

/// Variables declared by one subsystem during layout construction.
///
/// Passed to [`Subsystem::allocate`](crate::Subsystem::allocate) when the
/// System realizes its topology. Each call appends default values to the
/// corresponding partition of the continuous state, or declares a discrete
/// variable along with the stage it invalidates when written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    q: Vec<f64>,
    u: Vec<f64>,
    z: Vec<f64>,
    discrete: Vec<DiscreteVariable>,
}

/// A declared discrete variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscreteVariable {
    /// Stage invalidated when the variable is written.
    pub invalidates: Stage,
    /// Value in the default state.
    pub default: f64,
}

impl Allocation {
    /// Appends position-like variables and returns their subsystem-local range.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NonFiniteDefault`] if any default is not finite.
    pub fn add_q(&mut self, defaults: &[f64]) -> Result<Range<usize>, LayoutError> {
        append(&mut self.q, defaults, "q")
    }

    /// Appends velocity-like variables and returns their subsystem-local range.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NonFiniteDefault`] if any default is not finite.
    pub fn add_u(&mut self, defaults: &[f64]) -> Result<Range<usize>, LayoutError> {
        append(&mut self.u, defaults, "u")
    }

    /// Appends auxiliary continuous variables and returns their subsystem-local range.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NonFiniteDefault`] if any default is not finite.
    pub fn add_z(&mut self, defaults: &[f64]) -> Result<Range<usize>, LayoutError> {
        append(&mut self.z, defaults, "z")
    }

    /// Declares a discrete variable that invalidates `invalidates` when written.
    ///
    /// # Errors
    ///
    /// - [`LayoutError::DiscreteStage`] if `invalidates` is below
    ///   [`Stage::Model`], since the layout itself is fixed at Topology.
    /// - [`LayoutError::NonFiniteDefault`] if `default` is not finite.
    pub fn add_discrete(
        &mut self,
        invalidates: Stage,
        default: f64,
    ) -> Result<DiscreteIndex, LayoutError> {
        if invalidates < Stage::Model {
            return Err(LayoutError::DiscreteStage { stage: invalidates });
        }
        if !default.is_finite() {
            return Err(LayoutError::NonFiniteDefault {
                kind: "discrete",
                index: self.discrete.len(),
            });
        }
        self.discrete.push(DiscreteVariable {
            invalidates,
            default,
        });
        Ok(DiscreteIndex(self.discrete.len() - 1))
    }
}

fn append(
    values: &mut Vec<f64>,
    defaults: &[f64],
    kind: &'static str,
) -> Result<Range<usize>, LayoutError> {
    if let Some(offset) = defaults.iter().position(|v| !v.is_finite()) {
        return Err(LayoutError::NonFiniteDefault {
            kind,
            index: values.len() + offset,
        });
    }
    let start = values.len();
    values.extend_from_slice(defaults);
    Ok(start..values.len())
}

/// Where one subsystem's variables live inside a [`State`](crate::State).
///
/// Continuous ranges are absolute indices into `y = [q | u | z]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemSlots {
    pub q: Range<usize>,
    pub u: Range<usize>,
    pub z: Range<usize>,
    pub discrete: Range<usize>,
}

/// The variable layout of every State built from one System topology.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLayout {
    nq: usize,
    nu: usize,
    nz: usize,
    slots: Vec<SubsystemSlots>,
    discrete: Vec<DiscreteVariable>,
    default_y: Vec<f64>,
}

impl StateLayout {
    /// Builds a layout from per-subsystem allocations, in subsystem order.
    pub(crate) fn from_allocations(allocations: &[Allocation]) -> Self {
        let nq: usize = allocations.iter().map(|a| a.q.len()).sum();
        let nu: usize = allocations.iter().map(|a| a.u.len()).sum();
        let nz: usize = allocations.iter().map(|a| a.z.len()).sum();

        let mut default_y = vec![0.0; nq + nu + nz];
        let mut discrete = Vec::new();
        let mut slots = Vec::with_capacity(allocations.len());
        let (mut iq, mut iu, mut iz) = (0, nq, nq + nu);

        for alloc in allocations {
            let q = iq..iq + alloc.q.len();
            let u = iu..iu + alloc.u.len();
            let z = iz..iz + alloc.z.len();
            default_y[q.clone()].copy_from_slice(&alloc.q);
            default_y[u.clone()].copy_from_slice(&alloc.u);
            default_y[z.clone()].copy_from_slice(&alloc.z);
            (iq, iu, iz) = (q.end, u.end, z.end);

            let start = discrete.len();
            discrete.extend_from_slice(&alloc.discrete);
            slots.push(SubsystemSlots {
                q,
                u,
                z,
                discrete: start..discrete.len(),
            });
        }

        Self {
            nq,
            nu,
            nz,
            slots,
            discrete,
            default_y,
        }
    }

    /// Number of position-like variables.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.nq
    }

    /// Number of velocity-like variables.
    #[must_use]
    pub fn nu(&self) -> usize {
        self.nu
    }

    /// Number of auxiliary continuous variables.
    #[must_use]
    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Total number of continuous variables.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.nq + self.nu + self.nz
    }

    /// Number of subsystems covered by this layout.
    #[must_use]
    pub fn subsystem_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns where a subsystem's variables live, if it exists.
    #[must_use]
    pub fn slots(&self, subsystem: SubsystemIndex) -> Option<&SubsystemSlots> {
        self.slots.get(subsystem.get())
    }

    /// All declared discrete variables, in layout order.
    #[must_use]
    pub fn discrete_variables(&self) -> &[DiscreteVariable] {
        &self.discrete
    }

    /// Resolves a subsystem-local discrete index to its global position.
    pub(crate) fn discrete_position(
        &self,
        subsystem: SubsystemIndex,
        index: DiscreteIndex,
    ) -> Option<usize> {
        let range = &self.slots(subsystem)?.discrete;
        let position = range.start + index.get();
        range.contains(&position).then_some(position)
    }

    pub(crate) fn default_y(&self) -> &[f64] {
        &self.default_y
    }

    /// Returns the stage whose inputs include `y[index]`.
    #[must_use]
    pub fn stage_of_y(&self, index: usize) -> Stage {
        if index < self.nq {
            Stage::Position
        } else if index < self.nq + self.nu {
            Stage::Velocity
        } else {
            Stage::Dynamics
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_are_laid_out_q_then_u_then_z() {
        let mut first = Allocation::default();
        first.add_q(&[1.0, 2.0]).unwrap();
        first.add_u(&[3.0, 4.0]).unwrap();

        let mut second = Allocation::default();
        second.add_q(&[5.0]).unwrap();
        second.add_u(&[6.0]).unwrap();
        second.add_z(&[7.0]).unwrap();

        let layout = StateLayout::from_allocations(&[first, second]);

        assert_eq!((layout.nq(), layout.nu(), layout.nz()), (3, 3, 1));
        assert_eq!(layout.default_y(), &[1.0, 2.0, 5.0, 3.0, 4.0, 6.0, 7.0]);

        let slots = layout.slots(SubsystemIndex::new(1)).unwrap();
        assert_eq!(slots.q, 2..3);
        assert_eq!(slots.u, 5..6);
        assert_eq!(slots.z, 6..7);

        assert_eq!(layout.stage_of_y(2), Stage::Position);
        assert_eq!(layout.stage_of_y(3), Stage::Velocity);
        assert_eq!(layout.stage_of_y(6), Stage::Dynamics);
    }

    #[test]
    fn local_ranges_are_relative_to_the_subsystem() {
        let mut alloc = Allocation::default();
        assert_eq!(alloc.add_q(&[0.0, 0.0]).unwrap(), 0..2);
        assert_eq!(alloc.add_q(&[0.0]).unwrap(), 2..3);
    }

    #[test]
    fn discrete_variables_must_invalidate_model_or_later() {
        let mut alloc = Allocation::default();
        assert_eq!(
            alloc.add_discrete(Stage::Topology, 1.0),
            Err(LayoutError::DiscreteStage {
                stage: Stage::Topology
            })
        );
        assert_eq!(
            alloc.add_discrete(Stage::Instance, 1.0),
            Ok(DiscreteIndex::new(0))
        );
    }

    #[test]
    fn rejects_non_finite_defaults() {
        let mut alloc = Allocation::default();
        alloc.add_u(&[0.0]).unwrap();
        assert_eq!(
            alloc.add_u(&[1.0, f64::NAN]),
            Err(LayoutError::NonFiniteDefault {
                kind: "u",
                index: 2
            })
        );

        alloc.add_discrete(Stage::Model, 1.0).unwrap();
        assert_eq!(
            alloc.add_discrete(Stage::Instance, f64::INFINITY),
            Err(LayoutError::NonFiniteDefault {
                kind: "discrete",
                index: 1
            })
        );
        assert_eq!(alloc.add_discrete(Stage::Instance, 2.0), Ok(DiscreteIndex::new(1)));
    }

    #[test]
    fn resolves_discrete_positions_per_subsystem() {
        let mut first = Allocation::default();
        first.add_discrete(Stage::Model, 0.0).unwrap();
        let mut second = Allocation::default();
        second.add_discrete(Stage::Time, 0.0).unwrap();
        second.add_discrete(Stage::Dynamics, 0.0).unwrap();

        let layout = StateLayout::from_allocations(&[first, second]);
        let second_index = SubsystemIndex::new(1);

        assert_eq!(
            layout.discrete_position(second_index, DiscreteIndex::new(1)),
            Some(2)
        );
        assert_eq!(
            layout.discrete_position(second_index, DiscreteIndex::new(2)),
            None
        );
    }
}
