//! A damped mass-spring system split across three subsystems.
//!
//! The mass integrates `x' = v, v' = F / m`. Each force element caches its
//! force at Dynamics, and the mass sums those at Acceleration together with
//! any `f64` forces generators contribute to the mass itself at Dynamics.

use std::any::Any;

use strata_core::{
    Allocation, DiscreteIndex, LayoutError, RealizeContext, RealizeResult, Stage, State,
    Subsystem, SubsystemIndex, System,
};

/// The mass value, stored as a discrete variable of [`Mass`].
pub const MASS: DiscreteIndex = DiscreteIndex::new(0);

/// A point mass on a line.
#[derive(Debug, Clone)]
pub struct Mass {
    pub position: f64,
    pub velocity: f64,
    pub mass: f64,
    forces: Vec<SubsystemIndex>,
}

impl Mass {
    #[must_use]
    pub fn new(mass: f64, position: f64, velocity: f64) -> Self {
        Self {
            position,
            velocity,
            mass,
            forces: Vec::new(),
        }
    }

    /// Adds a force element whose Dynamics cache acts on this mass.
    pub fn attach(&mut self, force: SubsystemIndex) {
        self.forces.push(force);
    }

    #[must_use]
    pub fn forces(&self) -> &[SubsystemIndex] {
        &self.forces
    }
}

impl Subsystem for Mass {
    fn name(&self) -> &str {
        "mass"
    }

    fn allocate(&self, alloc: &mut Allocation) -> Result<(), LayoutError> {
        alloc.add_q(&[self.position])?;
        alloc.add_u(&[self.velocity])?;
        alloc.add_discrete(Stage::Instance, self.mass)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Subsystem> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn realize_acceleration(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
        let mass = ctx.discrete(MASS)?;
        let velocity = ctx.u()?[0];

        let mut force = 0.0;
        for &element in &self.forces {
            force += *ctx.cache::<f64>(element, Stage::Dynamics)?;
        }
        for external in ctx.contributions::<f64>(ctx.subsystem(), Stage::Dynamics)? {
            force += *external;
        }

        ctx.set_qdot(&[velocity])?;
        ctx.set_udot(&[force / mass])?;
        Ok(())
    }

    /// Caches the kinetic energy.
    fn realize_report(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
        let mass = ctx.discrete(MASS)?;
        let velocity = ctx.u()?[0];
        ctx.set_cache(0.5 * mass * velocity * velocity);
        Ok(())
    }
}

/// A linear spring anchored at the origin.
#[derive(Debug, Clone)]
pub struct Spring {
    pub mass: SubsystemIndex,
    pub stiffness: f64,
}

impl Subsystem for Spring {
    fn name(&self) -> &str {
        "spring"
    }

    fn clone_box(&self) -> Box<dyn Subsystem> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn realize_dynamics(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
        let position = ctx.state().subsystem_q(self.mass)?[0];
        ctx.set_cache(-self.stiffness * position);
        Ok(())
    }

    /// Caches the potential energy.
    fn realize_report(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
        let position = ctx.state().subsystem_q(self.mass)?[0];
        ctx.set_cache(0.5 * self.stiffness * position * position);
        Ok(())
    }
}

/// A linear viscous damper.
#[derive(Debug, Clone)]
pub struct Damper {
    pub mass: SubsystemIndex,
    pub coefficient: f64,
}

impl Subsystem for Damper {
    fn name(&self) -> &str {
        "damper"
    }

    fn clone_box(&self) -> Box<dyn Subsystem> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn realize_dynamics(&self, ctx: &mut RealizeContext<'_>) -> RealizeResult {
        let velocity = ctx.state().subsystem_u(self.mass)?[0];
        ctx.set_cache(-self.coefficient * velocity);
        Ok(())
    }
}

/// Subsystem indices of an [`oscillator`] System.
#[derive(Debug, Clone, Copy)]
pub struct Oscillator {
    pub mass: SubsystemIndex,
    pub spring: SubsystemIndex,
    pub damper: SubsystemIndex,
}

impl Oscillator {
    /// Total mechanical energy of a State realized through Report.
    #[must_use]
    pub fn energy(&self, state: &State) -> Option<f64> {
        let kinetic = state.cache::<f64>(self.mass, Stage::Report)?;
        let potential = state.cache::<f64>(self.spring, Stage::Report)?;
        Some(*kinetic + *potential)
    }
}

/// Builds a damped oscillator released from rest at `position`, with its
/// topology realized.
///
/// # Panics
///
/// Panics if the topology cannot be realized.
#[must_use]
pub fn oscillator(
    mass: f64,
    stiffness: f64,
    damping: f64,
    position: f64,
) -> (System, Oscillator) {
    let mut system = System::new("oscillator");
    let mass_index = system.add_subsystem(Mass::new(mass, position, 0.0));
    let spring = system.add_subsystem(Spring {
        mass: mass_index,
        stiffness,
    });
    let damper = system.add_subsystem(Damper {
        mass: mass_index,
        coefficient: damping,
    });
    system
        .add_topological_contribution::<Mass, _>(mass_index, |m| {
            m.attach(spring);
            m.attach(damper);
        })
        .expect("the mass is subsystem 0");
    system
        .realize_topology()
        .expect("oscillator topology is valid");

    let handles = Oscillator {
        mass: mass_index,
        spring,
        damper,
    };
    (system, handles)
}
