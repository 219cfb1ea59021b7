use crate::core::forcefield::term::{EnergyBreakdown, GroupMask};
use crate::core::models::cell::BoxVectors;
use crate::core::units::{AMU_PER_NM3_TO_G_PER_ML, BOLTZ};
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// Which parts of a [`State`] to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateRequest {
    pub positions: bool,
    pub velocities: bool,
    pub energy: bool,
    pub parameters: bool,
    /// Force groups summed into the potential energy.
    pub groups: GroupMask,
}

impl StateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions(mut self) -> Self {
        self.positions = true;
        self
    }

    pub fn with_velocities(mut self) -> Self {
        self.velocities = true;
        self
    }

    pub fn with_energy(mut self) -> Self {
        self.energy = true;
        self
    }

    pub fn with_parameters(mut self) -> Self {
        self.parameters = true;
        self
    }

    pub fn with_groups(mut self, groups: GroupMask) -> Self {
        self.groups = groups;
        self
    }

    /// Everything needed to restart a run.
    pub fn everything() -> Self {
        Self::new()
            .with_positions()
            .with_velocities()
            .with_energy()
            .with_parameters()
    }

    /// Union of two requests; group masks are combined.
    pub fn merge(self, other: Self) -> Self {
        Self {
            positions: self.positions || other.positions,
            velocities: self.velocities || other.velocities,
            energy: self.energy || other.energy,
            parameters: self.parameters || other.parameters,
            groups: GroupMask(self.groups.0 | other.groups.0),
        }
    }
}

/// An immutable snapshot of a context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct State {
    /// Simulated time in ps.
    pub time: f64,
    pub step_count: u64,
    pub positions: Option<Vec<Vector3<f64>>>,
    pub velocities: Option<Vec<Vector3<f64>>>,
    pub box_vectors: Option<BoxVectors>,
    /// Potential energy of the requested groups, kJ/mol.
    pub potential_energy: Option<f64>,
    pub kinetic_energy: Option<f64>,
    pub group_energies: Option<EnergyBreakdown>,
    pub parameters: BTreeMap<String, f64>,
}

impl State {
    pub fn volume(&self) -> Option<f64> {
        self.box_vectors.as_ref().map(BoxVectors::volume)
    }

    pub fn total_energy(&self) -> Option<f64> {
        Some(self.potential_energy? + self.kinetic_energy?)
    }

    /// Instantaneous temperature in K for `dof` degrees of freedom.
    pub fn temperature(&self, dof: usize) -> Option<f64> {
        if dof == 0 {
            return None;
        }
        Some(2.0 * self.kinetic_energy? / (dof as f64 * BOLTZ))
    }

    /// Density in g/mL for a system of `total_mass` amu.
    pub fn density(&self, total_mass: f64) -> Option<f64> {
        let volume = self.volume()?;
        Some(total_mass / volume * AMU_PER_NM3_TO_G_PER_ML)
    }
}
