use super::forces::{Force, ForceKind, ForceParams};
use crate::core::models::cell::BoxVectors;

/// A fixed distance between two atoms, enforced by SHAKE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub atoms: [usize; 2],
    /// Distance in nm.
    pub distance: f64,
}

/// The parameterized system a context simulates: particle masses,
/// distance constraints and the force contributions.
///
/// The particle count is fixed at construction. Forces may be added and
/// their parameters edited until a context is created from the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionModel {
    masses: Vec<f64>,
    constraints: Vec<Constraint>,
    forces: Vec<Force>,
    /// Molecules as lists of atom indices (connected components of bonds).
    molecules: Vec<Vec<usize>>,
    default_box: Option<BoxVectors>,
}

impl InteractionModel {
    pub fn new(masses: Vec<f64>) -> Self {
        let molecules = (0..masses.len()).map(|i| vec![i]).collect();
        Self {
            masses,
            molecules,
            ..Default::default()
        }
    }

    pub fn particle_count(&self) -> usize {
        self.masses.len()
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn forces(&self) -> &[Force] {
        &self.forces
    }

    pub fn forces_mut(&mut self) -> &mut [Force] {
        &mut self.forces
    }

    /// Appends a force and returns its index.
    pub fn add_force(&mut self, force: Force) -> usize {
        self.forces.push(force);
        self.forces.len() - 1
    }

    pub fn has_force(&self, kind: ForceKind) -> bool {
        self.forces.iter().any(|f| f.kind() == kind)
    }

    pub fn molecules(&self) -> &[Vec<usize>] {
        &self.molecules
    }

    pub fn set_molecules(&mut self, molecules: Vec<Vec<usize>>) {
        self.molecules = molecules;
    }

    pub fn default_box(&self) -> Option<&BoxVectors> {
        self.default_box.as_ref()
    }

    pub fn set_default_box(&mut self, cell: Option<BoxVectors>) {
        self.default_box = cell;
    }

    pub fn uses_periodic_boundary_conditions(&self) -> bool {
        self.forces
            .iter()
            .any(|f| f.uses_periodic_boundary_conditions())
    }

    /// Degrees of freedom used to convert kinetic energy to temperature.
    pub fn degrees_of_freedom(&self) -> usize {
        let massive = self.masses.iter().filter(|m| **m > 0.0).count();
        let mut dof = 3 * massive;
        dof = dof.saturating_sub(self.constraints.len());
        if self
            .forces
            .iter()
            .any(|f| matches!(f.params, ForceParams::CmMotionRemover(_)))
        {
            dof = dof.saturating_sub(3);
        }
        dof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::forces::CmMotionRemover;

    #[test]
    fn degrees_of_freedom_account_for_constraints_and_motion_removal() {
        let mut model = InteractionModel::new(vec![12.0, 16.0, 1.0]);
        assert_eq!(model.degrees_of_freedom(), 9);
        model.add_constraint(Constraint {
            atoms: [1, 2],
            distance: 0.1,
        });
        assert_eq!(model.degrees_of_freedom(), 8);
        let remover = CmMotionRemover { frequency: 1 };
        model.add_force(Force::new(ForceParams::CmMotionRemover(remover)));
        assert_eq!(model.degrees_of_freedom(), 5);
    }

    #[test]
    fn new_model_treats_each_particle_as_a_molecule() {
        let model = InteractionModel::new(vec![1.0, 1.0]);
        assert_eq!(model.molecules(), &[vec![0], vec![1]]);
        assert_eq!(model.total_mass(), 2.0);
        assert!(!model.uses_periodic_boundary_conditions());
    }
}
