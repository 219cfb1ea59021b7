use super::error::EngineError;
use crate::core::forcefield::model::Constraint;
use crate::core::models::cell::BoxVectors;
use nalgebra::Vector3;
use tracing::trace;

const MAX_ITERATIONS: usize = 150;

/// Iterative SHAKE/RATTLE solver for fixed-distance constraints.
///
/// Each particle carries a weight, normally its inverse mass. Particles of
/// weight zero never move; constraints between two such particles are dropped.
#[derive(Debug, Clone)]
pub(crate) struct ConstraintSolver {
    constraints: Vec<Constraint>,
    weights: Vec<f64>,
    tolerance: f64,
}

impl ConstraintSolver {
    pub fn new(constraints: &[Constraint], weights: Vec<f64>, tolerance: f64) -> Self {
        let constraints = constraints
            .iter()
            .filter(|c| weights[c.atoms[0]] + weights[c.atoms[1]] > 0.0)
            .copied()
            .collect();
        Self {
            constraints,
            weights,
            tolerance,
        }
    }

    /// Inverse-mass weights for `masses`; massless particles get weight zero.
    pub fn inverse_masses(masses: &[f64]) -> Vec<f64> {
        masses
            .iter()
            .map(|&m| if m > 0.0 { 1.0 / m } else { 0.0 })
            .collect()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn displacement(cell: Option<&BoxVectors>, a: Vector3<f64>, b: Vector3<f64>) -> Vector3<f64> {
        match cell {
            Some(cell) => cell.min_image(a - b),
            None => a - b,
        }
    }

    /// Moves `positions` onto the constraint surface along the bond directions
    /// of `reference` (SHAKE). Returns the number of sweeps used.
    pub fn apply(
        &self,
        reference: &[Vector3<f64>],
        positions: &mut [Vector3<f64>],
        cell: Option<&BoxVectors>,
    ) -> Result<usize, EngineError> {
        if self.constraints.is_empty() {
            return Ok(0);
        }
        for iteration in 0..MAX_ITERATIONS {
            let mut converged = true;
            for c in &self.constraints {
                let [i, j] = c.atoms;
                let d2 = c.distance * c.distance;
                let rij = Self::displacement(cell, positions[i], positions[j]);
                let diff = d2 - rij.norm_squared();
                if diff.abs() <= 2.0 * self.tolerance * d2 {
                    continue;
                }
                converged = false;

                let rij_ref = Self::displacement(cell, reference[i], reference[j]);
                let rrpr = rij.dot(&rij_ref);
                if rrpr < d2 * 1e-6 {
                    return Err(EngineError::ConstraintFailure {
                        iterations: iteration + 1,
                    });
                }
                let (wi, wj) = (self.weights[i], self.weights[j]);
                let acor = diff / (2.0 * rrpr * (wi + wj));
                positions[i] += rij_ref * (acor * wi);
                positions[j] -= rij_ref * (acor * wj);
            }
            if converged {
                trace!(iterations = iteration, "SHAKE converged");
                return Ok(iteration);
            }
        }
        Err(EngineError::ConstraintFailure {
            iterations: MAX_ITERATIONS,
        })
    }

    /// Removes the components of `vectors` that would change any constrained
    /// distance at `positions` (RATTLE velocity step). Used for velocities and
    /// for minimizer search directions.
    pub fn project(
        &self,
        positions: &[Vector3<f64>],
        vectors: &mut [Vector3<f64>],
        cell: Option<&BoxVectors>,
    ) -> Result<usize, EngineError> {
        if self.constraints.is_empty() {
            return Ok(0);
        }
        let bonds: Vec<Vector3<f64>> = self
            .constraints
            .iter()
            .map(|c| Self::displacement(cell, positions[c.atoms[0]], positions[c.atoms[1]]))
            .collect();

        for iteration in 0..MAX_ITERATIONS {
            let mut converged = true;
            for (c, rij) in self.constraints.iter().zip(&bonds) {
                let [i, j] = c.atoms;
                let (wi, wj) = (self.weights[i], self.weights[j]);
                let r2 = rij.norm_squared();
                let rv = rij.dot(&(vectors[i] - vectors[j]));
                let scale = (vectors[i].norm() + vectors[j].norm()).max(f64::MIN_POSITIVE);
                if rv.abs() <= self.tolerance * r2.sqrt() * scale {
                    continue;
                }
                converged = false;
                let g = rv / (r2 * (wi + wj));
                vectors[i] -= rij * (g * wi);
                vectors[j] += rij * (g * wj);
            }
            if converged {
                return Ok(iteration);
            }
        }
        Err(EngineError::ConstraintFailure {
            iterations: MAX_ITERATIONS,
        })
    }

    /// Largest relative deviation of a constrained distance from its target.
    #[cfg(test)]
    pub fn max_deviation(&self, positions: &[Vector3<f64>], cell: Option<&BoxVectors>) -> f64 {
        self.constraints
            .iter()
            .map(|c| {
                let (a, b) = (positions[c.atoms[0]], positions[c.atoms[1]]);
                let r = Self::displacement(cell, a, b).norm();
                ((r - c.distance) / c.distance).abs()
            })
            .fold(0.0, f64::max)
    }
}
