use super::constraints::ConstraintSolver;
use super::error::EngineError;
use crate::core::models::cell::BoxVectors;
use crate::core::units::BOLTZ;
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::StandardNormal;

const DEFAULT_CONSTRAINT_TOLERANCE: f64 = 1e-5;

/// Leapfrog Langevin dynamics at constant temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LangevinIntegrator {
    /// Heat-bath temperature in K.
    pub temperature: f64,
    /// Friction coefficient in 1/ps.
    pub friction: f64,
    /// Step size in ps.
    pub step_size: f64,
    /// Relative tolerance for constrained distances.
    pub constraint_tolerance: f64,
}

impl LangevinIntegrator {
    pub fn new(temperature: f64, friction: f64, step_size: f64) -> Self {
        Self {
            temperature,
            friction,
            step_size,
            constraint_tolerance: DEFAULT_CONSTRAINT_TOLERANCE,
        }
    }

    pub fn with_constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.constraint_tolerance = tolerance;
        self
    }

    pub fn kt(&self) -> f64 {
        BOLTZ * self.temperature
    }

    /// Advances positions and velocities by one step given the forces at the
    /// current positions.
    ///
    /// Velocities are updated first (friction, force and noise), then
    /// positions are drifted and constrained, and the velocities are
    /// recomputed from the constrained displacement.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn advance<R: Rng>(
        &self,
        positions: &mut [Vector3<f64>],
        velocities: &mut [Vector3<f64>],
        forces: &[Vector3<f64>],
        inverse_masses: &[f64],
        solver: &ConstraintSolver,
        cell: Option<&BoxVectors>,
        rng: &mut R,
    ) -> Result<(), EngineError> {
        let dt = self.step_size;
        let vscale = (-self.friction * dt).exp();
        let fscale = if self.friction == 0.0 {
            dt
        } else {
            (1.0 - vscale) / self.friction
        };
        let noise_variance = self.kt() * (1.0 - vscale * vscale);

        for ((v, f), &w) in velocities.iter_mut().zip(forces).zip(inverse_masses) {
            if w == 0.0 {
                continue;
            }
            let sigma = (noise_variance * w).sqrt();
            let noise = Vector3::new(
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
            );
            *v = *v * vscale + f * (w * fscale) + noise * sigma;
        }

        let mut trial: Vec<Vector3<f64>> = positions
            .iter()
            .zip(velocities.iter())
            .zip(inverse_masses)
            .map(|((x, v), &w)| if w == 0.0 { *x } else { x + v * dt })
            .collect();
        solver.apply(positions, &mut trial, cell)?;

        let inv_dt = 1.0 / dt;
        for (((x, v), x_new), &w) in positions
            .iter_mut()
            .zip(velocities.iter_mut())
            .zip(&trial)
            .zip(inverse_masses)
        {
            if w != 0.0 {
                *v = (x_new - *x) * inv_dt;
            }
            *x = *x_new;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::model::Constraint;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn frictionless_step_is_plain_leapfrog() {
        let integrator = LangevinIntegrator::new(300.0, 0.0, 0.002);
        let solver = ConstraintSolver::new(&[], vec![0.5], 1e-5);
        let mut positions = vec![Vector3::zeros()];
        let mut velocities = vec![Vector3::new(1.0, 0.0, 0.0)];
        let forces = vec![Vector3::new(0.0, 10.0, 0.0)];
        let mut rng = Pcg64::seed_from_u64(1);

        integrator
            .advance(
                &mut positions,
                &mut velocities,
                &forces,
                &[0.5],
                &solver,
                None,
                &mut rng,
            )
            .unwrap();

        assert!((velocities[0] - Vector3::new(1.0, 0.01, 0.0)).norm() < 1e-12);
        assert!((positions[0] - Vector3::new(0.002, 0.00002, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn massless_particles_do_not_move() {
        let integrator = LangevinIntegrator::new(300.0, 5.0, 0.001);
        let solver = ConstraintSolver::new(&[], vec![0.0], 1e-5);
        let start = Vector3::new(0.3, 0.2, 0.1);
        let mut positions = vec![start];
        let mut velocities = vec![Vector3::zeros()];
        let mut rng = Pcg64::seed_from_u64(2);

        integrator
            .advance(
                &mut positions,
                &mut velocities,
                &[Vector3::new(100.0, 0.0, 0.0)],
                &[0.0],
                &solver,
                None,
                &mut rng,
            )
            .unwrap();

        assert_eq!(positions[0], start);
        assert_eq!(velocities[0], Vector3::zeros());
    }

    #[test]
    fn constrained_bond_keeps_its_length() {
        let integrator = LangevinIntegrator::new(300.0, 1.0, 0.001).with_constraint_tolerance(1e-8);
        let constraints = [Constraint {
            atoms: [0, 1],
            distance: 0.1,
        }];
        let weights = ConstraintSolver::inverse_masses(&[12.0, 1.0]);
        let solver = ConstraintSolver::new(&constraints, weights.clone(), 1e-8);
        let mut positions = vec![Vector3::zeros(), Vector3::new(0.1, 0.0, 0.0)];
        let mut velocities = vec![Vector3::zeros(), Vector3::new(0.0, 2.0, 0.0)];
        let mut rng = Pcg64::seed_from_u64(3);

        for _ in 0..50 {
            let forces = vec![Vector3::zeros(); 2];
            integrator
                .advance(
                    &mut positions,
                    &mut velocities,
                    &forces,
                    &weights,
                    &solver,
                    None,
                    &mut rng,
                )
                .unwrap();
        }

        let r = (positions[1] - positions[0]).norm();
        assert!((r - 0.1).abs() < 1e-8);
    }

    #[test]
    fn thermostat_drives_free_particles_to_target_temperature() {
        let temperature = 300.0;
        let integrator = LangevinIntegrator::new(temperature, 50.0, 0.002);
        let n = 500;
        let mass = 10.0;
        let weights = vec![1.0 / mass; n];
        let solver = ConstraintSolver::new(&[], weights.clone(), 1e-5);
        let mut positions = vec![Vector3::zeros(); n];
        let mut velocities = vec![Vector3::zeros(); n];
        let forces = vec![Vector3::zeros(); n];
        let mut rng = Pcg64::seed_from_u64(4);

        for _ in 0..200 {
            integrator
                .advance(
                    &mut positions,
                    &mut velocities,
                    &forces,
                    &weights,
                    &solver,
                    None,
                    &mut rng,
                )
                .unwrap();
        }

        let kinetic: f64 = velocities
            .iter()
            .map(|v| 0.5 * mass * v.norm_squared())
            .sum();
        let measured = 2.0 * kinetic / (3.0 * n as f64 * BOLTZ);
        assert!((measured - temperature).abs() < 0.1 * temperature, "T = {measured}");
    }
}
