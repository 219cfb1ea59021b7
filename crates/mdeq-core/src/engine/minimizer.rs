use super::constraints::ConstraintSolver;
use super::error::EngineError;
use crate::core::models::cell::BoxVectors;
use nalgebra::Vector3;
use std::collections::VecDeque;
use tracing::{debug, trace};

const HISTORY: usize = 6;
const MAX_DISPLACEMENT: f64 = 0.05;
const MAX_BACKTRACKS: usize = 20;
const ARMIJO: f64 = 1e-4;

/// Summary of an energy minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizationReport {
    pub iterations: usize,
    pub initial_energy: f64,
    pub final_energy: f64,
    /// Whether the RMS force fell below the tolerance.
    pub converged: bool,
}

struct Correction {
    s: Vec<Vector3<f64>>,
    y: Vec<Vector3<f64>>,
    rho: f64,
}

fn dot(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    a.iter().zip(b).map(|(u, v)| u.dot(v)).sum()
}

/// Limited-memory BFGS on particle positions with SHAKE-enforced constraints.
///
/// `evaluate` returns the potential energy and the forces for a set of
/// positions. Search directions are projected onto the constraint manifold
/// and every trial point is constrained before it is evaluated. Particles
/// with zero solver weight never move.
pub(crate) fn minimize<E>(
    positions: &mut Vec<Vector3<f64>>,
    solver: &ConstraintSolver,
    cell: Option<&BoxVectors>,
    tolerance: f64,
    max_iterations: usize,
    mut evaluate: E,
) -> Result<MinimizationReport, EngineError>
where
    E: FnMut(&[Vector3<f64>]) -> Result<(f64, Vec<Vector3<f64>>), EngineError>,
{
    let reference = positions.clone();
    solver.apply(&reference, positions, cell)?;

    let free_components = 3 * solver.weights().iter().filter(|w| **w > 0.0).count();
    let gradient = |positions: &[Vector3<f64>], forces: Vec<Vector3<f64>>| {
        let mut g: Vec<Vector3<f64>> = forces.into_iter().map(|f| -f).collect();
        solver.project(positions, &mut g, cell)?;
        for (g, w) in g.iter_mut().zip(solver.weights()) {
            if *w == 0.0 {
                *g = Vector3::zeros();
            }
        }
        Ok::<_, EngineError>(g)
    };
    let rms = |g: &[Vector3<f64>]| (dot(g, g) / free_components.max(1) as f64).sqrt();

    let (mut energy, forces) = evaluate(&positions[..])?;
    if !energy.is_finite() {
        return Err(EngineError::NonFiniteEnergy { step: 0 });
    }
    let initial_energy = energy;
    let mut g = gradient(&positions[..], forces)?;
    let mut history: VecDeque<Correction> = VecDeque::with_capacity(HISTORY);
    let mut iterations = 0;
    let mut converged = false;

    loop {
        if rms(&g) < tolerance {
            converged = true;
            break;
        }
        if max_iterations > 0 && iterations >= max_iterations {
            break;
        }
        iterations += 1;

        let mut direction = search_direction(&g, &history);
        solver.project(positions, &mut direction, cell)?;
        for (d, w) in direction.iter_mut().zip(solver.weights()) {
            if *w == 0.0 {
                *d = Vector3::zeros();
            }
        }
        let mut slope = dot(&g, &direction);
        if slope >= 0.0 {
            history.clear();
            direction = g.iter().map(|v| -v).collect();
            slope = -dot(&g, &g);
        }

        let largest = direction.iter().map(|d| d.norm()).fold(0.0, f64::max);
        if largest == 0.0 {
            break;
        }
        let mut alpha = (MAX_DISPLACEMENT / largest).min(1.0);

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut trial: Vec<Vector3<f64>> = positions
                .iter()
                .zip(&direction)
                .map(|(x, d)| x + d * alpha)
                .collect();
            if solver.apply(positions, &mut trial, cell).is_ok() {
                let (trial_energy, trial_forces) = evaluate(&trial[..])?;
                if trial_energy.is_finite() && trial_energy <= energy + ARMIJO * alpha * slope {
                    accepted = Some((trial, trial_energy, trial_forces));
                    break;
                }
            }
            alpha *= 0.5;
        }

        let Some((trial, trial_energy, trial_forces)) = accepted else {
            if history.is_empty() {
                debug!(
                    iterations,
                    "line search failed along steepest descent; stopping"
                );
                break;
            }
            trace!(iterations, "line search failed; resetting L-BFGS history");
            history.clear();
            continue;
        };

        let new_g = gradient(&trial, trial_forces)?;
        let s: Vec<Vector3<f64>> = trial
            .iter()
            .zip(positions.iter())
            .map(|(a, b)| a - b)
            .collect();
        let y: Vec<Vector3<f64>> = new_g.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back(Correction {
                s,
                y,
                rho: 1.0 / sy,
            });
        }

        *positions = trial;
        energy = trial_energy;
        g = new_g;
    }

    debug!(
        iterations,
        initial_energy,
        final_energy = energy,
        converged,
        "Minimization finished"
    );
    Ok(MinimizationReport {
        iterations,
        initial_energy,
        final_energy: energy,
        converged,
    })
}

/// Two-loop recursion: approximates `-H⁻¹ g` from the stored corrections.
fn search_direction(g: &[Vector3<f64>], history: &VecDeque<Correction>) -> Vec<Vector3<f64>> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let a = c.rho * dot(&c.s, &q);
        for (qi, yi) in q.iter_mut().zip(&c.y) {
            *qi -= yi * a;
        }
        alphas.push(a);
    }
    let gamma = history
        .back()
        .map(|c| dot(&c.s, &c.y) / dot(&c.y, &c.y))
        .unwrap_or(1.0);
    let mut r: Vec<Vector3<f64>> = q.into_iter().map(|v| v * gamma).collect();
    for (c, a) in history.iter().zip(alphas.into_iter().rev()) {
        let b = c.rho * dot(&c.y, &r);
        for (ri, si) in r.iter_mut().zip(&c.s) {
            *ri += si * (a - b);
        }
    }
    r.into_iter().map(|v| -v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::model::Constraint;

    /// Harmonic springs of rest length `r0` between consecutive particles.
    fn springs(
        k: f64,
        r0: f64,
    ) -> impl FnMut(&[Vector3<f64>]) -> Result<(f64, Vec<Vector3<f64>>), EngineError> {
        move |x| {
            let mut e = 0.0;
            let mut f = vec![Vector3::zeros(); x.len()];
            for i in 1..x.len() {
                let d = x[i] - x[i - 1];
                let r = d.norm();
                e += 0.5 * k * (r - r0).powi(2);
                let fi = d * (-k * (r - r0) / r);
                f[i] += fi;
                f[i - 1] -= fi;
            }
            Ok((e, f))
        }
    }

    #[test]
    fn relaxes_a_stretched_spring_chain() {
        let solver = ConstraintSolver::new(&[], vec![1.0; 3], 1e-8);
        let mut positions = vec![
            Vector3::zeros(),
            Vector3::new(0.25, 0.05, 0.0),
            Vector3::new(0.4, 0.2, 0.1),
        ];
        let energy = springs(1000.0, 0.15);
        let report = minimize(&mut positions, &solver, None, 1e-3, 0, energy).unwrap();

        assert!(report.converged);
        assert!(report.final_energy < report.initial_energy);
        assert!(report.final_energy < 1e-6);
        for i in 1..3 {
            assert!(((positions[i] - positions[i - 1]).norm() - 0.15).abs() < 1e-4);
        }
    }

    #[test]
    fn respects_constraints_and_fixed_particles() {
        let constraints = [Constraint {
            atoms: [1, 2],
            distance: 0.1,
        }];
        let solver = ConstraintSolver::new(&constraints, vec![0.0, 1.0, 1.0], 1e-8);
        let mut positions = vec![
            Vector3::zeros(),
            Vector3::new(0.3, 0.0, 0.0),
            Vector3::new(0.3, 0.12, 0.0),
        ];
        let report = minimize(&mut positions, &solver, None, 1e-2, 0, springs(500.0, 0.2)).unwrap();

        assert_eq!(positions[0], Vector3::zeros());
        assert!(((positions[2] - positions[1]).norm() - 0.1).abs() < 1e-6);
        assert!(report.final_energy <= report.initial_energy);
    }

    #[test]
    fn stops_at_the_iteration_limit() {
        let solver = ConstraintSolver::new(&[], vec![1.0; 2], 1e-8);
        let mut positions = vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)];
        let energy = springs(1000.0, 0.1);
        let report = minimize(&mut positions, &solver, None, 1e-12, 2, energy).unwrap();
        assert_eq!(report.iterations, 2);
        assert!(!report.converged);
    }

    #[test]
    fn non_finite_start_is_an_error() {
        let solver = ConstraintSolver::new(&[], vec![1.0], 1e-8);
        let mut positions = vec![Vector3::zeros()];
        let result = minimize(&mut positions, &solver, None, 1.0, 0, |x| {
            Ok((f64::NAN, vec![Vector3::zeros(); x.len()]))
        });
        assert!(matches!(result, Err(EngineError::NonFiniteEnergy { .. })));
    }
}
