use super::ewald::{self, EwaldParameters};
use super::forces::{Force, ForceParams, NonbondedForce, NonbondedMethod};
use super::model::InteractionModel;
use super::neighbors::{self, NeighborPair};
use super::potentials;
use super::term::{EnergyBreakdown, GroupMask};
use crate::core::models::cell::BoxVectors;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EnergyCalculationError {
    #[error("{force} uses periodic boundary conditions but no box vectors were given")]
    MissingBox { force: &'static str },
    #[error("Nonbonded cutoff {cutoff} nm exceeds half the smallest box length ({limit} nm)")]
    CutoffTooLarge { cutoff: f64, limit: f64 },
    #[error("Expected {expected} positions, got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub energies: EnergyBreakdown,
    /// Total force on each particle in kJ/mol/nm.
    pub forces: Vec<Vector3<f64>>,
}

/// Per-force data that stays fixed for the lifetime of a context.
#[derive(Debug, Clone)]
struct NonbondedSetup {
    excluded: HashSet<(usize, usize)>,
    ewald: Option<EwaldParameters>,
    /// Dispersion correction energy times volume.
    dispersion_coefficient: f64,
    krf: f64,
    crf: f64,
}

/// Evaluates energies and forces of an [`InteractionModel`].
///
/// Ewald parameters and exclusion tables are computed once from the model and
/// the initial box, the way a simulation context keeps them fixed while the
/// barostat changes the box.
#[derive(Debug, Clone)]
pub struct ForceEvaluator {
    setups: Vec<Option<NonbondedSetup>>,
    parallel: bool,
}

impl ForceEvaluator {
    pub fn new(
        model: &InteractionModel,
        cell: Option<&BoxVectors>,
    ) -> Result<Self, EnergyCalculationError> {
        let mut setups = Vec::with_capacity(model.forces().len());
        for force in model.forces() {
            setups.push(match &force.params {
                ForceParams::Nonbonded(nb) => Some(Self::prepare(force, nb, cell)?),
                _ => None,
            });
        }
        Ok(Self {
            setups,
            parallel: false,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn ewald_parameters(&self) -> Vec<EwaldParameters> {
        self.setups
            .iter()
            .flatten()
            .filter_map(|s| s.ewald)
            .collect()
    }

    fn prepare(
        force: &Force,
        nb: &NonbondedForce,
        cell: Option<&BoxVectors>,
    ) -> Result<NonbondedSetup, EnergyCalculationError> {
        let excluded = nb
            .exceptions
            .iter()
            .map(|e| (e.atoms[0].min(e.atoms[1]), e.atoms[0].max(e.atoms[1])))
            .collect();

        let mut setup = NonbondedSetup {
            excluded,
            ewald: None,
            dispersion_coefficient: 0.0,
            krf: 0.0,
            crf: 0.0,
        };
        if !nb.method.is_periodic() {
            return Ok(setup);
        }
        let cell = cell.ok_or(EnergyCalculationError::MissingBox {
            force: force.name(),
        })?;
        check_cutoff(nb.cutoff, cell)?;

        if nb.method.uses_ewald() {
            setup.ewald = Some(EwaldParameters::from_tolerance(
                nb.cutoff,
                nb.ewald_error_tolerance,
                cell,
            ));
        } else {
            let eps = nb.reaction_field_dielectric;
            let rc = nb.cutoff;
            setup.krf = (eps - 1.0) / ((2.0 * eps + 1.0) * rc.powi(3));
            setup.crf = 3.0 * eps / ((2.0 * eps + 1.0) * rc);
        }
        if nb.use_dispersion_correction {
            setup.dispersion_coefficient = dispersion_coefficient(nb);
        }
        Ok(setup)
    }

    /// Computes energies and forces of the forces whose group is in `groups`.
    pub fn evaluate(
        &self,
        model: &InteractionModel,
        positions: &[Vector3<f64>],
        cell: Option<&BoxVectors>,
        groups: GroupMask,
    ) -> Result<Evaluation, EnergyCalculationError> {
        let n = model.particle_count();
        if positions.len() != n {
            return Err(EnergyCalculationError::PositionCountMismatch {
                expected: n,
                actual: positions.len(),
            });
        }
        let mut energies = EnergyBreakdown::new();
        let mut forces = vec![Vector3::zeros(); n];

        for (force, setup) in model.forces().iter().zip(&self.setups) {
            if !groups.contains(force.group) {
                continue;
            }
            let bonded_cell = if force.uses_periodic_boundary_conditions() {
                cell
            } else {
                None
            };
            let energy = match (&force.params, setup) {
                (ForceParams::HarmonicBond(f), _) => {
                    let mut e = 0.0;
                    for term in &f.bonds {
                        let [i, j] = term.atoms;
                        let delta = displacement(positions[j] - positions[i], bonded_cell);
                        let (de, [fi, fj]) = potentials::harmonic_bond(&delta, term.length, term.k);
                        e += de;
                        forces[i] += fi;
                        forces[j] += fj;
                    }
                    e
                }
                (ForceParams::HarmonicAngle(f), _) => {
                    let mut e = 0.0;
                    for term in &f.angles {
                        let [i, j, k] = term.atoms;
                        let u = displacement(positions[i] - positions[j], bonded_cell);
                        let v = displacement(positions[k] - positions[j], bonded_cell);
                        let (de, [fi, fj, fk]) =
                            potentials::harmonic_angle(&u, &v, term.angle, term.k);
                        e += de;
                        forces[i] += fi;
                        forces[j] += fj;
                        forces[k] += fk;
                    }
                    e
                }
                (ForceParams::RbTorsion(f), _) => {
                    let mut e = 0.0;
                    for term in &f.torsions {
                        e += torsion(positions, term.atoms, bonded_cell, &mut forces, |phi| {
                            potentials::rb_torsion(phi, &term.c)
                        });
                    }
                    e
                }
                (ForceParams::PeriodicTorsion(f), _) => {
                    let mut e = 0.0;
                    for term in &f.torsions {
                        e += torsion(positions, term.atoms, bonded_cell, &mut forces, |phi| {
                            potentials::periodic_torsion(phi, term.periodicity, term.phase, term.k)
                        });
                    }
                    e
                }
                (ForceParams::Nonbonded(nb), Some(setup)) => {
                    self.nonbonded(force, nb, setup, positions, cell, &mut forces)?
                }
                _ => 0.0,
            };
            energies.add_to_group(force.group, energy);
        }

        Ok(Evaluation { energies, forces })
    }

    fn nonbonded(
        &self,
        force: &Force,
        nb: &NonbondedForce,
        setup: &NonbondedSetup,
        positions: &[Vector3<f64>],
        cell: Option<&BoxVectors>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, EnergyCalculationError> {
        let n = positions.len();
        let periodic = nb.method.is_periodic();
        let cell = if periodic {
            let cell = cell.ok_or(EnergyCalculationError::MissingBox {
                force: force.name(),
            })?;
            check_cutoff(nb.cutoff, cell)?;
            Some(cell)
        } else {
            None
        };
        let cutoff = periodic.then_some(nb.cutoff);
        let particles = &nb.particles;
        let alpha = setup.ewald.map(|p| p.alpha);

        let pairs = neighbors::build_pairs(positions, cell, cutoff);
        let pair_kernel = |chunk: &[NeighborPair], local: &mut [Vector3<f64>]| -> f64 {
            let mut e = 0.0;
            for pair in chunk {
                if setup.excluded.contains(&(pair.i, pair.j)) {
                    continue;
                }
                let (pi, pj) = (&particles[pair.i], &particles[pair.j]);
                let r = pair.r2.sqrt();
                let sigma = 0.5 * (pi.sigma + pj.sigma);
                let epsilon = (pi.epsilon * pj.epsilon).sqrt();
                let qq = pi.charge * pj.charge;
                let (e_lj, de_lj) = potentials::lennard_jones(r, sigma, epsilon);
                let (e_el, de_el) = match (nb.method, alpha) {
                    (NonbondedMethod::NoCutoff, _) => potentials::coulomb(r, qq),
                    (NonbondedMethod::CutoffPeriodic, _) => {
                        potentials::reaction_field(r, qq, setup.krf, setup.crf)
                    }
                    (_, Some(alpha)) => potentials::ewald_real(r, qq, alpha),
                    (_, None) => potentials::coulomb(r, qq),
                };
                e += e_lj + e_el;
                if r > 0.0 {
                    let f = -(de_lj + de_el) / r * pair.delta;
                    local[pair.i] += f;
                    local[pair.j] -= f;
                }
            }
            e
        };
        let (mut energy, pair_forces) = accumulate(&pairs, n, self.parallel, pair_kernel);
        for (total, part) in forces.iter_mut().zip(pair_forces) {
            *total += part;
        }

        for exception in &nb.exceptions {
            let [i, j] = exception.atoms;
            let delta = displacement(positions[i] - positions[j], cell);
            let r = delta.norm();
            if r <= 0.0 {
                continue;
            }
            let mut de_dr = 0.0;
            if !exception.is_exclusion() {
                let (e_lj, de_lj) =
                    potentials::lennard_jones(r, exception.sigma, exception.epsilon);
                let (e_el, de_el) = potentials::coulomb(r, exception.charge_prod);
                energy += e_lj + e_el;
                de_dr += de_lj + de_el;
            }
            if let Some(alpha) = alpha {
                let qq = particles[i].charge * particles[j].charge;
                let (e_x, de_x) = potentials::ewald_exclusion(r, qq, alpha);
                energy += e_x;
                de_dr += de_x;
            }
            let f = -de_dr / r * delta;
            forces[i] += f;
            forces[j] -= f;
        }

        if let (Some(params), Some(cell)) = (setup.ewald.as_ref(), cell) {
            let charges: Vec<f64> = particles.iter().map(|p| p.charge).collect();
            energy +=
                ewald::reciprocal_space(positions, &charges, cell, params, forces, self.parallel);
            energy += ewald::self_energy(&charges, params.alpha);
            energy += ewald::neutralizing_background(&charges, params.alpha, cell.volume());
        }
        if let Some(cell) = cell {
            energy += setup.dispersion_coefficient / cell.volume();
        }
        Ok(energy)
    }
}

fn check_cutoff(cutoff: f64, cell: &BoxVectors) -> Result<(), EnergyCalculationError> {
    let limit = 0.5 * cell.min_length();
    if cutoff > limit {
        return Err(EnergyCalculationError::CutoffTooLarge { cutoff, limit });
    }
    Ok(())
}

#[inline]
fn displacement(delta: Vector3<f64>, cell: Option<&BoxVectors>) -> Vector3<f64> {
    match cell {
        Some(cell) => cell.min_image(delta),
        None => delta,
    }
}

fn torsion<F>(
    positions: &[Vector3<f64>],
    atoms: [usize; 4],
    cell: Option<&BoxVectors>,
    forces: &mut [Vector3<f64>],
    kernel: F,
) -> f64
where
    F: Fn(f64) -> (f64, f64),
{
    let [a, b, c, d] = atoms;
    let b1 = displacement(positions[b] - positions[a], cell);
    let b2 = displacement(positions[c] - positions[b], cell);
    let b3 = displacement(positions[d] - positions[c], cell);
    let Some((phi, gradient)) = potentials::dihedral(&b1, &b2, &b3) else {
        return 0.0;
    };
    let (energy, de_dphi) = kernel(phi);
    for (atom, g) in atoms.iter().zip(gradient.iter()) {
        forces[*atom] -= de_dphi * *g;
    }
    energy
}

/// Runs `kernel` over chunks of `items`, in parallel when requested, and sums
/// the returned energies and the per-particle forces it accumulates.
fn accumulate<T, F>(items: &[T], n: usize, parallel: bool, kernel: F) -> (f64, Vec<Vector3<f64>>)
where
    T: Sync,
    F: Fn(&[T], &mut [Vector3<f64>]) -> f64 + Sync,
{
    const CHUNK: usize = 2048;
    if !parallel {
        let mut forces = vec![Vector3::zeros(); n];
        let energy = kernel(items, &mut forces[..]);
        return (energy, forces);
    }
    items
        .par_chunks(CHUNK)
        .fold(
            || (0.0, vec![Vector3::zeros(); n]),
            |(e, mut f), chunk| {
                let de = kernel(chunk, &mut f[..]);
                (e + de, f)
            },
        )
        .reduce(
            || (0.0, vec![Vector3::zeros(); n]),
            |(e1, mut f1), (e2, f2)| {
                for (a, b) in f1.iter_mut().zip(f2) {
                    *a += b;
                }
                (e1 + e2, f1)
            },
        )
}

/// Long-range Lennard-Jones correction for a homogeneous fluid, times volume.
fn dispersion_coefficient(nb: &NonbondedForce) -> f64 {
    let mut classes: HashMap<(u64, u64), (f64, f64, usize)> = HashMap::new();
    for p in &nb.particles {
        classes
            .entry((p.sigma.to_bits(), p.epsilon.to_bits()))
            .or_insert((p.sigma, p.epsilon, 0))
            .2 += 1;
    }
    let classes: Vec<(f64, f64, usize)> = classes.into_values().collect();
    let n = nb.particles.len() as f64;
    let interactions = n * (n + 1.0) / 2.0;
    if interactions == 0.0 {
        return 0.0;
    }
    let (mut sum12, mut sum6) = (0.0, 0.0);
    for (a, &(sa, ea, na)) in classes.iter().enumerate() {
        for &(sb, eb, nb_count) in &classes[a..] {
            let count = if sa.to_bits() == sb.to_bits() && ea.to_bits() == eb.to_bits() {
                (na * (na + 1)) as f64 / 2.0
            } else {
                (na * nb_count) as f64
            };
            let sigma = 0.5 * (sa + sb);
            let epsilon = (ea * eb).sqrt();
            let s6 = sigma.powi(6);
            sum12 += count * epsilon * s6 * s6;
            sum6 += count * epsilon * s6;
        }
    }
    sum12 /= interactions;
    sum6 /= interactions;
    let rc = nb.cutoff;
    8.0 * PI * n * n * (sum12 / (9.0 * rc.powi(9)) - sum6 / (3.0 * rc.powi(3)))
}
