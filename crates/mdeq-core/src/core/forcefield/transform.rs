//! Transformations applied to every force whose variant satisfies a predicate.

use super::forces::{Force, ForceKind, ForceParams};
use super::term::MAX_FORCE_GROUPS;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Cannot assign unique force groups to {count} forces (at most {max})")]
    TooManyForces { count: usize, max: usize },
}

/// Applies `transform` to every force for which `predicate` holds.
///
/// Returns the number of forces transformed.
pub fn map_forces<P, T>(forces: &mut [Force], predicate: P, mut transform: T) -> usize
where
    P: Fn(&Force) -> bool,
    T: FnMut(&mut Force),
{
    let mut count = 0;
    for force in forces.iter_mut() {
        if predicate(force) {
            transform(force);
            count += 1;
        }
    }
    count
}

/// Gives each force its own group, numbered from 0 in force order.
pub fn assign_force_groups(forces: &mut [Force]) -> Result<(), TransformError> {
    if forces.len() > MAX_FORCE_GROUPS {
        return Err(TransformError::TooManyForces {
            count: forces.len(),
            max: MAX_FORCE_GROUPS,
        });
    }
    let mut next = 0u32;
    map_forces(
        forces,
        |_| true,
        |force| {
            force.group = next;
            next += 1;
        },
    );
    Ok(())
}

/// Turns on minimum-image displacements for the bonded forces that default
/// to non-periodic evaluation.
pub fn enable_periodic_bonded(forces: &mut [Force]) -> usize {
    map_forces(
        forces,
        |f| {
            matches!(
                f.kind(),
                ForceKind::HarmonicBond | ForceKind::HarmonicAngle | ForceKind::RbTorsion
            )
        },
        |f| f.periodic = true,
    )
}

/// Multiplies every nonbonded particle charge by `factor`.
///
/// Lennard-Jones parameters and exception charge products are left as they are.
/// Returns the number of particles rescaled.
pub fn scale_charges(forces: &mut [Force], factor: f64) -> usize {
    let mut scaled = 0;
    map_forces(
        forces,
        |f| f.kind() == ForceKind::Nonbonded,
        |f| {
            if let ForceParams::Nonbonded(nb) = &mut f.params {
                for particle in nb.particles.iter_mut() {
                    particle.charge *= factor;
                    scaled += 1;
                }
            }
        },
    );
    scaled
}
