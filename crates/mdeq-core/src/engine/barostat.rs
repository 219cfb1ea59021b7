use super::error::EngineError;
use crate::core::forcefield::forces::AnisotropicBarostat;
use crate::core::models::cell::BoxVectors;
use crate::core::units::{BAR_TO_KJ_MOL_NM3, BOLTZ};
use nalgebra::Vector3;
use rand::Rng;
use tracing::{debug, trace};

const ADAPT_AFTER_ATTEMPTS: u32 = 10;
const MAX_VOLUME_SCALE_FRACTION: f64 = 0.3;

/// Running state of a Monte Carlo anisotropic barostat.
#[derive(Debug, Clone)]
pub(crate) struct MonteCarloBarostat {
    settings: AnisotropicBarostat,
    volume_scale: [f64; 3],
    attempted: [u32; 3],
    accepted: [u32; 3],
}

/// Result of one volume-move attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MoveOutcome {
    Accepted { axis: usize },
    Rejected { axis: usize },
    /// The trial box would be smaller than twice the cutoff.
    Skipped { axis: usize },
}

impl MonteCarloBarostat {
    pub fn new(settings: AnisotropicBarostat, initial_volume: f64) -> Self {
        Self {
            settings,
            volume_scale: [0.01 * initial_volume; 3],
            attempted: [0; 3],
            accepted: [0; 3],
        }
    }

    pub fn settings(&self) -> &AnisotropicBarostat {
        &self.settings
    }

    /// Replaces pressures and temperature; step sizes and counters are kept.
    pub fn update_settings(&mut self, settings: AnisotropicBarostat) {
        self.settings = settings;
    }

    pub fn frequency(&self) -> u32 {
        self.settings.frequency
    }

    #[cfg(test)]
    pub fn volume_scale(&self, axis: usize) -> f64 {
        self.volume_scale[axis]
    }

    /// Attempts one volume move along a random enabled axis.
    ///
    /// `energy` evaluates the potential energy for a set of positions and a
    /// box. On rejection `positions` and `cell` are restored.
    #[allow(clippy::too_many_arguments)]
    pub fn attempt<R, E>(
        &mut self,
        positions: &mut Vec<Vector3<f64>>,
        cell: &mut BoxVectors,
        molecules: &[Vec<usize>],
        min_length: Option<f64>,
        current_energy: f64,
        rng: &mut R,
        mut energy: E,
    ) -> Result<MoveOutcome, EngineError>
    where
        R: Rng,
        E: FnMut(&[Vector3<f64>], &BoxVectors) -> Result<f64, EngineError>,
    {
        let axes: Vec<usize> = (0..3).filter(|&a| self.settings.scale[a]).collect();
        let Some(&axis) = axes.get(rng.gen_range(0..axes.len().max(1))) else {
            return Ok(MoveOutcome::Skipped { axis: 0 });
        };

        let volume = cell.volume();
        let delta_volume = self.volume_scale[axis] * 2.0 * (rng.r#gen::<f64>() - 0.5);
        let new_volume = volume + delta_volume;
        self.attempted[axis] += 1;
        if new_volume <= 0.0 {
            self.adapt(axis, volume);
            return Ok(MoveOutcome::Rejected { axis });
        }
        let factor = new_volume / volume;
        let trial_cell = cell.with_axis_scaled(axis, factor);
        if min_length.is_some_and(|limit| trial_cell.lengths[axis] < limit) {
            self.attempted[axis] -= 1;
            trace!(
                axis,
                "volume move skipped: box would shrink below the cutoff limit"
            );
            return Ok(MoveOutcome::Skipped { axis });
        }

        let saved = positions.clone();
        scale_molecule_centres(positions, molecules, cell, axis, factor);
        let trial_energy = energy(positions, &trial_cell)?;

        let kt = BOLTZ * self.settings.temperature;
        let pressure = self.settings.pressure[axis] * BAR_TO_KJ_MOL_NM3;
        let w = (trial_energy - current_energy) + pressure * delta_volume
            - molecules.len() as f64 * kt * (new_volume / volume).ln();

        let outcome = if w <= 0.0 || rng.r#gen::<f64>() < (-w / kt).exp() {
            *cell = trial_cell;
            self.accepted[axis] += 1;
            MoveOutcome::Accepted { axis }
        } else {
            *positions = saved;
            MoveOutcome::Rejected { axis }
        };
        self.adapt(axis, cell.volume());
        Ok(outcome)
    }

    fn adapt(&mut self, axis: usize, volume: f64) {
        let attempted = self.attempted[axis];
        if attempted < ADAPT_AFTER_ATTEMPTS {
            return;
        }
        let accepted = self.accepted[axis] as f64;
        let attempted = attempted as f64;
        if accepted < 0.25 * attempted {
            self.volume_scale[axis] /= 1.1;
        } else if accepted > 0.75 * attempted {
            self.volume_scale[axis] =
                (self.volume_scale[axis] * 1.1).min(volume * MAX_VOLUME_SCALE_FRACTION);
        } else {
            return;
        }
        debug!(
            axis,
            volume_scale = self.volume_scale[axis],
            "barostat step size adapted"
        );
        self.attempted[axis] = 0;
        self.accepted[axis] = 0;
    }
}

/// Moves each molecule rigidly so that its centre scales with the box axis.
fn scale_molecule_centres(
    positions: &mut [Vector3<f64>],
    molecules: &[Vec<usize>],
    cell: &BoxVectors,
    axis: usize,
    factor: f64,
) {
    let length = cell.lengths[axis];
    for molecule in molecules {
        let Some(&first) = molecule.first() else {
            continue;
        };
        let anchor = positions[first][axis];
        let unwrapped: f64 = molecule
            .iter()
            .map(|&i| {
                let d = positions[i][axis] - anchor;
                anchor + d - length * (d / length).round()
            })
            .sum();
        let mut centre = unwrapped / molecule.len() as f64;
        centre -= length * (centre / length).floor();
        let shift = centre * (factor - 1.0);
        for &i in molecule {
            positions[i][axis] += shift;
        }
    }
}
