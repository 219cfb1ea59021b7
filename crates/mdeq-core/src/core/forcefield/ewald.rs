//! Reciprocal-space Ewald summation.
//!
//! The real-space part lives in [`super::potentials::ewald_real`]; this module
//! computes the splitting parameter, the number of wave vectors per axis, the
//! structure-factor sum and the constant self/neutralizing terms.

use crate::core::models::cell::BoxVectors;
use crate::core::units::ONE_4PI_EPS0;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwaldParameters {
    /// Splitting parameter α in 1/nm.
    pub alpha: f64,
    /// Wave vectors per axis; indices run over `-(kmax-1)..=kmax-1`.
    pub kmax: [usize; 3],
}

impl EwaldParameters {
    /// Chooses α so that the real-space error at the cutoff is about `tolerance`,
    /// and the smallest odd `kmax` per axis whose reciprocal error is below it.
    pub fn from_tolerance(cutoff: f64, tolerance: f64, cell: &BoxVectors) -> Self {
        let alpha = (-(2.0 * tolerance).ln()).sqrt() / cutoff;
        let mut kmax = [1usize; 3];
        for (axis, slot) in kmax.iter_mut().enumerate() {
            let width = cell.lengths[axis];
            let error = |k: f64| {
                k * (width * alpha).sqrt() / 20.0 * (-(PI * k / (width * alpha)).powi(2)).exp()
            };
            let mut k = 1usize;
            while error(k as f64) >= tolerance && k < 512 {
                k += 1;
            }
            if k % 2 == 0 {
                k += 1;
            }
            *slot = k;
        }
        Self { alpha, kmax }
    }
}

/// Per-axis tables of `cos(k·x)` and `sin(k·x)` for `k = 0..kmax`.
struct PhaseTable {
    cos: Vec<f64>,
    sin: Vec<f64>,
    kmax: usize,
}

impl PhaseTable {
    fn new(positions: &[Vector3<f64>], axis: usize, length: f64, kmax: usize) -> Self {
        let n = positions.len();
        let mut cos = vec![0.0; n * kmax];
        let mut sin = vec![0.0; n * kmax];
        let base = 2.0 * PI / length;
        for (atom, p) in positions.iter().enumerate() {
            let (s1, c1) = (base * p[axis]).sin_cos();
            let row = atom * kmax;
            cos[row] = 1.0;
            sin[row] = 0.0;
            for k in 1..kmax {
                let (cp, sp) = (cos[row + k - 1], sin[row + k - 1]);
                cos[row + k] = cp * c1 - sp * s1;
                sin[row + k] = sp * c1 + cp * s1;
            }
        }
        Self { cos, sin, kmax }
    }

    /// `(cos, sin)` of `n·(2π/L)·x` for signed `n`.
    #[inline]
    fn get(&self, atom: usize, n: i64) -> (f64, f64) {
        let k = n.unsigned_abs() as usize;
        let idx = atom * self.kmax + k;
        let (c, s) = (self.cos[idx], self.sin[idx]);
        if n < 0 { (c, -s) } else { (c, s) }
    }
}

fn wave_vectors(kmax: [usize; 3]) -> Vec<[i64; 3]> {
    let (kx, ky, kz) = (kmax[0] as i64, kmax[1] as i64, kmax[2] as i64);
    let mut out = Vec::new();
    for nx in 0..kx {
        let ny_start = if nx == 0 { 0 } else { -(ky - 1) };
        for ny in ny_start..ky {
            let nz_start = if nx == 0 && ny == 0 { 1 } else { -(kz - 1) };
            for nz in nz_start..kz {
                out.push([nx, ny, nz]);
            }
        }
    }
    out
}

/// Reciprocal-space energy; forces are accumulated into `forces`.
///
/// Only half of k-space is enumerated, using the symmetry of `|S(k)|²`.
pub fn reciprocal_space(
    positions: &[Vector3<f64>],
    charges: &[f64],
    cell: &BoxVectors,
    params: &EwaldParameters,
    forces: &mut [Vector3<f64>],
    parallel: bool,
) -> f64 {
    let n = positions.len();
    let tables: Vec<PhaseTable> = (0..3)
        .map(|axis| PhaseTable::new(positions, axis, cell.lengths[axis], params.kmax[axis]))
        .collect();
    let volume = cell.volume();
    let four_alpha2 = 4.0 * params.alpha * params.alpha;
    let recip = Vector3::new(
        2.0 * PI / cell.lengths.x,
        2.0 * PI / cell.lengths.y,
        2.0 * PI / cell.lengths.z,
    );
    let energy_factor = ONE_4PI_EPS0 * 4.0 * PI / volume;
    let force_factor = 2.0 * energy_factor;

    let contribution = |n_vec: &[i64; 3], local: &mut Vec<Vector3<f64>>| -> f64 {
        let k = Vector3::new(
            n_vec[0] as f64 * recip.x,
            n_vec[1] as f64 * recip.y,
            n_vec[2] as f64 * recip.z,
        );
        let k2 = k.norm_squared();
        let g = (-k2 / four_alpha2).exp() / k2;

        let mut phases = Vec::with_capacity(n);
        let (mut sum_cos, mut sum_sin) = (0.0, 0.0);
        for atom in 0..n {
            let (cx, sx) = tables[0].get(atom, n_vec[0]);
            let (cy, sy) = tables[1].get(atom, n_vec[1]);
            let (cz, sz) = tables[2].get(atom, n_vec[2]);
            let cxy = cx * cy - sx * sy;
            let sxy = sx * cy + cx * sy;
            let c = cxy * cz - sxy * sz;
            let s = sxy * cz + cxy * sz;
            sum_cos += charges[atom] * c;
            sum_sin += charges[atom] * s;
            phases.push((c, s));
        }
        for (atom, (c, s)) in phases.into_iter().enumerate() {
            let scale = force_factor * g * charges[atom] * (sum_cos * s - sum_sin * c);
            local[atom] += scale * k;
        }
        energy_factor * g * (sum_cos * sum_cos + sum_sin * sum_sin)
    };

    let waves = wave_vectors(params.kmax);
    let (energy, recip_forces) = if parallel {
        waves
            .par_iter()
            .fold(
                || (0.0, vec![Vector3::zeros(); n]),
                |(e, mut f), n_vec| {
                    let de = contribution(n_vec, &mut f);
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
    } else {
        let mut f = vec![Vector3::zeros(); n];
        let mut e = 0.0;
        for n_vec in &waves {
            e += contribution(n_vec, &mut f);
        }
        (e, f)
    };

    for (total, part) in forces.iter_mut().zip(recip_forces) {
        *total += part;
    }
    energy
}

/// Interaction of each Gaussian charge cloud with itself.
pub fn self_energy(charges: &[f64], alpha: f64) -> f64 {
    let sum_q2: f64 = charges.iter().map(|q| q * q).sum();
    -ONE_4PI_EPS0 * alpha / PI.sqrt() * sum_q2
}

/// Energy of the uniform background that neutralizes a net charge.
pub fn neutralizing_background(charges: &[f64], alpha: f64, volume: f64) -> f64 {
    let q: f64 = charges.iter().sum();
    -ONE_4PI_EPS0 * PI * q * q / (2.0 * volume * alpha * alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_follows_cutoff_and_tolerance() {
        let params = EwaldParameters::from_tolerance(1.2, 1e-4, &BoxVectors::new(3.0, 3.0, 3.0));
        let expected = (-(2e-4f64).ln()).sqrt() / 1.2;
        assert!((params.alpha - expected).abs() < 1e-12);
        assert!(params.kmax.iter().all(|k| k % 2 == 1));
        assert_eq!(params.kmax[0], params.kmax[1]);
    }

    #[test]
    fn larger_box_needs_more_wave_vectors() {
        let small = EwaldParameters::from_tolerance(1.0, 1e-5, &BoxVectors::new(2.5, 2.5, 2.5));
        let large = EwaldParameters::from_tolerance(1.0, 1e-5, &BoxVectors::new(2.5, 2.5, 6.0));
        assert!(large.kmax[2] > small.kmax[2]);
    }

    #[test]
    fn wave_vectors_cover_half_space_without_origin() {
        let waves = wave_vectors([3, 3, 3]);
        assert!(!waves.contains(&[0, 0, 0]));
        assert_eq!(waves.len(), (5 * 5 * 5 - 1) / 2);
        for w in &waves {
            let neg = [-w[0], -w[1], -w[2]];
            assert!(!waves.contains(&neg));
        }
    }

    #[test]
    fn reciprocal_forces_match_energy_gradient() {
        let cell = BoxVectors::new(2.0, 2.2, 2.4);
        let params = EwaldParameters {
            alpha: 3.0,
            kmax: [7, 7, 7],
        };
        let charges = [0.5, -0.3, -0.2];
        let positions = vec![
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(0.9, 1.4, 0.2),
            Vector3::new(1.5, 0.3, 2.0),
        ];
        let mut forces = vec![Vector3::zeros(); 3];
        reciprocal_space(&positions, &charges, &cell, &params, &mut forces, false);

        let h = 1e-6;
        for atom in 0..3 {
            for d in 0..3 {
                let mut plus = positions.clone();
                let mut minus = positions.clone();
                plus[atom][d] += h;
                minus[atom][d] -= h;
                let mut scratch = vec![Vector3::zeros(); 3];
                let ep = reciprocal_space(&plus, &charges, &cell, &params, &mut scratch, false);
                let em = reciprocal_space(&minus, &charges, &cell, &params, &mut scratch, false);
                let numeric = -(ep - em) / (2.0 * h);
                assert!(
                    (forces[atom][d] - numeric).abs() < 1e-4 * numeric.abs().max(1.0),
                    "atom {} axis {}: {} vs {}",
                    atom,
                    d,
                    forces[atom][d],
                    numeric
                );
            }
        }
    }

    #[test]
    fn parallel_and_serial_sums_agree() {
        let cell = BoxVectors::new(2.0, 2.0, 2.0);
        let params = EwaldParameters {
            alpha: 2.5,
            kmax: [5, 5, 5],
        };
        let charges = [0.4, -0.4];
        let positions = vec![Vector3::new(0.2, 0.2, 0.2), Vector3::new(1.1, 0.7, 1.6)];
        let mut fs = vec![Vector3::zeros(); 2];
        let mut fp = vec![Vector3::zeros(); 2];
        let es = reciprocal_space(&positions, &charges, &cell, &params, &mut fs, false);
        let ep = reciprocal_space(&positions, &charges, &cell, &params, &mut fp, true);
        assert!((es - ep).abs() < 1e-9);
        assert!((fs[1] - fp[1]).norm() < 1e-9);
    }

    #[test]
    fn neutral_system_has_no_background_term() {
        assert_eq!(neutralizing_background(&[0.5, -0.5], 3.0, 27.0), 0.0);
        assert!(neutralizing_background(&[1.0], 3.0, 27.0) < 0.0);
    }
}
