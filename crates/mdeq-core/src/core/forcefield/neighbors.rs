use crate::core::models::cell::BoxVectors;
use nalgebra::Vector3;

/// A pair of atoms within the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborPair {
    pub i: usize,
    pub j: usize,
    /// `x_i - x_j`, minimum-imaged for periodic systems.
    pub delta: Vector3<f64>,
    pub r2: f64,
}

/// Builds the list of pairs `i < j` closer than `cutoff`.
///
/// With a periodic cell of at least three cutoff-sized cells per axis, a cell
/// list with half-shell neighbour search is used; otherwise every pair is
/// tested. Without a cell or cutoff every pair is returned.
pub fn build_pairs(
    positions: &[Vector3<f64>],
    cell: Option<&BoxVectors>,
    cutoff: Option<f64>,
) -> Vec<NeighborPair> {
    match (cell, cutoff) {
        (Some(cell), Some(cutoff)) => {
            let dims = cell.lengths.map(|l| (l / cutoff).floor() as usize);
            if dims.iter().all(|&n| n >= 3) {
                cell_list_pairs(positions, cell, cutoff, [dims.x, dims.y, dims.z])
            } else {
                brute_force_pairs(positions, Some(cell), Some(cutoff))
            }
        }
        (cell, cutoff) => brute_force_pairs(positions, cell, cutoff),
    }
}

fn brute_force_pairs(
    positions: &[Vector3<f64>],
    cell: Option<&BoxVectors>,
    cutoff: Option<f64>,
) -> Vec<NeighborPair> {
    let cutoff2 = cutoff.map(|c| c * c).unwrap_or(f64::INFINITY);
    let mut pairs = Vec::new();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let mut delta = positions[i] - positions[j];
            if let Some(cell) = cell {
                delta = cell.min_image(delta);
            }
            let r2 = delta.norm_squared();
            if r2 < cutoff2 {
                pairs.push(NeighborPair { i, j, delta, r2 });
            }
        }
    }
    pairs
}

const HALF_SHELL: [(i64, i64, i64); 13] = [
    (1, 0, 0),
    (-1, 1, 0),
    (0, 1, 0),
    (1, 1, 0),
    (-1, -1, 1),
    (0, -1, 1),
    (1, -1, 1),
    (-1, 0, 1),
    (0, 0, 1),
    (1, 0, 1),
    (-1, 1, 1),
    (0, 1, 1),
    (1, 1, 1),
];

fn cell_list_pairs(
    positions: &[Vector3<f64>],
    cell: &BoxVectors,
    cutoff: f64,
    dims: [usize; 3],
) -> Vec<NeighborPair> {
    let cutoff2 = cutoff * cutoff;
    let n_cells = dims[0] * dims[1] * dims[2];
    let mut heads: Vec<Vec<usize>> = vec![Vec::new(); n_cells];
    let index = |c: [usize; 3]| (c[2] * dims[1] + c[1]) * dims[0] + c[0];

    for (atom, p) in positions.iter().enumerate() {
        let mut c = [0usize; 3];
        for axis in 0..3 {
            let l = cell.lengths[axis];
            let frac = (p[axis] / l).rem_euclid(1.0);
            c[axis] = ((frac * dims[axis] as f64) as usize).min(dims[axis] - 1);
        }
        heads[index(c)].push(atom);
    }

    let mut pairs = Vec::new();
    let mut push_if_close = |a: usize, b: usize| {
        let (i, j) = if a < b { (a, b) } else { (b, a) };
        let delta = cell.min_image(positions[i] - positions[j]);
        let r2 = delta.norm_squared();
        if r2 < cutoff2 {
            pairs.push(NeighborPair { i, j, delta, r2 });
        }
    };

    for cz in 0..dims[2] {
        for cy in 0..dims[1] {
            for cx in 0..dims[0] {
                let home = &heads[index([cx, cy, cz])];
                for (k, &a) in home.iter().enumerate() {
                    for &b in &home[k + 1..] {
                        push_if_close(a, b);
                    }
                }
                for (dx, dy, dz) in HALF_SHELL {
                    let wrap = |c: usize, d: i64, n: usize| {
                        (c as i64 + d).rem_euclid(n as i64) as usize
                    };
                    let other = &heads[index([
                        wrap(cx, dx, dims[0]),
                        wrap(cy, dy, dims[1]),
                        wrap(cz, dz, dims[2]),
                    ])];
                    for &a in home {
                        for &b in other {
                            push_if_close(a, b);
                        }
                    }
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn random_positions(n: usize, cell: &BoxVectors, seed: u64) -> Vec<Vector3<f64>> {
        let mut rng = Pcg64::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-0.5..1.5) * cell.lengths.x,
                    rng.gen_range(0.0..1.0) * cell.lengths.y,
                    rng.gen_range(0.0..1.0) * cell.lengths.z,
                )
            })
            .collect()
    }

    fn sorted_keys(pairs: &[NeighborPair]) -> Vec<(usize, usize)> {
        let mut keys: Vec<_> = pairs.iter().map(|p| (p.i, p.j)).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn cell_list_finds_the_same_pairs_as_brute_force() {
        let cell = BoxVectors::new(3.3, 3.6, 4.0);
        let positions = random_positions(300, &cell, 7);
        let fast = build_pairs(&positions, Some(&cell), Some(1.0));
        let slow = brute_force_pairs(&positions, Some(&cell), Some(1.0));
        assert_eq!(sorted_keys(&fast), sorted_keys(&slow));
        assert!(!fast.is_empty());
    }

    #[test]
    fn small_cell_falls_back_to_brute_force() {
        let cell = BoxVectors::new(2.5, 2.5, 2.5);
        let positions = random_positions(50, &cell, 3);
        let pairs = build_pairs(&positions, Some(&cell), Some(1.2));
        let slow = brute_force_pairs(&positions, Some(&cell), Some(1.2));
        assert_eq!(sorted_keys(&pairs), sorted_keys(&slow));
    }

    #[test]
    fn pairs_use_minimum_image_displacements() {
        let cell = BoxVectors::new(3.0, 3.0, 3.0);
        let positions = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::new(2.9, 0.0, 0.0)];
        let pairs = build_pairs(&positions, Some(&cell), Some(1.0));
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].delta.x - 0.2).abs() < 1e-12);
    }

    #[test]
    fn no_cutoff_returns_every_pair() {
        let positions = vec![
            Vector3::zeros(),
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 50.0, 0.0),
        ];
        assert_eq!(build_pairs(&positions, None, None).len(), 3);
    }
}
