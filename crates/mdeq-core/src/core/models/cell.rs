use nalgebra::Vector3;
use std::fmt;

/// A rectangular periodic simulation cell.
///
/// Only orthorhombic cells are represented: the three box vectors are
/// `(a, 0, 0)`, `(0, b, 0)` and `(0, 0, c)` with lengths in nm. This is the
/// shape the anisotropic barostat preserves when it rescales single axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxVectors {
    pub lengths: Vector3<f64>,
}

impl BoxVectors {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self {
            lengths: Vector3::new(a, b, c),
        }
    }

    pub fn volume(&self) -> f64 {
        self.lengths.x * self.lengths.y * self.lengths.z
    }

    /// The three box vectors as rows `A`, `B`, `C`.
    pub fn vectors(&self) -> [Vector3<f64>; 3] {
        [
            Vector3::new(self.lengths.x, 0.0, 0.0),
            Vector3::new(0.0, self.lengths.y, 0.0),
            Vector3::new(0.0, 0.0, self.lengths.z),
        ]
    }

    pub fn min_length(&self) -> f64 {
        self.lengths.min()
    }

    /// Applies the minimum-image convention to a displacement vector.
    #[inline]
    pub fn min_image(&self, mut delta: Vector3<f64>) -> Vector3<f64> {
        for axis in 0..3 {
            let len = self.lengths[axis];
            delta[axis] -= len * (delta[axis] / len).round();
        }
        delta
    }

    /// Returns a copy of the cell with one axis scaled by `factor`.
    pub fn with_axis_scaled(&self, axis: usize, factor: f64) -> Self {
        let mut lengths = self.lengths;
        lengths[axis] *= factor;
        Self { lengths }
    }

    pub fn is_valid(&self) -> bool {
        self.lengths.iter().all(|l| l.is_finite() && *l > 0.0)
    }
}

impl fmt::Display for BoxVectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}] nm",
            self.lengths.x, self.lengths.y, self.lengths.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn volume_is_product_of_lengths() {
        let cell = BoxVectors::new(2.0, 3.0, 4.0);
        assert!((cell.volume() - 24.0).abs() < TOLERANCE);
    }

    #[test]
    fn min_image_wraps_into_half_box() {
        let cell = BoxVectors::new(2.0, 2.0, 2.0);
        let d = cell.min_image(Vector3::new(1.9, -1.2, 0.4));
        assert!((d.x - (-0.1)).abs() < TOLERANCE);
        assert!((d.y - 0.8).abs() < TOLERANCE);
        assert!((d.z - 0.4).abs() < TOLERANCE);
    }

    #[test]
    fn with_axis_scaled_changes_only_one_axis() {
        let cell = BoxVectors::new(2.0, 3.0, 4.0).with_axis_scaled(1, 1.5);
        assert_eq!(cell.lengths, Vector3::new(2.0, 4.5, 4.0));
    }

    #[test]
    fn vectors_are_diagonal() {
        let [a, b, c] = BoxVectors::new(1.0, 2.0, 3.0).vectors();
        assert_eq!(a, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(b, Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(c, Vector3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn invalid_cells_are_detected() {
        assert!(BoxVectors::new(1.0, 1.0, 1.0).is_valid());
        assert!(!BoxVectors::new(0.0, 1.0, 1.0).is_valid());
        assert!(!BoxVectors::new(f64::NAN, 1.0, 1.0).is_valid());
    }
}
