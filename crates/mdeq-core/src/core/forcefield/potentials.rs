//! Pure energy/derivative kernels.
//!
//! Pair kernels return `(energy, dE/dr)`. Bonded kernels return the energy
//! together with the force on each participating atom.

use crate::core::units::ONE_4PI_EPS0;
use nalgebra::Vector3;
use std::f64::consts::PI;

const TWO_OVER_SQRT_PI: f64 = std::f64::consts::FRAC_2_SQRT_PI;

/// Complementary error function (Chebyshev fit, fractional error below 1.2e-7).
#[inline]
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t
        * (-z * z - 1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87
                                        + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
            .exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

#[inline]
pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// `E = ½ k (r - r0)²`; `delta` points from atom 1 to atom 2.
#[inline]
pub fn harmonic_bond(delta: &Vector3<f64>, length: f64, k: f64) -> (f64, [Vector3<f64>; 2]) {
    let r = delta.norm();
    let dr = r - length;
    let energy = 0.5 * k * dr * dr;
    if r < 1e-12 {
        return (energy, [Vector3::zeros(); 2]);
    }
    let f2 = -(k * dr / r) * delta;
    (energy, [-f2, f2])
}

/// `E = ½ k (θ - θ0)²` for the angle i-j-k.
///
/// `u = x_i - x_j` and `v = x_k - x_j`.
#[inline]
pub fn harmonic_angle(
    u: &Vector3<f64>,
    v: &Vector3<f64>,
    angle: f64,
    k: f64,
) -> (f64, [Vector3<f64>; 3]) {
    let p = u.cross(v);
    let p_norm = p.norm();
    let theta = p_norm.atan2(u.dot(v));
    let dtheta = theta - angle;
    let energy = 0.5 * k * dtheta * dtheta;
    let u2 = u.norm_squared();
    let v2 = v.norm_squared();
    if p_norm < 1e-12 || u2 < 1e-24 || v2 < 1e-24 {
        return (energy, [Vector3::zeros(); 3]);
    }
    let de_dtheta = k * dtheta;
    let dtheta_du = u.cross(&p) / (u2 * p_norm);
    let dtheta_dv = -v.cross(&p) / (v2 * p_norm);
    let fi = -de_dtheta * dtheta_du;
    let fk = -de_dtheta * dtheta_dv;
    (energy, [fi, -(fi + fk), fk])
}

/// Dihedral angle of four atoms and its gradient with respect to each atom.
///
/// `b1 = x2 - x1`, `b2 = x3 - x2`, `b3 = x4 - x3`. The angle is in (-π, π],
/// zero for the cis conformation.
#[inline]
pub fn dihedral(
    b1: &Vector3<f64>,
    b2: &Vector3<f64>,
    b3: &Vector3<f64>,
) -> Option<(f64, [Vector3<f64>; 4])> {
    let n1 = b1.cross(b2);
    let n2 = b2.cross(b3);
    let n1_sq = n1.norm_squared();
    let n2_sq = n2.norm_squared();
    let l2 = b2.norm_squared();
    if n1_sq < 1e-24 || n2_sq < 1e-24 || l2 < 1e-24 {
        return None;
    }
    let l = l2.sqrt();
    let phi = (l * b1.dot(&n2)).atan2(n1.dot(&n2));

    let g1 = -(l / n1_sq) * n1;
    let g4 = (l / n2_sq) * n2;
    let a = b1.dot(b2) / l2;
    let c = b3.dot(b2) / l2;
    let g2 = -(1.0 + a) * g1 + c * g4;
    let g3 = a * g1 - (1.0 + c) * g4;
    Some((phi, [g1, g2, g3, g4]))
}

/// Ryckaert-Bellemans torsion, `E = Σ cₙ cosⁿ(φ - π)`.
#[inline]
pub fn rb_torsion(phi: f64, c: &[f64; 6]) -> (f64, f64) {
    let psi = phi - PI;
    let cos_psi = psi.cos();
    let sin_psi = psi.sin();
    let mut energy = 0.0;
    let mut de_dcos = 0.0;
    let mut cos_pow = 1.0;
    for (n, cn) in c.iter().enumerate() {
        energy += cn * cos_pow;
        if n + 1 < c.len() {
            de_dcos += (n + 1) as f64 * c[n + 1] * cos_pow;
        }
        cos_pow *= cos_psi;
    }
    (energy, -de_dcos * sin_psi)
}

/// Periodic torsion, `E = k (1 + cos(nφ - φ0))`.
#[inline]
pub fn periodic_torsion(phi: f64, periodicity: u32, phase: f64, k: f64) -> (f64, f64) {
    let n = f64::from(periodicity);
    let arg = n * phi - phase;
    (k * (1.0 + arg.cos()), -k * n * arg.sin())
}

/// 12-6 Lennard-Jones.
#[inline]
pub fn lennard_jones(r: f64, sigma: f64, epsilon: f64) -> (f64, f64) {
    if epsilon == 0.0 || r < 1e-12 {
        return (0.0, 0.0);
    }
    let sr6 = (sigma / r).powi(6);
    let sr12 = sr6 * sr6;
    (
        4.0 * epsilon * (sr12 - sr6),
        24.0 * epsilon / r * (sr6 - 2.0 * sr12),
    )
}

/// Plain Coulomb interaction for a charge product `qq`.
#[inline]
pub fn coulomb(r: f64, qq: f64) -> (f64, f64) {
    if qq == 0.0 || r < 1e-12 {
        return (0.0, 0.0);
    }
    let e = ONE_4PI_EPS0 * qq / r;
    (e, -e / r)
}

/// Coulomb with a reaction-field continuum beyond the cutoff.
#[inline]
pub fn reaction_field(r: f64, qq: f64, krf: f64, crf: f64) -> (f64, f64) {
    if qq == 0.0 || r < 1e-12 {
        return (0.0, 0.0);
    }
    let pre = ONE_4PI_EPS0 * qq;
    (
        pre * (1.0 / r + krf * r * r - crf),
        pre * (-1.0 / (r * r) + 2.0 * krf * r),
    )
}

/// Direct-space Ewald term, `E = qq erfc(αr) / r`.
#[inline]
pub fn ewald_real(r: f64, qq: f64, alpha: f64) -> (f64, f64) {
    if qq == 0.0 || r < 1e-12 {
        return (0.0, 0.0);
    }
    let ar = alpha * r;
    let erfc_ar = erfc(ar);
    let pre = ONE_4PI_EPS0 * qq;
    (
        pre * erfc_ar / r,
        -pre * (erfc_ar / (r * r) + TWO_OVER_SQRT_PI * alpha * (-ar * ar).exp() / r),
    )
}

/// Removes the reciprocal-space interaction of an excluded pair,
/// `E = -qq erf(αr) / r`.
#[inline]
pub fn ewald_exclusion(r: f64, qq: f64, alpha: f64) -> (f64, f64) {
    if qq == 0.0 {
        return (0.0, 0.0);
    }
    let pre = ONE_4PI_EPS0 * qq;
    if r < 1e-8 {
        return (-pre * TWO_OVER_SQRT_PI * alpha, 0.0);
    }
    let ar = alpha * r;
    let erf_ar = erf(ar);
    (
        -pre * erf_ar / r,
        -pre * (TWO_OVER_SQRT_PI * alpha * (-ar * ar).exp() / r - erf_ar / (r * r)),
    )
}
