//! Physical constants in the engine's unit system.
//!
//! Lengths are in nm, time in ps, mass in amu, charge in e, energy in kJ/mol,
//! temperature in K and pressure in bar.

/// Boltzmann constant in kJ/(mol·K).
pub const BOLTZ: f64 = 0.008_314_462_618_153_24;

/// Coulomb prefactor 1/(4πε₀) in kJ·nm/(mol·e²).
pub const ONE_4PI_EPS0: f64 = 138.935_456;

/// One bar expressed in kJ/(mol·nm³).
pub const BAR_TO_KJ_MOL_NM3: f64 = 0.060_221_407_6;

/// Converts a density in amu/nm³ to g/mL.
pub const AMU_PER_NM3_TO_G_PER_ML: f64 = 1.660_539_066_60e-3;

pub const ANGSTROM_PER_NM: f64 = 10.0;

/// AKMA time unit in ps, used by the DCD header.
pub const AKMA_TIME_PS: f64 = 0.048_888_21;

/// Default dielectric of the reaction-field continuum for cutoff electrostatics.
pub const REACTION_FIELD_DIELECTRIC: f64 = 78.3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thermal_energy_at_room_temperature_is_about_two_and_a_half_kj() {
        let kt = BOLTZ * 300.0;
        assert!((kt - 2.494).abs() < 1e-3);
    }

    #[test]
    fn one_bar_times_one_cubic_nanometer_is_small() {
        assert!(BAR_TO_KJ_MOL_NM3 < 0.1);
        assert!(BAR_TO_KJ_MOL_NM3 > 0.05);
    }
}
