use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicBondTerm {
    pub atoms: [usize; 2],
    /// Equilibrium length in nm.
    pub length: f64,
    /// Force constant in kJ/mol/nm².
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicAngleTerm {
    pub atoms: [usize; 3],
    /// Equilibrium angle in radians.
    pub angle: f64,
    /// Force constant in kJ/mol/rad².
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RbTorsionTerm {
    pub atoms: [usize; 4],
    /// Ryckaert-Bellemans coefficients c0..c5 in kJ/mol.
    pub c: [f64; 6],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicTorsionTerm {
    pub atoms: [usize; 4],
    pub periodicity: u32,
    /// Phase in radians.
    pub phase: f64,
    /// Barrier height in kJ/mol.
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonbondedParticle {
    /// Partial charge in e.
    pub charge: f64,
    /// Lennard-Jones sigma in nm.
    pub sigma: f64,
    /// Lennard-Jones well depth in kJ/mol.
    pub epsilon: f64,
}

/// A pair whose interaction replaces the standard nonbonded one.
///
/// Pairs with zero charge product and zero epsilon are plain exclusions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonbondedException {
    pub atoms: [usize; 2],
    pub charge_prod: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

impl NonbondedException {
    pub fn is_exclusion(&self) -> bool {
        self.charge_prod == 0.0 && self.epsilon == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NonbondedMethod {
    NoCutoff,
    CutoffPeriodic,
    Ewald,
    #[default]
    #[serde(rename = "PME", alias = "Pme")]
    Pme,
}

impl NonbondedMethod {
    pub fn is_periodic(&self) -> bool {
        !matches!(self, NonbondedMethod::NoCutoff)
    }

    pub fn uses_ewald(&self) -> bool {
        matches!(self, NonbondedMethod::Ewald | NonbondedMethod::Pme)
    }
}

impl fmt::Display for NonbondedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NonbondedMethod::NoCutoff => "NoCutoff",
            NonbondedMethod::CutoffPeriodic => "CutoffPeriodic",
            NonbondedMethod::Ewald => "Ewald",
            NonbondedMethod::Pme => "PME",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonicBondForce {
    pub bonds: Vec<HarmonicBondTerm>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonicAngleForce {
    pub angles: Vec<HarmonicAngleTerm>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RbTorsionForce {
    pub torsions: Vec<RbTorsionTerm>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodicTorsionForce {
    pub torsions: Vec<PeriodicTorsionTerm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonbondedForce {
    pub method: NonbondedMethod,
    /// Real-space cutoff in nm; ignored for `NoCutoff`.
    pub cutoff: f64,
    pub ewald_error_tolerance: f64,
    pub use_dispersion_correction: bool,
    pub reaction_field_dielectric: f64,
    pub particles: Vec<NonbondedParticle>,
    pub exceptions: Vec<NonbondedException>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CmMotionRemover {
    /// Steps between removals.
    pub frequency: u32,
}

/// Monte Carlo barostat that scales each box axis independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnisotropicBarostat {
    /// Target pressure along x, y, z in bar.
    pub pressure: Vector3<f64>,
    /// Temperature in K; must match the integrator's.
    pub temperature: f64,
    /// Which axes may be rescaled.
    pub scale: [bool; 3],
    /// Steps between volume-move attempts.
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForceParams {
    HarmonicBond(HarmonicBondForce),
    HarmonicAngle(HarmonicAngleForce),
    RbTorsion(RbTorsionForce),
    PeriodicTorsion(PeriodicTorsionForce),
    Nonbonded(NonbondedForce),
    CmMotionRemover(CmMotionRemover),
    AnisotropicBarostat(AnisotropicBarostat),
}

/// The variant tag of a [`ForceParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForceKind {
    HarmonicBond,
    HarmonicAngle,
    RbTorsion,
    PeriodicTorsion,
    Nonbonded,
    CmMotionRemover,
    AnisotropicBarostat,
}

impl ForceKind {
    /// Class name used for this kind of force in log output.
    pub fn name(&self) -> &'static str {
        match self {
            ForceKind::HarmonicBond => "HarmonicBondForce",
            ForceKind::HarmonicAngle => "HarmonicAngleForce",
            ForceKind::RbTorsion => "RBTorsionForce",
            ForceKind::PeriodicTorsion => "PeriodicTorsionForce",
            ForceKind::Nonbonded => "NonbondedForce",
            ForceKind::CmMotionRemover => "CMMotionRemover",
            ForceKind::AnisotropicBarostat => "MonteCarloAnisotropicBarostat",
        }
    }
}

/// One force contribution of an interaction model.
#[derive(Debug, Clone, PartialEq)]
pub struct Force {
    /// Force group (0..32) used to select this force in energy queries.
    pub group: u32,
    /// Whether bonded terms use minimum-image displacements.
    /// Nonbonded forces follow their method instead.
    pub periodic: bool,
    pub params: ForceParams,
}

impl Force {
    pub fn new(params: ForceParams) -> Self {
        Self {
            group: 0,
            periodic: false,
            params,
        }
    }

    pub fn kind(&self) -> ForceKind {
        match &self.params {
            ForceParams::HarmonicBond(_) => ForceKind::HarmonicBond,
            ForceParams::HarmonicAngle(_) => ForceKind::HarmonicAngle,
            ForceParams::RbTorsion(_) => ForceKind::RbTorsion,
            ForceParams::PeriodicTorsion(_) => ForceKind::PeriodicTorsion,
            ForceParams::Nonbonded(_) => ForceKind::Nonbonded,
            ForceParams::CmMotionRemover(_) => ForceKind::CmMotionRemover,
            ForceParams::AnisotropicBarostat(_) => ForceKind::AnisotropicBarostat,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn uses_periodic_boundary_conditions(&self) -> bool {
        match &self.params {
            ForceParams::Nonbonded(nb) => nb.method.is_periodic(),
            ForceParams::CmMotionRemover(_) => false,
            ForceParams::AnisotropicBarostat(_) => false,
            _ => self.periodic,
        }
    }

    /// Bitmask selecting this force's group.
    pub fn group_bit(&self) -> u32 {
        1u32 << (self.group & 31)
    }

    pub fn as_nonbonded(&self) -> Option<&NonbondedForce> {
        match &self.params {
            ForceParams::Nonbonded(nb) => Some(nb),
            _ => None,
        }
    }

    pub fn as_barostat(&self) -> Option<&AnisotropicBarostat> {
        match &self.params {
            ForceParams::AnisotropicBarostat(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_follow_class_names() {
        let force = Force::new(ForceParams::RbTorsion(RbTorsionForce::default()));
        assert_eq!(force.kind(), ForceKind::RbTorsion);
        assert_eq!(force.name(), "RBTorsionForce");
        assert_eq!(
            ForceKind::AnisotropicBarostat.name(),
            "MonteCarloAnisotropicBarostat"
        );
    }

    #[test]
    fn bonded_forces_default_to_non_periodic() {
        let force = Force::new(ForceParams::HarmonicBond(HarmonicBondForce::default()));
        assert!(!force.uses_periodic_boundary_conditions());
    }

    #[test]
    fn nonbonded_periodicity_follows_method() {
        let nb = |method| {
            Force::new(ForceParams::Nonbonded(NonbondedForce {
                method,
                cutoff: 1.0,
                ewald_error_tolerance: 1e-4,
                use_dispersion_correction: true,
                reaction_field_dielectric: 78.3,
                particles: vec![],
                exceptions: vec![],
            }))
        };
        assert!(nb(NonbondedMethod::Pme).uses_periodic_boundary_conditions());
        assert!(!nb(NonbondedMethod::NoCutoff).uses_periodic_boundary_conditions());
    }

    #[test]
    fn exclusion_has_no_interaction() {
        let excl = NonbondedException {
            atoms: [0, 1],
            charge_prod: 0.0,
            sigma: 1.0,
            epsilon: 0.0,
        };
        assert!(excl.is_exclusion());
    }

    #[test]
    fn group_bit_selects_group() {
        let mut force = Force::new(ForceParams::CmMotionRemover(CmMotionRemover { frequency: 1 }));
        force.group = 5;
        assert_eq!(force.group_bit(), 32);
    }
}
