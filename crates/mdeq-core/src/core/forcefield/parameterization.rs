use super::forces::{
    CmMotionRemover, Force, ForceParams, HarmonicAngleForce, HarmonicAngleTerm, HarmonicBondForce,
    HarmonicBondTerm, NonbondedException, NonbondedForce, NonbondedMethod, NonbondedParticle,
    PeriodicTorsionForce, PeriodicTorsionTerm, RbTorsionForce, RbTorsionTerm,
};
use super::model::{Constraint, InteractionModel};
use super::params::{
    AtomMatcher, AtomTypeDef, BondDef, ForceDef, ForceFieldDefinition, NonbondedDef,
    PeriodicTorsionDef, ResidueTemplate,
};
use crate::core::elements;
use crate::core::models::system::MolecularSystem;
use crate::core::models::topology::Bond;
use crate::core::units::REACTION_FIELD_DIELECTRIC;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ParameterizationError {
    #[error("No residue template matches residue {residue} {number}")]
    NoTemplate { residue: String, number: isize },
    #[error("Template '{residue}' uses atom type '{type_name}', which is not defined")]
    UnknownAtomType { residue: String, type_name: String },
    #[error("No nonbonded parameters for atom '{atom}' (type '{type_name}')")]
    MissingNonbondedParameters { atom: String, type_name: String },
    #[error("Template '{residue}' gives no charge for atom '{atom}'")]
    MissingCharge { residue: String, atom: String },
    #[error("No bond length for the constrained bond {atom1}-{atom2}")]
    MissingConstraintLength { atom1: String, atom2: String },
    #[error("Nonbonded method {method} requires periodic box vectors in the structure")]
    NoBox { method: NonbondedMethod },
    #[error("Nonbonded cutoff {cutoff} nm exceeds half the smallest box length ({limit} nm)")]
    CutoffTooLarge { cutoff: f64, limit: f64 },
}

/// Which bonds are replaced by rigid distance constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConstraintMode {
    None,
    /// Bonds involving a hydrogen atom.
    #[default]
    HBonds,
    AllBonds,
}

impl std::fmt::Display for ConstraintMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConstraintMode::None => "None",
            ConstraintMode::HBonds => "HBonds",
            ConstraintMode::AllBonds => "AllBonds",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub nonbonded_method: NonbondedMethod,
    /// Nonbonded cutoff in nm.
    pub cutoff: f64,
    pub constraints: ConstraintMode,
    pub ewald_error_tolerance: f64,
    pub use_dispersion_correction: bool,
    pub remove_cm_motion: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            nonbonded_method: NonbondedMethod::Pme,
            cutoff: 1.2,
            constraints: ConstraintMode::HBonds,
            ewald_error_tolerance: 1e-4,
            use_dispersion_correction: true,
            remove_cm_motion: true,
        }
    }
}

/// Per-atom assignment made while matching residue templates.
struct AtomAssignment<'a> {
    template: &'a ResidueTemplate,
    template_atom: usize,
    atom_type: &'a AtomTypeDef,
}

/// Builds an [`InteractionModel`] for a structure from a force-field definition.
pub struct Parameterizer<'a> {
    forcefield: &'a ForceFieldDefinition,
    options: &'a ModelOptions,
}

/// Convenience wrapper around [`Parameterizer::build`].
pub fn create_model(
    system: &MolecularSystem,
    forcefield: &ForceFieldDefinition,
    options: &ModelOptions,
) -> Result<InteractionModel, ParameterizationError> {
    Parameterizer::new(forcefield, options).build(system)
}

impl<'a> Parameterizer<'a> {
    pub fn new(forcefield: &'a ForceFieldDefinition, options: &'a ModelOptions) -> Self {
        Self {
            forcefield,
            options,
        }
    }

    pub fn build(
        &self,
        system: &MolecularSystem,
    ) -> Result<InteractionModel, ParameterizationError> {
        self.check_box(system)?;

        let assignments = self.assign_templates(system)?;
        let bonds = self.effective_bonds(system, &assignments);
        let graph = BondGraph::new(system.atom_count(), &bonds);

        let masses = system
            .atoms()
            .iter()
            .zip(&assignments)
            .map(|(atom, a)| {
                if a.atom_type.mass > 0.0 {
                    a.atom_type.mass
                } else {
                    elements::atomic_mass(&atom.element).unwrap_or(0.0)
                }
            })
            .collect();
        let mut model = InteractionModel::new(masses);
        model.set_molecules(graph.components());
        model.set_default_box(system.box_vectors().copied());

        let constrained = self.constraints(system, &assignments, &bonds)?;
        for constraint in &constrained {
            model.add_constraint(*constraint);
        }
        let constrained_pairs: HashSet<Bond> = constrained
            .iter()
            .map(|c| Bond::new(c.atoms[0], c.atoms[1]))
            .collect();

        for def in &self.forcefield.forces {
            let params = match def {
                ForceDef::HarmonicBond(defs) => ForceParams::HarmonicBond(self.bond_force(
                    defs,
                    &assignments,
                    &bonds,
                    &constrained_pairs,
                )),
                ForceDef::HarmonicAngle(defs) => {
                    let mut force = HarmonicAngleForce::default();
                    let mut skipped = 0;
                    for [i, j, k] in graph.angles() {
                        let types = [i, j, k].map(|a| assignments[a].atom_type);
                        match defs.iter().find(|d| matches_either_way(&d.atoms, types)) {
                            Some(d) => force.angles.push(HarmonicAngleTerm {
                                atoms: [i, j, k],
                                angle: d.angle,
                                k: d.k,
                            }),
                            None => {
                                debug!("No angle parameters for atoms {}-{}-{}", i, j, k);
                                skipped += 1;
                            }
                        }
                    }
                    report_skipped("angle", skipped);
                    ForceParams::HarmonicAngle(force)
                }
                ForceDef::RbTorsion(defs) => {
                    let mut force = RbTorsionForce::default();
                    let mut skipped = 0;
                    for atoms in graph.propers() {
                        let types = atoms.map(|i| assignments[i].atom_type);
                        match best_match(defs.iter().map(|d| &d.atoms), types) {
                            Some(index) => force.torsions.push(RbTorsionTerm {
                                atoms,
                                c: defs[index].c,
                            }),
                            None => {
                                debug!("No RB torsion parameters for atoms {:?}", atoms);
                                skipped += 1;
                            }
                        }
                    }
                    report_skipped("RB torsion", skipped);
                    ForceParams::RbTorsion(force)
                }
                ForceDef::PeriodicTorsion { propers, impropers } => ForceParams::PeriodicTorsion(
                    self.periodic_torsion_force(propers, impropers, &assignments, &graph),
                ),
                ForceDef::Nonbonded(def) => {
                    ForceParams::Nonbonded(self.nonbonded_force(def, system, &assignments, &graph)?)
                }
            };
            model.add_force(Force::new(params));
        }

        if self.options.remove_cm_motion {
            model.add_force(Force::new(ForceParams::CmMotionRemover(CmMotionRemover {
                frequency: 1,
            })));
        }

        info!(
            "Built interaction model: {} particles, {} constraints, {} forces, {} molecules",
            model.particle_count(),
            model.constraints().len(),
            model.forces().len(),
            model.molecules().len()
        );
        Ok(model)
    }

    fn check_box(&self, system: &MolecularSystem) -> Result<(), ParameterizationError> {
        let method = self.options.nonbonded_method;
        if !method.is_periodic() {
            return Ok(());
        }
        let cell = system
            .box_vectors()
            .ok_or(ParameterizationError::NoBox { method })?;
        let limit = 0.5 * cell.min_length();
        if self.options.cutoff > limit {
            return Err(ParameterizationError::CutoffTooLarge {
                cutoff: self.options.cutoff,
                limit,
            });
        }
        Ok(())
    }

    /// Matches every residue against a template: first by residue name and
    /// atom-name set, then by atom-name set alone.
    fn assign_templates(
        &self,
        system: &MolecularSystem,
    ) -> Result<Vec<AtomAssignment<'a>>, ParameterizationError> {
        let forcefield: &'a ForceFieldDefinition = self.forcefield;
        let mut slots: Vec<Option<AtomAssignment<'a>>> =
            (0..system.atom_count()).map(|_| None).collect();

        for (_, residue) in system.residues() {
            let names: BTreeSet<&str> = residue
                .atoms()
                .iter()
                .filter_map(|&i| system.atom(i))
                .map(|a| a.name.as_str())
                .collect();
            let same_atoms = |t: &&ResidueTemplate| {
                t.atoms.len() == names.len()
                    && t.atoms.iter().all(|a| names.contains(a.name.as_str()))
            };
            let template = forcefield
                .residues
                .iter()
                .filter(|t| t.name == residue.name)
                .find(same_atoms)
                .or_else(|| forcefield.residues.iter().find(same_atoms))
                .ok_or_else(|| ParameterizationError::NoTemplate {
                    residue: residue.name.clone(),
                    number: residue.number,
                })?;
            if template.name != residue.name {
                debug!(
                    "Residue {} {} matched template '{}' by atom names",
                    residue.name, residue.number, template.name
                );
            }

            for &index in residue.atoms() {
                let Some(atom) = system.atom(index) else {
                    continue;
                };
                let Some(template_atom) = template.atom_index(&atom.name) else {
                    continue;
                };
                let type_name = &template.atoms[template_atom].type_name;
                let atom_type = forcefield.atom_type(type_name).ok_or_else(|| {
                    ParameterizationError::UnknownAtomType {
                        residue: template.name.clone(),
                        type_name: type_name.clone(),
                    }
                })?;
                slots[index] = Some(AtomAssignment {
                    template,
                    template_atom,
                    atom_type,
                });
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    let (residue, number) = system
                        .atom(index)
                        .and_then(|a| system.residue(a.residue_id))
                        .map(|r| (r.name.clone(), r.number))
                        .unwrap_or_default();
                    ParameterizationError::NoTemplate { residue, number }
                })
            })
            .collect()
    }

    /// Structure bonds, plus template bonds for residues that carry no
    /// intra-residue bonds of their own.
    fn effective_bonds(
        &self,
        system: &MolecularSystem,
        assignments: &[AtomAssignment<'_>],
    ) -> Vec<Bond> {
        let mut bonds: BTreeSet<Bond> = system.bonds().iter().copied().collect();
        for (residue_id, residue) in system.residues() {
            if !system.intra_residue_bonds(residue_id).is_empty() {
                continue;
            }
            let Some(&first) = residue.atoms().first() else {
                continue;
            };
            let template = assignments[first].template;
            let by_template_atom = |t: usize| {
                residue
                    .atoms()
                    .iter()
                    .copied()
                    .find(|&i| assignments[i].template_atom == t)
            };
            let mut added = 0;
            for &(a, b) in &template.bonds {
                if let (Some(i), Some(j)) = (by_template_atom(a), by_template_atom(b)) {
                    bonds.insert(Bond::new(i, j));
                    added += 1;
                }
            }
            debug!(
                "Residue {} {} has no bonds; added {} from template '{}'",
                residue.name, residue.number, added, template.name
            );
        }
        bonds.into_iter().collect()
    }

    fn constraints(
        &self,
        system: &MolecularSystem,
        assignments: &[AtomAssignment<'_>],
        bonds: &[Bond],
    ) -> Result<Vec<Constraint>, ParameterizationError> {
        let bond_defs: Vec<&BondDef> = self
            .forcefield
            .forces
            .iter()
            .filter_map(|f| match f {
                ForceDef::HarmonicBond(defs) => Some(defs.iter()),
                _ => None,
            })
            .flatten()
            .collect();

        let mut constraints = Vec::new();
        for bond in bonds {
            let (a, b) = (bond.atom1, bond.atom2);
            let constrained = match self.options.constraints {
                ConstraintMode::None => false,
                ConstraintMode::AllBonds => true,
                ConstraintMode::HBonds => {
                    let atoms = system.atoms();
                    atoms[a].is_hydrogen() || atoms[b].is_hydrogen()
                }
            };
            if !constrained {
                continue;
            }
            let types = [assignments[a].atom_type, assignments[b].atom_type];
            let def = bond_defs
                .iter()
                .find(|d| matches_either_way(&d.atoms, types))
                .ok_or_else(|| ParameterizationError::MissingConstraintLength {
                    atom1: system.atoms()[a].name.clone(),
                    atom2: system.atoms()[b].name.clone(),
                })?;
            constraints.push(Constraint {
                atoms: [a, b],
                distance: def.length,
            });
        }
        Ok(constraints)
    }

    fn bond_force(
        &self,
        defs: &[BondDef],
        assignments: &[AtomAssignment<'_>],
        bonds: &[Bond],
        constrained: &HashSet<Bond>,
    ) -> HarmonicBondForce {
        let mut force = HarmonicBondForce::default();
        let mut skipped = 0;
        for bond in bonds {
            if constrained.contains(bond) {
                continue;
            }
            let (a, b) = (bond.atom1, bond.atom2);
            let types = [assignments[a].atom_type, assignments[b].atom_type];
            match defs.iter().find(|d| matches_either_way(&d.atoms, types)) {
                Some(d) => force.bonds.push(HarmonicBondTerm {
                    atoms: [a, b],
                    length: d.length,
                    k: d.k,
                }),
                None => {
                    debug!("No bond parameters for atoms {}-{}", a, b);
                    skipped += 1;
                }
            }
        }
        report_skipped("bond", skipped);
        force
    }

    fn periodic_torsion_force(
        &self,
        propers: &[PeriodicTorsionDef],
        impropers: &[PeriodicTorsionDef],
        assignments: &[AtomAssignment<'_>],
        graph: &BondGraph,
    ) -> PeriodicTorsionForce {
        let mut force = PeriodicTorsionForce::default();
        let mut skipped = 0;
        for atoms in graph.propers() {
            let types = atoms.map(|i| assignments[i].atom_type);
            match best_match(propers.iter().map(|d| &d.atoms), types) {
                Some(index) => push_periodic_terms(&mut force, atoms, &propers[index]),
                None => {
                    debug!("No proper torsion parameters for atoms {:?}", atoms);
                    skipped += 1;
                }
            }
        }
        report_skipped("proper torsion", skipped);

        if impropers.is_empty() {
            return force;
        }
        for center in 0..graph.len() {
            let neighbors = graph.neighbors(center);
            if neighbors.len() != 3 {
                continue;
            }
            let center_type = assignments[center].atom_type;
            let mut best: Option<(usize, [usize; 3], usize)> = None;
            for (index, def) in impropers.iter().enumerate() {
                if !def.atoms[0].matches(center_type) {
                    continue;
                }
                for order in PERMUTATIONS {
                    let outer = order.map(|p| neighbors[p]);
                    let fits = outer
                        .iter()
                        .zip(&def.atoms[1..])
                        .all(|(&i, m)| m.matches(assignments[i].atom_type));
                    if !fits {
                        continue;
                    }
                    let wildcards = def.atoms.iter().filter(|m| m.is_wildcard()).count();
                    if best.is_none_or(|(_, _, w)| wildcards < w) {
                        best = Some((index, outer, wildcards));
                    }
                }
            }
            if let Some((index, [a2, a3, a4], _)) = best {
                push_periodic_terms(&mut force, [a2, a3, center, a4], &impropers[index]);
            }
        }
        force
    }

    fn nonbonded_force(
        &self,
        def: &NonbondedDef,
        system: &MolecularSystem,
        assignments: &[AtomAssignment<'_>],
        graph: &BondGraph,
    ) -> Result<NonbondedForce, ParameterizationError> {
        let mut particles = Vec::with_capacity(assignments.len());
        for (atom, assignment) in system.atoms().iter().zip(assignments) {
            let atom_type = assignment.atom_type;
            let entry = def
                .atoms
                .iter()
                .find(|a| matches!(&a.atom, AtomMatcher::Type(name) if *name == atom_type.name))
                .or_else(|| def.atoms.iter().find(|a| a.atom.matches(atom_type)))
                .ok_or_else(|| ParameterizationError::MissingNonbondedParameters {
                    atom: atom.name.clone(),
                    type_name: atom_type.name.clone(),
                })?;
            let charge = if def.charge_from_residue {
                assignment.template.atoms[assignment.template_atom]
                    .charge
                    .ok_or_else(|| ParameterizationError::MissingCharge {
                        residue: assignment.template.name.clone(),
                        atom: atom.name.clone(),
                    })?
            } else {
                entry.charge.unwrap_or(0.0)
            };
            particles.push(NonbondedParticle {
                charge,
                sigma: entry.sigma,
                epsilon: entry.epsilon,
            });
        }

        let (excluded, pairs14) = graph.exclusions();
        let mut exceptions = Vec::with_capacity(excluded.len() + pairs14.len());
        for (i, j) in excluded {
            exceptions.push(NonbondedException {
                atoms: [i, j],
                charge_prod: 0.0,
                sigma: 1.0,
                epsilon: 0.0,
            });
        }
        for (i, j) in pairs14 {
            let (pi, pj) = (&particles[i], &particles[j]);
            exceptions.push(NonbondedException {
                atoms: [i, j],
                charge_prod: def.coulomb14scale * pi.charge * pj.charge,
                sigma: 0.5 * (pi.sigma + pj.sigma),
                epsilon: def.lj14scale * (pi.epsilon * pj.epsilon).sqrt(),
            });
        }

        let net_charge: f64 = particles.iter().map(|p| p.charge).sum();
        if net_charge.abs() > 1e-6 {
            warn!("System has a net charge of {:.6} e", net_charge);
        }

        Ok(NonbondedForce {
            method: self.options.nonbonded_method,
            cutoff: self.options.cutoff,
            ewald_error_tolerance: self.options.ewald_error_tolerance,
            use_dispersion_correction: self.options.use_dispersion_correction,
            reaction_field_dielectric: REACTION_FIELD_DIELECTRIC,
            particles,
            exceptions,
        })
    }
}

const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

fn report_skipped(kind: &str, skipped: usize) {
    if skipped > 0 {
        warn!("Skipped {skipped} {kind} term(s) with no matching parameters");
    }
}

fn push_periodic_terms(
    force: &mut PeriodicTorsionForce,
    atoms: [usize; 4],
    def: &PeriodicTorsionDef,
) {
    for term in &def.terms {
        force.torsions.push(PeriodicTorsionTerm {
            atoms,
            periodicity: term.periodicity,
            phase: term.phase,
            k: term.k,
        });
    }
}

fn matches_forward<const N: usize>(matchers: &[AtomMatcher; N], types: [&AtomTypeDef; N]) -> bool {
    matchers.iter().zip(types).all(|(m, t)| m.matches(t))
}

fn matches_either_way<const N: usize>(
    matchers: &[AtomMatcher; N],
    types: [&AtomTypeDef; N],
) -> bool {
    let mut reversed = types;
    reversed.reverse();
    matches_forward(matchers, types) || matches_forward(matchers, reversed)
}

/// Index of the matching definition with the fewest wildcards; the first
/// one in file order wins ties.
fn best_match<'d, const N: usize>(
    candidates: impl Iterator<Item = &'d [AtomMatcher; N]>,
    types: [&AtomTypeDef; N],
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, matchers) in candidates.enumerate() {
        if !matches_either_way(matchers, types) {
            continue;
        }
        let wildcards = matchers.iter().filter(|m| m.is_wildcard()).count();
        if best.is_none_or(|(_, w)| wildcards < w) {
            best = Some((index, wildcards));
        }
    }
    best.map(|(index, _)| index)
}

/// Adjacency of the bonds a model is built from.
struct BondGraph {
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<usize>>,
}

impl BondGraph {
    fn new(atom_count: usize, bonds: &[Bond]) -> Self {
        let mut adjacency = vec![Vec::new(); atom_count];
        for bond in bonds {
            adjacency[bond.atom1].push(bond.atom2);
            adjacency[bond.atom2].push(bond.atom1);
        }
        for list in adjacency.iter_mut() {
            list.sort_unstable();
        }
        Self {
            bonds: bonds.to_vec(),
            adjacency,
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    fn neighbors(&self, atom: usize) -> &[usize] {
        &self.adjacency[atom]
    }

    fn components(&self) -> Vec<Vec<usize>> {
        let n = self.adjacency.len();
        let mut visited = vec![false; n];
        let mut molecules = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut molecule = Vec::new();
            let mut stack = vec![start];
            while let Some(atom) = stack.pop() {
                molecule.push(atom);
                for &next in &self.adjacency[atom] {
                    if !visited[next] {
                        visited[next] = true;
                        stack.push(next);
                    }
                }
            }
            molecule.sort_unstable();
            molecules.push(molecule);
        }
        molecules
    }

    /// Every `i-j-k` with `i < k` bonded to the centre `j`.
    fn angles(&self) -> Vec<[usize; 3]> {
        let mut angles = Vec::new();
        for (j, neighbors) in self.adjacency.iter().enumerate() {
            for (n, &i) in neighbors.iter().enumerate() {
                for &k in &neighbors[n + 1..] {
                    angles.push([i, j, k]);
                }
            }
        }
        angles
    }

    /// Every `a-b-c-d` chain around each bond `b-c`.
    fn propers(&self) -> Vec<[usize; 4]> {
        let mut torsions = Vec::new();
        for bond in &self.bonds {
            let (b, c) = (bond.atom1, bond.atom2);
            for &a in &self.adjacency[b] {
                if a == c {
                    continue;
                }
                for &d in &self.adjacency[c] {
                    if d == b || d == a {
                        continue;
                    }
                    torsions.push([a, b, c, d]);
                }
            }
        }
        torsions
    }

    /// 1-2 and 1-3 pairs, and the 1-4 pairs that are neither.
    fn exclusions(&self) -> (BTreeSet<(usize, usize)>, BTreeSet<(usize, usize)>) {
        let ordered = |a: usize, b: usize| (a.min(b), a.max(b));
        let mut excluded = BTreeSet::new();
        for bond in &self.bonds {
            excluded.insert(ordered(bond.atom1, bond.atom2));
        }
        for [i, _, k] in self.angles() {
            excluded.insert(ordered(i, k));
        }
        let pairs14 = self
            .propers()
            .into_iter()
            .map(|[a, _, _, d]| ordered(a, d))
            .filter(|pair| !excluded.contains(pair))
            .collect();
        (excluded, pairs14)
    }
}
