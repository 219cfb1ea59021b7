use super::atom::Atom;
use super::cell::BoxVectors;
use super::chain::Chain;
use super::ids::{ChainId, ResidueId};
use super::residue::Residue;
use super::topology::Bond;
use nalgebra::Vector3;
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("A residue must be started before atoms are added")]
    NoCurrentResidue,
    #[error("A chain must be started before residues are added")]
    NoCurrentChain,
    #[error("Duplicate atom serial: {0}")]
    DuplicateSerial(usize),
    #[error("Bond references unknown atom serial {0}")]
    UnknownSerial(usize),
    #[error("Bond from atom {0} to itself")]
    SelfBond(usize),
    #[error("Expected {expected} positions, got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },
}

/// The molecular structure a simulation is built from.
///
/// Holds chains, residues, atoms and bonds, the periodic cell and the current
/// atom positions (nm). Once built, the number of atoms and bonds is fixed;
/// positions and the cell may be updated (e.g. before writing the final
/// structure of a run).
#[derive(Debug, Clone, Default)]
pub struct MolecularSystem {
    /// Atoms in dense index order.
    atoms: Vec<Atom>,
    /// Primary storage for residues.
    residues: SlotMap<ResidueId, Residue>,
    /// Primary storage for chains.
    chains: SlotMap<ChainId, Chain>,
    /// Chains in the order they were first seen.
    chain_order: Vec<ChainId>,
    /// All bonds, deduplicated.
    bonds: Vec<Bond>,
    /// Cached adjacency list indexed by atom index.
    bond_adjacency: Vec<Vec<usize>>,
    /// The periodic cell, if the structure is periodic.
    box_vectors: Option<BoxVectors>,
}

impl MolecularSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    /// Iterates chains in file order.
    pub fn chains(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chain_order
            .iter()
            .filter_map(|&id| self.chains.get(id).map(|c| (id, c)))
    }

    /// Iterates residues in file order (chain by chain).
    pub fn residues(&self) -> impl Iterator<Item = (ResidueId, &Residue)> {
        self.chains().flat_map(move |(_, chain)| {
            chain
                .residues()
                .iter()
                .filter_map(move |&id| self.residues.get(id).map(|r| (id, r)))
        })
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bonded_neighbors(&self, atom_index: usize) -> &[usize] {
        self.bond_adjacency
            .get(atom_index)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn box_vectors(&self) -> Option<&BoxVectors> {
        self.box_vectors.as_ref()
    }

    pub fn set_box_vectors(&mut self, box_vectors: Option<BoxVectors>) {
        self.box_vectors = box_vectors;
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    pub fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<(), TopologyError> {
        if positions.len() != self.atoms.len() {
            return Err(TopologyError::PositionCountMismatch {
                expected: self.atoms.len(),
                actual: positions.len(),
            });
        }
        for (atom, pos) in self.atoms.iter_mut().zip(positions) {
            atom.position = *pos;
        }
        Ok(())
    }

    /// Adds a bond between two atoms by dense index.
    ///
    /// Adding an existing bond is a no-op. Used while building a system and
    /// when force-field templates supply bonds a structure file left out.
    pub(crate) fn add_bond(&mut self, a: usize, b: usize) -> Result<(), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfBond(a));
        }
        let n = self.atoms.len();
        if a >= n || b >= n {
            return Err(TopologyError::UnknownSerial(a.max(b)));
        }
        if self.bond_adjacency[a].contains(&b) {
            return Ok(());
        }
        self.bonds.push(Bond::new(a, b));
        self.bond_adjacency[a].push(b);
        self.bond_adjacency[b].push(a);
        Ok(())
    }

    /// Partitions the atoms into molecules (connected components of the bond
    /// graph). Each molecule lists its atoms in ascending index order and the
    /// molecules are ordered by their first atom.
    pub fn molecules(&self) -> Vec<Vec<usize>> {
        let n = self.atoms.len();
        let mut visited = vec![false; n];
        let mut molecules = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            let mut molecule = Vec::new();
            let mut stack = vec![start];
            visited[start] = true;
            while let Some(atom) = stack.pop() {
                molecule.push(atom);
                for &next in &self.bond_adjacency[atom] {
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

    /// Returns the set of bonded pairs that lie within a single residue.
    pub fn intra_residue_bonds(&self, residue_id: ResidueId) -> HashSet<Bond> {
        self.bonds
            .iter()
            .filter(|b| {
                self.atoms[b.atom1].residue_id == residue_id
                    && self.atoms[b.atom2].residue_id == residue_id
            })
            .copied()
            .collect()
    }
}

/// Incremental construction of a [`MolecularSystem`] in file order.
pub struct MolecularSystemBuilder {
    system: MolecularSystem,
    atom_serial_map: HashMap<usize, usize>,
    chain_id_map: HashMap<char, ChainId>,
    current_chain: Option<ChainId>,
    current_residue: Option<ResidueId>,
    pending_bonds: Vec<(usize, usize)>,
}

impl Default for MolecularSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MolecularSystemBuilder {
    pub fn new() -> Self {
        Self {
            system: MolecularSystem::new(),
            atom_serial_map: HashMap::new(),
            chain_id_map: HashMap::new(),
            current_chain: None,
            current_residue: None,
            pending_bonds: Vec::new(),
        }
    }

    pub fn start_chain(&mut self, id: char) -> &mut Self {
        let system = &mut self.system;
        let chain_id = *self.chain_id_map.entry(id).or_insert_with(|| {
            let chain_id = system.chains.insert(Chain::new(id));
            system.chain_order.push(chain_id);
            chain_id
        });
        self.current_chain = Some(chain_id);
        self.current_residue = None;
        self
    }

    pub fn start_residue(
        &mut self,
        number: isize,
        name: &str,
        hetero: bool,
    ) -> Result<&mut Self, TopologyError> {
        let chain_id = self.current_chain.ok_or(TopologyError::NoCurrentChain)?;
        let residue_id = self
            .system
            .residues
            .insert(Residue::new(number, name, chain_id, hetero));
        if let Some(chain) = self.system.chains.get_mut(chain_id) {
            chain.residues.push(residue_id);
        }
        self.current_residue = Some(residue_id);
        Ok(self)
    }

    pub fn add_atom(
        &mut self,
        serial: usize,
        name: &str,
        element: &str,
        position: Vector3<f64>,
    ) -> Result<&mut Self, TopologyError> {
        let residue_id = self
            .current_residue
            .ok_or(TopologyError::NoCurrentResidue)?;
        if self.atom_serial_map.contains_key(&serial) {
            return Err(TopologyError::DuplicateSerial(serial));
        }
        let index = self.system.atoms.len();
        self.system
            .atoms
            .push(Atom::new(index, serial, name, element, residue_id, position));
        self.system.bond_adjacency.push(Vec::new());
        if let Some(residue) = self.system.residues.get_mut(residue_id) {
            residue.add_atom(index);
        }
        self.atom_serial_map.insert(serial, index);
        Ok(self)
    }

    /// Records a bond by source serial numbers; resolved in [`Self::build`]
    /// so that bonds may reference atoms that appear later in the file.
    pub fn add_bond(&mut self, serial1: usize, serial2: usize) -> &mut Self {
        self.pending_bonds.push((serial1, serial2));
        self
    }

    pub fn box_vectors(&mut self, box_vectors: BoxVectors) -> &mut Self {
        self.system.box_vectors = Some(box_vectors);
        self
    }

    pub fn build(mut self) -> Result<MolecularSystem, TopologyError> {
        let mut pending = std::mem::take(&mut self.pending_bonds);
        pending.sort_unstable();
        pending.dedup();
        for (s1, s2) in pending {
            let a = *self
                .atom_serial_map
                .get(&s1)
                .ok_or(TopologyError::UnknownSerial(s1))?;
            let b = *self
                .atom_serial_map
                .get(&s2)
                .ok_or(TopologyError::UnknownSerial(s2))?;
            self.system.add_bond(a, b)?;
        }
        Ok(self.system)
    }
}
