use super::ids::ChainId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub number: isize,        // Residue sequence number from the source file
    pub name: String,         // Residue name, matched against force-field templates
    pub chain_id: ChainId,    // ID of the parent chain
    pub hetero: bool,         // Read from (and written back as) HETATM records
    pub(crate) atoms: Vec<usize>, // Dense indices of the atoms in this residue
}

impl Residue {
    pub fn new(number: isize, name: &str, chain_id: ChainId, hetero: bool) -> Self {
        Self {
            number,
            name: name.to_string(),
            chain_id,
            hetero,
            atoms: Vec::new(),
        }
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub(crate) fn add_atom(&mut self, atom_index: usize) {
        if !self.atoms.contains(&atom_index) {
            self.atoms.push(atom_index);
        }
    }
}
