use super::ids::ResidueId;
use crate::core::elements;
use nalgebra::Vector3;

/// Represents an atom of the input structure.
///
/// The position is stored in nanometers. The `index` is the atom's dense
/// position in the system and therefore in every per-particle array of the
/// engine; `serial` is the number the atom carried in its source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Dense index of the atom within its system.
    pub index: usize,
    /// Serial number from the source file.
    pub serial: usize,
    /// The atom name (e.g. "C1", "OW").
    pub name: String,
    /// Canonical element symbol (e.g. "C", "Cl"); empty if unknown.
    pub element: String,
    /// The ID of the residue this atom belongs to.
    pub residue_id: ResidueId,
    /// Cartesian position in nm.
    pub position: Vector3<f64>,
}

impl Atom {
    pub fn new(
        index: usize,
        serial: usize,
        name: &str,
        element: &str,
        residue_id: ResidueId,
        position: Vector3<f64>,
    ) -> Self {
        Self {
            index,
            serial,
            name: name.to_string(),
            element: elements::normalize_symbol(element),
            residue_id,
            position,
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        elements::is_hydrogen(&self.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_normalizes_element_symbol() {
        let atom = Atom::new(
            0,
            1,
            "CL1",
            "CL",
            ResidueId::default(),
            Vector3::new(0.1, 0.2, 0.3),
        );
        assert_eq!(atom.element, "Cl");
        assert_eq!(atom.name, "CL1");
        assert_eq!(atom.position, Vector3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn hydrogen_detection_uses_element_not_name() {
        let h = Atom::new(0, 1, "HW1", "H", ResidueId::default(), Vector3::zeros());
        let hg = Atom::new(1, 2, "HG", "Hg", ResidueId::default(), Vector3::zeros());
        assert!(h.is_hydrogen());
        assert!(!hg.is_hydrogen());
    }
}
