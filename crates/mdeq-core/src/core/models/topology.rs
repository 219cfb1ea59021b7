#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bond {
    pub atom1: usize, // Dense index of the lower-numbered atom
    pub atom2: usize, // Dense index of the higher-numbered atom
}

impl Bond {
    /// Creates a bond with its atoms stored in ascending order.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            atom1: a.min(b),
            atom2: a.max(b),
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }

    /// Returns the partner of `atom` in this bond, if `atom` takes part in it.
    pub fn other(&self, atom: usize) -> Option<usize> {
        if self.atom1 == atom {
            Some(self.atom2)
        } else if self.atom2 == atom {
            Some(self.atom1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bond_new_orders_atoms() {
        let bond = Bond::new(7, 2);
        assert_eq!(bond.atom1, 2);
        assert_eq!(bond.atom2, 7);
        assert_eq!(bond, Bond::new(2, 7));
    }

    #[test]
    fn bond_contains_returns_true_for_both_atoms() {
        let bond = Bond::new(10, 20);
        assert!(bond.contains(10));
        assert!(bond.contains(20));
        assert!(!bond.contains(30));
    }

    #[test]
    fn bond_other_returns_partner() {
        let bond = Bond::new(1, 5);
        assert_eq!(bond.other(1), Some(5));
        assert_eq!(bond.other(5), Some(1));
        assert_eq!(bond.other(3), None);
    }
}
