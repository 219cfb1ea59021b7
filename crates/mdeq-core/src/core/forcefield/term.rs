use std::ops::{Add, AddAssign};

pub const MAX_FORCE_GROUPS: usize = 32;

/// A set of force groups, one bit per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupMask(pub u32);

impl GroupMask {
    pub const ALL: GroupMask = GroupMask(u32::MAX);

    pub fn single(group: u32) -> Self {
        GroupMask(1u32 << (group & 31))
    }

    #[inline]
    pub fn contains(&self, group: u32) -> bool {
        self.0 & (1u32 << (group & 31)) != 0
    }
}

impl Default for GroupMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Potential energy split by force group, in kJ/mol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBreakdown {
    groups: [f64; MAX_FORCE_GROUPS],
}

impl Default for EnergyBreakdown {
    fn default() -> Self {
        Self {
            groups: [0.0; MAX_FORCE_GROUPS],
        }
    }
}

impl EnergyBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_to_group(&mut self, group: u32, energy: f64) {
        self.groups[(group & 31) as usize] += energy;
    }

    pub fn group(&self, group: u32) -> f64 {
        self.groups[(group & 31) as usize]
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.groups.iter().sum()
    }

    /// Sum over the groups selected by `mask`.
    pub fn total_for(&self, mask: GroupMask) -> f64 {
        (0..MAX_FORCE_GROUPS as u32)
            .filter(|g| mask.contains(*g))
            .map(|g| self.group(g))
            .sum()
    }

    pub fn is_finite(&self) -> bool {
        self.groups.iter().all(|e| e.is_finite())
    }
}

impl Add for EnergyBreakdown {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for EnergyBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.groups.iter_mut().zip(rhs.groups.iter()) {
            *a += b;
        }
    }
}
