//! # Core Models Module
//!
//! Data structures describing the molecular structure that a simulation is built from.
//!
//! - [`atom`] - individual atoms with element, position and source serial
//! - [`residue`] - residues (molecules, for liquids) grouping atoms
//! - [`chain`] - chains grouping residues
//! - [`topology`] - bonds between atoms
//! - [`cell`] - the periodic simulation cell
//! - [`system`] - the complete [`system::MolecularSystem`] and its builder
//! - [`ids`] - stable identifiers for residues and chains
//!
//! Atoms are addressed by a dense index (`0..atom_count`) because every
//! per-particle array in the engine (positions, velocities, forces, masses) is
//! laid out in that order.

pub mod atom;
pub mod cell;
pub mod chain;
pub mod ids;
pub mod residue;
pub mod system;
pub mod topology;
