//! Reading and writing the file formats an equilibration run consumes and produces.
//!
//! Structure files implement the [`traits::StructureFile`] trait ([`pdb::PdbFile`]);
//! trajectories are written frame by frame through [`dcd::DcdWriter`].

pub mod dcd;
pub mod pdb;
pub mod traits;
