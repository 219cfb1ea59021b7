//! # Core Module
//!
//! The stateless building blocks of the engine.
//!
//! - **Molecular Representation** ([`models`]) - atoms, residues, chains, bonds and the periodic
//!   cell
//! - **Force Field** ([`forcefield`]) - XML force-field definitions, the parameterized interaction
//!   model, force kernels and energy evaluation
//! - **File I/O** ([`io`]) - PDB structures and DCD trajectories
//! - **Units and Elements** ([`units`], [`elements`]) - physical constants and element data
//!
//! Everything here is free of simulation state; the [`crate::engine`] layer owns positions,
//! velocities and time.

pub mod elements;
pub mod forcefield;
pub mod io;
pub mod models;
pub mod units;
