//! # Force Field Module
//!
//! Turns an XML force-field definition and a molecular structure into an
//! [`model::InteractionModel`], and evaluates energies and forces of that model.
//!
//! ## Overview
//!
//! The supported functional forms are:
//!
//! - **Harmonic bonds and angles**, with bonds optionally replaced by distance constraints
//! - **Ryckaert-Bellemans and periodic torsions** (propers and impropers)
//! - **Lennard-Jones** with Lorentz-Berthelot combination and a long-range dispersion correction
//! - **Electrostatics** as plain Coulomb, reaction field, or Ewald summation
//!
//! ## Key Components
//!
//! - [`params`] - the parsed XML definition (atom types, residue templates, force sections)
//! - [`parameterization`] - template matching and assembly of the interaction model
//! - [`forces`] - the closed set of force variants and their per-term parameters
//! - [`transform`] - edits applied to the force list by variant (groups, PBC, charges)
//! - [`energy`] - energy and force evaluation with group selection
//! - [`term`] - force-group masks and per-group energy breakdowns
//!
//! ## Usage
//!
//! ```ignore
//! use mdeq::core::forcefield::{parameterization, params::ForceFieldDefinition};
//!
//! let definition = ForceFieldDefinition::load(Path::new("field.xml"))?;
//! let model = parameterization::create_model(&system, &definition, &options)?;
//! ```

pub mod energy;
pub mod ewald;
pub mod forces;
pub mod model;
pub(crate) mod neighbors;
pub mod parameterization;
pub mod params;
pub(crate) mod potentials;
pub mod term;
pub mod transform;
