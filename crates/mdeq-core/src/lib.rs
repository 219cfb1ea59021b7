//! # mdeq Core Library
//!
//! A native molecular dynamics engine together with the NPT equilibration
//! workflow that drives it: load a force field and a periodic structure, build
//! an interaction model with Ewald electrostatics, minimize, run Langevin
//! dynamics under an anisotropic Monte Carlo barostat, and write trajectory,
//! final structure and restart state.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data: the structure model
//!   (`MolecularSystem`), force-field definitions, the parameterized
//!   `InteractionModel`, pure force kernels and file formats (PDB, DCD).
//!
//! - **[`engine`]: The Simulation Machinery.** Stateful objects that own and
//!   mutate a running simulation: compute platforms, the `Context`, the
//!   Langevin integrator with constraints, the Monte Carlo barostat, the energy
//!   minimizer, state snapshots and periodic reporters.
//!
//! - **[`workflows`]: The Public API.** Complete scientific procedures built on
//!   top of the other two layers, most importantly [`workflows::equilibrate`].

pub mod core;
pub mod engine;
pub mod workflows;
