//! # Workflows Module
//!
//! Complete procedures built from the `core` and `engine` layers.
//!
//! ## Overview
//!
//! A workflow takes an immutable configuration, loads its inputs, builds and
//! drives a simulation, and writes its outputs. Progress is surfaced through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter) and the
//! human-readable run log goes to a caller-supplied writer.
//!
//! ## Architecture
//!
//! - **Equilibration** ([`equilibrate`]) - minimization followed by Langevin
//!   dynamics under an anisotropic Monte Carlo barostat, producing a
//!   trajectory, a final structure and a restart state.

pub mod equilibrate;
