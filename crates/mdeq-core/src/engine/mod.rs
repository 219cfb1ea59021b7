//! # Engine Module
//!
//! The stateful half of the library: everything that owns and advances a
//! running simulation.
//!
//! ## Overview
//!
//! A [`context::Context`] binds an
//! [`InteractionModel`](crate::core::forcefield::model::InteractionModel) to a
//! [`integrator::LangevinIntegrator`] and a compute [`platform::Platform`]. It owns the
//! positions, velocities, periodic box, elapsed time and step count, and exposes the
//! operations a driver needs: stepping, minimization, state queries and restarts.
//! A [`simulation::Simulation`] adds the structure and a list of periodic reporters.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - the immutable equilibration configuration and its builder
//! - **Platforms** ([`platform`]) - named compute platforms and their properties
//! - **Dynamics** ([`integrator`], [`constraints`], [`barostat`]) - Langevin leapfrog with SHAKE,
//!   and Monte Carlo box moves
//! - **Minimization** ([`minimizer`]) - constrained L-BFGS
//! - **State** ([`state`], [`serialization`]) - snapshots and their XML form
//! - **Reporting** ([`reporters`], [`progress`]) - periodic output and progress events
//! - **Error Handling** ([`error`]) - engine-level error type

pub(crate) mod barostat;
pub mod config;
pub(crate) mod constraints;
pub mod context;
pub mod error;
pub mod integrator;
pub mod minimizer;
pub mod platform;
pub mod progress;
pub mod reporters;
pub mod serialization;
pub mod simulation;
pub mod state;
