use thiserror::Error;

use super::config::ConfigError;
use super::serialization::StateFileError;
use crate::core::forcefield::energy::EnergyCalculationError;
use crate::core::forcefield::parameterization::ParameterizationError;
use crate::core::forcefield::params::ForceFieldError;
use crate::core::forcefield::transform::TransformError;
use crate::core::io::dcd::DcdError;
use crate::core::io::pdb::PdbError;
use crate::core::models::system::TopologyError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Force field error: {source}")]
    ForceField {
        #[from]
        source: ForceFieldError,
    },

    #[error("Structure file error: {source}")]
    Structure {
        #[from]
        source: PdbError,
    },

    #[error("Topology error: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error("Trajectory error: {source}")]
    Trajectory {
        #[from]
        source: DcdError,
    },

    #[error("State file error: {source}")]
    StateFile {
        #[from]
        source: StateFileError,
    },

    #[error("Failed to build the interaction model: {source}")]
    Parameterization {
        #[from]
        source: ParameterizationError,
    },

    #[error("Failed to set up forces: {source}")]
    Transform {
        #[from]
        source: TransformError,
    },

    #[error("Energy evaluation failed: {source}")]
    Energy {
        #[from]
        source: EnergyCalculationError,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Platform '{name}' is not available (available: {})", available.join(", "))]
    PlatformUnavailable {
        name: String,
        available: Vec<String>,
    },

    #[error("Platform '{platform}' has no property '{name}'")]
    UnknownProperty { platform: String, name: String },

    #[error("Invalid value '{value}' for platform property '{name}': {reason}")]
    InvalidPropertyValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Force '{force}' is in group {group}; groups must be below 32")]
    InvalidForceGroup { force: &'static str, group: u32 },

    #[error(
        "Barostat temperature {barostat} K differs from the integrator temperature {integrator} K"
    )]
    TemperatureMismatch { barostat: f64, integrator: f64 },

    #[error("The model uses periodic boundary conditions but has no box vectors")]
    MissingBox,

    #[error("Invalid box vectors: {0}")]
    InvalidBox(String),

    #[error("Constraints failed to converge after {iterations} iterations")]
    ConstraintFailure { iterations: usize },

    #[error("Energy is not finite at step {step}; the simulation has diverged")]
    NonFiniteEnergy { step: u64 },

    #[error("State mismatch: {what} has {actual} entries, expected {expected}")]
    StateMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Context has no parameter '{0}'")]
    UnknownParameter(String),

    #[error("State does not contain {0}")]
    MissingStateData(&'static str),
}
