use crate::core::forcefield::forces::NonbondedMethod;
use crate::core::forcefield::parameterization::{ConstraintMode, ModelOptions};
use nalgebra::Vector3;
use std::path::PathBuf;
use thiserror::Error;

/// Platform requested when none is configured. It is a GPU platform and is
/// not among the platforms this engine provides, so a run that keeps it fails
/// with [`EngineError::PlatformUnavailable`](super::error::EngineError).
pub const DEFAULT_PLATFORM: &str = "OpenCL";

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("At least one barostat axis must be scaled")]
    NoScaledAxis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub forcefield_path: PathBuf,
    pub structure_path: PathBuf,
    /// Saved state to restart from instead of the structure coordinates.
    pub restart_state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub nonbonded_method: NonbondedMethod,
    /// Nonbonded cutoff in nm.
    pub cutoff: f64,
    pub ewald_error_tolerance: f64,
    pub constraints: ConstraintMode,
    pub use_dispersion_correction: bool,
    /// Factor applied to every nonbonded charge after the model is built.
    pub charge_scale: Option<f64>,
}

impl ModelConfig {
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            nonbonded_method: self.nonbonded_method,
            cutoff: self.cutoff,
            constraints: self.constraints,
            ewald_error_tolerance: self.ewald_error_tolerance,
            use_dispersion_correction: self.use_dispersion_correction,
            remove_cm_motion: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsConfig {
    /// Kelvin; shared by the integrator and the barostat.
    pub temperature: f64,
    /// Friction coefficient in 1/ps.
    pub friction: f64,
    /// Time step in ps.
    pub step_size: f64,
    /// Per-axis target pressure in bar.
    pub pressure: Vector3<f64>,
    pub scale_axes: [bool; 3],
    /// Steps between Monte Carlo box moves.
    pub barostat_frequency: u32,
    /// Draw initial velocities from a Maxwell-Boltzmann distribution at this temperature.
    pub initial_velocity_temperature: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizationConfig {
    /// RMS force tolerance in kJ/mol/nm.
    pub tolerance: f64,
    /// `0` runs until converged.
    pub max_iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConfig {
    pub name: String,
    /// Property overrides applied in order.
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub blocks: u64,
    pub steps_per_block: u64,
    /// Steps between state-data lines.
    pub report_interval: u64,
    /// Steps between DCD frames.
    pub dcd_interval: u64,
    pub pdb_trajectory_interval: Option<u64>,
    pub checkpoint_interval: Option<u64>,
}

impl RunConfig {
    pub fn total_steps(&self) -> u64 {
        self.blocks * self.steps_per_block
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub trajectory_path: PathBuf,
    pub structure_path: PathBuf,
    pub state_path: PathBuf,
    pub pdb_trajectory_path: PathBuf,
    pub checkpoint_path: PathBuf,
}

/// Everything an equilibration run needs, fixed before the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibrationConfig {
    pub input: InputConfig,
    pub model: ModelConfig,
    pub dynamics: DynamicsConfig,
    pub minimization: MinimizationConfig,
    pub platform: PlatformConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

impl EquilibrationConfig {
    pub fn builder() -> EquilibrationConfigBuilder {
        EquilibrationConfigBuilder::new()
    }
}

/// Builds an [`EquilibrationConfig`]; every unset value takes its default.
#[derive(Default)]
pub struct EquilibrationConfigBuilder {
    forcefield_path: Option<PathBuf>,
    structure_path: Option<PathBuf>,
    restart_state_path: Option<PathBuf>,
    nonbonded_method: Option<NonbondedMethod>,
    cutoff: Option<f64>,
    ewald_error_tolerance: Option<f64>,
    constraints: Option<ConstraintMode>,
    use_dispersion_correction: Option<bool>,
    charge_scale: Option<f64>,
    temperature: Option<f64>,
    friction: Option<f64>,
    step_size: Option<f64>,
    pressure: Option<Vector3<f64>>,
    scale_axes: Option<[bool; 3]>,
    barostat_frequency: Option<u32>,
    initial_velocity_temperature: Option<f64>,
    seed: Option<u64>,
    minimization_tolerance: Option<f64>,
    minimization_max_iterations: Option<usize>,
    platform_name: Option<String>,
    platform_properties: Option<Vec<(String, String)>>,
    blocks: Option<u64>,
    steps_per_block: Option<u64>,
    report_interval: Option<u64>,
    dcd_interval: Option<u64>,
    pdb_trajectory_interval: Option<u64>,
    checkpoint_interval: Option<u64>,
    trajectory_path: Option<PathBuf>,
    final_structure_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
    pdb_trajectory_path: Option<PathBuf>,
    checkpoint_path: Option<PathBuf>,
}

impl EquilibrationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forcefield_path(mut self, path: PathBuf) -> Self {
        self.forcefield_path = Some(path);
        self
    }
    pub fn structure_path(mut self, path: PathBuf) -> Self {
        self.structure_path = Some(path);
        self
    }
    pub fn restart_state_path(mut self, path: Option<PathBuf>) -> Self {
        self.restart_state_path = path;
        self
    }
    pub fn nonbonded_method(mut self, method: NonbondedMethod) -> Self {
        self.nonbonded_method = Some(method);
        self
    }
    pub fn cutoff(mut self, cutoff_nm: f64) -> Self {
        self.cutoff = Some(cutoff_nm);
        self
    }
    pub fn ewald_error_tolerance(mut self, tolerance: f64) -> Self {
        self.ewald_error_tolerance = Some(tolerance);
        self
    }
    pub fn constraints(mut self, mode: ConstraintMode) -> Self {
        self.constraints = Some(mode);
        self
    }
    pub fn use_dispersion_correction(mut self, enabled: bool) -> Self {
        self.use_dispersion_correction = Some(enabled);
        self
    }
    pub fn charge_scale(mut self, factor: Option<f64>) -> Self {
        self.charge_scale = factor;
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn friction(mut self, per_ps: f64) -> Self {
        self.friction = Some(per_ps);
        self
    }
    pub fn step_size(mut self, ps: f64) -> Self {
        self.step_size = Some(ps);
        self
    }
    pub fn pressure(mut self, bar: Vector3<f64>) -> Self {
        self.pressure = Some(bar);
        self
    }
    pub fn scale_axes(mut self, axes: [bool; 3]) -> Self {
        self.scale_axes = Some(axes);
        self
    }
    pub fn barostat_frequency(mut self, steps: u32) -> Self {
        self.barostat_frequency = Some(steps);
        self
    }
    pub fn initial_velocity_temperature(mut self, kelvin: Option<f64>) -> Self {
        self.initial_velocity_temperature = kelvin;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn minimization_tolerance(mut self, tolerance: f64) -> Self {
        self.minimization_tolerance = Some(tolerance);
        self
    }
    pub fn minimization_max_iterations(mut self, iterations: usize) -> Self {
        self.minimization_max_iterations = Some(iterations);
        self
    }
    pub fn platform_name(mut self, name: &str) -> Self {
        self.platform_name = Some(name.to_string());
        self
    }
    pub fn platform_properties(mut self, properties: Vec<(String, String)>) -> Self {
        self.platform_properties = Some(properties);
        self
    }
    pub fn blocks(mut self, blocks: u64) -> Self {
        self.blocks = Some(blocks);
        self
    }
    pub fn steps_per_block(mut self, steps: u64) -> Self {
        self.steps_per_block = Some(steps);
        self
    }
    pub fn report_interval(mut self, steps: u64) -> Self {
        self.report_interval = Some(steps);
        self
    }
    pub fn dcd_interval(mut self, steps: u64) -> Self {
        self.dcd_interval = Some(steps);
        self
    }
    pub fn pdb_trajectory_interval(mut self, steps: Option<u64>) -> Self {
        self.pdb_trajectory_interval = steps;
        self
    }
    pub fn checkpoint_interval(mut self, steps: Option<u64>) -> Self {
        self.checkpoint_interval = steps;
        self
    }
    pub fn trajectory_path(mut self, path: PathBuf) -> Self {
        self.trajectory_path = Some(path);
        self
    }
    pub fn final_structure_path(mut self, path: PathBuf) -> Self {
        self.final_structure_path = Some(path);
        self
    }
    pub fn state_path(mut self, path: PathBuf) -> Self {
        self.state_path = Some(path);
        self
    }
    pub fn pdb_trajectory_path(mut self, path: PathBuf) -> Self {
        self.pdb_trajectory_path = Some(path);
        self
    }
    pub fn checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }

    pub fn build(self) -> Result<EquilibrationConfig, ConfigError> {
        let model = ModelConfig {
            nonbonded_method: self.nonbonded_method.unwrap_or_default(),
            cutoff: positive("cutoff", self.cutoff.unwrap_or(1.2))?,
            ewald_error_tolerance: positive(
                "ewald_error_tolerance",
                self.ewald_error_tolerance.unwrap_or(1e-4),
            )?,
            constraints: self.constraints.unwrap_or_default(),
            use_dispersion_correction: self.use_dispersion_correction.unwrap_or(true),
            charge_scale: self
                .charge_scale
                .map(|f| positive("charge_scale", f))
                .transpose()?,
        };

        let scale_axes = self.scale_axes.unwrap_or([true, true, false]);
        if !scale_axes.iter().any(|&s| s) {
            return Err(ConfigError::NoScaledAxis);
        }
        let friction = self.friction.unwrap_or(5.0);
        if !(friction >= 0.0 && friction.is_finite()) {
            return Err(invalid("friction", friction, "must be non-negative"));
        }
        let dynamics = DynamicsConfig {
            temperature: positive("temperature", self.temperature.unwrap_or(323.0))?,
            friction,
            step_size: positive("step_size", self.step_size.unwrap_or(0.001))?,
            pressure: self.pressure.unwrap_or(Vector3::new(1.0, 1.0, 0.0)),
            scale_axes,
            barostat_frequency: nonzero(
                "barostat_frequency",
                self.barostat_frequency.unwrap_or(5),
            )?,
            initial_velocity_temperature: self
                .initial_velocity_temperature
                .map(|t| positive("initial_velocity_temperature", t))
                .transpose()?,
            seed: self.seed,
        };

        let minimization = MinimizationConfig {
            tolerance: positive(
                "minimization_tolerance",
                self.minimization_tolerance.unwrap_or(10.0),
            )?,
            max_iterations: self.minimization_max_iterations.unwrap_or(0),
        };

        let platform = PlatformConfig {
            name: self
                .platform_name
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
            properties: self
                .platform_properties
                .unwrap_or_else(|| vec![("Precision".to_string(), "single".to_string())]),
        };

        let run = RunConfig {
            blocks: self.blocks.unwrap_or(1000),
            steps_per_block: self.steps_per_block.unwrap_or(1000),
            report_interval: nonzero("report_interval", self.report_interval.unwrap_or(1000))?,
            dcd_interval: nonzero("dcd_interval", self.dcd_interval.unwrap_or(5000))?,
            pdb_trajectory_interval: self
                .pdb_trajectory_interval
                .map(|n| nonzero("pdb_trajectory_interval", n))
                .transpose()?,
            checkpoint_interval: self
                .checkpoint_interval
                .map(|n| nonzero("checkpoint_interval", n))
                .transpose()?,
        };

        Ok(EquilibrationConfig {
            input: InputConfig {
                forcefield_path: self
                    .forcefield_path
                    .unwrap_or_else(|| PathBuf::from("field.xml")),
                structure_path: self
                    .structure_path
                    .unwrap_or_else(|| PathBuf::from("config.pdb")),
                restart_state_path: self.restart_state_path,
            },
            model,
            dynamics,
            minimization,
            platform,
            run,
            output: OutputConfig {
                trajectory_path: self
                    .trajectory_path
                    .unwrap_or_else(|| PathBuf::from("equil.dcd")),
                structure_path: self
                    .final_structure_path
                    .unwrap_or_else(|| PathBuf::from("equil.pdb")),
                state_path: self
                    .state_path
                    .unwrap_or_else(|| PathBuf::from("state-eq.xml")),
                pdb_trajectory_path: self
                    .pdb_trajectory_path
                    .unwrap_or_else(|| PathBuf::from("traj.pdb")),
                checkpoint_path: self
                    .checkpoint_path
                    .unwrap_or_else(|| PathBuf::from("restart.xml")),
            },
        })
    }
}

fn invalid(name: &'static str, value: impl ToString, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason,
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(name, value, "must be positive"))
    }
}

fn nonzero<T: Copy + Default + PartialEq + ToString>(
    name: &'static str,
    value: T,
) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(invalid(name, value, "must be at least 1"))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::platform::Platform;

    #[test]
    fn defaults_reproduce_the_reference_run() {
        let config = EquilibrationConfig::builder().build().unwrap();
        assert_eq!(config.input.forcefield_path, PathBuf::from("field.xml"));
        assert_eq!(config.input.structure_path, PathBuf::from("config.pdb"));
        assert_eq!(config.model.nonbonded_method, NonbondedMethod::Pme);
        assert_eq!(config.model.cutoff, 1.2);
        assert_eq!(config.model.ewald_error_tolerance, 1e-4);
        assert_eq!(config.model.constraints, ConstraintMode::HBonds);
        assert_eq!(config.dynamics.temperature, 323.0);
        assert_eq!(config.dynamics.friction, 5.0);
        assert_eq!(config.dynamics.step_size, 0.001);
        assert_eq!(config.dynamics.pressure, Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(config.dynamics.scale_axes, [true, true, false]);
        assert_eq!(config.dynamics.barostat_frequency, 5);
        assert_eq!(config.run.total_steps(), 1_000_000);
        assert_eq!(config.run.report_interval, 1000);
        assert_eq!(config.run.dcd_interval, 5000);
        assert_eq!(config.platform.name, DEFAULT_PLATFORM);
        assert!(!Platform::available().contains(&DEFAULT_PLATFORM));
        assert_eq!(
            config.platform.properties,
            vec![("Precision".to_string(), "single".to_string())]
        );
        assert_eq!(config.output.trajectory_path, PathBuf::from("equil.dcd"));
        assert_eq!(config.output.structure_path, PathBuf::from("equil.pdb"));
        assert_eq!(config.output.state_path, PathBuf::from("state-eq.xml"));
    }

    #[test]
    fn rejects_non_positive_physical_values() {
        assert!(matches!(
            EquilibrationConfig::builder().step_size(0.0).build(),
            Err(ConfigError::InvalidValue {
                name: "step_size",
                ..
            })
        ));
        assert!(matches!(
            EquilibrationConfig::builder().temperature(-1.0).build(),
            Err(ConfigError::InvalidValue {
                name: "temperature",
                ..
            })
        ));
        assert!(matches!(
            EquilibrationConfig::builder().report_interval(0).build(),
            Err(ConfigError::InvalidValue {
                name: "report_interval",
                ..
            })
        ));
        assert_eq!(
            EquilibrationConfig::builder()
                .scale_axes([false; 3])
                .build()
                .unwrap_err(),
            ConfigError::NoScaledAxis
        );
    }

    #[test]
    fn model_options_follow_model_section() {
        let config = EquilibrationConfig::builder()
            .cutoff(1.0)
            .constraints(ConstraintMode::AllBonds)
            .build()
            .unwrap();
        let options = config.model.model_options();
        assert_eq!(options.cutoff, 1.0);
        assert_eq!(options.constraints, ConstraintMode::AllBonds);
        assert!(options.remove_cm_motion);
    }
}
