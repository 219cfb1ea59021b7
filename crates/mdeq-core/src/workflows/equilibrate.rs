use crate::core::forcefield::forces::{AnisotropicBarostat, Force, ForceParams};
use crate::core::forcefield::parameterization::create_model;
use crate::core::forcefield::params::ForceFieldDefinition;
use crate::core::forcefield::transform::{
    assign_force_groups, enable_periodic_bonded, scale_charges,
};
use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::cell::BoxVectors;
use crate::engine::config::EquilibrationConfig;
use crate::engine::context::Context;
use crate::engine::error::EngineError;
use crate::engine::integrator::LangevinIntegrator;
use crate::engine::minimizer::MinimizationReport;
use crate::engine::platform::Platform;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::reporters::{
    CheckpointReporter, DcdReporter, PdbReporter, SharedWriter, StateDataReporter, python_float,
};
use crate::engine::simulation::Simulation;
use crate::engine::state::{State, StateRequest};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// What an equilibration run produced.
#[derive(Debug, Clone)]
pub struct EquilibrationSummary {
    /// Potential energy of the input structure once constrained distances are
    /// enforced, kJ/mol.
    pub initial_energy: f64,
    /// Potential energy after minimization, kJ/mol.
    pub minimized_energy: f64,
    pub minimization: MinimizationReport,
    pub total_steps: u64,
    /// Box written to the final structure file.
    pub final_box: Option<BoxVectors>,
    /// The state written to the state file, with time and step count reset.
    pub final_state: State,
    pub trajectory_path: PathBuf,
    pub structure_path: PathBuf,
    pub state_path: PathBuf,
}

/// The `#`-prefixed run log.
struct RunLog {
    out: SharedWriter,
}

impl RunLog {
    fn line(&mut self, text: impl fmt::Display) -> Result<(), EngineError> {
        writeln!(self.out, "{text}").map_err(|source| EngineError::Io {
            path: "<log>".to_string(),
            source,
        })
    }

    fn timestamp(&mut self) -> Result<(), EngineError> {
        let now = chrono::Local::now();
        self.line(format_args!("# {}", now.format("%Y-%m-%d %H:%M:%S%.6f")))
    }

    /// Logs the potential energy of every force, preceded by the total when
    /// `with_total` is set. Returns the total.
    fn energies(&mut self, context: &Context, with_total: bool) -> Result<f64, EngineError> {
        let state = context.get_state(StateRequest::new().with_energy())?;
        let (Some(total), Some(groups)) = (state.potential_energy, state.group_energies) else {
            return Err(EngineError::MissingStateData("energies"));
        };
        if with_total {
            self.line(format_args!("# PotentialEnergy {} kJ/mol", python_float(total)))?;
        }
        for force in context.model().forces() {
            self.line(format_args!(
                "#   {} {} kJ/mol",
                force.name(),
                python_float(groups.group(force.group))
            ))?;
        }
        Ok(total)
    }
}

fn axis_triple(values: [f64; 3]) -> String {
    let parts: Vec<String> = values.iter().map(|v| python_float(*v)).collect();
    format!("({})", parts.join(", "))
}

/// Equilibrates a periodic structure at constant temperature and pressure.
///
/// Loads the force field and structure, builds the interaction model, adds the
/// anisotropic barostat, minimizes, runs `blocks × steps_per_block` Langevin
/// steps with the configured reporters and finally writes the structure with
/// the equilibrated box and a state file whose time and step count are zero.
/// The run log, including the state-data table, is written to `log`.
#[instrument(skip_all, name = "equilibration_workflow")]
pub fn run(
    config: &EquilibrationConfig,
    log: SharedWriter,
    reporter: &ProgressReporter,
) -> Result<EquilibrationSummary, EngineError> {
    let mut log = RunLog { out: log };
    log.timestamp()?;
    log.line("")?;

    // === Phase 0: Inputs and interaction model ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let input = &config.input;
    log.line(format_args!(
        "# {} {}",
        input.forcefield_path.display(),
        input.structure_path.display()
    ))?;
    let forcefield = ForceFieldDefinition::load(&input.forcefield_path)?;
    let (structure, _) = PdbFile::read_from_path(&input.structure_path)?;
    info!(
        residues = structure.residue_count(),
        atoms = structure.atom_count(),
        bonds = structure.bond_count(),
        "Inputs loaded"
    );

    log.line(format_args!(
        "#   {} molecules {} atoms {} bonds",
        structure.residue_count(),
        structure.atom_count(),
        structure.bond_count()
    ))?;
    match structure.box_vectors() {
        Some(cell) => {
            log.line("# Box vectors (nm):")?;
            log.line("#     x      y      z")?;
            for v in cell.vectors() {
                log.line(format_args!("#   {:6.2} {:6.2} {:6.2}", v.x, v.y, v.z))?;
            }
        }
        None => warn!("Structure has no periodic box"),
    }

    let mut model = create_model(&structure, &forcefield, &config.model.model_options())?;
    if let Some(factor) = config.model.charge_scale {
        let scaled = scale_charges(model.forces_mut(), factor);
        info!(factor, particles = scaled, "Charges scaled");
    }

    let dynamics = &config.dynamics;
    let integrator =
        LangevinIntegrator::new(dynamics.temperature, dynamics.friction, dynamics.step_size);
    log.line(format_args!(
        "# Langevin integrator {} K",
        python_float(dynamics.temperature)
    ))?;
    let pressure = dynamics.pressure;
    log.line(format_args!(
        "#   barostat {}",
        axis_triple([pressure.x, pressure.y, pressure.z])
    ))?;
    model.add_force(Force::new(ForceParams::AnisotropicBarostat(AnisotropicBarostat {
        pressure: dynamics.pressure,
        temperature: dynamics.temperature,
        scale: dynamics.scale_axes,
        frequency: dynamics.barostat_frequency,
    })));

    let platform = Platform::by_name(&config.platform.name)?;

    assign_force_groups(model.forces_mut())?;
    let periodic = enable_periodic_bonded(model.forces_mut());
    info!(
        forces = model.forces().len(),
        periodic_bonded = periodic,
        "Force groups assigned"
    );

    let context = Context::new(
        model,
        integrator,
        &platform,
        &config.platform.properties,
        dynamics.seed,
    )?;
    let mut simulation = Simulation::new(structure, context);
    let positions = simulation.structure.positions();
    simulation.context.set_positions(&positions)?;

    if let Some(temperature) = dynamics.initial_velocity_temperature {
        simulation
            .context
            .set_velocities_to_temperature(temperature, dynamics.seed)?;
        log.line(format_args!("# velocities at {} K", python_float(temperature)))?;
    }
    if let Some(path) = &input.restart_state_path {
        log.line(format_args!("# coordinates and velocities from {}", path.display()))?;
        simulation.load_state(path)?;
        let cell = simulation.context.box_vectors().copied();
        simulation.structure.set_box_vectors(cell);
    }

    let platform = simulation.context.platform();
    log.line(format_args!("# platform {}", platform.name()))?;
    for name in platform.property_names() {
        let value = platform.property_value(name).unwrap_or_default();
        log.line(format_args!("#   {name} {value}"))?;
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Minimization ===
    reporter.report(Progress::PhaseStart {
        name: "Minimization",
    });
    simulation.context.apply_constraints()?;
    let initial_energy = log.energies(&simulation.context, true)?;
    log.line("# Minimizing energy...")?;
    let minimization = simulation.context.minimize(
        config.minimization.tolerance,
        config.minimization.max_iterations,
    )?;
    let minimized_energy = log.energies(&simulation.context, true)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Dynamics ===
    reporter.report(Progress::PhaseStart {
        name: "Equilibration",
    });
    let run = &config.run;
    let output = &config.output;
    simulation.add_reporter(Box::new(StateDataReporter::new(log.out.clone(), run.report_interval)));
    simulation.add_reporter(Box::new(DcdReporter::new(&output.trajectory_path, run.dcd_interval)));
    if let Some(interval) = run.pdb_trajectory_interval {
        simulation.add_reporter(Box::new(PdbReporter::new(&output.pdb_trajectory_path, interval)));
    }
    if let Some(interval) = run.checkpoint_interval {
        simulation.add_reporter(Box::new(CheckpointReporter::new(
            &output.checkpoint_path,
            interval,
        )));
    }

    let total_steps = run.total_steps();
    info!(
        blocks = run.blocks,
        steps_per_block = run.steps_per_block,
        "Starting dynamics"
    );
    reporter.report(Progress::TaskStart { total_steps });
    for _ in 0..run.blocks {
        simulation.step(run.steps_per_block)?;
        reporter.report(Progress::TaskAdvance {
            steps: run.steps_per_block,
        });
    }
    reporter.report(Progress::TaskFinish);
    simulation.finish()?;
    log.energies(&simulation.context, false)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Final structure and state ===
    reporter.report(Progress::PhaseStart { name: "Output" });
    let state = simulation
        .context
        .get_state(StateRequest::new().with_positions().with_velocities())?;
    let positions = state
        .positions
        .ok_or(EngineError::MissingStateData("positions"))?;
    simulation.structure.set_box_vectors(state.box_vectors);
    simulation.structure.set_positions(&positions)?;
    PdbFile::write_system_to_path(&simulation.structure, &output.structure_path)?;
    info!(path = %output.structure_path.display(), "Final structure written");

    simulation.context.set_time(0.0);
    simulation.context.set_step_count(0);
    let final_state = simulation.save_state(&output.state_path)?;
    log.line(format_args!("# state saved to {}", output.state_path.display()))?;
    reporter.report(Progress::PhaseFinish);

    log.line("")?;
    log.timestamp()?;
    log.out.flush().map_err(|source| EngineError::Io {
        path: "<log>".to_string(),
        source,
    })?;

    Ok(EquilibrationSummary {
        initial_energy,
        minimized_energy,
        minimization,
        total_steps,
        final_box: state.box_vectors,
        final_state,
        trajectory_path: output.trajectory_path.clone(),
        structure_path: output.structure_path.clone(),
        state_path: output.state_path.clone(),
    })
}
