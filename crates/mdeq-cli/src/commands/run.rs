use crate::cli::RunArgs;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use mdeq::{
    engine::{progress::ProgressReporter, reporters::SharedWriter},
    workflows,
};
use std::fs::File;
use tracing::info;

pub fn run(args: RunArgs, quiet: bool) -> Result<()> {
    info!("Merging configuration from defaults, file and CLI arguments...");
    let AppConfig {
        report_path,
        core_config,
    } = build_config(&args)?;

    let log = match &report_path {
        Some(path) => {
            info!("Writing the run log to {:?}", path);
            SharedWriter::new(File::create(path)?)
        }
        None => SharedWriter::stdout(),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = if quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::with_callback(progress_handler.get_callback())
    };

    info!(
        "Equilibrating {:?} with {:?} for {} steps...",
        core_config.input.structure_path,
        core_config.input.forcefield_path,
        core_config.run.total_steps()
    );
    let summary = workflows::equilibrate::run(&core_config, log, &reporter)?;

    info!(
        "Minimization took the potential energy from {:.4} to {:.4} kJ/mol.",
        summary.initial_energy, summary.minimized_energy
    );
    if !quiet {
        eprintln!(
            "✓ {} steps done. Trajectory: {}, structure: {}, state: {}",
            summary.total_steps,
            summary.trajectory_path.display(),
            summary.structure_path.display(),
            summary.state_path.display()
        );
    }

    Ok(())
}
