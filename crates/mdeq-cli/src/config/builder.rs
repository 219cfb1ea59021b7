use super::defaults::DEFAULT_CONFIG_FILE;
use super::file::{FileConfig, apply_set_values};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use mdeq::engine::config::{EquilibrationConfig, EquilibrationConfigBuilder};
use nalgebra::Vector3;
use std::path::Path;
use toml::Table;
use tracing::{debug, info};

/// Calls `$builder.$method(value)` when `$value` is `Some`.
macro_rules! apply {
    ($builder:ident . $method:ident ( $value:expr )) => {
        if let Some(value) = $value {
            $builder = $builder.$method(value);
        }
    };
}

/// Merges built-in defaults, the configuration file, `--set` values and
/// explicit flags, in increasing order of precedence.
pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    build_config_in(args, Path::new("."))
}

fn build_config_in(args: &RunArgs, working_dir: &Path) -> Result<AppConfig> {
    let table = match &args.config {
        Some(path) => FileConfig::load_table(path)?,
        None => {
            let implicit = working_dir.join(DEFAULT_CONFIG_FILE);
            if implicit.is_file() {
                info!("Using configuration file {:?}", implicit);
                FileConfig::load_table(&implicit)?
            } else {
                debug!("No configuration file; using built-in defaults.");
                Table::new()
            }
        }
    };
    let table = apply_set_values(table, &args.set_values)?;
    let file = FileConfig::from_table(table)?;

    let input = file.input.unwrap_or_default();
    let model = file.model.unwrap_or_default();
    let dynamics = file.dynamics.unwrap_or_default();
    let minimization = file.minimization.unwrap_or_default();
    let platform = file.platform.unwrap_or_default();
    let run = file.run.unwrap_or_default();
    let output = file.output.unwrap_or_default();

    let mut builder = EquilibrationConfig::builder();

    apply!(builder.forcefield_path(args.forcefield.clone().or(input.forcefield)));
    apply!(builder.structure_path(args.structure.clone().or(input.structure)));
    apply!(builder.restart_state_path(args.restart.clone().or(input.restart_state).map(Some)));

    apply!(builder.nonbonded_method(model.nonbonded_method));
    apply!(builder.cutoff(model.cutoff));
    apply!(builder.ewald_error_tolerance(model.ewald_error_tolerance));
    apply!(builder.constraints(model.constraints));
    apply!(builder.use_dispersion_correction(model.dispersion_correction));
    apply!(builder.charge_scale(args.charge_scale.or(model.charge_scale).map(Some)));

    let temperature = args.temperature.or(dynamics.temperature);
    apply!(builder.temperature(temperature));
    apply!(builder.friction(dynamics.friction));
    apply!(builder.step_size(dynamics.step_size));
    apply!(builder.pressure(dynamics.pressure.map(Vector3::from)));
    apply!(builder.scale_axes(dynamics.scale_axes));
    apply!(builder.barostat_frequency(dynamics.barostat_frequency));
    let velocity_temperature = if args.init_velocities {
        Some(temperature.unwrap_or(builder_default_temperature()?))
    } else {
        dynamics.initial_velocity_temperature
    };
    apply!(builder.initial_velocity_temperature(velocity_temperature.map(Some)));
    apply!(builder.seed(args.seed.or(dynamics.seed).map(Some)));

    apply!(builder.minimization_tolerance(minimization.tolerance));
    apply!(builder.minimization_max_iterations(minimization.max_iterations));

    if let Some(name) = args.platform.as_deref().or(platform.name.as_deref()) {
        builder = builder.platform_name(name);
    }
    builder = merge_platform_properties(builder, platform.properties, &args.properties)?;

    apply!(builder.blocks(args.blocks.or(run.blocks)));
    apply!(builder.steps_per_block(args.steps_per_block.or(run.steps_per_block)));
    apply!(builder.report_interval(run.report_interval));
    apply!(builder.dcd_interval(run.dcd_interval));
    apply!(builder.pdb_trajectory_interval(run.pdb_interval.map(Some)));
    apply!(builder.checkpoint_interval(run.checkpoint_interval.map(Some)));

    apply!(builder.trajectory_path(output.trajectory));
    apply!(builder.final_structure_path(output.structure));
    apply!(builder.state_path(output.state));
    apply!(builder.pdb_trajectory_path(output.pdb_trajectory));
    apply!(builder.checkpoint_path(output.checkpoint));

    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    debug!("Final configuration: {:?}", core_config);

    Ok(AppConfig {
        report_path: args.report.clone().or(output.report),
        core_config,
    })
}

fn builder_default_temperature() -> Result<f64> {
    EquilibrationConfig::builder()
        .build()
        .map(|c| c.dynamics.temperature)
        .map_err(|e| CliError::Config(e.to_string()))
}

/// File properties are applied first, then `-P` assignments, which replace
/// a file entry of the same name. When neither gives any, the built-in
/// properties stay.
fn merge_platform_properties(
    builder: EquilibrationConfigBuilder,
    file_properties: Option<std::collections::BTreeMap<String, String>>,
    cli_properties: &[String],
) -> Result<EquilibrationConfigBuilder> {
    if file_properties.is_none() && cli_properties.is_empty() {
        return Ok(builder);
    }
    let mut properties: Vec<(String, String)> =
        file_properties.unwrap_or_default().into_iter().collect();
    for assignment in cli_properties {
        let (name, value) =
            parser::parse_assignment(assignment).map_err(|e| CliError::Argument(e.to_string()))?;
        match properties.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => properties.push((name, value)),
        }
    }
    Ok(builder.platform_properties(properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdeq::core::forcefield::forces::NonbondedMethod;
    use mdeq::core::forcefield::parameterization::ConstraintMode;
    use std::path::PathBuf;

    fn args_with_config(path: PathBuf) -> RunArgs {
        RunArgs {
            config: Some(path),
            ..Default::default()
        }
    }

    #[test]
    fn no_file_and_no_flags_gives_the_built_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_config_in(&RunArgs::default(), dir.path()).unwrap();
        let defaults = EquilibrationConfig::builder().build().unwrap();
        assert_eq!(app.core_config, defaults);
        assert_eq!(app.report_path, None);
        assert_eq!(
            app.core_config.input.forcefield_path,
            PathBuf::from("field.xml")
        );
        assert_eq!(app.core_config.model.nonbonded_method, NonbondedMethod::Pme);
        assert_eq!(app.core_config.model.constraints, ConstraintMode::HBonds);
    }

    #[test]
    fn implicit_config_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[run]\nblocks = 3\nsteps-per-block = 7\n",
        )
        .unwrap();
        let app = build_config_in(&RunArgs::default(), dir.path()).unwrap();
        assert_eq!(app.core_config.run.total_steps(), 21);
    }

    #[test]
    fn flags_override_sets_which_override_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eq.toml");
        std::fs::write(
            &path,
            r#"
[dynamics]
temperature = 300.0
friction = 1.0

[run]
blocks = 5

[platform]
name = "CPU"
properties = { Precision = "mixed", Threads = "2" }

[output]
report = "eq.log"
"#,
        )
        .unwrap();
        let args = RunArgs {
            temperature: Some(350.0),
            blocks: Some(2),
            platform: Some("Reference".to_string()),
            properties: vec!["Precision=double".to_string()],
            set_values: vec![
                "dynamics.friction=2".to_string(),
                "run.blocks=4".to_string(),
                "model.charge-scale=0.8".to_string(),
            ],
            ..args_with_config(path)
        };
        let app = build_config_in(&args, dir.path()).unwrap();
        let config = app.core_config;

        assert_eq!(config.dynamics.temperature, 350.0);
        assert_eq!(config.dynamics.friction, 2.0);
        assert_eq!(config.run.blocks, 2);
        assert_eq!(config.model.charge_scale, Some(0.8));
        assert_eq!(config.platform.name, "Reference");
        assert_eq!(
            config.platform.properties,
            vec![
                ("Precision".to_string(), "double".to_string()),
                ("Threads".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(app.report_path, Some(PathBuf::from("eq.log")));
    }

    #[test]
    fn init_velocities_uses_the_dynamics_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            init_velocities: true,
            temperature: Some(298.0),
            ..Default::default()
        };
        let config = build_config_in(&args, dir.path()).unwrap().core_config;
        assert_eq!(config.dynamics.initial_velocity_temperature, Some(298.0));

        let args = RunArgs {
            init_velocities: true,
            ..Default::default()
        };
        let config = build_config_in(&args, dir.path()).unwrap().core_config;
        assert_eq!(config.dynamics.initial_velocity_temperature, Some(323.0));
    }

    #[test]
    fn invalid_values_surface_as_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            set_values: vec!["model.cutoff=-1.0".to_string()],
            ..Default::default()
        };
        let result = build_config_in(&args, dir.path());
        assert!(matches!(result, Err(CliError::Config(_))));

        let args = RunArgs {
            set_values: vec!["dynamics.scale-axes=[false, false, false]".to_string()],
            ..Default::default()
        };
        let result = build_config_in(&args, dir.path());
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn malformed_property_is_an_argument_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            properties: vec!["Precision".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            build_config_in(&args, dir.path()),
            Err(CliError::Argument(_))
        ));
    }
}
