use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The mdeq developers",
    version,
    about = "mdeq - NPT equilibration of periodic molecular systems with a native molecular dynamics engine.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress diagnostics and the progress bar; errors are still shown
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write diagnostics to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Minimize and equilibrate a periodic structure under constant temperature and pressure.
    Run(RunArgs),
    /// Print the default configuration file.
    Config(ConfigArgs),
    /// List the compute platforms and their properties.
    Platforms,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file in TOML format. `mdeq.toml` in the working
    /// directory is used when present and no file is given.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Input Overrides ---
    /// Force-field XML file.
    #[arg(short = 'f', long, value_name = "PATH")]
    pub forcefield: Option<PathBuf>,

    /// Structure file (PDB) with bonds and periodic box.
    #[arg(short = 's', long, value_name = "PATH")]
    pub structure: Option<PathBuf>,

    /// Restart from a saved state file instead of the structure coordinates.
    #[arg(long, value_name = "PATH")]
    pub restart: Option<PathBuf>,

    // --- Model and Dynamics Overrides ---
    /// Multiply every nonbonded charge by this factor after the model is built.
    #[arg(long, value_name = "FLOAT")]
    pub charge_scale: Option<f64>,

    /// Temperature of the integrator and barostat in K.
    #[arg(short = 'T', long, value_name = "KELVIN")]
    pub temperature: Option<f64>,

    /// Draw initial velocities at the dynamics temperature.
    #[arg(long)]
    pub init_velocities: bool,

    /// Seed for the integrator, barostat and velocity generator.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Run Overrides ---
    /// Number of step blocks.
    #[arg(short, long, value_name = "INT")]
    pub blocks: Option<u64>,

    /// Integration steps per block.
    #[arg(long, value_name = "INT")]
    pub steps_per_block: Option<u64>,

    // --- Platform Overrides ---
    /// Compute platform name. Defaults to OpenCL, which this build lacks; use Reference or CPU.
    #[arg(short, long, value_name = "NAME")]
    pub platform: Option<String>,

    /// Set a platform property. Can be used multiple times. Example: -P Precision=double
    #[arg(short = 'P', long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    // --- Output Overrides ---
    /// Write the run log and state-data table to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S dynamics.friction=1.0
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

/// Arguments for the `config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Write the configuration to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse_with_repeated_sets() {
        let cli = Cli::try_parse_from([
            "mdeq",
            "-vv",
            "run",
            "-c",
            "eq.toml",
            "--platform",
            "Reference",
            "-P",
            "Precision=double",
            "-S",
            "run.blocks=10",
            "-S",
            "run.steps-per-block=10",
            "--seed",
            "42",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.config, Some(PathBuf::from("eq.toml")));
        assert_eq!(args.platform.as_deref(), Some("Reference"));
        assert_eq!(args.properties, vec!["Precision=double"]);
        assert_eq!(
            args.set_values,
            vec!["run.blocks=10", "run.steps-per-block=10"]
        );
        assert_eq!(args.seed, Some(42));
        assert!(!args.init_velocities);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["mdeq", "-q", "-v", "platforms"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["mdeq", "config", "-j", "4", "--quiet"]).unwrap();
        assert_eq!(cli.threads, Some(4));
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Config(ConfigArgs { output: None })));
    }
}
