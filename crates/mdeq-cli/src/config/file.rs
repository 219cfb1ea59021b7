use crate::error::{CliError, Result};
use crate::utils::parser;
use mdeq::core::forcefield::forces::NonbondedMethod;
use mdeq::core::forcefield::parameterization::ConstraintMode;
use mdeq::engine::config::EquilibrationConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileInputConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forcefield: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_state: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonbonded_method: Option<NonbondedMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ewald_error_tolerance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ConstraintMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispersion_correction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_scale: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileDynamicsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_axes: Option<[bool; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barostat_frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_velocity_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileMinimizationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePlatformConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRunConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps_per_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dcd_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdb_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileOutputConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdb_trajectory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PathBuf>,
    /// Run log destination; stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
}

/// The TOML configuration file. Every key is optional.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<FileInputConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<FileModelConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamics: Option<FileDynamicsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimization: Option<FileMinimizationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<FilePlatformConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<FileRunConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<FileOutputConfig>,
}

impl FileConfig {
    /// Reads `path` as a raw table so that `--set` values can be merged in
    /// before the typed configuration is checked.
    pub fn load_table(path: &Path) -> Result<Table> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_table(table: Table) -> Result<Self> {
        Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::Config(e.to_string().trim_end().to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load_table(path).and_then(Self::from_table)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::Other(e.into()))
    }
}

/// Applies `KEY=VALUE` assignments to a raw configuration table. Keys are
/// dotted paths (`dynamics.temperature`); values are TOML literals, and
/// anything that does not parse as one is taken as a string.
pub fn apply_set_values(mut table: Table, set_values: &[String]) -> Result<Table> {
    for assignment in set_values {
        let (key, raw) =
            parser::parse_assignment(assignment).map_err(|e| CliError::Config(e.to_string()))?;
        let path = parser::parse_key_path(&key).map_err(|e| CliError::Config(e.to_string()))?;
        let value = parse_value(&raw);
        debug!(key = %key, value = %value, "Applying --set");

        let (last, parents) = path
            .split_last()
            .ok_or_else(|| CliError::Config(format!("Empty key in '{assignment}'")))?;
        let mut current = &mut table;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            current = match entry {
                Value::Table(inner) => inner,
                _ => {
                    return Err(CliError::Config(format!(
                        "Cannot set '{key}': '{segment}' is not a section"
                    )));
                }
            };
        }
        current.insert(last.to_string(), value);
    }
    Ok(table)
}

fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    toml::from_str::<Table>(&format!("value = {trimmed}"))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| Value::String(trimmed.to_string()))
}

impl From<&EquilibrationConfig> for FileConfig {
    fn from(config: &EquilibrationConfig) -> Self {
        let p = config.dynamics.pressure;
        Self {
            input: Some(FileInputConfig {
                forcefield: Some(config.input.forcefield_path.clone()),
                structure: Some(config.input.structure_path.clone()),
                restart_state: config.input.restart_state_path.clone(),
            }),
            model: Some(FileModelConfig {
                nonbonded_method: Some(config.model.nonbonded_method),
                cutoff: Some(config.model.cutoff),
                ewald_error_tolerance: Some(config.model.ewald_error_tolerance),
                constraints: Some(config.model.constraints),
                dispersion_correction: Some(config.model.use_dispersion_correction),
                charge_scale: config.model.charge_scale,
            }),
            dynamics: Some(FileDynamicsConfig {
                temperature: Some(config.dynamics.temperature),
                friction: Some(config.dynamics.friction),
                step_size: Some(config.dynamics.step_size),
                pressure: Some([p.x, p.y, p.z]),
                scale_axes: Some(config.dynamics.scale_axes),
                barostat_frequency: Some(config.dynamics.barostat_frequency),
                initial_velocity_temperature: config.dynamics.initial_velocity_temperature,
                seed: config.dynamics.seed,
            }),
            minimization: Some(FileMinimizationConfig {
                tolerance: Some(config.minimization.tolerance),
                max_iterations: Some(config.minimization.max_iterations),
            }),
            platform: Some(FilePlatformConfig {
                name: Some(config.platform.name.clone()),
                properties: Some(config.platform.properties.iter().cloned().collect()),
            }),
            run: Some(FileRunConfig {
                blocks: Some(config.run.blocks),
                steps_per_block: Some(config.run.steps_per_block),
                report_interval: Some(config.run.report_interval),
                dcd_interval: Some(config.run.dcd_interval),
                pdb_interval: config.run.pdb_trajectory_interval,
                checkpoint_interval: config.run.checkpoint_interval,
            }),
            output: Some(FileOutputConfig {
                trajectory: Some(config.output.trajectory_path.clone()),
                structure: Some(config.output.structure_path.clone()),
                state: Some(config.output.state_path.clone()),
                pdb_trajectory: Some(config.output.pdb_trajectory_path.clone()),
                checkpoint: Some(config.output.checkpoint_path.clone()),
                report: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[input]
forcefield = "ff/field.xml"

[model]
nonbonded-method = "PME"
constraints = "HBonds"
charge-scale = 0.8

[dynamics]
pressure = [1.0, 1.0, 0.0]
scale-axes = [true, true, false]

[platform]
name = "CPU"
properties = { Precision = "mixed", Threads = "2" }
"#;

    fn sample_table() -> Table {
        toml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn sample_file_parses_into_sections() {
        let config = FileConfig::from_table(sample_table()).unwrap();
        let input = config.input.unwrap();
        assert_eq!(input.forcefield, Some(PathBuf::from("ff/field.xml")));
        assert_eq!(input.structure, None);
        let model = config.model.unwrap();
        assert_eq!(model.nonbonded_method, Some(NonbondedMethod::Pme));
        assert_eq!(model.constraints, Some(ConstraintMode::HBonds));
        assert_eq!(model.charge_scale, Some(0.8));
        let platform = config.platform.unwrap();
        assert_eq!(platform.properties.unwrap()["Threads"], "2");
        assert!(config.run.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let table: Table = toml::from_str("[dynamics]\ntemprature = 300.0\n").unwrap();
        assert!(matches!(FileConfig::from_table(table), Err(CliError::Config(_))));
    }

    #[test]
    fn set_values_create_sections_and_infer_types() {
        let table = apply_set_values(
            sample_table(),
            &[
                "dynamics.temperature=300".to_string(),
                "run.blocks=10".to_string(),
                "platform.name=Reference".to_string(),
                "platform.properties.Precision=double".to_string(),
                "dynamics.scale-axes=[true, false, false]".to_string(),
            ],
        )
        .unwrap();
        let config = FileConfig::from_table(table).unwrap();
        let dynamics = config.dynamics.unwrap();
        assert_eq!(dynamics.temperature, Some(300.0));
        assert_eq!(dynamics.scale_axes, Some([true, false, false]));
        assert_eq!(config.run.unwrap().blocks, Some(10));
        let platform = config.platform.unwrap();
        assert_eq!(platform.name.as_deref(), Some("Reference"));
        assert_eq!(platform.properties.unwrap()["Precision"], "double");
    }

    #[test]
    fn set_value_through_a_scalar_is_an_error() {
        let values = ["model.charge-scale.inner=1".to_string()];
        let result = apply_set_values(sample_table(), &values);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn malformed_assignment_is_an_error() {
        let result = apply_set_values(Table::new(), &["run.blocks".to_string()]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileConfig::load_table(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[run\nblocks = 1").unwrap();
        let result = FileConfig::load_table(&path);
        assert!(matches!(result, Err(CliError::FileParsing { path: p, .. }) if p == path));
    }
}
