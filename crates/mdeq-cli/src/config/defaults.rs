use super::file::FileConfig;
use crate::error::{CliError, Result};
use mdeq::engine::config::EquilibrationConfig;
use mdeq::engine::platform::Platform;

/// Configuration file picked up from the working directory when no
/// `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "mdeq.toml";

const TEMPLATE_HEADER: &str = "\
# mdeq equilibration configuration
#
# Paths are relative to the working directory. Every key may be omitted,
# overridden on the command line, or set with -S section.key=value.
";

/// The built-in configuration rendered as a configuration file.
pub fn default_template() -> Result<String> {
    let defaults = EquilibrationConfig::builder()
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    let body = FileConfig::from(&defaults).to_toml()?;
    Ok(format!(
        "{TEMPLATE_HEADER}# Platforms built into this binary: {}.\n\n{body}",
        Platform::available().join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_lists_every_section() {
        let template = default_template().unwrap();
        for section in [
            "[input]",
            "[model]",
            "[dynamics]",
            "[minimization]",
            "[platform]",
            "[run]",
            "[output]",
        ] {
            assert!(template.contains(section), "missing {section}");
        }
        assert!(template.contains("nonbonded-method = \"PME\""));
        assert!(template.contains("Precision = \"single\""));
    }

    #[test]
    fn template_names_the_default_and_the_built_in_platforms() {
        let template = default_template().unwrap();
        assert!(template.contains("name = \"OpenCL\""));
        assert!(template.contains("# Platforms built into this binary: Reference, CPU."));
    }

    #[test]
    fn template_parses_back_to_the_defaults() {
        let parsed: FileConfig = toml::from_str(&default_template().unwrap()).unwrap();
        let defaults = EquilibrationConfig::builder().build().unwrap();
        assert_eq!(parsed, FileConfig::from(&defaults));
    }
}
