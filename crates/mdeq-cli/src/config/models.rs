use mdeq::engine::config::EquilibrationConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Run log destination; `None` writes to stdout.
    pub report_path: Option<PathBuf>,
    pub core_config: EquilibrationConfig,
}
