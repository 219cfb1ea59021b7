//! Command-line configuration: the TOML file model, `--set` handling, and
//! the merge of file, command line and built-in defaults into an
//! [`EquilibrationConfig`](mdeq::engine::config::EquilibrationConfig).

pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;

pub use builder::build_config;
pub use models::AppConfig;
