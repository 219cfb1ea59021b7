use crate::cli::ConfigArgs;
use crate::config::defaults::default_template;
use crate::error::Result;
use tracing::info;

pub fn run(args: ConfigArgs) -> Result<()> {
    let template = default_template()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &template)?;
            info!("Default configuration written to {:?}", path);
            eprintln!("✓ Default configuration written to: {}", path.display());
        }
        None => print!("{}", template),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::FileConfig;

    #[test]
    fn writes_a_parsable_template_to_the_requested_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdeq.toml");
        run(ConfigArgs {
            output: Some(path.clone()),
        })
        .unwrap();
        let parsed = FileConfig::from_file(&path).unwrap();
        assert!(parsed.run.is_some());
        assert!(parsed.platform.is_some());
    }
}
