use crate::error::Result;
use mdeq::engine::config::DEFAULT_PLATFORM;
use mdeq::engine::platform::Platform;
use std::fmt::Write as _;

pub fn run() -> Result<()> {
    print!("{}", describe_platforms()?);
    Ok(())
}

/// One block per platform: its name, then each property with its default.
/// A closing note names the default platform when this build lacks it.
fn describe_platforms() -> Result<String> {
    let mut text = String::new();
    for name in Platform::available() {
        let platform = Platform::by_name(name)?;
        let _ = writeln!(text, "{}", platform.name());
        for property in platform.property_names() {
            let value = platform.property_value(property).unwrap_or_default();
            let _ = writeln!(text, "  {} = {}", property, value);
        }
    }
    if !Platform::available().contains(&DEFAULT_PLATFORM) {
        let _ = writeln!(
            text,
            "Default platform {DEFAULT_PLATFORM} is not available; pass --platform."
        );
    }
    Ok(text)
}
