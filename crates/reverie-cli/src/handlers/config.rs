//! Config command handler.

use anyhow::Result;
use reverie_engine::EngineConfig;

/// Print the default engine configuration as pretty JSON.
///
/// The output is a valid `--engine-config` file.
pub fn execute() -> Result<()> {
    println!("{}", render_default()?);
    Ok(())
}

fn render_default() -> Result<String> {
    Ok(serde_json::to_string_pretty(&EngineConfig::default())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips() {
        let json = render_default().unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.staging_threshold, EngineConfig::default().staging_threshold);
        assert!(json.contains("\"crossfade_overlap\": 2.0"));
    }
}
