//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together for
//! the CLI: the HTTP synthesis backend, the playback clock and the engine
//! configuration. Handlers receive a fully composed [`SessionContext`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use reverie_engine::{
    EngineConfig, HttpBackendConfig, HttpSynthesisBackend, PlaybackClock, ScriptBlock,
    SynthesisBackend, WallClock,
};
use serde_json::Value;

use crate::commands::RenderArgs;
use crate::error::CliError;
use crate::parser::BackendArgs;

/// Everything a render session needs.
pub struct SessionContext {
    /// Speech synthesis backend.
    pub backend: Arc<dyn SynthesisBackend>,
    /// Playback clock (live output or wall time).
    pub clock: Arc<dyn PlaybackClock>,
    /// Engine settings after file and flag overrides.
    pub config: EngineConfig,
    /// Destination WAV path.
    pub output: PathBuf,
}

/// Compose a render session from parsed arguments.
pub async fn bootstrap(args: &RenderArgs, backend: &BackendArgs) -> Result<SessionContext, CliError> {
    let config = load_engine_config(args.engine_config.as_deref()).await?;
    let config = apply_overrides(config, args);

    Ok(SessionContext {
        backend: build_backend(backend)?,
        clock: build_clock(args.play, config.sample_rate)?,
        output: args
            .out
            .clone()
            .unwrap_or_else(|| default_output_path(Local::now())),
        config,
    })
}

/// Read an [`EngineConfig`] JSON file, or the defaults when `path` is `None`.
pub async fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(mut config: EngineConfig, args: &RenderArgs) -> EngineConfig {
    if let Some(blocks) = args.staging {
        config = config.with_staging_threshold(blocks);
    }
    if let Some(ref phrase) = args.fallback_phrase {
        config = config.with_fallback_phrase(phrase.clone());
    }
    if let Some(seed) = args.seed {
        config = config.with_noise_seed(seed);
    }
    config
}

/// Load a script: a JSON array of blocks or `{ "blocks": [...] }`.
pub async fn load_script(path: &Path) -> Result<Vec<ScriptBlock>, CliError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    parse_script(&text).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

fn parse_script(text: &str) -> Result<Vec<ScriptBlock>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(mut map) if map.contains_key("blocks") => {
            serde_json::from_value(map.remove("blocks").unwrap_or(Value::Null))
        }
        other => serde_json::from_value(other),
    }
}

fn build_backend(args: &BackendArgs) -> Result<Arc<dyn SynthesisBackend>, CliError> {
    let config = HttpBackendConfig::new()
        .with_base_url(args.tts_url.clone())
        .with_model(args.tts_model.clone())
        .with_optional_api_key(args.api_key.clone())
        .with_response_mode(args.response_mode.into())
        .with_timeout(Duration::from_secs(args.timeout_secs));
    Ok(Arc::new(HttpSynthesisBackend::new(config)?))
}

#[cfg(feature = "live-playback")]
fn build_clock(play: bool, sample_rate: u32) -> Result<Arc<dyn PlaybackClock>, CliError> {
    if play {
        return Ok(Arc::new(reverie_engine::RodioClock::open(sample_rate)?));
    }
    Ok(Arc::new(WallClock::new()))
}

#[cfg(not(feature = "live-playback"))]
fn build_clock(play: bool, _sample_rate: u32) -> Result<Arc<dyn PlaybackClock>, CliError> {
    if play {
        return Err(CliError::Arguments(
            "--play needs a build with the `live-playback` feature".to_string(),
        ));
    }
    Ok(Arc::new(WallClock::new()))
}

/// `reverie-YYYYMMDD-HHMMSS.wav` in the current directory.
pub fn default_output_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("reverie-{}.wav", now.format("%Y%m%d-%H%M%S")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use clap::Parser;
    use reverie_engine::Mood;

    use super::*;
    use crate::commands::Commands;
    use crate::parser::Cli;

    fn render_args(extra: &[&str]) -> RenderArgs {
        let mut argv = vec!["reverie", "render", "script.json"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Some(Commands::Render(args)) => args,
            _ => panic!("expected render command"),
        }
    }

    #[test]
    fn test_parse_script_shapes() {
        let array = r#"[{ "text": "Hello.", "instructions": { "mood": "warm" } }]"#;
        let wrapped = r#"{ "blocks": [{ "text": "Hi." }, { "text": "Bye." }] }"#;
        let blocks = parse_script(array).unwrap();
        assert_eq!(blocks[0].instructions.mood, Mood::Warm);
        assert_eq!(parse_script(wrapped).unwrap().len(), 2);
        assert!(parse_script("{}").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let args = render_args(&["--staging", "2", "--seed", "9", "--fallback-phrase", "Rest."]);
        let config = apply_overrides(EngineConfig::default(), &args);
        assert_eq!(config.staging_threshold, 2);
        assert_eq!(config.noise_seed, 9);
        assert_eq!(config.fallback_phrase.as_deref(), Some("Rest."));
    }

    #[tokio::test]
    async fn test_engine_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        tokio::fs::write(&path, r#"{ "staging_threshold": 6, "crossfade_overlap": 1.5 }"#)
            .await
            .unwrap();

        let config = load_engine_config(Some(&path)).await.unwrap();
        assert_eq!(config.staging_threshold, 6);
        assert_eq!(config.crossfade_overlap, Duration::from_millis(1500));
        assert_eq!(config.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_missing_config_is_io_error() {
        let err = load_engine_config(Some(Path::new("/definitely/not/here.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }

    #[test]
    fn test_default_output_path() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            default_output_path(now),
            PathBuf::from("reverie-20260314-092653.wav")
        );
    }
}
