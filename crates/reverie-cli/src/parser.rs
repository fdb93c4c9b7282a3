//! Main CLI parser and top-level argument handling.
//!
//! Backend options are global and can come from the environment (or a
//! `.env` file loaded before parsing), so a script can be rendered with just
//! `reverie render script.json`.

use clap::{Args, Parser, ValueEnum};
use reverie_engine::ResponseMode;

use crate::commands::Commands;

/// Command-line interface for rendering narrated soundscapes.
#[derive(Parser)]
#[command(name = "reverie")]
#[command(about = "Render narrated ambient soundscapes from a script")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Speech synthesis service options.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// API root of an OpenAI-compatible speech service
    #[arg(
        long = "tts-url",
        env = "REVERIE_TTS_URL",
        default_value = "http://127.0.0.1:8880/v1",
        global = true
    )]
    pub tts_url: String,

    /// Model name sent with each request
    #[arg(
        long = "tts-model",
        env = "REVERIE_TTS_MODEL",
        default_value = "tts-1",
        global = true
    )]
    pub tts_model: String,

    /// Bearer token for the speech service
    #[arg(
        long = "api-key",
        env = "REVERIE_TTS_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,

    /// How the service returns audio
    #[arg(
        long = "response-mode",
        env = "REVERIE_TTS_RESPONSE",
        value_enum,
        default_value_t = ResponseModeArg::Pcm,
        global = true
    )]
    pub response_mode: ResponseModeArg,

    /// Per-request timeout in seconds
    #[arg(
        long = "tts-timeout",
        env = "REVERIE_TTS_TIMEOUT",
        default_value_t = 60,
        global = true
    )]
    pub timeout_secs: u64,
}

/// `--response-mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResponseModeArg {
    /// Raw PCM16 body
    Pcm,
    /// WAV file body
    Wav,
    /// JSON body with base64 audio
    Json,
}

impl From<ResponseModeArg> for ResponseMode {
    fn from(arg: ResponseModeArg) -> Self {
        match arg {
            ResponseModeArg::Pcm => Self::RawPcm,
            ResponseModeArg::Wav => Self::Wav,
            ResponseModeArg::Json => Self::Base64Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_backend_args() {
        let cli = Cli::parse_from([
            "reverie",
            "render",
            "script.json",
            "--tts-url",
            "http://tts.local/v1",
            "--response-mode",
            "json",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.backend.tts_url, "http://tts.local/v1");
        assert_eq!(cli.backend.response_mode, ResponseModeArg::Json);
        assert_eq!(
            ResponseMode::from(cli.backend.response_mode),
            ResponseMode::Base64Json
        );
    }

    #[test]
    fn test_no_command_is_allowed() {
        let cli = Cli::parse_from(["reverie"]);
        assert!(cli.command.is_none());
    }
}
