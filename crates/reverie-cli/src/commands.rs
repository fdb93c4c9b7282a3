//! Subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Render a script to a WAV file
    Render(RenderArgs),

    /// Print the default engine configuration as JSON
    Config,

    /// List the available moods and their chords
    Moods,
}

/// Options for `reverie render`.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Script JSON: an array of blocks, or an object with a `blocks` array
    pub script: PathBuf,

    /// Voice id passed to the speech service
    #[arg(long, env = "REVERIE_VOICE", default_value = "alloy")]
    pub voice: String,

    /// Output WAV path (defaults to a timestamped file in the current directory)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Engine configuration JSON; unspecified fields keep their defaults
    #[arg(long = "engine-config", env = "REVERIE_ENGINE_CONFIG")]
    pub engine_config: Option<PathBuf>,

    /// Blocks to stage before playback starts
    #[arg(long)]
    pub staging: Option<usize>,

    /// Phrase spoken when a block produces no voice
    #[arg(long = "fallback-phrase")]
    pub fallback_phrase: Option<String>,

    /// Seed for the pad noise floor
    #[arg(long)]
    pub seed: Option<u64>,

    /// Play through the default output device while rendering
    #[arg(long)]
    pub play: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::parser::Cli;

    use super::*;

    #[test]
    fn test_render_args() {
        let cli = Cli::parse_from([
            "reverie",
            "render",
            "calm.json",
            "--voice",
            "nova",
            "-o",
            "/tmp/calm.wav",
            "--staging",
            "2",
            "--fallback-phrase",
            "Breathe.",
        ]);
        let Some(Commands::Render(args)) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.script, PathBuf::from("calm.json"));
        assert_eq!(args.voice, "nova");
        assert_eq!(args.out, Some(PathBuf::from("/tmp/calm.wav")));
        assert_eq!(args.staging, Some(2));
        assert_eq!(args.fallback_phrase.as_deref(), Some("Breathe."));
        assert!(!args.play);
    }

    #[test]
    fn test_render_requires_script() {
        assert!(Cli::try_parse_from(["reverie", "render"]).is_err());
    }
}
