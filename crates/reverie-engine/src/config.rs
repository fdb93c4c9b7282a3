//! Engine configuration.
//!
//! Every tunable the renderer, scheduler and controller read lives here, so a
//! session can be reproduced from one serialized value.
//!
//! # Example
//!
//! ```
//! use reverie_engine::{EngineConfig, PausePolicy};
//! use std::time::Duration;
//!
//! let config = EngineConfig::new()
//!     .with_staging_threshold(2)
//!     .with_retry_base_delay(Duration::from_millis(250))
//!     .with_pause_policy(PausePolicy::HaltGeneration)
//!     .with_fallback_phrase("Take a slow breath and rest here for a moment.");
//! assert_eq!(config.staging_threshold, 2);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Working sample rate of the engine (Hz).
pub const ENGINE_SAMPLE_RATE: u32 = 24_000;

/// Output channel count.
pub const ENGINE_CHANNELS: u16 = 2;

/// Whether pausing playback also pauses block generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// Only the playback clock is suspended; rendering and writing continue.
    #[default]
    PlaybackOnly,

    /// The generation loop also waits at the next block boundary.
    HaltGeneration,
}

/// Configuration for one streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Working sample rate.
    pub sample_rate: u32,

    /// Soft character bound for one synthesis chunk.
    pub chunk_max_chars: usize,

    /// Attempts per chunk before it is dropped.
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` waits `n × retry_base_delay` before retrying.
    #[serde(with = "duration_secs")]
    pub retry_base_delay: Duration,

    /// Pause between consecutive synthesis calls.
    #[serde(with = "duration_secs")]
    pub inter_chunk_delay: Duration,

    /// Minimum music-only tail appended after the voice.
    #[serde(with = "duration_secs")]
    pub block_tail: Duration,

    /// Pad gain at block start, as a fraction of intensity.
    pub pad_start_level: f32,

    /// Pad gain while the voice is speaking, as a fraction of intensity.
    pub pad_duck_level: f32,

    /// Pad gain after the voice ends, as a fraction of intensity.
    pub pad_release_level: f32,

    /// Time to ramp from the start level down to the duck level.
    #[serde(with = "duration_secs")]
    pub duck_attack: Duration,

    /// Time before voice end at which the pad starts rising again.
    #[serde(with = "duration_secs")]
    pub duck_release: Duration,

    /// Fixed gain of the binaural layer.
    pub binaural_gain: f32,

    /// Cross-fade overlap between consecutive blocks.
    #[serde(with = "duration_secs")]
    pub crossfade_overlap: Duration,

    /// Fade-in applied to the very first block.
    #[serde(with = "duration_secs")]
    pub first_fade_in: Duration,

    /// How far past "now" the cursor lands after falling behind.
    #[serde(with = "duration_secs")]
    pub lag_epsilon: Duration,

    /// Blocks to stage before playback starts.
    pub staging_threshold: usize,

    /// Whether pause also halts generation.
    pub pause_policy: PausePolicy,

    /// Text spoken in place of a block that produced no voice audio.
    pub fallback_phrase: Option<String>,

    /// Length of a tone-only block when the script gives no target duration.
    #[serde(with = "duration_secs")]
    pub fallback_tone_duration: Duration,

    /// Seed for the pad noise floor.
    pub noise_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: ENGINE_SAMPLE_RATE,
            chunk_max_chars: 300,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            inter_chunk_delay: Duration::from_millis(250),
            block_tail: Duration::from_secs(1),
            pad_start_level: 0.3,
            pad_duck_level: 0.15,
            pad_release_level: 0.4,
            duck_attack: Duration::from_millis(500),
            duck_release: Duration::from_millis(500),
            binaural_gain: 0.06,
            crossfade_overlap: Duration::from_secs(2),
            first_fade_in: Duration::from_millis(300),
            lag_epsilon: Duration::from_millis(10),
            staging_threshold: 4,
            pause_policy: PausePolicy::PlaybackOnly,
            fallback_phrase: None,
            fallback_tone_duration: Duration::from_secs(10),
            noise_seed: 0x5EED_CAFE,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the soft chunk bound.
    #[must_use]
    pub const fn with_chunk_max_chars(mut self, chars: usize) -> Self {
        self.chunk_max_chars = chars;
        self
    }

    /// Set attempts per chunk (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff unit.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the inter-chunk throttle.
    #[must_use]
    pub const fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Set the cross-fade overlap.
    #[must_use]
    pub const fn with_crossfade_overlap(mut self, overlap: Duration) -> Self {
        self.crossfade_overlap = overlap;
        self
    }

    /// Set the first-block fade-in.
    #[must_use]
    pub const fn with_first_fade_in(mut self, fade: Duration) -> Self {
        self.first_fade_in = fade;
        self
    }

    /// Set how many blocks are staged before playback starts (at least one).
    #[must_use]
    pub fn with_staging_threshold(mut self, blocks: usize) -> Self {
        self.staging_threshold = blocks.max(1);
        self
    }

    /// Set the pause policy.
    #[must_use]
    pub const fn with_pause_policy(mut self, policy: PausePolicy) -> Self {
        self.pause_policy = policy;
        self
    }

    /// Set the fallback phrase.
    #[must_use]
    pub fn with_fallback_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.fallback_phrase = Some(phrase.into());
        self
    }

    /// Set the tone-only fallback length.
    #[must_use]
    pub const fn with_fallback_tone_duration(mut self, duration: Duration) -> Self {
        self.fallback_tone_duration = duration;
        self
    }

    /// Set the noise seed.
    #[must_use]
    pub const fn with_noise_seed(mut self, seed: u64) -> Self {
        self.noise_seed = seed;
        self
    }

    /// Configuration with every delay zeroed, for tests and offline batch runs.
    #[must_use]
    pub fn without_delays(self) -> Self {
        Self {
            retry_base_delay: Duration::ZERO,
            inter_chunk_delay: Duration::ZERO,
            ..self
        }
    }
}

/// Durations serialize as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::new();
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.crossfade_overlap, Duration::from_secs(2));
        assert_eq!(config.staging_threshold, 4);
        assert_eq!(config.pause_policy, PausePolicy::PlaybackOnly);
        assert!(config.fallback_phrase.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new()
            .with_max_attempts(0)
            .with_staging_threshold(0)
            .with_fallback_phrase("Rest here.")
            .with_pause_policy(PausePolicy::HaltGeneration);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.staging_threshold, 1);
        assert_eq!(config.fallback_phrase.as_deref(), Some("Rest here."));
        assert_eq!(config.pause_policy, PausePolicy::HaltGeneration);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "crossfade_overlap": 1.5, "pause_policy": "halt_generation" }"#,
        )
        .unwrap();
        assert_eq!(config.crossfade_overlap, Duration::from_millis(1500));
        assert_eq!(config.pause_policy, PausePolicy::HaltGeneration);
        assert_eq!(config.chunk_max_chars, 300);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result: Result<EngineConfig, _> =
            serde_json::from_str(r#"{ "block_tail": -1.0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_without_delays() {
        let config = EngineConfig::new().without_delays();
        assert_eq!(config.retry_base_delay, Duration::ZERO);
        assert_eq!(config.inter_chunk_delay, Duration::ZERO);
    }
}
