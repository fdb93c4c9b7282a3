//! Script input types: the blocks a session narrates.
//!
//! Blocks arrive from the drafting step as camelCase JSON:
//!
//! ```json
//! {
//!   "text": "Breathe in slowly.",
//!   "instructions": { "mood": "deep_focus", "intensity": 0.6, "binauralFreq": 6.0, "pauseAfter": 3 },
//!   "targetDuration": 20
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Background mood of a block. Selects the pad chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Ethereal,
    Warm,
    Epic,
    Nature,
    DeepFocus,
}

impl Mood {
    /// All supported moods, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Ethereal,
        Self::Warm,
        Self::Epic,
        Self::Nature,
        Self::DeepFocus,
    ];

    /// Chord frequencies (Hz) used by the pad generator.
    #[must_use]
    pub const fn chord(self) -> &'static [f32] {
        match self {
            // Cmaj7
            Self::Ethereal => &[261.63, 329.63, 392.00, 493.88],
            // A major, low voicing
            Self::Warm => &[220.00, 277.18, 329.63],
            // D minor with added fourth
            Self::Epic => &[146.83, 220.00, 293.66, 349.23],
            // G major
            Self::Nature => &[196.00, 246.94, 293.66],
            // Open fifths on A
            Self::DeepFocus => &[110.00, 164.81, 220.00],
        }
    }
}

/// Mixing instructions attached to a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixInstructions {
    /// Pad mood.
    #[serde(default)]
    pub mood: Mood,

    /// Background level, 0.0–1.0.
    #[serde(default = "default_intensity")]
    pub intensity: f32,

    /// Binaural beat frequency in Hz; no binaural layer when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binaural_freq: Option<f32>,

    /// Seconds of music-only tail after the voice ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_after: Option<u32>,
}

const fn default_intensity() -> f32 {
    0.5
}

impl Default for MixInstructions {
    fn default() -> Self {
        Self {
            mood: Mood::default(),
            intensity: default_intensity(),
            binaural_freq: None,
            pause_after: None,
        }
    }
}

impl MixInstructions {
    /// Intensity clamped into 0.0–1.0.
    #[must_use]
    pub fn clamped_intensity(&self) -> f32 {
        if self.intensity.is_nan() {
            return 0.0;
        }
        self.intensity.clamp(0.0, 1.0)
    }

    /// Binaural beat frequency if one was requested and is usable.
    #[must_use]
    pub fn binaural(&self) -> Option<f32> {
        self.binaural_freq.filter(|f| f.is_finite() && *f > 0.0)
    }
}

/// One segment of the script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptBlock {
    /// Prose to speak.
    pub text: String,

    /// How to mix the block.
    #[serde(default)]
    pub instructions: MixInstructions,

    /// Intended length in seconds. Used for tone-only blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration: Option<f64>,
}

impl ScriptBlock {
    /// Create a block with default mixing instructions.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            instructions: MixInstructions::default(),
            target_duration: None,
        }
    }

    /// Set the mood.
    #[must_use]
    pub const fn with_mood(mut self, mood: Mood) -> Self {
        self.instructions.mood = mood;
        self
    }

    /// Set the background intensity.
    #[must_use]
    pub const fn with_intensity(mut self, intensity: f32) -> Self {
        self.instructions.intensity = intensity;
        self
    }

    /// Request a binaural layer.
    #[must_use]
    pub const fn with_binaural(mut self, beat_hz: f32) -> Self {
        self.instructions.binaural_freq = Some(beat_hz);
        self
    }

    /// Set the music-only tail in seconds.
    #[must_use]
    pub const fn with_pause_after(mut self, seconds: u32) -> Self {
        self.instructions.pause_after = Some(seconds);
        self
    }

    /// Set the target duration in seconds.
    #[must_use]
    pub const fn with_target_duration(mut self, seconds: f64) -> Self {
        self.target_duration = Some(seconds);
        self
    }

    /// Target duration as a [`Duration`], if set and positive.
    #[must_use]
    pub fn target(&self) -> Option<Duration> {
        self.target_duration
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_block() {
        let json = r#"{
            "text": "Let the day settle.",
            "instructions": { "mood": "deep_focus", "intensity": 0.7, "binauralFreq": 6.5, "pauseAfter": 4 },
            "targetDuration": 30
        }"#;
        let block: ScriptBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.instructions.mood, Mood::DeepFocus);
        assert_eq!(block.instructions.binaural(), Some(6.5));
        assert_eq!(block.instructions.pause_after, Some(4));
        assert_eq!(block.target(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_instructions_use_defaults() {
        let block: ScriptBlock = serde_json::from_str(r#"{ "text": "Hello." }"#).unwrap();
        assert_eq!(block.instructions, MixInstructions::default());
        assert!(block.target().is_none());
    }

    #[test]
    fn intensity_is_clamped() {
        assert!((ScriptBlock::new("x").with_intensity(3.0).instructions.clamped_intensity() - 1.0).abs() < f32::EPSILON);
        assert!(ScriptBlock::new("x").with_intensity(-1.0).instructions.clamped_intensity().abs() < f32::EPSILON);
        assert!(ScriptBlock::new("x").with_intensity(f32::NAN).instructions.clamped_intensity().abs() < f32::EPSILON);
    }

    #[test]
    fn moods_have_distinct_chords() {
        for (i, a) in Mood::ALL.iter().enumerate() {
            for b in &Mood::ALL[i + 1..] {
                assert_ne!(a.chord(), b.chord(), "{a:?} and {b:?} share a chord");
            }
        }
    }

    #[test]
    fn non_positive_binaural_is_ignored() {
        assert!(ScriptBlock::new("x").with_binaural(0.0).instructions.binaural().is_none());
    }
}
