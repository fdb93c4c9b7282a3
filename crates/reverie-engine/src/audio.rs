//! PCM buffer types shared by the generator, renderer, scheduler and writer.

use std::sync::Arc;
use std::time::Duration;

/// Number of frames needed to hold `duration` at `sample_rate`.
#[must_use]
pub fn frames_for(duration: Duration, sample_rate: u32) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let frames = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
    frames
}

/// Duration of `frames` frames at `sample_rate`.
#[must_use]
pub fn duration_of(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    #[allow(clippy::cast_precision_loss)]
    let secs = frames as f64 / f64::from(sample_rate);
    Duration::from_secs_f64(secs)
}

/// Planar stereo buffer (separate left/right vectors of equal length).
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    /// Frames per channel.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Largest absolute sample value across both channels.
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }
}

/// One block of the program, mixed and ready for the scheduler and writer.
///
/// Samples are interleaved stereo and shared immutably between consumers.
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    /// Position of the originating block in the script.
    pub index: usize,

    /// Interleaved stereo samples.
    pub samples: Arc<[f32]>,

    /// Sample rate of `samples`.
    pub sample_rate: u32,

    /// Whether the block carries synthesized voice.
    pub has_voice: bool,
}

impl RenderedBlock {
    /// Frames per channel.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Playback length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        duration_of(self.frames(), self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_rounds() {
        assert_eq!(frames_for(Duration::from_secs(10), 24_000), 240_000);
        assert_eq!(frames_for(Duration::from_micros(20), 24_000), 0);
        assert_eq!(frames_for(Duration::from_micros(30), 24_000), 1);
    }

    #[test]
    fn peak_spans_both_channels() {
        let buffer = StereoBuffer {
            left: vec![1.0, 0.5],
            right: vec![-0.5, -2.0],
            sample_rate: 24_000,
        };
        assert_eq!(buffer.frames(), 2);
        assert!((buffer.peak() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rendered_block_duration() {
        let block = RenderedBlock {
            index: 0,
            samples: vec![0.0; 48_000].into(),
            sample_rate: 24_000,
            has_voice: false,
        };
        assert_eq!(block.frames(), 24_000);
        assert_eq!(block.duration(), Duration::from_secs(1));
    }
}
