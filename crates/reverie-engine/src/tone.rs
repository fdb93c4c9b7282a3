//! Procedural tone generation: ambient pads and binaural beats.
//!
//! Both generators are pure functions of their arguments. The pad's noise
//! floor comes from a seeded [`StdRng`], so a given seed always yields the
//! same buffer.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::{StereoBuffer, frames_for};
use crate::script::Mood;

/// Carrier frequency of the binaural layer (left ear).
pub const BINAURAL_CARRIER_HZ: f64 = 200.0;

/// Linear fade at each end of a pad.
pub const PAD_FADE: Duration = Duration::from_secs(2);

/// Detune ratio of the chorus companion oscillator.
const DETUNE: f64 = 1.01;

/// Peak amplitude of the pad's noise floor, before the output halving.
const NOISE_LEVEL: f32 = 0.02;

/// Output scale applied to both pad channels.
const PAD_OUTPUT_GAIN: f32 = 0.5;

/// Sine oscillator driven by a wrapped phase accumulator.
struct Oscillator {
    phase: f64,
    increment: f64,
}

impl Oscillator {
    fn new(freq: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            increment: freq / f64::from(sample_rate),
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f64 {
        let value = (self.phase * TAU).sin();
        self.phase = (self.phase + self.increment).fract();
        value
    }
}

/// Gain of a symmetric linear fade-in/out envelope at `frame`.
#[inline]
fn fade_envelope(frame: usize, total: usize, fade_frames: usize) -> f32 {
    if fade_frames == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let fade = fade_frames as f32;
    #[allow(clippy::cast_precision_loss)]
    let rise = frame as f32 / fade;
    #[allow(clippy::cast_precision_loss)]
    let fall = (total - frame) as f32 / fade;
    rise.min(fall).clamp(0.0, 1.0)
}

/// Ambient pad for `mood`, `duration` long.
///
/// Sums one sine per chord tone plus a companion detuned by 1 %, adds a soft
/// noise floor, applies a two-second linear fade at both ends and writes the
/// result to both channels at half amplitude.
#[must_use]
pub fn pad(duration: Duration, mood: Mood, sample_rate: u32, seed: u64) -> StereoBuffer {
    pad_frames(frames_for(duration, sample_rate), mood, sample_rate, seed)
}

/// [`pad`] sized in frames rather than time.
#[must_use]
pub fn pad_frames(frames: usize, mood: Mood, sample_rate: u32, seed: u64) -> StereoBuffer {
    let chord = mood.chord();
    let mut oscillators: Vec<Oscillator> = chord
        .iter()
        .flat_map(|&f| {
            let f = f64::from(f);
            [
                Oscillator::new(f, sample_rate),
                Oscillator::new(f * DETUNE, sample_rate),
            ]
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let norm = 1.0 / oscillators.len().max(1) as f64;
    let fade_frames = frames_for(PAD_FADE, sample_rate);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut left = Vec::with_capacity(frames);
    for frame in 0..frames {
        let tonal: f64 = oscillators.iter_mut().map(Oscillator::next_sample).sum::<f64>() * norm;
        #[allow(clippy::cast_possible_truncation)]
        let tonal = tonal as f32;
        let noise = rng.gen_range(-NOISE_LEVEL..=NOISE_LEVEL);
        let env = fade_envelope(frame, frames, fade_frames);
        let sample = ((tonal + noise) * env * PAD_OUTPUT_GAIN).clamp(-1.0, 1.0);
        left.push(sample);
    }
    let right = left.clone();

    StereoBuffer {
        left,
        right,
        sample_rate,
    }
}

/// Binaural beat: a 200 Hz carrier in the left ear and `200 + beat_hz` in the
/// right, perceived as a beat at `beat_hz`.
#[must_use]
pub fn binaural(duration: Duration, beat_hz: f32, sample_rate: u32) -> StereoBuffer {
    binaural_frames(frames_for(duration, sample_rate), beat_hz, sample_rate)
}

/// [`binaural`] sized in frames rather than time.
#[must_use]
pub fn binaural_frames(frames: usize, beat_hz: f32, sample_rate: u32) -> StereoBuffer {
    let mut left_osc = Oscillator::new(BINAURAL_CARRIER_HZ, sample_rate);
    let mut right_osc = Oscillator::new(BINAURAL_CARRIER_HZ + f64::from(beat_hz), sample_rate);

    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for _ in 0..frames {
        #[allow(clippy::cast_possible_truncation)]
        {
            left.push(left_osc.next_sample() as f32);
            right.push(right_osc.next_sample() as f32);
        }
    }

    StereoBuffer {
        left,
        right,
        sample_rate,
    }
}
