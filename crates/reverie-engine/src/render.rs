//! Block renderer: text → voice track → offline mix.
//!
//! For each script block the renderer segments the text, synthesizes every
//! chunk (with retry and throttling), decodes the responses to mono PCM at the
//! working rate and hands the voice track to a blocking worker that lays it
//! over the procedural pad with ducking automation.
//!
//! ```text
//!   gain
//!   0.4i ┤                                  ╭──────
//!   0.3i ┤╲                                ╱
//!  0.15i ┤ ╰──────────────────────────────╯
//!        └┬──┬─────────────────────────┬──┬──────▶ t
//!         0  attack         voice_end−release  voice_end
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::audio::{RenderedBlock, duration_of, frames_for};
use crate::backend::SynthesisBackend;
use crate::config::EngineConfig;
use crate::decode::decode_to_mono;
use crate::error::EngineError;
use crate::script::{MixInstructions, ScriptBlock};
use crate::segment::split_into_chunks;
use crate::tone;

// ── Gain automation ────────────────────────────────────────────────

/// Piecewise-linear gain curve over block time (seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct GainAutomation {
    points: Vec<(f64, f32)>,
}

impl GainAutomation {
    /// A constant gain for the whole block.
    #[must_use]
    pub fn constant(gain: f32) -> Self {
        Self {
            points: vec![(0.0, gain)],
        }
    }

    /// Pad ducking under a voice track that ends at `voice_end`.
    ///
    /// Starts at the start level, ducks over the attack, holds until one
    /// release period before the voice ends, then rises to the release level
    /// and holds. A voice shorter than the attack still gets a full release
    /// ramp after the duck.
    #[must_use]
    pub fn ducking(config: &EngineConfig, intensity: f32, voice_end: Duration) -> Self {
        let attack = config.duck_attack.as_secs_f64();
        let release = config.duck_release.as_secs_f64();
        let voice_end = voice_end.as_secs_f64();

        let hold_end = attack.max(voice_end - release);
        let rise_end = voice_end.max(hold_end + release);

        let duck = config.pad_duck_level * intensity;
        Self {
            points: vec![
                (0.0, config.pad_start_level * intensity),
                (attack, duck),
                (hold_end, duck),
                (rise_end, config.pad_release_level * intensity),
            ],
        }
    }

    /// Gain at `t` seconds into the block.
    #[must_use]
    pub fn value_at(&self, t: f64) -> f32 {
        let Some(&(first_t, first_g)) = self.points.first() else {
            return 0.0;
        };
        if t <= first_t {
            return first_g;
        }
        for pair in self.points.windows(2) {
            let (t0, g0) = pair[0];
            let (t1, g1) = pair[1];
            if t < t1 {
                let span = t1 - t0;
                if span <= 0.0 {
                    return g1;
                }
                #[allow(clippy::cast_possible_truncation)]
                let frac = ((t - t0) / span) as f32;
                return (g1 - g0).mul_add(frac, g0);
            }
        }
        self.points.last().map_or(first_g, |&(_, g)| g)
    }
}

// ── Offline mix ────────────────────────────────────────────────────

/// Mix a mono voice track over the pad (and optional binaural layer) into
/// `total_frames` frames of interleaved stereo.
///
/// The voice is centred on both channels at unity gain.
pub fn mix_block(
    voice: &[f32],
    instructions: &MixInstructions,
    automation: &GainAutomation,
    config: &EngineConfig,
    total_frames: usize,
    seed: u64,
) -> Vec<f32> {
    let rate = config.sample_rate;
    let pad = tone::pad_frames(total_frames, instructions.mood, rate, seed);
    let binaural = instructions
        .binaural()
        .map(|hz| tone::binaural_frames(total_frames, hz, rate));
    let binaural_gain = config.binaural_gain;

    let mut out = Vec::with_capacity(total_frames * 2);
    for frame in 0..total_frames {
        #[allow(clippy::cast_precision_loss)]
        let t = frame as f64 / f64::from(rate);
        let gain = automation.value_at(t);
        let v = voice.get(frame).copied().unwrap_or(0.0);

        let mut left = pad.left[frame].mul_add(gain, v);
        let mut right = pad.right[frame].mul_add(gain, v);
        if let Some(ref layer) = binaural {
            left = layer.left[frame].mul_add(binaural_gain, left);
            right = layer.right[frame].mul_add(binaural_gain, right);
        }
        out.push(left);
        out.push(right);
    }
    out
}

// ── Renderer ───────────────────────────────────────────────────────

/// Turns script blocks into mixed, ready-to-schedule audio.
pub struct BlockRenderer {
    backend: Arc<dyn SynthesisBackend>,
    config: Arc<EngineConfig>,
}

impl BlockRenderer {
    /// Create a renderer over `backend`.
    pub fn new(backend: Arc<dyn SynthesisBackend>, config: Arc<EngineConfig>) -> Self {
        Self { backend, config }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render one block with `voice`.
    ///
    /// Returns `Ok(None)` when no chunk produced any voice samples. Errors are
    /// reserved for failures of the mixing worker itself; synthesis failures
    /// are retried and then dropped.
    pub async fn render(
        &self,
        index: usize,
        block: &ScriptBlock,
        voice: &str,
    ) -> Result<Option<RenderedBlock>, EngineError> {
        let track = self.synthesize_voice(&block.text, voice).await;
        if track.is_empty() {
            tracing::debug!(block = index, "Block produced no voice");
            return Ok(None);
        }

        let rate = self.config.sample_rate;
        let voice_end = duration_of(track.len(), rate);
        let pause_after =
            Duration::from_secs(u64::from(block.instructions.pause_after.unwrap_or(0)));
        let tail = self.config.block_tail.max(pause_after);
        let total_frames = track.len() + frames_for(tail, rate);

        let automation = GainAutomation::ducking(
            &self.config,
            block.instructions.clamped_intensity(),
            voice_end,
        );

        let samples = self
            .mix(
                index,
                track,
                block.instructions.clone(),
                automation,
                total_frames,
            )
            .await?;

        tracing::debug!(
            block = index,
            voice_secs = voice_end.as_secs_f64(),
            total_secs = duration_of(total_frames, rate).as_secs_f64(),
            "Block rendered"
        );

        Ok(Some(RenderedBlock {
            index,
            samples: samples.into(),
            sample_rate: rate,
            has_voice: true,
        }))
    }

    /// Render `duration` of the block's tone layers alone, at the release level.
    pub async fn render_tone_only(
        &self,
        index: usize,
        block: &ScriptBlock,
        duration: Duration,
    ) -> Result<RenderedBlock, EngineError> {
        let rate = self.config.sample_rate;
        let total_frames = frames_for(duration, rate);
        let automation = GainAutomation::constant(
            self.config.pad_release_level * block.instructions.clamped_intensity(),
        );

        let samples = self
            .mix(
                index,
                Vec::new(),
                block.instructions.clone(),
                automation,
                total_frames,
            )
            .await?;

        tracing::debug!(
            block = index,
            secs = duration.as_secs_f64(),
            "Tone-only block rendered"
        );

        Ok(RenderedBlock {
            index,
            samples: samples.into(),
            sample_rate: rate,
            has_voice: false,
        })
    }

    /// Run the offline mix on the blocking pool.
    async fn mix(
        &self,
        index: usize,
        voice: Vec<f32>,
        instructions: MixInstructions,
        automation: GainAutomation,
        total_frames: usize,
    ) -> Result<Vec<f32>, EngineError> {
        let config = Arc::clone(&self.config);
        let seed = config.noise_seed.wrapping_add(index as u64);

        tokio::task::spawn_blocking(move || {
            mix_block(&voice, &instructions, &automation, &config, total_frames, seed)
        })
        .await
        .map_err(|e| EngineError::TaskFailed(format!("mix worker failed: {e}")))
    }

    /// Synthesize and decode every chunk of `text`, in order.
    async fn synthesize_voice(&self, text: &str, voice: &str) -> Vec<f32> {
        let chunks = split_into_chunks(text, self.config.chunk_max_chars);
        let mut track = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.config.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.config.inter_chunk_delay).await;
            }
            if let Some(samples) = self.synthesize_chunk(i, chunk, voice).await {
                track.extend_from_slice(&samples);
            }
        }
        track
    }

    /// One chunk with linear backoff. `None` once attempts are exhausted.
    async fn synthesize_chunk(&self, index: usize, chunk: &str, voice: &str) -> Option<Vec<f32>> {
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.backend.synthesize(chunk, voice).await {
                Ok(Some(audio)) => match decode_to_mono(&audio, self.config.sample_rate) {
                    Ok(samples) if !samples.is_empty() => {
                        tracing::debug!(
                            chunk = index,
                            attempt,
                            samples = samples.len(),
                            "Chunk synthesized"
                        );
                        return Some(samples);
                    }
                    Ok(_) => tracing::debug!(chunk = index, attempt, "Decoded chunk was empty"),
                    Err(e) => {
                        tracing::warn!(chunk = index, attempt, error = %e, "Chunk decode failed");
                    }
                },
                Ok(None) => {
                    tracing::debug!(
                        chunk = index,
                        attempt,
                        backend = self.backend.name(),
                        "Empty synthesis response"
                    );
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(
                        chunk = index,
                        attempt,
                        error = %e,
                        "Chunk failed permanently, dropping"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!(chunk = index, attempt, error = %e, "Chunk synthesis failed");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_base_delay * attempt).await;
            }
        }

        tracing::warn!(chunk = index, attempts, "Chunk dropped after exhausting retries");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::backend::SynthesizedAudio;
    use crate::script::Mood;

    /// Returns `fail_first` errors, then one second of constant PCM.
    struct FlakyBackend {
        calls: AtomicUsize,
        fail_first: usize,
        error: fn() -> EngineError,
    }

    impl FlakyBackend {
        fn new(fail_first: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
                error: || EngineError::SynthesisError("flaky".into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SynthesisBackend for FlakyBackend {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
        ) -> Result<Option<SynthesizedAudio>, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err((self.error)());
            }
            let pcm: Vec<u8> = std::iter::repeat_n(8_192_i16.to_le_bytes(), 24_000)
                .flatten()
                .collect();
            Ok(Some(SynthesizedAudio::pcm16(Bytes::from(pcm), 24_000, 1)))
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct SilentBackend;

    #[async_trait::async_trait]
    impl SynthesisBackend for SilentBackend {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
        ) -> Result<Option<SynthesizedAudio>, EngineError> {
            Ok(None)
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    fn renderer(backend: impl SynthesisBackend + 'static) -> BlockRenderer {
        BlockRenderer::new(Arc::new(backend), Arc::new(EngineConfig::new().without_delays()))
    }

    #[test]
    fn ducking_curve_shape() {
        let config = EngineConfig::default();
        let curve = GainAutomation::ducking(&config, 1.0, Duration::from_secs(5));
        assert!((curve.value_at(0.0) - 0.3).abs() < 1e-6);
        assert!((curve.value_at(0.25) - 0.225).abs() < 1e-4);
        assert!((curve.value_at(0.5) - 0.15).abs() < 1e-6);
        assert!((curve.value_at(4.0) - 0.15).abs() < 1e-6);
        assert!((curve.value_at(4.75) - 0.275).abs() < 1e-4);
        assert!((curve.value_at(5.0) - 0.4).abs() < 1e-6);
        assert!((curve.value_at(9.0) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn ducking_scales_with_intensity() {
        let config = EngineConfig::default();
        let curve = GainAutomation::ducking(&config, 0.5, Duration::from_secs(3));
        assert!((curve.value_at(0.0) - 0.15).abs() < 1e-6);
        assert!((curve.value_at(10.0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn short_voice_still_ramps() {
        let config = EngineConfig::default();
        let curve = GainAutomation::ducking(&config, 1.0, Duration::from_millis(200));
        assert!((curve.value_at(0.5) - 0.15).abs() < 1e-6);
        assert!((curve.value_at(0.75) - 0.275).abs() < 1e-4);
        assert!((curve.value_at(1.0) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn mix_places_voice_on_both_channels() {
        let config = EngineConfig::default();
        let instructions = MixInstructions {
            intensity: 0.0,
            ..MixInstructions::default()
        };
        let voice = vec![0.5_f32; 100];
        let out = mix_block(&voice, &instructions, &GainAutomation::constant(0.0), &config, 200, 1);
        assert_eq!(out.len(), 400);
        assert!((out[20] - 0.5).abs() < f32::EPSILON);
        assert!((out[21] - 0.5).abs() < f32::EPSILON);
        assert!(out[300].abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn render_appends_tail() {
        let rendered = renderer(FlakyBackend::new(0))
            .render(0, &ScriptBlock::new("Breathe in."), "alloy")
            .await
            .unwrap()
            .unwrap();
        // One second of voice plus the one second default tail.
        assert_eq!(rendered.frames(), 48_000);
        assert!(rendered.has_voice);
    }

    #[tokio::test]
    async fn pause_after_extends_tail() {
        let block = ScriptBlock::new("Rest.").with_pause_after(3);
        let rendered = renderer(FlakyBackend::new(0))
            .render(0, &block, "alloy")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rendered.duration(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_backoff() {
        let backend = Arc::new(FlakyBackend::new(2));
        let config = EngineConfig::new()
            .with_retry_base_delay(Duration::from_secs(1))
            .with_inter_chunk_delay(Duration::ZERO);
        let renderer = BlockRenderer::new(backend.clone(), Arc::new(config));

        let started = tokio::time::Instant::now();
        let rendered = renderer
            .render(0, &ScriptBlock::new("Hello there."), "alloy")
            .await
            .unwrap();

        assert!(rendered.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        // 1 s after the first failure, 2 s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn exhausted_chunk_is_dropped() {
        let backend = Arc::new(FlakyBackend::new(usize::MAX));
        let renderer = BlockRenderer::new(backend.clone(), Arc::new(EngineConfig::new().without_delays()));
        let rendered = renderer
            .render(0, &ScriptBlock::new("Nothing comes back."), "alloy")
            .await
            .unwrap();
        assert!(rendered.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
            error: || EngineError::BackendStatus {
                status: 401,
                message: "unauthorized".into(),
            },
        });
        let renderer = BlockRenderer::new(backend.clone(), Arc::new(EngineConfig::new().without_delays()));
        let rendered = renderer
            .render(0, &ScriptBlock::new("Key is wrong."), "alloy")
            .await
            .unwrap();
        assert!(rendered.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_text_is_no_voice() {
        let rendered = renderer(FlakyBackend::new(0))
            .render(0, &ScriptBlock::new("   "), "alloy")
            .await
            .unwrap();
        assert!(rendered.is_none());
    }

    #[tokio::test]
    async fn silent_backend_yields_none() {
        let rendered = renderer(SilentBackend)
            .render(0, &ScriptBlock::new("Hello."), "alloy")
            .await
            .unwrap();
        assert!(rendered.is_none());
    }

    #[tokio::test]
    async fn tone_only_block_has_requested_length() {
        let block = ScriptBlock::new("").with_mood(Mood::DeepFocus).with_binaural(8.0);
        let rendered = renderer(SilentBackend)
            .render_tone_only(2, &block, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(rendered.frames(), 240_000);
        assert_eq!(rendered.index, 2);
        assert!(!rendered.has_voice);
        assert!(rendered.samples.iter().all(|s| s.abs() <= 1.0));
    }
}
