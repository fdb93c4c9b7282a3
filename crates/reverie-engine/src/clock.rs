//! Playback clock capability.
//!
//! The scheduler only needs a monotonic "now" in seconds and somewhere to
//! put faded audio at an absolute start time. Three implementations exist:
//!
//! | Clock          | Time source                  | Audio                      |
//! |----------------|------------------------------|----------------------------|
//! | [`ManualClock`]| virtual, advanced by caller  | recorded for inspection    |
//! | [`WallClock`]  | monotonic, minus paused time | discarded                  |
//! | `RodioClock`   | output device                | mixed live (`live-playback`)|

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::EngineError;

/// One block placed on the clock's timeline.
#[derive(Debug, Clone)]
pub struct ScheduledAudio {
    /// Index of the originating script block.
    pub block_index: usize,

    /// Absolute start time in clock seconds.
    pub start: f64,

    /// Playback length in seconds.
    pub duration: f64,

    /// Linear fade-in length in seconds.
    pub fade_in: f64,

    /// Linear fade-out length in seconds, ending at `start + duration`.
    pub fade_out: f64,

    /// Interleaved stereo samples, unfaded.
    pub samples: Arc<[f32]>,

    /// Sample rate of `samples`.
    pub sample_rate: u32,
}

impl ScheduledAudio {
    /// End time in clock seconds.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// A copy of the samples with both fades applied.
    #[must_use]
    pub fn faded_samples(&self) -> Vec<f32> {
        apply_fades(&self.samples, self.sample_rate, self.fade_in, self.fade_out)
    }
}

/// Apply linear fades to interleaved stereo `samples`.
///
/// The fade-in ramps 0 → 1 over the first `fade_in` seconds, the fade-out
/// 1 → 0 over the last `fade_out` seconds; both are clipped to the buffer.
#[must_use]
pub fn apply_fades(samples: &[f32], sample_rate: u32, fade_in: f64, fade_out: f64) -> Vec<f32> {
    let frames = samples.len() / 2;
    let to_frames = |secs: f64| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = (secs.max(0.0) * f64::from(sample_rate)).round() as usize;
        n.min(frames)
    };
    let fade_in_frames = to_frames(fade_in);
    let fade_out_frames = to_frames(fade_out);

    let mut out = samples.to_vec();
    for (frame, pair) in out.chunks_exact_mut(2).enumerate() {
        let mut gain = 1.0_f64;
        if frame < fade_in_frames {
            #[allow(clippy::cast_precision_loss)]
            let g = frame as f64 / fade_in_frames as f64;
            gain = gain.min(g);
        }
        let remaining = frames - frame - 1;
        if remaining < fade_out_frames {
            #[allow(clippy::cast_precision_loss)]
            let g = remaining as f64 / fade_out_frames as f64;
            gain = gain.min(g);
        }
        #[allow(clippy::cast_possible_truncation)]
        let gain = gain as f32;
        pair[0] *= gain;
        pair[1] *= gain;
    }
    out
}

/// Time source and audio sink for the scheduler.
///
/// Implementations are shared between the controller and its generation
/// task, so every method takes `&self`.
pub trait PlaybackClock: Send + Sync {
    /// Current clock time in seconds.
    fn now(&self) -> f64;

    /// Place faded audio at `audio.start`.
    fn schedule(&self, audio: ScheduledAudio) -> Result<(), EngineError>;

    /// Stop the clock from advancing (and audio from playing).
    fn suspend(&self) -> Result<(), EngineError>;

    /// Undo [`suspend`](Self::suspend).
    fn resume(&self) -> Result<(), EngineError>;

    /// Release every resource. Idempotent.
    fn close(&self);

    /// Short name for logs.
    fn name(&self) -> &str;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Manual clock ───────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ManualInner {
    now: f64,
    scheduled: Vec<ScheduledAudio>,
    suspended: bool,
    close_calls: usize,
    closed: bool,
}

/// Virtual clock advanced explicitly by its owner.
///
/// Cloning yields another handle to the same timeline, so a test can keep a
/// handle while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `secs`. Ignored while suspended.
    pub fn advance(&self, secs: f64) {
        let mut inner = lock(&self.inner);
        if !inner.suspended {
            inner.now += secs.max(0.0);
        }
    }

    /// Jump to an absolute time; never moves backwards.
    pub fn set_time(&self, secs: f64) {
        let mut inner = lock(&self.inner);
        inner.now = inner.now.max(secs);
    }

    /// Everything scheduled so far, in scheduling order.
    #[must_use]
    pub fn scheduled(&self) -> Vec<ScheduledAudio> {
        lock(&self.inner).scheduled.clone()
    }

    /// Whether the clock is suspended.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        lock(&self.inner).suspended
    }

    /// Whether [`close`](PlaybackClock::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// How many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        lock(&self.inner).close_calls
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        lock(&self.inner).now
    }

    fn schedule(&self, audio: ScheduledAudio) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(EngineError::ClockError("clock is closed".into()));
        }
        inner.scheduled.push(audio);
        Ok(())
    }

    fn suspend(&self) -> Result<(), EngineError> {
        lock(&self.inner).suspended = true;
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        lock(&self.inner).suspended = false;
        Ok(())
    }

    fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.close_calls += 1;
        inner.closed = true;
    }

    fn name(&self) -> &str {
        "manual"
    }
}

// ── Wall clock ─────────────────────────────────────────────────────

#[derive(Debug)]
struct WallInner {
    origin: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
    closed: bool,
}

/// Monotonic clock that discards audio; used for file-only rendering.
///
/// Time spent suspended does not count.
#[derive(Debug)]
pub struct WallClock {
    inner: Mutex<WallInner>,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock {
    /// A clock whose time zero is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(WallInner {
                origin: Instant::now(),
                paused_at: None,
                paused_total: Duration::ZERO,
                closed: false,
            }),
        }
    }
}

impl PlaybackClock for WallClock {
    fn now(&self) -> f64 {
        let inner = lock(&self.inner);
        let reference = inner.paused_at.unwrap_or_else(Instant::now);
        reference
            .saturating_duration_since(inner.origin)
            .saturating_sub(inner.paused_total)
            .as_secs_f64()
    }

    fn schedule(&self, audio: ScheduledAudio) -> Result<(), EngineError> {
        if lock(&self.inner).closed {
            return Err(EngineError::ClockError("clock is closed".into()));
        }
        tracing::trace!(
            block = audio.block_index,
            start = audio.start,
            duration = audio.duration,
            "Wall clock discarding scheduled audio"
        );
        Ok(())
    }

    fn suspend(&self) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        if inner.paused_at.is_none() {
            inner.paused_at = Some(Instant::now());
        }
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        if let Some(at) = inner.paused_at.take() {
            inner.paused_total += at.elapsed();
        }
        Ok(())
    }

    fn close(&self) {
        lock(&self.inner).closed = true;
    }

    fn name(&self) -> &str {
        "wall"
    }
}
