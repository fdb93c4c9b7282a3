//! Stream controller: owns one session from script to finished file.
//!
//! ```text
//!   Idle → Initializing → Generating → Flushing → Finalizing → Complete
//!                            │  ▲
//!                  pause()   ▼  │  resume()        (orthogonal flag)
//!                          paused
//!
//!   close() → Closed        fatal error → Error      (from anywhere)
//! ```
//!
//! A single generation task renders blocks strictly in script order and fans
//! each one out to the scheduler and the writer. The caller observes progress
//! through an unbounded [`StreamEvent`] channel and steers the session with
//! [`pause`](StreamController::pause), [`resume`](StreamController::resume)
//! and [`close`](StreamController::close).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::RenderedBlock;
use crate::backend::SynthesisBackend;
use crate::clock::PlaybackClock;
use crate::config::{ENGINE_CHANNELS, EngineConfig, PausePolicy};
use crate::error::EngineError;
use crate::render::BlockRenderer;
use crate::scheduler::PlaybackScheduler;
use crate::script::ScriptBlock;
use crate::writer::{DownloadHandle, DurableWriter};

// ── State machine ──────────────────────────────────────────────────

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// Constructed, not started.
    Idle,

    /// Allocating the writer and scheduler.
    Initializing,

    /// Rendering blocks.
    Generating,

    /// Generation ended; draining the staging queue.
    Flushing,

    /// Writing the final header.
    Finalizing,

    /// Finished; the artifact is complete.
    Complete,

    /// Closed by the caller.
    Closed,

    /// A fatal error stopped the session.
    Error,
}

impl StreamState {
    /// Whether the session can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

/// Notifications emitted by the controller.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// State changed.
    StateChanged(StreamState),

    /// A block was rendered, scheduled and written.
    Progress {
        /// Completed share of the script, 0–100.
        percent: u8,
        /// Blocks finished so far.
        blocks_done: usize,
    },

    /// The staging queue was released; playback can begin.
    ReadyToPlay,

    /// The session finished and the artifact is complete.
    Complete(DownloadHandle),

    /// A fatal error stopped the session.
    Error(String),
}

// ── Shared session state ───────────────────────────────────────────

/// State shared by the controller handle and its generation task.
struct Shared {
    state: watch::Sender<StreamState>,
    paused: watch::Sender<bool>,
    timeline_end: watch::Sender<f64>,
    events: mpsc::UnboundedSender<StreamEvent>,
    clock: Arc<dyn PlaybackClock>,
    clock_released: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, next: StreamState) {
        let changed = self.state.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::debug!(state = ?next, "Stream state changed");
            self.emit(StreamEvent::StateChanged(next));
        }
    }

    fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    fn emit(&self, event: StreamEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.events.send(event);
    }

    fn release_clock(&self) {
        if !self.clock_released.swap(true, Ordering::SeqCst) {
            tracing::debug!(clock = self.clock.name(), "Releasing playback clock");
            self.clock.close();
        }
    }

    fn clock_available(&self) -> bool {
        !self.clock_released.load(Ordering::SeqCst)
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Drives one soundscape session.
pub struct StreamController {
    shared: Arc<Shared>,
    backend: Arc<dyn SynthesisBackend>,
    config: Arc<EngineConfig>,
    output: Option<PathBuf>,
    task: Option<JoinHandle<Result<DownloadHandle, EngineError>>>,
}

impl StreamController {
    /// Create a controller.
    ///
    /// `output` is the WAV path; `None` keeps the result in memory. Returns
    /// the controller and a receiver for [`StreamEvent`]s.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        clock: Arc<dyn PlaybackClock>,
        config: EngineConfig,
        output: Option<PathBuf>,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(StreamState::Idle);
        let (paused, _) = watch::channel(false);
        let (timeline_end, _) = watch::channel(0.0);

        let shared = Arc::new(Shared {
            state,
            paused,
            timeline_end,
            events,
            clock,
            clock_released: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        let controller = Self {
            shared,
            backend,
            config: Arc::new(config),
            output,
            task: None,
        };
        (controller, event_rx)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.shared.state.subscribe()
    }

    /// Whether playback is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// Clock time at which everything scheduled so far has finished playing.
    #[must_use]
    pub fn timeline_end(&self) -> f64 {
        *self.shared.timeline_end.borrow()
    }

    /// Start rendering `blocks` with `voice`.
    pub fn start(
        &mut self,
        blocks: Vec<ScriptBlock>,
        voice: impl Into<String>,
    ) -> Result<(), EngineError> {
        if self.task.is_some() || self.state() != StreamState::Idle {
            return Err(EngineError::AlreadyStarted);
        }

        let voice = voice.into();
        tracing::info!(
            blocks = blocks.len(),
            voice = %voice,
            backend = self.backend.name(),
            output = ?self.output,
            "Starting stream session"
        );
        self.shared.set_state(StreamState::Initializing);

        let session = Session {
            shared: Arc::clone(&self.shared),
            renderer: BlockRenderer::new(Arc::clone(&self.backend), Arc::clone(&self.config)),
            config: Arc::clone(&self.config),
            output: self.output.clone(),
        };
        self.task = Some(tokio::spawn(session.run(blocks, voice)));
        Ok(())
    }

    /// Pause playback. With [`PausePolicy::HaltGeneration`] rendering also
    /// stops before the next block. Idempotent.
    pub fn pause(&self) -> Result<(), EngineError> {
        if self.state().is_terminal() {
            return Ok(());
        }
        if !self
            .shared
            .paused
            .send_if_modified(|p| !std::mem::replace(p, true))
        {
            return Ok(());
        }
        tracing::debug!("Stream paused");
        if self.shared.clock_available() {
            self.shared.clock.suspend()?;
        }
        Ok(())
    }

    /// Resume after [`pause`](Self::pause). Idempotent.
    pub fn resume(&self) -> Result<(), EngineError> {
        if !self
            .shared
            .paused
            .send_if_modified(|p| std::mem::replace(p, false))
        {
            return Ok(());
        }
        tracing::debug!("Stream resumed");
        if self.shared.clock_available() {
            self.shared.clock.resume()?;
        }
        Ok(())
    }

    /// Cancel generation and release the clock. Whatever was already written
    /// stays where it is. Idempotent.
    pub fn close(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::info!("Closing stream session");
        }
        self.shared.cancel.cancel();
        self.shared.set_state(StreamState::Closed);
        self.shared.release_clock();
    }

    /// Wait for the generation task and return its outcome.
    pub async fn wait(&mut self) -> Result<DownloadHandle, EngineError> {
        let task = self.task.take().ok_or(EngineError::NotStarted)?;
        task.await
            .map_err(|e| EngineError::TaskFailed(format!("generation task failed: {e}")))?
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Generation task ────────────────────────────────────────────────

struct Session {
    shared: Arc<Shared>,
    renderer: BlockRenderer,
    config: Arc<EngineConfig>,
    output: Option<PathBuf>,
}

impl Session {
    async fn run(
        self,
        blocks: Vec<ScriptBlock>,
        voice: String,
    ) -> Result<DownloadHandle, EngineError> {
        let result = self.generate(&blocks, &voice).await;
        match result {
            Ok(ref handle) => {
                tracing::info!(destination = ?handle.path(), "Stream session complete");
            }
            Err(EngineError::Cancelled) => {
                tracing::debug!("Stream session cancelled");
            }
            Err(ref e) => {
                tracing::error!(error = %e, "Stream session failed");
                if !self.shared.state().is_terminal() {
                    self.shared.set_state(StreamState::Error);
                    self.shared.emit(StreamEvent::Error(e.to_string()));
                }
            }
        }
        result
    }

    async fn generate(
        &self,
        blocks: &[ScriptBlock],
        voice: &str,
    ) -> Result<DownloadHandle, EngineError> {
        let mut writer = DurableWriter::open(
            self.output.as_deref(),
            self.config.sample_rate,
            ENGINE_CHANNELS,
        )
        .await;
        let mut scheduler =
            PlaybackScheduler::new(Arc::clone(&self.shared.clock), &self.config, blocks.len());
        self.shared.set_state(StreamState::Generating);

        let total = blocks.len();
        let mut tone_only = 0_usize;
        for (index, block) in blocks.iter().enumerate() {
            self.checkpoint().await?;

            let rendered = self.cancellable(self.render_block(index, block, voice)).await?;
            if !rendered.has_voice {
                tone_only += 1;
            }

            if scheduler.submit(rendered.clone())? {
                tracing::info!(block = index, "Staging released, ready to play");
                self.shared.emit(StreamEvent::ReadyToPlay);
            }
            self.shared
                .timeline_end
                .send_replace(scheduler.state().next_start_time);
            self.cancellable(writer.append(&rendered.samples)).await?;

            let blocks_done = index + 1;
            self.shared.emit(StreamEvent::Progress {
                percent: percent(blocks_done, total),
                blocks_done,
            });
            tracing::debug!(
                block = index,
                buffered_ahead = scheduler.buffered_ahead(),
                "Block complete"
            );
        }

        if self.shared.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.shared.set_state(StreamState::Flushing);
        if scheduler.finish()? {
            self.shared.emit(StreamEvent::ReadyToPlay);
        }
        self.shared
            .timeline_end
            .send_replace(scheduler.state().next_start_time);

        if tone_only > 0 {
            tracing::warn!(tone_only, total, "Some blocks were rendered without voice");
        }

        self.shared.set_state(StreamState::Finalizing);
        let handle = self.cancellable(writer.finalize()).await?;

        self.shared.set_state(StreamState::Complete);
        self.shared.emit(StreamEvent::Complete(handle.clone()));
        Ok(handle)
    }

    /// Render a block, falling back to the fallback phrase and then to a
    /// tone-only block when no voice comes back.
    async fn render_block(
        &self,
        index: usize,
        block: &ScriptBlock,
        voice: &str,
    ) -> Result<RenderedBlock, EngineError> {
        if let Some(rendered) = self.renderer.render(index, block, voice).await? {
            return Ok(rendered);
        }

        if let Some(ref phrase) = self.config.fallback_phrase {
            tracing::warn!(block = index, "No voice for block, using fallback phrase");
            let fallback = ScriptBlock {
                text: phrase.clone(),
                ..block.clone()
            };
            if let Some(rendered) = self.renderer.render(index, &fallback, voice).await? {
                return Ok(rendered);
            }
        }

        let duration = block.target().unwrap_or(self.config.fallback_tone_duration);
        tracing::warn!(
            block = index,
            secs = duration.as_secs_f64(),
            "No voice for block, rendering tone only"
        );
        self.renderer.render_tone_only(index, block, duration).await
    }

    /// Cancellation point, plus the pause gate under
    /// [`PausePolicy::HaltGeneration`].
    async fn checkpoint(&self) -> Result<(), EngineError> {
        if self.shared.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.config.pause_policy != PausePolicy::HaltGeneration {
            return Ok(());
        }

        let mut paused = self.shared.paused.subscribe();
        if *paused.borrow() {
            tracing::debug!("Generation halted while paused");
        }
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => Err(EngineError::Cancelled),
            // The sender lives in `shared`, so this only ends on resume.
            _ = paused.wait_for(|p| !*p) => Ok(()),
        }
    }

    /// Race `fut` against cancellation.
    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => Err(EngineError::Cancelled),
            result = fut => result,
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done.saturating_mul(100) / total).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn terminal_states() {
        assert!(StreamState::Closed.is_terminal());
        assert!(StreamState::Error.is_terminal());
        assert!(!StreamState::Complete.is_terminal());
        assert!(!StreamState::Generating.is_terminal());
    }
}
