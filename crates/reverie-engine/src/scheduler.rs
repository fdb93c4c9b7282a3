//! Cross-fading playback scheduler with a staging buffer.
//!
//! Rendered blocks are withheld in a [`StagingQueue`] until enough of the
//! program exists to play without gaps, then released to the clock in one
//! pass. From then on every block is scheduled as soon as it arrives.
//!
//! Each block overlaps its predecessor by the configured cross-fade and
//! fades out over its own tail, so consecutive fades sum smoothly.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::audio::RenderedBlock;
use crate::clock::{PlaybackClock, ScheduledAudio};
use crate::config::EngineConfig;
use crate::error::EngineError;

/// FIFO of rendered blocks waiting for the staging threshold.
#[derive(Debug, Default)]
pub struct StagingQueue {
    blocks: VecDeque<RenderedBlock>,
}

impl StagingQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block.
    pub fn push(&mut self, block: RenderedBlock) {
        self.blocks.push_back(block);
    }

    /// Blocks currently staged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Remove and return everything, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = RenderedBlock> + '_ {
        self.blocks.drain(..)
    }
}

/// Timeline position of the next block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerState {
    /// Where the next block would begin, in clock seconds.
    pub next_start_time: f64,

    /// Blocks handed to the clock so far.
    pub scheduled: usize,

    /// Duration of the most recently scheduled block, in seconds.
    pub last_duration: f64,
}

/// Places rendered blocks on a [`PlaybackClock`] timeline.
pub struct PlaybackScheduler {
    clock: Arc<dyn PlaybackClock>,
    state: SchedulerState,
    staging: StagingQueue,
    threshold: usize,
    released: bool,
    overlap: f64,
    first_fade_in: f64,
    lag_epsilon: f64,
}

impl PlaybackScheduler {
    /// A scheduler for a program of `total_blocks` blocks.
    ///
    /// Staging releases at `min(config.staging_threshold, total_blocks)`.
    pub fn new(clock: Arc<dyn PlaybackClock>, config: &EngineConfig, total_blocks: usize) -> Self {
        Self {
            clock,
            state: SchedulerState::default(),
            staging: StagingQueue::new(),
            threshold: config.staging_threshold.max(1).min(total_blocks.max(1)),
            released: false,
            overlap: config.crossfade_overlap.as_secs_f64(),
            first_fade_in: config.first_fade_in.as_secs_f64(),
            lag_epsilon: config.lag_epsilon.as_secs_f64(),
        }
    }

    /// Accept a rendered block.
    ///
    /// Returns `true` when this call released the staging queue, i.e. the
    /// program just became ready to play. That happens at most once.
    pub fn submit(&mut self, block: RenderedBlock) -> Result<bool, EngineError> {
        if self.released {
            self.schedule(&block)?;
            return Ok(false);
        }

        self.staging.push(block);
        tracing::debug!(
            staged = self.staging.len(),
            threshold = self.threshold,
            "Block staged"
        );
        if self.staging.len() >= self.threshold {
            self.release()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Generation has ended: flush whatever is still staged.
    ///
    /// Returns `true` if this released the queue and scheduled audio. An
    /// empty queue is never reported as a release.
    pub fn finish(&mut self) -> Result<bool, EngineError> {
        if self.released {
            return Ok(false);
        }
        let had_blocks = !self.staging.is_empty();
        self.release()?;
        Ok(had_blocks)
    }

    /// Seconds of audio scheduled beyond the clock's current time.
    #[must_use]
    pub fn buffered_ahead(&self) -> f64 {
        (self.state.next_start_time - self.clock.now()).max(0.0)
    }

    /// Current timeline position.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Whether the staging queue has been released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Blocks still withheld.
    #[must_use]
    pub fn staged(&self) -> usize {
        self.staging.len()
    }

    fn release(&mut self) -> Result<(), EngineError> {
        self.released = true;
        let staged: Vec<RenderedBlock> = self.staging.drain().collect();
        tracing::debug!(blocks = staged.len(), "Releasing staging queue");
        for block in &staged {
            self.schedule(block)?;
        }
        Ok(())
    }

    fn schedule(&mut self, block: &RenderedBlock) -> Result<(), EngineError> {
        let now = self.clock.now();
        if self.state.next_start_time < now {
            tracing::debug!(
                cursor = self.state.next_start_time,
                now,
                "Playback cursor fell behind, snapping forward"
            );
            self.state.next_start_time = now + self.lag_epsilon;
        }

        let duration = block.duration().as_secs_f64();
        // A cross-fade covers at most half of either block, so starts are
        // strictly increasing and the cursor never moves backwards.
        let (start, fade_in) = if self.state.scheduled == 0 {
            (self.state.next_start_time, self.first_fade_in)
        } else {
            let overlap = self
                .overlap
                .min(self.state.last_duration / 2.0)
                .min(duration / 2.0);
            ((self.state.next_start_time - overlap).max(now), overlap)
        };

        let audio = ScheduledAudio {
            block_index: block.index,
            start,
            duration,
            fade_in: fade_in.min(duration),
            fade_out: self.overlap.min(duration / 2.0),
            samples: Arc::clone(&block.samples),
            sample_rate: block.sample_rate,
        };

        tracing::debug!(
            block = block.index,
            start,
            duration,
            clock = self.clock.name(),
            "Scheduling block"
        );
        self.clock.schedule(audio)?;

        self.state.next_start_time = start + duration;
        self.state.scheduled += 1;
        self.state.last_duration = duration;
        Ok(())
    }
}
