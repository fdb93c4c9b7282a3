//! Streaming narrated-soundscape engine.
//!
//! Turns a script of text blocks into a continuous audio program: each block
//! is narrated by a speech synthesis backend, laid over a procedural ambient
//! pad (with optional binaural beat), cross-faded into a playback timeline and
//! persisted incrementally as a PCM16 stereo WAV.
//!
//! ```text
//!  ScriptBlock ─▶ segment ─▶ SynthesisBackend ─▶ decode ─▶ mix (render)
//!                                                              │
//!                               ┌──────────────────────────────┤
//!                               ▼                              ▼
//!                     PlaybackScheduler ─▶ clock       DurableWriter ─▶ WAV
//! ```
//!
//! [`StreamController`] runs the whole pipeline as a single task and reports
//! through [`StreamEvent`]s.

#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

pub mod audio;
pub mod backend;
pub mod clock;
pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
#[cfg(feature = "live-playback")]
pub mod playback;
pub mod render;
pub mod scheduler;
pub mod script;
pub mod segment;
pub mod tone;
pub mod writer;

// Re-export key types for convenience
pub use audio::RenderedBlock;
pub use backend::http::{HttpBackendConfig, HttpSynthesisBackend, ResponseMode};
pub use backend::{AudioEncoding, SynthesisBackend, SynthesizedAudio};
pub use clock::{ManualClock, PlaybackClock, ScheduledAudio, WallClock};
pub use config::{EngineConfig, PausePolicy};
pub use controller::{StreamController, StreamEvent, StreamState};
pub use error::EngineError;
#[cfg(feature = "live-playback")]
pub use playback::RodioClock;
pub use render::BlockRenderer;
pub use scheduler::PlaybackScheduler;
pub use script::{MixInstructions, Mood, ScriptBlock};
pub use segment::split_into_chunks;
pub use writer::{DownloadHandle, DurableWriter};
