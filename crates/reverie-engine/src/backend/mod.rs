//! Speech synthesis capability, the engine's only view of the TTS service.
//!
//! The renderer holds an `Arc<dyn SynthesisBackend>` and never knows which
//! service answers. Backends return *encoded* audio; decoding to the working
//! sample rate happens in [`crate::decode`].
//!
//! ## Backend implementations
//!
//! | Module     | Service                                                  |
//! |------------|----------------------------------------------------------|
//! | [`http`]   | OpenAI-compatible `POST /audio/speech` over `reqwest`    |

pub mod http;

use bytes::Bytes;

use crate::error::EngineError;

/// Wire encoding of a synthesis response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Headerless signed 16-bit little-endian PCM, interleaved.
    Pcm16 { sample_rate: u32, channels: u16 },

    /// A complete RIFF/WAVE file.
    Wav,
}

/// Encoded audio for one synthesized chunk.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Raw encoded bytes.
    pub data: Bytes,

    /// How `data` is encoded.
    pub encoding: AudioEncoding,
}

impl SynthesizedAudio {
    /// Raw PCM16 audio.
    #[must_use]
    pub const fn pcm16(data: Bytes, sample_rate: u32, channels: u16) -> Self {
        Self {
            data,
            encoding: AudioEncoding::Pcm16 {
                sample_rate,
                channels,
            },
        }
    }

    /// A WAV file.
    #[must_use]
    pub const fn wav(data: Bytes) -> Self {
        Self {
            data,
            encoding: AudioEncoding::Wav,
        }
    }

    /// Whether there is any payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Backend-agnostic text-to-speech capability.
///
/// Implementations must be `Send + Sync` so the generation task can hold
/// them across `.await` points. The service is treated as unreliable and
/// rate-limited; retry and throttling live in the renderer, not here.
#[async_trait::async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize one chunk of text with `voice`.
    ///
    /// `Ok(None)` means the service answered but produced no audio.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<Option<SynthesizedAudio>, EngineError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
