//! Engine error types.

use std::path::PathBuf;

/// Errors that can occur while producing a soundscape session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The synthesis backend failed for one chunk.
    #[error("Speech synthesis failed: {0}")]
    SynthesisError(String),

    /// The synthesis backend answered with a non-success HTTP status.
    #[error("Synthesis backend returned HTTP {status}: {message}")]
    BackendStatus { status: u16, message: String },

    /// Synthesized audio could not be decoded into PCM.
    #[error("Failed to decode synthesized audio: {0}")]
    DecodeError(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// The durable output file could not be created or written.
    #[error("Storage error at {path}: {source}")]
    StorageError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The mix grew past what a 32-bit RIFF size field can describe.
    #[error("Output of {bytes} bytes exceeds the WAV container limit")]
    ContainerTooLarge { bytes: u64 },

    /// The sample format cannot be described by a PCM WAV header.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Appending to a writer whose header has already been finalized.
    #[error("Writer already finalized")]
    WriterFinalized,

    /// No live audio clock could be opened.
    #[error("Playback clock unavailable: {0}")]
    ClockUnavailable(String),

    /// The playback clock rejected a scheduling or transport request.
    #[error("Playback clock error: {0}")]
    ClockError(String),

    /// The audio thread exited unexpectedly.
    #[error("Audio thread died unexpectedly")]
    AudioThreadDied,

    /// `start()` called on a controller that already ran.
    #[error("Stream already started")]
    AlreadyStarted,

    /// A transport call that needs a running session.
    #[error("Stream not started")]
    NotStarted,

    /// The session was closed before it finished.
    #[error("Stream cancelled")]
    Cancelled,

    /// A blocking worker panicked or was aborted.
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether retrying the same synthesis request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::SynthesisError(_) | Self::DecodeError(_) | Self::Io(_) => true,
            Self::BackendStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        let limited = EngineError::BackendStatus {
            status: 429,
            message: "slow down".to_string(),
        };
        let server = EngineError::BackendStatus {
            status: 503,
            message: "unavailable".to_string(),
        };
        let client = EngineError::BackendStatus {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn lifecycle_errors_are_not_retryable() {
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(!EngineError::WriterFinalized.is_retryable());
    }
}
