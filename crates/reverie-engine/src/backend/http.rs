//! HTTP synthesis backend for OpenAI-compatible speech endpoints.
//!
//! Sends `POST {base_url}/audio/speech` with a JSON body and reads the audio
//! back either as a binary body or as a JSON envelope carrying base64 audio
//! (`{ "data": "<base64>" }`). Retries are the renderer's job; this backend
//! performs exactly one request per call and classifies the outcome.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::backend::{SynthesisBackend, SynthesizedAudio};
use crate::config::ENGINE_SAMPLE_RATE;
use crate::error::EngineError;

/// How the service returns audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Body is headerless PCM16 LE mono at `sample_rate`.
    #[default]
    RawPcm,

    /// Body is a WAV file.
    Wav,

    /// Body is JSON `{ "data": "<base64 PCM16 LE mono>" }`.
    Base64Json,
}

impl ResponseMode {
    const fn response_format(self) -> &'static str {
        match self {
            Self::RawPcm | Self::Base64Json => "pcm",
            Self::Wav => "wav",
        }
    }
}

/// Configuration for [`HttpSynthesisBackend`].
///
/// # Example
///
/// ```
/// use reverie_engine::backend::http::{HttpBackendConfig, ResponseMode};
/// use std::time::Duration;
///
/// let config = HttpBackendConfig::new()
///     .with_base_url("http://localhost:8880/v1")
///     .with_model("kokoro")
///     .with_response_mode(ResponseMode::Wav)
///     .with_timeout(Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,

    /// Model name sent with every request.
    pub model: String,

    /// Optional bearer token.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request timeout.
    #[serde(with = "timeout_secs")]
    pub timeout: Duration,

    /// Response decoding mode.
    pub response_mode: ResponseMode,

    /// Sample rate of raw PCM responses.
    pub sample_rate: u32,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8880/v1".to_string(),
            model: "tts-1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            response_mode: ResponseMode::RawPcm,
            sample_rate: ENGINE_SAMPLE_RATE,
        }
    }
}

impl HttpBackendConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API root.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set an optional bearer token.
    #[must_use]
    pub fn with_optional_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the response mode.
    #[must_use]
    pub const fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    /// Set the raw PCM sample rate.
    #[must_use]
    pub const fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

/// Request body of the speech endpoint.
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// JSON envelope returned in [`ResponseMode::Base64Json`].
#[derive(Debug, Deserialize)]
struct AudioEnvelope {
    #[serde(default, alias = "audio")]
    data: Option<String>,
}

/// OpenAI-compatible speech backend.
pub struct HttpSynthesisBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpSynthesisBackend {
    /// Build the backend and its HTTP client.
    pub fn new(config: HttpBackendConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("reverie-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::SynthesisError(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            url = %config.speech_url(),
            model = %config.model,
            mode = ?config.response_mode,
            "HTTP synthesis backend configured"
        );

        Ok(Self { client, config })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn decode_body(&self, body: Bytes) -> Result<Option<SynthesizedAudio>, EngineError> {
        if body.is_empty() {
            return Ok(None);
        }
        match self.config.response_mode {
            ResponseMode::RawPcm => Ok(Some(SynthesizedAudio::pcm16(
                body,
                self.config.sample_rate,
                1,
            ))),
            ResponseMode::Wav => Ok(Some(SynthesizedAudio::wav(body))),
            ResponseMode::Base64Json => parse_envelope(&body, self.config.sample_rate),
        }
    }
}

/// Decode a `{ "data": "<base64>" }` envelope into PCM16 mono audio.
fn parse_envelope(body: &[u8], sample_rate: u32) -> Result<Option<SynthesizedAudio>, EngineError> {
    let envelope: AudioEnvelope = serde_json::from_slice(body)
        .map_err(|e| EngineError::DecodeError(format!("invalid audio envelope: {e}")))?;

    let Some(encoded) = envelope.data.filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    let raw = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| EngineError::DecodeError(format!("invalid base64 audio: {e}")))?;

    if raw.is_empty() {
        return Ok(None);
    }
    Ok(Some(SynthesizedAudio::pcm16(raw.into(), sample_rate, 1)))
}

#[async_trait::async_trait]
impl SynthesisBackend for HttpSynthesisBackend {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<Option<SynthesizedAudio>, EngineError> {
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice,
            response_format: self.config.response_mode.response_format(),
        };

        let mut request = self.client.post(self.config.speech_url()).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::SynthesisError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::BackendStatus {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::SynthesisError(e.to_string()))?;

        tracing::debug!(
            chars = text.len(),
            bytes = bytes.len(),
            "Speech endpoint responded"
        );

        self.decode_body(bytes)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Timeouts serialize as whole seconds.
mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
