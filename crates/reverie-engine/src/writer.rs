//! Incremental WAV persistence.
//!
//! The writer appends PCM16 as each block is rendered so a session that dies
//! half-way still leaves its audio on disk. The 44-byte header is written as
//! a placeholder first and patched with the real sizes at finalization.
//!
//! ```text
//!  offset  size  field
//!  0       4     "RIFF"
//!  4       4     36 + data length
//!  8       4     "WAVE"
//!  12      4     "fmt "
//!  16      4     16 (PCM fmt chunk size)
//!  20      2     1 (PCM)
//!  22      2     channels
//!  24      4     sample rate
//!  28      4     byte rate
//!  32      2     block align
//!  34      2     16 (bits per sample)
//!  36      4     "data"
//!  40      4     data length
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::EngineError;

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;

/// Where a finished session's audio ended up.
#[derive(Debug, Clone)]
pub enum DownloadHandle {
    /// A complete WAV file on disk.
    File(PathBuf),

    /// An in-memory WAV, header first, as ordered chunks.
    Memory(Vec<Bytes>),
}

impl DownloadHandle {
    /// Path of a file-backed result.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory(_) => None,
        }
    }

    /// Concatenate an in-memory result into one buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Self::File(_) => None,
            Self::Memory(chunks) => {
                let mut out = Vec::with_capacity(chunks.iter().map(Bytes::len).sum());
                for chunk in chunks {
                    out.extend_from_slice(chunk);
                }
                Some(out.into())
            }
        }
    }
}

/// Build the 44-byte PCM WAV header for `data_len` bytes of sample data.
pub fn wav_header(
    data_len: u64,
    sample_rate: u32,
    channels: u16,
) -> Result<[u8; WAV_HEADER_LEN], EngineError> {
    let too_large = || EngineError::ContainerTooLarge { bytes: data_len };
    let data = u32::try_from(data_len).map_err(|_| too_large())?;
    let riff = data.checked_add(36).ok_or_else(too_large)?;

    let block_align = channels
        .checked_mul(BITS_PER_SAMPLE / 8)
        .ok_or_else(|| EngineError::UnsupportedFormat(format!("{channels} channels")))?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| {
            EngineError::UnsupportedFormat(format!(
                "{sample_rate} Hz x {channels} channels overflows the byte rate"
            ))
        })?;

    let mut header = [0_u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16_u32.to_le_bytes());
    header[20..22].copy_from_slice(&1_u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data.to_le_bytes());
    Ok(header)
}

/// Convert `f32` samples to clamped signed 16-bit little-endian PCM.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let s = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        let scaled = if s < 0.0 { s * 32_768.0 } else { s * 32_767.0 };
        #[allow(clippy::cast_possible_truncation)]
        let value = scaled as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.into()
}

// ── Byte stores ────────────────────────────────────────────────────

/// Append-only byte sink with a header patched in at the end.
#[async_trait::async_trait]
pub trait ByteStore: Send {
    /// Append one chunk of sample data.
    async fn append(&mut self, chunk: Bytes) -> Result<(), EngineError>;

    /// Write the final header and hand back the result.
    async fn finalize(
        &mut self,
        header: [u8; WAV_HEADER_LEN],
    ) -> Result<DownloadHandle, EngineError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// File-backed store: placeholder header, appends, seek-and-rewrite.
pub struct FileStore {
    path: PathBuf,
    file: File,
}

impl FileStore {
    /// Create (or truncate) `path` and write the placeholder header.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let storage = |source| EngineError::StorageError {
            path: path.clone(),
            source,
        };

        let mut file = File::create(&path).await.map_err(storage)?;
        file.write_all(&[0_u8; WAV_HEADER_LEN])
            .await
            .map_err(storage)?;

        tracing::info!(path = %path.display(), "Output file opened");
        Ok(Self { path, file })
    }

    fn storage_error(&self, source: std::io::Error) -> EngineError {
        EngineError::StorageError {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl ByteStore for FileStore {
    async fn append(&mut self, chunk: Bytes) -> Result<(), EngineError> {
        self.file
            .write_all(&chunk)
            .await
            .map_err(|e| self.storage_error(e))
    }

    async fn finalize(
        &mut self,
        header: [u8; WAV_HEADER_LEN],
    ) -> Result<DownloadHandle, EngineError> {
        self.file.flush().await.map_err(|e| self.storage_error(e))?;
        self.file
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| self.storage_error(e))?;
        self.file
            .write_all(&header)
            .await
            .map_err(|e| self.storage_error(e))?;
        self.file.flush().await.map_err(|e| self.storage_error(e))?;
        self.file.sync_all().await.map_err(|e| self.storage_error(e))?;
        Ok(DownloadHandle::File(self.path.clone()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store: ordered chunks, header prepended at finalization.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: Vec<Bytes>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ByteStore for MemoryStore {
    async fn append(&mut self, chunk: Bytes) -> Result<(), EngineError> {
        self.chunks.push(chunk);
        Ok(())
    }

    async fn finalize(
        &mut self,
        header: [u8; WAV_HEADER_LEN],
    ) -> Result<DownloadHandle, EngineError> {
        let mut chunks = Vec::with_capacity(self.chunks.len() + 1);
        chunks.push(Bytes::copy_from_slice(&header));
        chunks.append(&mut self.chunks);
        Ok(DownloadHandle::Memory(chunks))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ── Durable writer ─────────────────────────────────────────────────

/// Incremental PCM16 WAV writer over a [`ByteStore`].
pub struct DurableWriter {
    store: Box<dyn ByteStore>,
    total_bytes_written: u64,
    finalized: bool,
    sample_rate: u32,
    channels: u16,
}

impl DurableWriter {
    /// Writer over an explicit store.
    pub fn new(store: Box<dyn ByteStore>, sample_rate: u32, channels: u16) -> Self {
        Self {
            store,
            total_bytes_written: 0,
            finalized: false,
            sample_rate,
            channels,
        }
    }

    /// Writer that keeps everything in memory.
    #[must_use]
    pub fn memory(sample_rate: u32, channels: u16) -> Self {
        Self::new(Box::new(MemoryStore::new()), sample_rate, channels)
    }

    /// Open a file-backed writer at `path`, or an in-memory one when `path`
    /// is `None` or the file cannot be created.
    pub async fn open(path: Option<&Path>, sample_rate: u32, channels: u16) -> Self {
        let Some(path) = path else {
            return Self::memory(sample_rate, channels);
        };
        match FileStore::create(path).await {
            Ok(store) => Self::new(Box::new(store), sample_rate, channels),
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to in-memory output");
                Self::memory(sample_rate, channels)
            }
        }
    }

    /// Encode and append interleaved `f32` samples.
    pub async fn append(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        if self.finalized {
            return Err(EngineError::WriterFinalized);
        }
        let chunk = encode_pcm16(samples);
        let len = chunk.len() as u64;
        let total = self.total_bytes_written + len;
        if total > u64::from(u32::MAX - 36) {
            return Err(EngineError::ContainerTooLarge { bytes: total });
        }

        self.store.append(chunk).await?;
        self.total_bytes_written = total;
        Ok(())
    }

    /// Patch the header and return the finished artifact.
    pub async fn finalize(&mut self) -> Result<DownloadHandle, EngineError> {
        if self.finalized {
            return Err(EngineError::WriterFinalized);
        }
        let header = wav_header(self.total_bytes_written, self.sample_rate, self.channels)?;
        let handle = self.store.finalize(header).await?;
        self.finalized = true;

        tracing::info!(
            store = %self.store.describe(),
            bytes = self.total_bytes_written,
            "Output finalized"
        );
        Ok(handle)
    }

    /// Sample-data bytes appended so far (header excluded).
    #[must_use]
    pub const fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Where the audio is going.
    #[must_use]
    pub fn describe(&self) -> String {
        self.store.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = wav_header(96_000, 24_000, 2).unwrap();
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 96_036);
        assert_eq!(&header[8..16], b"WAVEfmt ");
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        assert_eq!(u32::from_le_bytes(header[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), 96_000);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 4);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes(header[40..44].try_into().unwrap()), 96_000);
    }

    #[test]
    fn oversized_header_is_rejected() {
        assert!(matches!(
            wav_header(u64::from(u32::MAX), 24_000, 2),
            Err(EngineError::ContainerTooLarge { .. })
        ));
    }

    #[test]
    fn extreme_sample_rate_is_rejected() {
        assert!(matches!(
            wav_header(0, u32::MAX, 2),
            Err(EngineError::UnsupportedFormat(_))
        ));
        assert!(wav_header(0, u32::MAX / 4, 2).is_ok());
    }

    #[test]
    fn pcm16_is_asymmetric_and_clamped() {
        let bytes = encode_pcm16(&[1.0, -1.0, 2.0, -3.0, 0.0, f32::NAN]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![32_767, -32_768, 32_767, -32_768, 0, 0]);
    }

    #[tokio::test]
    async fn memory_writer_prepends_header() {
        let mut writer = DurableWriter::memory(24_000, 2);
        writer.append(&[0.5; 10]).await.unwrap();
        writer.append(&[-0.5; 6]).await.unwrap();
        assert_eq!(writer.total_bytes_written(), 32);

        let handle = writer.finalize().await.unwrap();
        let bytes = handle.to_bytes().unwrap();
        assert_eq!(bytes.len(), 44 + 32);
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 32);
    }

    #[tokio::test]
    async fn append_after_finalize_fails() {
        let mut writer = DurableWriter::memory(24_000, 2);
        writer.finalize().await.unwrap();
        assert!(matches!(
            writer.append(&[0.0]).await,
            Err(EngineError::WriterFinalized)
        ));
        assert!(matches!(
            writer.finalize().await,
            Err(EngineError::WriterFinalized)
        ));
    }

    #[tokio::test]
    async fn file_writer_patches_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.wav");

        let mut writer = DurableWriter::open(Some(&path), 24_000, 2).await;
        assert_eq!(writer.describe(), path.display().to_string());
        writer.append(&[0.25; 480]).await.unwrap();
        let handle = writer.finalize().await.unwrap();
        assert_eq!(handle.path(), Some(path.as_path()));

        let bytes = tokio::fs::read(&path).await.unwrap();
        assert_eq!(bytes.len(), 44 + 960);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 960);
    }

    #[tokio::test]
    async fn unwritable_path_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("out.wav");

        let mut writer = DurableWriter::open(Some(&path), 24_000, 2).await;
        assert_eq!(writer.describe(), "memory");
        writer.append(&[0.0; 4]).await.unwrap();
        assert!(matches!(writer.finalize().await.unwrap(), DownloadHandle::Memory(_)));
    }
}
