//! Decoding synthesized audio into mono PCM at the engine's working rate.

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler as _};

use crate::backend::{AudioEncoding, SynthesizedAudio};
use crate::error::EngineError;

/// Decode a synthesis response into mono `f32` samples at `target_rate`.
pub fn decode_to_mono(audio: &SynthesizedAudio, target_rate: u32) -> Result<Vec<f32>, EngineError> {
    let (samples, channels, rate) = match audio.encoding {
        AudioEncoding::Pcm16 {
            sample_rate,
            channels,
        } => (pcm16_le_to_f32(&audio.data)?, channels, sample_rate),
        AudioEncoding::Wav => decode_wav(&audio.data)?,
    };

    if channels == 0 || rate == 0 {
        return Err(EngineError::DecodeError(format!(
            "invalid stream layout: {channels} channels at {rate} Hz"
        )));
    }

    let mono = if channels > 1 {
        downmix(&samples, channels)
    } else {
        samples
    };

    if rate == target_rate {
        Ok(mono)
    } else {
        resample(&mono, rate, target_rate)
    }
}

/// Convert raw signed 16-bit little-endian bytes to `f32` in [-1, 1).
pub fn pcm16_le_to_f32(bytes: &[u8]) -> Result<Vec<f32>, EngineError> {
    if bytes.len() % 2 != 0 {
        return Err(EngineError::DecodeError(format!(
            "odd PCM16 byte length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u16, u32), EngineError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| EngineError::DecodeError(e.to_string()))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::DecodeError(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    #[allow(clippy::cast_precision_loss)]
                    s.map(|v| v as f32 / scale)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| EngineError::DecodeError(e.to_string()))?
        }
    };

    Ok((samples, spec.channels, spec.sample_rate))
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels);
    #[allow(clippy::cast_precision_loss)]
    let divisor = channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / divisor)
        .collect()
}

/// Resample mono audio from one sample rate to another using FFT-based resampling.
///
/// The resampler is flushed with silence until its output covers the whole
/// input, and its leading delay is trimmed, so the result holds exactly
/// `ceil(len × to / from)` samples aligned with the input.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, EngineError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(EngineError::ResampleError(format!(
            "cannot resample {from_rate} Hz to {to_rate} Hz"
        )));
    }

    let chunk_size = 1024;
    let resample_err = |e: rubato::ResampleError| EngineError::ResampleError(e.to_string());

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        chunk_size,
        2, // sub-chunks for quality
        1, // mono
    )
    .map_err(|e| EngineError::ResampleError(e.to_string()))?;

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(delay + expected + resampler.output_frames_max());

    for chunk in samples.chunks(chunk_size) {
        let result = if chunk.len() == chunk_size {
            resampler.process(&[chunk], None)
        } else {
            resampler.process_partial(Some(&[chunk][..]), None)
        }
        .map_err(resample_err)?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    while output.len() < delay + expected {
        let result = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_err)?;
        match result.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => break,
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn pcm(samples: &[i16]) -> Bytes {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>().into()
    }

    #[test]
    fn pcm16_converts_extremes() {
        let out = pcm16_le_to_f32(&pcm(&[0, i16::MAX, i16::MIN])).unwrap();
        assert!(out[0].abs() < f32::EPSILON);
        assert!((out[1] - 0.999_97).abs() < 1e-4);
        assert!((out[2] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn odd_length_is_rejected() {
        assert!(matches!(
            pcm16_le_to_f32(&[1, 2, 3]),
            Err(EngineError::DecodeError(_))
        ));
    }

    #[test]
    fn stereo_pcm_is_downmixed() {
        let audio = SynthesizedAudio::pcm16(pcm(&[16_384, 0, -16_384, -16_384]), 24_000, 2);
        let mono = decode_to_mono(&audio, 24_000).unwrap();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.25).abs() < 1e-4);
        assert!((mono[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn wav_is_decoded() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 24_000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0_i16, 8_192, -8_192] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let audio = SynthesizedAudio::wav(cursor.into_inner().into());
        let mono = decode_to_mono(&audio, 24_000).unwrap();
        assert_eq!(mono.len(), 3);
        assert!((mono[1] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn garbage_wav_is_a_decode_error() {
        let audio = SynthesizedAudio::wav(Bytes::from_static(b"not a riff file"));
        assert!(matches!(
            decode_to_mono(&audio, 24_000),
            Err(EngineError::DecodeError(_))
        ));
    }

    #[test]
    fn resampling_keeps_exact_length_and_tail() {
        let input = vec![0.5_f32; 16_000];
        let output = resample(&input, 16_000, 24_000).unwrap();
        assert_eq!(output.len(), 24_000);

        // The final chunk is not clipped by the resampler's delay.
        let tail = &output[22_000..23_800];
        #[allow(clippy::cast_precision_loss)]
        let mean = tail.iter().sum::<f32>() / tail.len() as f32;
        assert!((mean - 0.5).abs() < 0.05, "tail mean {mean}");
    }

    #[test]
    fn resampling_a_partial_chunk() {
        let input = vec![0.25_f32; 500];
        let output = resample(&input, 24_000, 48_000).unwrap();
        assert_eq!(output.len(), 1_000);
    }
}
