//! Fragment normalization: everything between a raw WebSocket payload and
//! the session's canonical mono f32 stream.
//!
//! ```text
//! AudioData ──── base64 / data-URL ────► raw bytes
//!    raw bytes + "pcm"          ► f32-LE pass-through (already session rate)
//!    raw bytes + container tag  ► symphonia decode → mono mean → rescale
//!                                 → rubato resample to the session rate
//! ```
//!
//! Normalization has no side effects beyond the returned buffer; a failed
//! fragment never disturbs session state.

pub mod codec;
pub mod resample;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Result, VerbatimError};
use crate::protocol::AudioData;

/// Format tag for raw float32 PCM fragments.
pub const FORMAT_PCM: &str = "pcm";

/// Converts incoming audio fragments to mono f32 at a fixed target rate.
#[derive(Debug, Clone)]
pub struct SampleNormalizer {
    target_sample_rate: u32,
}

impl SampleNormalizer {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Normalize one fragment.
    ///
    /// `pcm` fragments are trusted to already be mono float32 in [-1, 1] at
    /// the session rate and pass through bit-exact. Anything else goes
    /// through the codec capability, gets downmixed to mono (arithmetic
    /// mean), rescaled to float range and resampled to the session rate.
    ///
    /// # Errors
    /// - `VerbatimError::Decode` for malformed base64 or misaligned `pcm`
    ///   payloads.
    /// - `VerbatimError::Codec` for unrecognized or corrupt containers.
    pub fn normalize(&self, data: &AudioData, format: &str) -> Result<Vec<f32>> {
        let bytes = decode_transport(data)?;

        if format.eq_ignore_ascii_case(FORMAT_PCM) {
            return pcm_to_f32(&bytes);
        }

        let decoded = codec::decode(bytes, format)?;
        resample::resample_fragment(&decoded.samples, decoded.sample_rate, self.target_sample_rate)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }
}

/// Strip an optional `data:audio/...;base64,` header and base64-decode text
/// payloads; byte payloads pass through untouched.
fn decode_transport(data: &AudioData) -> Result<Vec<u8>> {
    match data {
        AudioData::Bytes(bytes) => Ok(bytes.clone()),
        AudioData::Text(text) => {
            let encoded = match text.split_once(',') {
                Some((header, rest)) if header.starts_with("data:audio") => rest,
                _ => text.as_str(),
            };
            BASE64
                .decode(encoded.trim())
                .map_err(|e| VerbatimError::Decode(format!("invalid base64 audio payload: {e}")))
        }
    }
}

/// Reinterpret raw bytes as little-endian f32 samples.
fn pcm_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(VerbatimError::Decode(format!(
            "pcm payload length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Encode f32 samples as raw little-endian PCM bytes (the inverse of the
/// `pcm` ingest path; used by clients and tests).
pub fn f32_to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pcm_round_trip_is_exact() {
        let normalizer = SampleNormalizer::new(16_000);
        let samples: Vec<f32> = (0..1_000).map(|i| (i as f32 / 500.0) - 1.0).collect();

        let out = normalizer
            .normalize(&AudioData::Bytes(f32_to_pcm(&samples)), "pcm")
            .expect("normalize pcm");
        assert_eq!(out, samples);
    }

    #[test]
    fn pcm_accepts_base64_text_payloads() {
        let normalizer = SampleNormalizer::new(16_000);
        let samples = vec![0.25f32, -0.5, 1.0];
        let encoded = BASE64.encode(f32_to_pcm(&samples));

        let out = normalizer
            .normalize(&AudioData::Text(encoded), "pcm")
            .expect("normalize base64 pcm");
        assert_eq!(out, samples);
    }

    #[test]
    fn data_url_header_is_stripped() {
        let normalizer = SampleNormalizer::new(16_000);
        let samples = vec![0.125f32, -0.125];
        let payload = format!(
            "data:audio/webm;base64,{}",
            BASE64.encode(f32_to_pcm(&samples))
        );

        let out = normalizer
            .normalize(&AudioData::Text(payload), "pcm")
            .expect("normalize data-URL pcm");
        assert_eq!(out, samples);
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        let normalizer = SampleNormalizer::new(16_000);
        let err = normalizer.normalize(&AudioData::Text("not base64 at all!!".into()), "pcm");
        assert!(matches!(err, Err(VerbatimError::Decode(_))));
    }

    #[test]
    fn misaligned_pcm_is_a_decode_error() {
        let normalizer = SampleNormalizer::new(16_000);
        let err = normalizer.normalize(&AudioData::Bytes(vec![0, 1, 2]), "pcm");
        assert!(matches!(err, Err(VerbatimError::Decode(_))));
    }

    #[test]
    fn corrupt_container_is_a_codec_error() {
        let normalizer = SampleNormalizer::new(16_000);
        let err = normalizer.normalize(&AudioData::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8]), "webm");
        assert!(matches!(err, Err(VerbatimError::Codec(_))));
    }

    #[test]
    fn wav_fragment_is_downmixed_rescaled_and_resampled() {
        // Stereo i16 WAV at 32 kHz: both channels at half amplitude, so the
        // mono mean stays at 0.5 and the 16 kHz output halves the length.
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 32_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create wav writer");
            for _ in 0..32_000 {
                writer.write_sample(16_384i16).expect("write left");
                writer.write_sample(16_384i16).expect("write right");
            }
            writer.finalize().expect("finalize wav");
        }

        let normalizer = SampleNormalizer::new(16_000);
        let out = normalizer
            .normalize(&AudioData::Bytes(cursor.into_inner()), "wav")
            .expect("normalize wav");

        assert!(
            (out.len() as isize - 16_000).unsigned_abs() <= 64,
            "expected ≈16000 samples, got {}",
            out.len()
        );
        // Steady-state samples sit at 16384/32768 = 0.5 after the resampler
        // settles; check the middle of the fragment.
        let mid = out[out.len() / 2];
        assert_relative_eq!(mid, 0.5, epsilon = 0.01);
    }
}
