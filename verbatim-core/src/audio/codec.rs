//! Container decoding behind the normalizer.
//!
//! Encoded fragments (webm, ogg, wav, ...) are handed to symphonia for
//! probing and decoding; this module is the whole extent of the crate's
//! codec knowledge. Decoded audio leaves here as mono f32 at the
//! container's declared rate — resampling to the session rate happens in
//! [`super::resample`].
//!
//! Downmix policy: arithmetic mean across channels. Sample rescaling:
//! 16-bit ÷ 32768, 32-bit ÷ 2147483648, 8-bit and float widths cast without
//! scaling.

use std::io::Cursor;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

use crate::error::{Result, VerbatimError};

/// A decoded fragment: mono samples plus the container's declared rate.
#[derive(Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode one encoded fragment to mono f32.
///
/// `format_hint` is the client-declared container tag (`webm`, `ogg`, ...),
/// forwarded to the probe as an extension hint.
///
/// # Errors
/// Returns `VerbatimError::Codec` for unrecognized containers, unsupported
/// codecs and corrupt streams. The error is scoped to this fragment.
pub fn decode(bytes: Vec<u8>, format_hint: &str) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if !format_hint.is_empty() {
        hint.with_extension(format_hint);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            VerbatimError::Codec(format!("unrecognized container ({format_hint}): {e}"))
        })?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VerbatimError::Codec("no decodable track in fragment".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VerbatimError::Codec("container does not declare a sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VerbatimError::Codec(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(VerbatimError::Codec(format!("demux error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => downmix_into(&decoded, &mut samples)?,
            // A single undecodable packet is recoverable; the stream may
            // still carry good audio after it.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(VerbatimError::Codec(format!("decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(VerbatimError::Codec(
            "fragment contained no audio samples".into(),
        ));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Downmix one decoded buffer to mono, appending to `out`.
fn downmix_into(decoded: &AudioBufferRef<'_>, out: &mut Vec<f32>) -> Result<()> {
    match decoded {
        AudioBufferRef::F32(buf) => mix(buf.as_ref(), out, |s| s),
        AudioBufferRef::F64(buf) => mix(buf.as_ref(), out, |s| s as f32),
        AudioBufferRef::S16(buf) => mix(buf.as_ref(), out, |s| f32::from(s) / 32_768.0),
        AudioBufferRef::S32(buf) => mix(buf.as_ref(), out, |s| s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => mix(buf.as_ref(), out, |s| f32::from(s)),
        AudioBufferRef::S8(buf) => mix(buf.as_ref(), out, |s| f32::from(s)),
        _ => {
            return Err(VerbatimError::Codec(
                "unsupported sample width in decoded audio".into(),
            ))
        }
    }
    Ok(())
}

/// Average all channels of `buf` into mono, converting each sample with `f`.
fn mix<S, F>(buf: &AudioBuffer<S>, out: &mut Vec<f32>, f: F)
where
    S: Sample,
    F: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();

    if channels == 1 {
        out.extend(buf.chan(0)[..frames].iter().map(|&s| f(s)));
        return;
    }

    out.reserve(frames);
    for frame in 0..frames {
        let mut acc = 0.0f32;
        for ch in 0..channels {
            acc += f(buf.chan(ch)[frame]);
        }
        out.push(acc / channels as f32);
    }
}
