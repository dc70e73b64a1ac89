//! One-shot sample-rate conversion for decoded fragments.
//!
//! ## Design
//!
//! Each fragment is normalized independently — the normalizer holds no state
//! between calls — so conversion happens in a single pass over the whole
//! decoded fragment: full rubato blocks first, a `process_partial` tail for
//! the remainder, and one final flush of the resampler's internal delay so
//! no trailing samples are lost.
//!
//! When the fragment already carries the target rate the input is returned
//! unchanged and no rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{Result, VerbatimError};

/// Input frame count per rubato call.
const BLOCK: usize = 1_024;

/// Convert a whole mono fragment from `from_rate` to `to_rate`.
pub fn resample_fragment(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);

    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, BLOCK, 1)
        .map_err(|e| VerbatimError::Codec(format!("resampler init: {e}")))?;

    let mut out = Vec::with_capacity((samples.len() as f64 * ratio) as usize + BLOCK);
    let mut output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

    let mut blocks = samples.chunks_exact(BLOCK);
    for block in &mut blocks {
        let (_consumed, produced) = resampler
            .process_into_buffer(&[block], &mut output_buf, None)
            .map_err(|e| VerbatimError::Codec(format!("resample: {e}")))?;
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let (_consumed, produced) = resampler
            .process_partial_into_buffer(Some(&[tail]), &mut output_buf, None)
            .map_err(|e| VerbatimError::Codec(format!("resample tail: {e}")))?;
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    // Flush the delay line.
    let (_consumed, produced) = resampler
        .process_partial_into_buffer(None::<&[&[f32]]>, &mut output_buf, None)
        .map_err(|e| VerbatimError::Codec(format!("resample flush: {e}")))?;
    out.extend_from_slice(&output_buf[0][..produced]);

    Ok(out)
}
