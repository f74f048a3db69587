//! Segmented inference with overlap-add.
//!
//! The model only accepts fixed-length windows. The mix is cut into
//! segments that overlap by `overlap * segment` frames, every segment is run
//! through the model, and the results are blended back with triangular
//! weights. With `shifts > 1` the whole procedure is repeated on randomly
//! offset copies of the mix and averaged.

use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use tracing::debug;

use crate::error::{Result, StemError};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentParams {
    /// Frames per model window.
    pub segment: usize,
    /// Fraction of a segment shared with the next one, in `[0, 1)`.
    pub overlap: f32,
    /// Randomly offset passes to average. 0 and 1 mean one unshifted pass.
    pub shifts: usize,
    /// Largest random offset, in frames.
    pub max_shift: usize,
}

impl SegmentParams {
    pub fn stride(&self) -> usize {
        let stride = ((1.0 - self.overlap.clamp(0.0, 0.99)) * self.segment as f32) as usize;
        stride.max(1)
    }
}

/// Triangular blend weights `1, 2, ..., peak, ..., 2, 1`, normalized to 1.
pub fn segment_weights(segment: usize) -> Array1<f32> {
    let half = segment / 2;
    let rising = (1..=half).map(|i| i as f32);
    let falling = (1..=segment - half).rev().map(|i| i as f32);
    let mut w: Array1<f32> = rising.chain(falling).collect();
    let peak = w.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 {
        w /= peak;
    }
    w
}

/// Runs `run` over the mix and returns `[sources, channels, frames]`.
///
/// `run` receives a `[channels, segment]` window (zero padded at the end of
/// the mix) and must return `[sources, channels, >= segment]`.
pub fn apply_segmented<F>(
    mix: ArrayView2<f32>,
    sources: usize,
    params: &SegmentParams,
    mut run: F,
) -> Result<Array3<f32>>
where
    F: FnMut(ArrayView2<f32>) -> Result<Array3<f32>>,
{
    if params.segment == 0 {
        return Err(StemError::Inference("model window is zero frames".into()));
    }

    if params.shifts <= 1 || params.max_shift == 0 {
        return overlap_add(mix, sources, params, &mut run);
    }

    let channels = mix.nrows();
    let length = mix.ncols();
    let max_shift = params.max_shift;

    let mut padded = Array2::<f32>::zeros((channels, length + 2 * max_shift));
    padded
        .slice_mut(s![.., max_shift..max_shift + length])
        .assign(&mix);

    let mut rng = rand::thread_rng();
    let mut out = Array3::<f32>::zeros((sources, channels, length));
    for pass in 0..params.shifts {
        let offset = rng.gen_range(0..=max_shift);
        debug!(pass, offset, "shifted inference pass");

        let shifted = padded.slice(s![.., offset..length + max_shift]);
        let res = overlap_add(shifted, sources, params, &mut run)?;
        let skip = max_shift - offset;
        out += &res.slice(s![.., .., skip..skip + length]);
    }
    out /= params.shifts as f32;

    Ok(out)
}

fn overlap_add<F>(
    mix: ArrayView2<f32>,
    sources: usize,
    params: &SegmentParams,
    run: &mut F,
) -> Result<Array3<f32>>
where
    F: FnMut(ArrayView2<f32>) -> Result<Array3<f32>>,
{
    let channels = mix.nrows();
    let length = mix.ncols();
    let segment = params.segment;
    let stride = params.stride();
    let weights = segment_weights(segment);

    let mut out = Array3::<f32>::zeros((sources, channels, length));
    let mut sum_weight = Array1::<f32>::zeros(length);
    let mut window = Array2::<f32>::zeros((channels, segment));

    let mut offset = 0usize;
    while offset < length {
        let end = (offset + segment).min(length);
        let chunk_len = end - offset;

        window.fill(0.0);
        window
            .slice_mut(s![.., ..chunk_len])
            .assign(&mix.slice(s![.., offset..end]));

        let chunk_out = run(window.view())?;
        let shape = chunk_out.shape();
        if shape[0] != sources || shape[1] != channels || shape[2] < chunk_len {
            return Err(StemError::Inference(format!(
                "model returned shape {:?}, expected [{}, {}, >= {}]",
                shape, sources, channels, chunk_len
            )));
        }

        let w = weights.slice(s![..chunk_len]);
        for (mut acc, part) in out
            .axis_iter_mut(Axis(0))
            .zip(chunk_out.axis_iter(Axis(0)))
        {
            let mut target = acc.slice_mut(s![.., offset..end]);
            let weighted = &part.slice(s![.., ..chunk_len]) * &w;
            target += &weighted;
        }
        let mut sw = sum_weight.slice_mut(s![offset..end]);
        sw += &w;

        offset += stride;
    }

    // Every frame is covered by at least one segment, but an empty mix is not.
    let norm = sum_weight.mapv(|v| if v > 0.0 { v } else { 1.0 });
    out /= &norm;

    Ok(out)
}
