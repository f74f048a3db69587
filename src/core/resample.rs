use ndarray::{s, Array2, ArrayView2};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, StemError};

/// Returns a two-channel copy: mono is duplicated, extra channels dropped.
pub fn to_stereo(audio: ArrayView2<f32>) -> Array2<f32> {
    let frames = audio.ncols();
    let mut stereo = Array2::<f32>::zeros((2, frames));
    match audio.nrows() {
        0 => {}
        1 => {
            stereo.row_mut(0).assign(&audio.row(0));
            stereo.row_mut(1).assign(&audio.row(0));
        }
        _ => stereo.assign(&audio.slice(s![..2, ..])),
    }
    stereo
}

/// Pads with silence or truncates so the result has exactly `frames` columns.
pub fn fit_length(audio: Array2<f32>, frames: usize) -> Array2<f32> {
    let have = audio.ncols();
    if have == frames {
        return audio;
    }
    if have > frames {
        return audio.slice(s![.., ..frames]).to_owned();
    }
    let mut out = Array2::<f32>::zeros((audio.nrows(), frames));
    out.slice_mut(s![.., ..have]).assign(&audio);
    out
}

/// Band-limited sample rate conversion of a `[channels, frames]` buffer.
///
/// The output length is `round(frames * to / from)`.
pub fn resample(audio: ArrayView2<f32>, from_rate: u32, to_rate: u32) -> Result<Array2<f32>> {
    if from_rate == to_rate {
        return Ok(audio.to_owned());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(StemError::Inference(format!(
            "cannot resample {from_rate} Hz -> {to_rate} Hz"
        )));
    }

    let channels = audio.nrows();
    let frames = audio.ncols();
    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (frames as f64 * ratio).round() as usize;
    if frames == 0 {
        return Ok(Array2::zeros((channels, 0)));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, frames, channels)
        .map_err(|e| StemError::Inference(format!("resampler setup failed: {e}")))?;

    // Delay compensation: run a silent tail through so the filter drains.
    let delay = resampler.output_delay();
    let input: Vec<Vec<f32>> = (0..channels).map(|ch| audio.row(ch).to_vec()).collect();
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| StemError::Inference(format!("resampling failed: {e}")))?;

    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| StemError::Inference(format!("resampling failed: {e}")))?;
    for (ch, rest) in output.iter_mut().zip(tail) {
        ch.extend(rest);
    }

    let mut result = Array2::<f32>::zeros((channels, expected));
    for (ch, samples) in output.iter().enumerate() {
        let usable = samples.len().saturating_sub(delay).min(expected);
        for i in 0..usable {
            result[[ch, i]] = samples[delay + i];
        }
    }

    Ok(result)
}
