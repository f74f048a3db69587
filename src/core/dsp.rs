use num_complex::Complex32;
use once_cell::sync::Lazy;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// FFT size and hop of the htdemucs spectrogram branch.
pub const DEMUCS_NFFT: usize = 4096;
pub const DEMUCS_HOP: usize = 1024;

struct FftPlan {
    forward: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
}

impl FftPlan {
    fn new(n_fft: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            forward: planner.plan_fft_forward(n_fft),
            hann_window: compute_hann(n_fft),
        }
    }
}

static FFT_PLAN_DEMUCS: Lazy<FftPlan> = Lazy::new(|| FftPlan::new(DEMUCS_NFFT));

fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = (n_fft - 1) as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

/// Complex-as-channels spectrogram of a stereo signal with center padding.
///
/// Returns `(buffer, F, Frames)` where `F = n_fft / 2` and
/// `Frames = 1 + T / hop`. The buffer is `[4, F, Frames]` flattened, channel
/// order `L.re, L.im, R.re, R.im`. `left` and `right` must have equal length.
pub fn stft_cac_stereo_centered(
    left: &[f32],
    right: &[f32],
    n_fft: usize,
    hop: usize,
) -> (Vec<f32>, usize, usize) {
    debug_assert_eq!(left.len(), right.len());

    let local;
    let plan: &FftPlan = if n_fft == DEMUCS_NFFT {
        &FFT_PLAN_DEMUCS
    } else {
        local = FftPlan::new(n_fft);
        &local
    };

    let t = left.len().min(right.len());
    let pad = n_fft / 2;

    let padded_len = pad + t + pad;
    let mut l_sig = vec![0.0f32; padded_len];
    let mut r_sig = vec![0.0f32; padded_len];
    l_sig[pad..pad + t].copy_from_slice(&left[..t]);
    r_sig[pad..pad + t].copy_from_slice(&right[..t]);

    let frames = 1 + (t / hop.max(1));
    let f_bins = n_fft / 2;

    let mut out = vec![0.0f32; 4 * f_bins * frames];
    let mut buf_l = vec![Complex32::zero(); n_fft];
    let mut buf_r = vec![Complex32::zero(); n_fft];

    for fr in 0..frames {
        let start = fr * hop;
        for i in 0..n_fft {
            let w = plan.hann_window[i];
            let (l, r) = match (l_sig.get(start + i), r_sig.get(start + i)) {
                (Some(&l), Some(&r)) => (l, r),
                _ => (0.0, 0.0),
            };
            buf_l[i] = Complex32::new(l * w, 0.0);
            buf_r[i] = Complex32::new(r * w, 0.0);
        }

        plan.forward.process(&mut buf_l);
        plan.forward.process(&mut buf_r);

        let plane = f_bins * frames;
        for fi in 0..f_bins {
            let at = fi * frames + fr;
            out[at] = buf_l[fi].re;
            out[plane + at] = buf_l[fi].im;
            out[2 * plane + at] = buf_r[fi].re;
            out[3 * plane + at] = buf_r[fi].im;
        }
    }

    (out, f_bins, frames)
}
