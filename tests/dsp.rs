use approx::assert_abs_diff_eq;
use stem_splitter_web::core::dsp::{stft_cac_stereo_centered, DEMUCS_HOP, DEMUCS_NFFT};

#[test]
fn stft_dimensions_follow_centered_framing() {
    let t = 10_000;
    let left = vec![0.0f32; t];
    let right = vec![0.0f32; t];

    let (spec, f_bins, frames) = stft_cac_stereo_centered(&left, &right, 1024, 256);
    assert_eq!(f_bins, 512);
    assert_eq!(frames, 1 + t / 256);
    assert_eq!(spec.len(), 4 * f_bins * frames);
    assert!(spec.iter().all(|&v| v == 0.0));
}

#[test]
fn stft_uses_cached_demucs_plan() {
    let t = DEMUCS_HOP * 8;
    let left: Vec<f32> = (0..t).map(|i| (i as f32 * 0.05).sin()).collect();
    let right = left.clone();

    let (spec, f_bins, frames) = stft_cac_stereo_centered(&left, &right, DEMUCS_NFFT, DEMUCS_HOP);
    assert_eq!(f_bins, DEMUCS_NFFT / 2);
    assert_eq!(frames, 9);

    // Identical channels give identical L and R planes.
    let plane = f_bins * frames;
    for i in 0..plane {
        assert_abs_diff_eq!(spec[i], spec[2 * plane + i], epsilon = 1e-4);
        assert_abs_diff_eq!(spec[plane + i], spec[3 * plane + i], epsilon = 1e-4);
    }
}

#[test]
fn sine_energy_lands_in_its_bin() {
    let n_fft = 1024;
    let hop = 256;
    let sr = 8_000.0f32;
    let bin = 64usize;
    let freq = bin as f32 * sr / n_fft as f32;

    let t = 8_192;
    let left: Vec<f32> = (0..t)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
        .collect();
    let right = vec![0.0f32; t];

    let (spec, f_bins, frames) = stft_cac_stereo_centered(&left, &right, n_fft, hop);
    let plane = f_bins * frames;
    let mid = frames / 2;
    let magnitude = |f: usize| {
        let at = f * frames + mid;
        (spec[at].powi(2) + spec[plane + at].powi(2)).sqrt()
    };

    let peak = (0..f_bins)
        .max_by(|&a, &b| magnitude(a).total_cmp(&magnitude(b)))
        .unwrap();
    assert_eq!(peak, bin);

    // Silent right channel.
    assert!(spec[2 * plane..].iter().all(|&v| v.abs() < 1e-6));
}
