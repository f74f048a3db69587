use approx::assert_abs_diff_eq;
use ndarray::{stack, Array2, Array3, ArrayView2, Axis};
use stem_splitter_web::core::chunking::{apply_segmented, segment_weights, SegmentParams};

fn test_mix(frames: usize) -> Array2<f32> {
    Array2::from_shape_fn((2, frames), |(c, i)| {
        ((i as f32 * 0.013).sin() + c as f32 * 0.1) * 0.5
    })
}

/// Every source is a copy of the window it was given.
fn identity(sources: usize) -> impl FnMut(ArrayView2<f32>) -> stem_splitter_web::Result<Array3<f32>> {
    move |window| {
        let views = vec![window; sources];
        Ok(stack(Axis(0), &views).unwrap())
    }
}

#[test]
fn weights_are_triangular_and_peak_at_one() {
    let w = segment_weights(10);
    assert_eq!(w.len(), 10);
    assert_abs_diff_eq!(w.iter().copied().fold(0.0f32, f32::max), 1.0);
    for i in 0..5 {
        assert_abs_diff_eq!(w[i], w[9 - i], epsilon = 1e-6);
    }
    assert!(w[0] < w[4]);
    assert!(w.iter().all(|&v| v > 0.0));
}

#[test]
fn stride_follows_overlap() {
    let p = SegmentParams {
        segment: 100,
        overlap: 0.25,
        shifts: 1,
        max_shift: 0,
    };
    assert_eq!(p.stride(), 75);

    let p = SegmentParams { overlap: 0.0, ..p };
    assert_eq!(p.stride(), 100);
}

#[test]
fn overlap_add_reconstructs_identity_model() {
    let mix = test_mix(3_517);
    let params = SegmentParams {
        segment: 1_000,
        overlap: 0.25,
        shifts: 1,
        max_shift: 0,
    };

    let mut windows = 0;
    let mut run = identity(4);
    let out = apply_segmented(mix.view(), 4, &params, |w| {
        windows += 1;
        assert_eq!(w.ncols(), 1_000);
        run(w)
    })
    .unwrap();

    assert_eq!(out.shape(), &[4, 2, 3_517]);
    assert_eq!(windows, 5);
    for stem in out.outer_iter() {
        for (a, b) in stem.iter().zip(mix.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }
}

#[test]
fn shifted_passes_average_back_to_the_mix() {
    let mix = test_mix(2_000);
    let params = SegmentParams {
        segment: 512,
        overlap: 0.25,
        shifts: 3,
        max_shift: 200,
    };

    let mut calls = 0;
    let mut run = identity(2);
    let out = apply_segmented(mix.view(), 2, &params, |w| {
        calls += 1;
        run(w)
    })
    .unwrap();

    assert_eq!(out.shape(), &[2, 2, 2_000]);
    assert!(calls > 3);
    for stem in out.outer_iter() {
        for (a, b) in stem.iter().zip(mix.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }
}

#[test]
fn single_pass_is_deterministic() {
    let mix = test_mix(1_500);
    let params = SegmentParams {
        segment: 400,
        overlap: 0.5,
        shifts: 1,
        max_shift: 100,
    };
    // Scale by window position so the result depends on where segments start.
    let run = |w: ArrayView2<f32>| -> stem_splitter_web::Result<Array3<f32>> {
        let ramp = Array2::from_shape_fn(w.raw_dim(), |(_, i)| i as f32 / 400.0);
        Ok((&w * &ramp).insert_axis(Axis(0)))
    };

    let a = apply_segmented(mix.view(), 1, &params, run).unwrap();
    let b = apply_segmented(mix.view(), 1, &params, run).unwrap();
    assert_eq!(a, b);
}

#[test]
fn wrong_model_output_shape_is_an_error() {
    let mix = test_mix(800);
    let params = SegmentParams {
        segment: 256,
        overlap: 0.25,
        shifts: 1,
        max_shift: 0,
    };
    let err = apply_segmented(mix.view(), 4, &params, identity(3)).unwrap_err();
    assert!(err.to_string().contains("shape"), "{err}");
}

#[test]
fn zero_segment_is_rejected() {
    let mix = test_mix(10);
    let params = SegmentParams {
        segment: 0,
        overlap: 0.25,
        shifts: 1,
        max_shift: 0,
    };
    assert!(apply_segmented(mix.view(), 1, &params, identity(1)).is_err());
}
