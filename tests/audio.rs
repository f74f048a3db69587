mod common;

use std::io::Cursor;

use axum::body::Bytes;
use ndarray::Array2;
use stem_splitter_web::{
    core::{
        audio::{
            encode_mp3, encode_wav, end_of_stream, limit_duration, load_audio, max_frames,
            WavDepth,
        },
        package::{apply_clip, ClipMode},
    },
    error::ErrorKind,
    types::Waveform,
};

use common::sine_wav;

#[test]
fn wav_upload_decodes_to_planar_samples() {
    let bytes = sine_wav(22_050, 2, 1.5);
    let wav = load_audio(Bytes::from(bytes), "song.wav").unwrap();

    assert_eq!(wav.sample_rate, 22_050);
    assert_eq!(wav.channels(), 2);
    assert_eq!(wav.frames(), 33_075);
    assert!((wav.duration_secs() - 1.5).abs() < 1e-6);

    let peak = wav.samples.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    assert!(peak > 0.45 && peak < 0.55, "peak {peak}");
}

#[test]
fn misnamed_upload_is_detected_from_content() {
    let bytes = sine_wav(8_000, 1, 0.25);
    let wav = load_audio(Bytes::from(bytes), "actually-a-wav.mp3").unwrap();
    assert_eq!(wav.channels(), 1);
    assert_eq!(wav.frames(), 2_000);
}

#[test]
fn garbage_is_a_decode_error() {
    let err = load_audio(Bytes::from_static(b"RIFF....nope"), "x.wav").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[test]
fn duration_limit_truncates_only_long_input() {
    let wav = Waveform::new(Array2::zeros((2, 50_000)), 10_000);
    assert_eq!(max_frames(10_000, 2.5), 25_000);

    let cut = limit_duration(wav.clone(), 2.5);
    assert_eq!(cut.frames(), 25_000);
    assert_eq!(cut.channels(), 2);

    let kept = limit_duration(wav, 60.0);
    assert_eq!(kept.frames(), 50_000);
}

#[test]
fn mp3_encoder_emits_frame_sync() {
    let audio = Array2::from_shape_fn((1, 44_100), |(_, i)| (i as f32 * 0.03).sin() * 0.3);
    let mp3 = encode_mp3(audio.view(), 44_100, 192).unwrap();

    assert!(mp3.len() > 1_000);
    assert_eq!(mp3[0], 0xFF);
    assert_eq!(mp3[1] & 0xE0, 0xE0);
}

#[test]
fn mp3_encoder_rejects_empty_channel_set() {
    let audio = Array2::<f32>::zeros((0, 100));
    assert!(encode_mp3(audio.view(), 44_100, 320).is_err());
}

#[test]
fn wav_encoder_honours_depth() {
    let audio = Array2::from_shape_fn((2, 1_000), |(c, i)| if c == 0 { 0.5 } else { -(i as f32) / 1_000.0 });

    for (depth, bits, format) in [
        (WavDepth::Int16, 16, hound::SampleFormat::Int),
        (WavDepth::Int24, 24, hound::SampleFormat::Int),
        (WavDepth::Float32, 32, hound::SampleFormat::Float),
    ] {
        let bytes = encode_wav(audio.view(), 32_000, depth).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 32_000);
        assert_eq!(spec.bits_per_sample, bits);
        assert_eq!(spec.sample_format, format);
        assert_eq!(reader.duration(), 1_000);
    }
}

#[test]
fn float_wav_round_trips_samples() {
    let audio = Array2::from_shape_fn((1, 16), |(_, i)| i as f32 / 32.0);
    let bytes = encode_wav(audio.view(), 8_000, WavDepth::Float32).unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let back: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
    assert_eq!(back, audio.iter().copied().collect::<Vec<_>>());
}

#[test]
fn rescale_keeps_shape_of_loud_stems() {
    let mut loud = Array2::from_shape_vec((1, 4), vec![2.0f32, -1.0, 0.5, 0.0]).unwrap();
    apply_clip(&mut loud, ClipMode::Rescale);
    let peak = loud.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    assert!(peak < 1.0);
    assert!((loud[[0, 0]] / loud[[0, 1]] + 2.0).abs() < 1e-6);

    let mut quiet = Array2::from_shape_vec((1, 2), vec![0.5f32, -0.25]).unwrap();
    apply_clip(&mut quiet, ClipMode::Rescale);
    assert_eq!(quiet[[0, 0]], 0.5);
}

#[test]
fn clamp_limits_each_sample() {
    let mut a = Array2::from_shape_vec((1, 3), vec![1.5f32, -3.0, 0.2]).unwrap();
    apply_clip(&mut a, ClipMode::Clamp);
    assert_eq!(a.as_slice().unwrap(), &[0.99, -0.99, 0.2]);
}

#[test]
fn mp3_bitrate_is_capped_for_low_sample_rates() {
    let audio = Array2::from_shape_fn((2, 22_050), |(_, i)| (i as f32 * 0.02).sin() * 0.3);
    let mp3 = encode_mp3(audio.view(), 22_050, 320).unwrap();
    assert_eq!(mp3[0], 0xFF);
}

#[test]
fn stream_end_is_classified() {
    use symphonia::core::errors::Error as SymphoniaError;

    let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "end of stream");
    assert!(end_of_stream(SymphoniaError::IoError(eof), 4_096).is_ok());

    // A reset mid-file would truncate the upload; it is refused instead.
    let err = end_of_stream(SymphoniaError::ResetRequired, 4_096).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.to_string().contains("4096"), "{err}");

    let err = end_of_stream(SymphoniaError::Unsupported("codec"), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}
