mod common;

use std::{io::Cursor, sync::atomic::Ordering, sync::Arc};

use axum::body::Bytes;
use stem_splitter_web::{
    core::{
        audio::{load_audio, WavDepth},
        package::{ClipMode, OutputFormat, PackageOptions},
        pipeline::{allowed_file, secure_filename, Pipeline, PipelineOptions, Upload},
    },
    error::{ErrorKind, StemError},
    SharedModel,
};

use common::{sine_wav, MockSeparator};

const MP3_FRAME: usize = 1152;

fn options(format: OutputFormat, max_duration_secs: f64) -> PipelineOptions {
    PipelineOptions {
        max_duration_secs,
        package: PackageOptions {
            format,
            clip: ClipMode::Rescale,
            two_stems: None,
        },
    }
}

fn wav_pipeline(max_duration_secs: f64) -> Pipeline {
    let (sep, _) = MockSeparator::new();
    Pipeline::new(
        SharedModel::ready(sep),
        options(OutputFormat::Wav { depth: WavDepth::Int16 }, max_duration_secs),
    )
}

fn upload(name: &str, bytes: Vec<u8>) -> Upload {
    Upload::new(Some(name), Bytes::from(bytes)).unwrap()
}

#[test]
fn stems_keep_input_duration_and_rate() {
    let out = wav_pipeline(170.0)
        .run(&upload("song.wav", sine_wav(22_050, 1, 10.0)))
        .unwrap();

    assert_eq!(out.track, "song");
    assert_eq!(out.sample_rate, 22_050);
    assert_eq!(out.frames, 220_500);
    assert!(!out.truncated);

    let names: Vec<_> = out.stems.iter().map(|s| s.file_name.as_str()).collect();
    assert_eq!(names, ["vocals.wav", "drums.wav", "bass.wav", "other.wav"]);

    for stem in &out.stems {
        assert_eq!(stem.mime, "audio/wav");
        let reader = hound::WavReader::new(Cursor::new(stem.bytes.to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.duration() as usize, 220_500);
    }
}

#[test]
fn long_input_is_cut_to_max_duration() {
    let out = wav_pipeline(2.0)
        .run(&upload("long.wav", sine_wav(8_000, 2, 5.0)))
        .unwrap();

    assert!(out.truncated);
    assert_eq!(out.frames, 16_000);
    for stem in &out.stems {
        assert_eq!(stem.frames, 16_000);
    }
}

#[test]
fn mp3_stems_are_mpeg_frames() {
    let (sep, calls) = MockSeparator::new();
    let pipeline = Pipeline::new(
        SharedModel::ready(sep),
        options(OutputFormat::Mp3 { bitrate: 128 }, 170.0),
    );

    let out = pipeline
        .run(&upload("Song.WAV", sine_wav(44_100, 2, 1.0)))
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.stems.len(), 4);
    for stem in &out.stems {
        assert!(stem.file_name.ends_with(".mp3"));
        assert_eq!(stem.mime, "audio/mpeg");

        // Decoded length may differ by the encoder delay, never by more
        // than one MPEG frame.
        let decoded = load_audio(stem.bytes.clone(), &stem.file_name).unwrap();
        assert_eq!(decoded.sample_rate, 44_100);
        let diff = decoded.frames().abs_diff(44_100);
        assert!(diff <= MP3_FRAME, "{}: {} frames", stem.file_name, decoded.frames());
    }
}

#[test]
fn two_stem_mode_keeps_one_source_and_mixes_the_rest() {
    let (sep, _) = MockSeparator::new();
    let mut opts = options(OutputFormat::Wav { depth: WavDepth::Float32 }, 170.0);
    opts.package.two_stems = Some("vocals".into());
    let pipeline = Pipeline::new(SharedModel::ready(sep), opts);

    let out = pipeline
        .run(&upload("song.wav", sine_wav(16_000, 1, 1.0)))
        .unwrap();
    let names: Vec<_> = out.stems.iter().map(|s| s.file_name.as_str()).collect();
    assert_eq!(names, ["vocals.wav", "no_vocals.wav"]);
}

#[test]
fn unknown_two_stem_source_is_rejected() {
    let (sep, _) = MockSeparator::new();
    let mut opts = options(OutputFormat::Wav { depth: WavDepth::Int16 }, 170.0);
    opts.package.two_stems = Some("kazoo".into());
    let pipeline = Pipeline::new(SharedModel::ready(sep), opts);

    let err = pipeline
        .run(&upload("song.wav", sine_wav(16_000, 1, 0.2)))
        .unwrap_err();
    assert!(matches!(err, StemError::Config(_)), "{err}");
}

#[test]
fn unavailable_model_fails_before_decoding() {
    let pipeline = Pipeline::new(
        SharedModel::Unavailable(Arc::from("no weights")),
        options(OutputFormat::Mp3 { bitrate: 320 }, 170.0),
    );
    let err = pipeline
        .run(&upload("junk.mp3", b"not audio".to_vec()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Model);
}

#[test]
fn garbage_bytes_are_a_decode_error() {
    let err = wav_pipeline(170.0)
        .run(&upload("broken.mp3", vec![0u8; 512]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.to_string().starts_with("Error loading audio file"));
}

#[test]
fn upload_validation() {
    assert!(matches!(
        Upload::new(None, Bytes::new()),
        Err(StemError::NoFilePart)
    ));
    assert!(matches!(
        Upload::new(Some(""), Bytes::new()),
        Err(StemError::NoSelectedFile)
    ));
    match Upload::new(Some("notes.txt"), Bytes::from_static(b"x")) {
        Err(StemError::DisallowedExtension(ext)) => assert_eq!(ext, "txt"),
        other => panic!("expected disallowed extension, got {other:?}"),
    }
    assert!(Upload::new(Some("noextension"), Bytes::new()).is_err());

    let up = Upload::new(Some("My Song!.MP3"), Bytes::from_static(b"abc")).unwrap();
    assert_eq!(up.len(), 3);
    assert_eq!(up.track(), "My_Song");
}

#[test]
fn extension_and_filename_helpers() {
    assert!(allowed_file("a.mp3"));
    assert!(allowed_file("a.b.WAV"));
    assert!(!allowed_file("a.flac"));
    assert!(!allowed_file("mp3"));

    assert_eq!(secure_filename("My Song!.MP3"), "My_Song.MP3");
    assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
    assert_eq!(secure_filename("C:\\music\\take  2.wav"), "C_music_take_2.wav");
    assert_eq!(secure_filename("  (live) ._"), "live");
    assert_eq!(secure_filename("héllo wörld.wav"), "hllo_wrld.wav");
    assert_eq!(secure_filename("///"), "upload");
}
