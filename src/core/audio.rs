use std::io::Cursor;

use axum::body::Bytes;
use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::{s, Array2, ArrayView2};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use crate::{
    error::{Result, StemError},
    types::Waveform,
};

/// Decodes an uploaded byte stream into a channel-major waveform.
///
/// `file_name` only provides a format hint; the container is detected from the
/// bytes themselves.
pub fn load_audio(bytes: Bytes, file_name: &str) -> Result<Waveform> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        hint.with_extension(&ext.to_ascii_lowercase());
    }

    let detected = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = detected.format;
    let track = format
        .default_track()
        .ok_or_else(|| StemError::Decode("no default track found".into()))?;
    let track_id = track.id;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut planar: Vec<Vec<f32>> = Vec::new();
    let mut sample_rate: u32 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(e) => {
                end_of_stream(e, planar.first().map(Vec::len).unwrap_or(0))?;
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(timestamp = packet.ts, reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            return Err(StemError::Decode("stream reports zero channels".into()));
        }
        if planar.is_empty() {
            planar = vec![Vec::new(); channels];
            sample_rate = spec.rate;
        } else if planar.len() != channels {
            return Err(StemError::Decode(format!(
                "channel count changed mid-stream ({} -> {})",
                planar.len(),
                channels
            )));
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        for frame in buffer.samples().chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
    }

    let frames = planar.first().map(Vec::len).unwrap_or(0);
    if frames == 0 || sample_rate == 0 {
        return Err(StemError::Decode("file contains no audio frames".into()));
    }

    let channels = planar.len();
    let flat: Vec<f32> = planar.into_iter().flatten().collect();
    let samples = Array2::from_shape_vec((channels, frames), flat)
        .map_err(|e| StemError::Decode(e.to_string()))?;

    debug!(sample_rate, channels, frames, "decoded upload");

    Ok(Waveform::new(samples, sample_rate))
}

/// Classifies the error that ended the packet loop. A clean end of file is
/// `Ok`; a stream that changes parameters mid-file is refused rather than
/// silently truncated.
pub fn end_of_stream(err: SymphoniaError, frames_decoded: usize) -> Result<()> {
    match err {
        SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
        SymphoniaError::ResetRequired => {
            warn!(frames_decoded, "stream reset mid-file");
            Err(StemError::Decode(format!(
                "stream changed parameters after {frames_decoded} frames"
            )))
        }
        e => Err(e.into()),
    }
}

/// Number of frames kept for `max_duration_secs` at `sample_rate`.
pub fn max_frames(sample_rate: u32, max_duration_secs: f64) -> usize {
    (sample_rate as f64 * max_duration_secs) as usize
}

/// Truncates the time axis to at most `max_duration_secs`. Shorter input is
/// returned unchanged.
pub fn limit_duration(wav: Waveform, max_duration_secs: f64) -> Waveform {
    let limit = max_frames(wav.sample_rate, max_duration_secs);
    if wav.frames() <= limit {
        return wav;
    }
    let samples = wav.samples.slice(s![.., ..limit]).to_owned();
    Waveform::new(samples, wav.sample_rate)
}

fn lame_bitrate(kbps: u32) -> mp3lame_encoder::Bitrate {
    use mp3lame_encoder::Bitrate;

    match kbps {
        0..=15 => Bitrate::Kbps8,
        16..=23 => Bitrate::Kbps16,
        24..=31 => Bitrate::Kbps24,
        32..=39 => Bitrate::Kbps32,
        40..=47 => Bitrate::Kbps40,
        48..=63 => Bitrate::Kbps48,
        64..=79 => Bitrate::Kbps64,
        80..=95 => Bitrate::Kbps80,
        96..=111 => Bitrate::Kbps96,
        112..=127 => Bitrate::Kbps112,
        128..=159 => Bitrate::Kbps128,
        160..=191 => Bitrate::Kbps160,
        192..=223 => Bitrate::Kbps192,
        224..=255 => Bitrate::Kbps224,
        256..=319 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

/// Highest CBR bitrate the MPEG version for `sample_rate` allows.
fn max_bitrate_kbps(sample_rate: u32) -> u32 {
    match sample_rate {
        0..=15_999 => 64,
        16_000..=31_999 => 160,
        _ => 320,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encodes a `[channels, frames]` buffer as CBR mp3, entirely in memory.
/// Mono is sent to both encoder channels; channels past the second are
/// ignored.
pub fn encode_mp3(audio: ArrayView2<f32>, sample_rate: u32, bitrate_kbps: u32) -> Result<Vec<u8>> {
    use mp3lame_encoder::{Builder, DualPcm, FlushNoGap, Quality};

    let channels = audio.nrows();
    if channels == 0 {
        return Err(StemError::Encode("no channels to encode".into()));
    }

    let mut builder =
        Builder::new().ok_or_else(|| StemError::Encode("LAME encoder init failed".into()))?;
    builder
        .set_num_channels(2)
        .map_err(|e| StemError::Encode(format!("LAME set channels failed: {e:?}")))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| StemError::Encode(format!("LAME rejected sample rate {sample_rate}: {e:?}")))?;
    builder
        .set_brate(lame_bitrate(bitrate_kbps.min(max_bitrate_kbps(sample_rate))))
        .map_err(|e| StemError::Encode(format!("LAME set bitrate failed: {e:?}")))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| StemError::Encode(format!("LAME set quality failed: {e:?}")))?;

    let mut encoder = builder
        .build()
        .map_err(|e| StemError::Encode(format!("LAME build failed: {e:?}")))?;

    let left: Vec<i16> = audio.row(0).iter().copied().map(to_i16).collect();
    let right: Vec<i16> = if channels > 1 {
        audio.row(1).iter().copied().map(to_i16).collect()
    } else {
        left.clone()
    };

    let mut out: Vec<u8> = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(left.len()));
    let written = encoder
        .encode(
            DualPcm {
                left: &left,
                right: &right,
            },
            out.spare_capacity_mut(),
        )
        .map_err(|e| StemError::Encode(format!("LAME encode failed: {e:?}")))?;
    // SAFETY: the encoder initialised `written` bytes of spare capacity.
    unsafe {
        out.set_len(written);
    }

    out.reserve(7200);
    let flushed = encoder
        .flush::<FlushNoGap>(out.spare_capacity_mut())
        .map_err(|e| StemError::Encode(format!("LAME flush failed: {e:?}")))?;
    // SAFETY: as above, for the flushed tail.
    unsafe {
        out.set_len(out.len() + flushed);
    }

    Ok(out)
}

/// Sample layout for wav output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WavDepth {
    #[default]
    Int16,
    Int24,
    Float32,
}

/// Encodes a `[channels, frames]` buffer as an in-memory wav file.
pub fn encode_wav(audio: ArrayView2<f32>, sample_rate: u32, depth: WavDepth) -> Result<Vec<u8>> {
    let channels = u16::try_from(audio.nrows())
        .map_err(|_| StemError::Encode("too many channels for wav".into()))?;
    let (bits_per_sample, sample_format) = match depth {
        WavDepth::Int16 => (16, SampleFormat::Int),
        WavDepth::Int24 => (24, SampleFormat::Int),
        WavDepth::Float32 => (32, SampleFormat::Float),
    };
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format,
    };

    let encode_err = |e: hound::Error| StemError::Encode(e.to_string());

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
        for frame in audio.columns() {
            for &sample in frame {
                match depth {
                    WavDepth::Int16 => writer.write_sample(to_i16(sample)),
                    WavDepth::Int24 => {
                        let max = ((1 << 23) - 1) as f32;
                        writer.write_sample((sample.clamp(-1.0, 1.0) * max) as i32)
                    }
                    WavDepth::Float32 => writer.write_sample(sample),
                }
                .map_err(encode_err)?;
            }
        }
        writer.finalize().map_err(encode_err)?;
    }

    Ok(cursor.into_inner())
}
