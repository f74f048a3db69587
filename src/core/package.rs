use axum::body::Bytes;
use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::{
    core::audio::{encode_mp3, encode_wav, WavDepth},
    error::{Result, StemError},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Mp3 { bitrate: u32 },
    Wav { depth: WavDepth },
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 { .. } => "mp3",
            OutputFormat::Wav { .. } => "wav",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 { .. } => "audio/mpeg",
            OutputFormat::Wav { .. } => "audio/wav",
        }
    }
}

/// How samples outside `[-1, 1]` are handled before encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipMode {
    /// Scale the whole stem down when it peaks above full scale.
    #[default]
    Rescale,
    /// Hard-limit every sample to +-0.99.
    Clamp,
}

impl std::str::FromStr for ClipMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rescale" => Ok(ClipMode::Rescale),
            "clamp" => Ok(ClipMode::Clamp),
            other => Err(format!("unknown clip mode `{other}` (expected rescale or clamp)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageOptions {
    pub format: OutputFormat,
    pub clip: ClipMode,
    /// Emit only `<stem>` and `no_<stem>` instead of every source.
    pub two_stems: Option<String>,
}

/// One encoded stem, ready to stream.
#[derive(Clone, Debug)]
pub struct PackagedStem {
    pub name: String,
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Bytes,
    pub frames: usize,
    pub sample_rate: u32,
}

pub fn apply_clip(audio: &mut Array2<f32>, mode: ClipMode) {
    match mode {
        ClipMode::Rescale => {
            let peak = audio.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let scale = (1.01 * peak).max(1.0);
            if scale > 1.0 {
                audio.mapv_inplace(|v| v / scale);
            }
        }
        ClipMode::Clamp => audio.mapv_inplace(|v| v.clamp(-0.99, 0.99)),
    }
}

/// Encodes a single stem into an in-memory container named `<name>.<ext>`.
pub fn package_stem(
    name: &str,
    audio: ArrayView2<f32>,
    sample_rate: u32,
    opts: &PackageOptions,
) -> Result<PackagedStem> {
    let mut audio = audio.to_owned();
    apply_clip(&mut audio, opts.clip);

    let encoded = match opts.format {
        OutputFormat::Mp3 { bitrate } => encode_mp3(audio.view(), sample_rate, bitrate)?,
        OutputFormat::Wav { depth } => encode_wav(audio.view(), sample_rate, depth)?,
    };

    Ok(PackagedStem {
        name: name.to_string(),
        file_name: format!("{name}.{}", opts.format.extension()),
        mime: opts.format.mime(),
        bytes: Bytes::from(encoded),
        frames: audio.ncols(),
        sample_rate,
    })
}

/// Packages every source of a `[sources, channels, frames]` separation.
///
/// In two-stem mode the named source is kept and every other source is
/// summed into `no_<name>`.
pub fn package_stems(
    separated: &Array3<f32>,
    names: &[String],
    sample_rate: u32,
    opts: &PackageOptions,
) -> Result<Vec<PackagedStem>> {
    if separated.len_of(Axis(0)) != names.len() {
        return Err(StemError::Inference(format!(
            "model produced {} sources but declares {}",
            separated.len_of(Axis(0)),
            names.len()
        )));
    }

    let Some(keep) = opts.two_stems.as_deref() else {
        return names
            .iter()
            .zip(separated.outer_iter())
            .map(|(name, stem)| package_stem(name, stem, sample_rate, opts))
            .collect();
    };

    let idx = names.iter().position(|n| n == keep).ok_or_else(|| {
        StemError::Config(format!(
            "two-stem mode asks for `{keep}` but the model only has {names:?}"
        ))
    })?;

    let kept = separated.index_axis(Axis(0), idx);
    let mut rest = Array2::<f32>::zeros(kept.raw_dim());
    for (i, stem) in separated.outer_iter().enumerate() {
        if i != idx {
            rest += &stem;
        }
    }

    Ok(vec![
        package_stem(keep, kept, sample_rate, opts)?,
        package_stem(&format!("no_{keep}"), rest.view(), sample_rate, opts)?,
    ])
}
