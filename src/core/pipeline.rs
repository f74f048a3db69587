use std::time::Instant;

use axum::body::Bytes;
use tracing::{debug, info};

use crate::{
    core::{
        audio::{limit_duration, load_audio},
        engine::SharedModel,
        package::{package_stems, PackageOptions, PackagedStem},
    },
    error::{Result, StemError},
};

pub const ALLOWED_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// True when the name has an extension from [`ALLOWED_EXTENSIONS`].
pub fn allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduces a client supplied file name to a safe ASCII label, the way
/// werkzeug does: path separators and whitespace runs become `_`, anything
/// else outside `[A-Za-z0-9._-]` is dropped, and leading or trailing `.`/`_`
/// are trimmed.
pub fn secure_filename(file_name: &str) -> String {
    let spaced = file_name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// An upload that passed validation. Construction is the only way in.
#[derive(Clone, Debug)]
pub struct Upload {
    file_name: String,
    bytes: Bytes,
}

impl Upload {
    /// `None` for the file name means the form had no file field at all.
    pub fn new(file_name: Option<&str>, bytes: Bytes) -> Result<Self> {
        let file_name = file_name.ok_or(StemError::NoFilePart)?;
        if file_name.is_empty() {
            return Err(StemError::NoSelectedFile);
        }
        if !allowed_file(file_name) {
            let ext = file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_default();
            return Err(StemError::DisallowedExtension(ext));
        }
        Ok(Self {
            file_name: file_name.to_string(),
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sanitized file stem used to label the result page.
    pub fn track(&self) -> String {
        let safe = secure_filename(&self.file_name);
        match safe.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => safe,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub max_duration_secs: f64,
    pub package: PackageOptions,
}

#[derive(Clone, Debug)]
pub struct SeparationOutput {
    pub track: String,
    pub sample_rate: u32,
    pub frames: usize,
    pub truncated: bool,
    pub stems: Vec<PackagedStem>,
}

/// Decode, limit, separate, package. Owned by the server and shared between
/// requests.
#[derive(Clone)]
pub struct Pipeline {
    model: SharedModel,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(model: SharedModel, options: PipelineOptions) -> Self {
        Self { model, options }
    }

    pub fn run(&self, upload: &Upload) -> Result<SeparationOutput> {
        let started = Instant::now();
        let separator = self.model.get()?;

        let wav = load_audio(upload.bytes.clone(), &upload.file_name)?;
        let input_frames = wav.frames();
        let wav = limit_duration(wav, self.options.max_duration_secs);
        let frames = wav.frames();
        let truncated = frames < input_frames;
        debug!(
            file = %upload.file_name,
            sample_rate = wav.sample_rate,
            channels = wav.channels(),
            frames,
            truncated,
            "audio ready for separation"
        );

        let separated = separator.separate(&wav)?;
        let shape = separated.shape();
        if shape[0] != separator.sources().len() || shape[2] != frames {
            return Err(StemError::Inference(format!(
                "`{}` returned shape {:?} for {} sources x {} frames",
                separator.name(),
                shape,
                separator.sources().len(),
                frames
            )));
        }

        let stems = package_stems(
            &separated,
            separator.sources(),
            wav.sample_rate,
            &self.options.package,
        )?;

        info!(
            file = %upload.file_name,
            model = separator.name(),
            stems = stems.len(),
            seconds = wav.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "separation finished"
        );

        Ok(SeparationOutput {
            track: upload.track(),
            sample_rate: wav.sample_rate,
            frames,
            truncated,
            stems,
        })
    }
}
