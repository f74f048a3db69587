use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Decoded audio, channel-major: `samples` has shape `[channels, frames]`.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub file: String,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Model description published next to the model weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub version: String,
    pub backend: String,
    pub sample_rate: u32,
    pub window: usize,
    pub hop: usize,
    pub stems: Vec<String>,
    #[serde(default)]
    pub input_layout: String,
    #[serde(default)]
    pub output_layout: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl ModelManifest {
    /// First artifact with a usable url and checksum.
    pub fn resolve_primary_artifact(&self) -> std::result::Result<&Artifact, String> {
        let a = self
            .artifacts
            .first()
            .ok_or_else(|| format!("manifest `{}` lists no artifacts", self.name))?;
        if a.url.is_empty() {
            return Err(format!("artifact `{}` has no url", a.file));
        }
        if a.sha256.len() < 8 {
            return Err(format!("artifact `{}` has no usable sha256", a.file));
        }
        Ok(a)
    }
}
