use std::{net::SocketAddr, time::Duration};

use crate::core::package::{ClipMode, OutputFormat, PackageOptions};

/// Upload size ceiling applied to the multipart body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Compute device the model session is created for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    /// Accelerator when one is present, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device `{other}` (expected auto, cpu or cuda)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub name: String,
    pub manifest_url_override: Option<String>,
    pub device: Device,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "htdemucs".into(),
            manifest_url_override: None,
            device: Device::Auto,
        }
    }
}

/// Knobs passed to segmented inference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceParams {
    /// Number of randomly shifted passes averaged together. 0 and 1 both
    /// mean a single, unshifted pass.
    pub shifts: usize,
    /// Fraction of each segment shared with its neighbour.
    pub overlap: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            shifts: 1,
            overlap: 0.25,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub model: ModelConfig,
    pub inference: InferenceParams,
    pub package: PackageOptions,
    pub max_duration_secs: f64,
    pub max_upload_bytes: usize,
    pub stem_ttl: Duration,
    pub secret_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            model: ModelConfig::default(),
            inference: InferenceParams::default(),
            package: PackageOptions {
                format: OutputFormat::Mp3 { bitrate: 320 },
                clip: ClipMode::Rescale,
                two_stems: None,
            },
            max_duration_secs: 170.0,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            stem_ttl: Duration::from_secs(15 * 60),
            secret_key: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::StemError;

        if !(self.max_duration_secs > 0.0) {
            return Err(StemError::Config("max duration must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.inference.overlap) {
            return Err(StemError::Config(format!(
                "overlap must be in [0, 1), got {}",
                self.inference.overlap
            )));
        }
        if let OutputFormat::Mp3 { bitrate } = self.package.format {
            if !(8..=320).contains(&bitrate) {
                return Err(StemError::Config(format!(
                    "mp3 bitrate must be between 8 and 320 kbps, got {bitrate}"
                )));
            }
        }
        if self.stem_ttl.is_zero() {
            return Err(StemError::Config("stem ttl must be non-zero".into()));
        }
        Ok(())
    }
}
