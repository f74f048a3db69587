use std::sync::Arc;

use ndarray::{Array3, ArrayView2};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, Value},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    config::{Device, InferenceParams, ModelConfig},
    core::{
        chunking::{apply_segmented, SegmentParams},
        dsp::{stft_cac_stereo_centered, DEMUCS_HOP, DEMUCS_NFFT},
        resample::{fit_length, resample, to_stereo},
    },
    error::{Result, StemError},
    model::model_manager::{ensure_model, ModelHandle},
    types::{ModelManifest, Waveform},
};

/// A loaded source-separation model.
///
/// `separate` returns `[sources, channels, frames]` where `sources` matches
/// [`Separator::sources`] and `frames` matches the input.
pub trait Separator: Send + Sync {
    fn name(&self) -> &str;
    fn sources(&self) -> &[String];
    fn separate(&self, wav: &Waveform) -> Result<Array3<f32>>;
}

/// Process-wide model slot, built once at start-up and cloned into handlers.
#[derive(Clone)]
pub enum SharedModel {
    Ready(Arc<dyn Separator>),
    Unavailable(Arc<str>),
}

impl SharedModel {
    pub fn ready(separator: impl Separator + 'static) -> Self {
        SharedModel::Ready(Arc::new(separator))
    }

    pub fn get(&self) -> Result<&Arc<dyn Separator>> {
        match self {
            SharedModel::Ready(sep) => Ok(sep),
            SharedModel::Unavailable(reason) => {
                Err(StemError::ModelUnavailable(reason.to_string()))
            }
        }
    }
}

fn ort_err(e: impl std::fmt::Display) -> StemError {
    StemError::ModelUnavailable(format!("onnx runtime: {e}"))
}

const TIME_INPUT: &str = "input";
const SPEC_INPUT: &str = "x";
const TIME_OUTPUT: &str = "add_67";

/// HTDemucs exported to ONNX, run through ONNX Runtime.
pub struct OrtSeparator {
    session: Mutex<Session>,
    manifest: ModelManifest,
    params: InferenceParams,
}

impl OrtSeparator {
    pub fn load(handle: &ModelHandle, device: Device, params: InferenceParams) -> Result<Self> {
        let mf = &handle.manifest;
        if mf.stems.is_empty() {
            return Err(StemError::Manifest(format!("model `{}` declares no stems", mf.name)));
        }
        if mf.window == 0 || mf.sample_rate == 0 {
            return Err(StemError::Manifest(format!(
                "model `{}` has window {} at {} Hz",
                mf.name, mf.window, mf.sample_rate
            )));
        }

        let builder = Session::builder()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?;
        let builder = match device {
            Device::Cpu => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .map_err(ort_err)?,
            // CUDA registration falls back to CPU when the runtime lacks it.
            Device::Auto | Device::Cuda => builder
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(ort_err)?,
        };
        let session = builder
            .commit_from_file(&handle.local_path)
            .map_err(|e| {
                StemError::ModelUnavailable(format!(
                    "cannot open {}: {e}",
                    handle.local_path.display()
                ))
            })?;

        info!(
            model = %mf.name,
            version = %mf.version,
            device = ?device,
            stems = ?mf.stems,
            path = %handle.local_path.display(),
            "separation model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            manifest: mf.clone(),
            params,
        })
    }

    /// One fixed-size model window: `[2, T]` in, `[sources, 2, T]` out.
    fn run_window(&self, window: ArrayView2<f32>) -> Result<Array3<f32>> {
        let t = window.ncols();
        let left: Vec<f32> = window.row(0).to_vec();
        let right: Vec<f32> = window.row(1).to_vec();

        let mut planar = Vec::with_capacity(2 * t);
        planar.extend_from_slice(&left);
        planar.extend_from_slice(&right);
        let time_value: Value = Tensor::from_array((vec![1usize, 2, t], planar))?.into_dyn();

        let (spec_cac, f_bins, frames) =
            stft_cac_stereo_centered(&left, &right, DEMUCS_NFFT, DEMUCS_HOP);
        let spec_value: Value =
            Tensor::from_array((vec![1usize, 4, f_bins, frames], spec_cac))?.into_dyn();

        let mut session = self.session.lock();
        let takes_spec = session.inputs.iter().any(|i| i.name == SPEC_INPUT);
        let outputs = if takes_spec {
            session.run(vec![(TIME_INPUT, time_value), (SPEC_INPUT, spec_value)])?
        } else {
            session.run(vec![(TIME_INPUT, time_value)])?
        };

        let value = outputs
            .iter()
            .find(|(name, _)| *name == TIME_OUTPUT)
            .or_else(|| outputs.iter().next())
            .map(|(_, v)| v)
            .ok_or_else(|| StemError::Inference("model returned no outputs".into()))?;

        let (_shape, data) = value.try_extract_tensor::<f32>()?;
        let sources = self.manifest.stems.len();
        let expected = sources * 2 * t;
        if data.len() != expected {
            return Err(StemError::Inference(format!(
                "model output has {} values, expected {} ([1, {}, 2, {}])",
                data.len(),
                expected,
                sources,
                t
            )));
        }

        Ok(Array3::from_shape_vec((sources, 2, t), data.to_vec())?)
    }
}

impl Separator for OrtSeparator {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn sources(&self) -> &[String] {
        &self.manifest.stems
    }

    fn separate(&self, wav: &Waveform) -> Result<Array3<f32>> {
        let frames = wav.frames();
        let model_rate = self.manifest.sample_rate;

        let stereo = to_stereo(wav.samples.view());
        let mix = resample(stereo.view(), wav.sample_rate, model_rate)?;

        let params = SegmentParams {
            segment: self.manifest.window,
            overlap: self.params.overlap,
            shifts: self.params.shifts,
            max_shift: (model_rate / 2) as usize,
        };
        debug!(
            frames = mix.ncols(),
            segment = params.segment,
            stride = params.stride(),
            shifts = params.shifts,
            "running segmented inference"
        );

        let separated = apply_segmented(mix.view(), self.sources().len(), &params, |window| {
            self.run_window(window)
        })?;

        if model_rate == wav.sample_rate && separated.shape()[2] == frames {
            return Ok(separated);
        }

        let mut out = Array3::<f32>::zeros((separated.shape()[0], 2, frames));
        for (i, stem) in separated.outer_iter().enumerate() {
            let back = resample(stem, model_rate, wav.sample_rate)?;
            out.index_axis_mut(ndarray::Axis(0), i)
                .assign(&fit_length(back, frames));
        }
        Ok(out)
    }
}

/// Resolves, downloads if needed, and opens the configured model.
pub fn load_model(cfg: &ModelConfig, params: InferenceParams) -> Result<OrtSeparator> {
    let handle = ensure_model(&cfg.name, cfg.manifest_url_override.as_deref())?;
    OrtSeparator::load(&handle, cfg.device, params)
}
