//! # stem-splitter-web
//!
//! A small web front-end for stem separation: upload an mp3 or wav file,
//! run it through a pretrained separation model, download the stems.

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod server;
pub mod store;
pub mod types;

pub use crate::{
    config::{Device, InferenceParams, ModelConfig, ServerConfig},
    core::{
        audio::{limit_duration, load_audio, WavDepth},
        engine::{OrtSeparator, Separator, SharedModel},
        package::{ClipMode, OutputFormat, PackageOptions, PackagedStem},
        pipeline::{Pipeline, PipelineOptions, SeparationOutput, Upload},
    },
    error::{ErrorKind, Result, StemError},
    io::progress::set_download_progress_callback,
    model::model_manager::{ensure_model, ModelHandle},
    server::{run_server, AppState},
    store::StemStore,
    types::{ModelManifest, Waveform},
};
