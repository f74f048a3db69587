pub mod audio;
pub mod chunking;
pub mod dsp;
pub mod engine;
pub mod package;
pub mod pipeline;
pub mod resample;
