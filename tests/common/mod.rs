#![allow(dead_code)]

use std::{
    f32::consts::PI,
    io::Cursor,
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
};

use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::{Array3, Axis};
use stem_splitter_web::{error::Result, types::Waveform, Separator};

/// 16-bit PCM wav holding a 440 Hz sine.
pub fn sine_wav(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = (sample_rate as f32 * seconds) as usize;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let v = (2.0 * PI * 440.0 * t).sin() * 0.5;
            for _ in 0..channels {
                writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Splits the input into four equal quarters and counts how often it ran.
pub struct MockSeparator {
    sources: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl MockSeparator {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let sep = Self {
            sources: ["vocals", "drums", "bass", "other"]
                .into_iter()
                .map(String::from)
                .collect(),
            calls: calls.clone(),
        };
        (sep, calls)
    }
}

impl Separator for MockSeparator {
    fn name(&self) -> &str {
        "mock"
    }

    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn separate(&self, wav: &Waveform) -> Result<Array3<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let quarter = wav.samples.mapv(|v| v * 0.25);
        let views = vec![quarter.view(); self.sources.len()];
        Ok(ndarray::stack(Axis(0), &views).unwrap())
    }
}
