//! Deterministic WAV files for decode tests

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Write a 440 Hz sine wave as 16-bit PCM
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = sample_rate as u64 * duration_ms / 1000;

    for frame in 0..total_frames {
        let t = frame as f32 / sample_rate as f32;
        let value = ((2.0 * PI * 440.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
