//! Soft-knee dynamic range compression for 16-bit little-endian PCM.
//!
//! The same curve runs on both paths: the capture path boosts the microphone
//! signal before compressing it, the playback path compresses first and then
//! scales by the user volume so loudness tracks the volume linearly.

use crate::error::{PipelineError, Result};

/// Which side of the pipeline a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanderMode {
    /// Pre-gain, then compress.
    Capture,
    /// Compress, then apply `volume_scale`.
    Playback,
}

/// Curve parameters. Values are in i16 sample units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompanderParams {
    pub threshold: f32,
    pub ratio: f32,
    pub knee: f32,
    /// Only used in capture mode.
    pub gain: f32,
    /// Only used in playback mode.
    pub volume_scale: f32,
}

impl CompanderParams {
    /// Microphone preset: lower threshold, gentler ratio, wider knee.
    pub const CAPTURE: Self = Self {
        threshold: 8192.0,
        ratio: 2.0,
        knee: 4096.0,
        gain: 2.0,
        volume_scale: 1.0,
    };

    /// Speaker preset for the given volume (clamped to 0..=100).
    pub fn playback(volume: i32) -> Self {
        Self {
            threshold: 16384.0,
            ratio: 4.0,
            knee: 2048.0,
            gain: 1.0,
            volume_scale: volume.clamp(0, 100) as f32 / 100.0,
        }
    }

    /// Lower edge of the knee band.
    pub fn knee_start(&self) -> f32 {
        self.threshold - self.knee
    }
}

/// Compand every sample of `buffer` in place.
///
/// The buffer must hold whole samples; an odd length is rejected before any
/// byte is touched.
pub fn process(buffer: &mut [u8], params: &CompanderParams, mode: CompanderMode) -> Result<()> {
    if buffer.len() % 2 != 0 {
        return Err(PipelineError::anomaly(format!(
            "odd PCM buffer length {}",
            buffer.len()
        )));
    }

    for pair in buffer.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        let shaped = compand_sample(sample, params, mode);
        pair.copy_from_slice(&shaped.to_le_bytes());
    }
    Ok(())
}

/// Compand a single sample. Float to integer conversion truncates toward zero.
pub fn compand_sample(sample: i16, params: &CompanderParams, mode: CompanderMode) -> i16 {
    let mut value = sample as f32;
    if mode == CompanderMode::Capture {
        value *= params.gain;
    }

    let magnitude = shape_magnitude(value.abs(), params);
    let mut shaped = magnitude.copysign(value);

    if mode == CompanderMode::Playback {
        shaped *= params.volume_scale;
    }

    // `as` saturates, the explicit clamp keeps the bounds visible.
    shaped.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn shape_magnitude(magnitude: f32, params: &CompanderParams) -> f32 {
    if magnitude > params.threshold {
        let excess = magnitude - params.threshold;
        let reduction = excess - excess / params.ratio;
        magnitude - reduction
    } else if magnitude > params.knee_start() {
        let excess = magnitude - params.knee_start();
        let reduction = excess * excess / (2.0 * params.knee) / params.ratio;
        magnitude - reduction
    } else {
        magnitude
    }
}
