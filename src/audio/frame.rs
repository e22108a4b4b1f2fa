//! Owned PCM frames received from the peer.

use std::fmt;

use crate::error::{PipelineError, Result};

/// Bytes per mono S16LE sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// A validated block of little-endian i16 mono samples.
///
/// Owns its bytes; dropping the frame releases them, whichever path the
/// caller leaves by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    bytes: Vec<u8>,
}

impl AudioFrame {
    /// Take ownership of an inbound payload, rejecting empty or odd lengths.
    pub fn from_payload(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(PipelineError::anomaly("zero-length audio payload"));
        }
        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            return Err(PipelineError::anomaly(format!(
                "audio payload of {} bytes is not sample aligned",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats::measure(&self.bytes)
    }
}

/// Copy a borrowed payload into a buffer we own.
///
/// Uses a fallible reservation so that an oversized message is reported as
/// [`PipelineError::AllocationFailure`] instead of aborting the process.
pub fn try_copy_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(payload.len())
        .map_err(|_| PipelineError::AllocationFailure {
            requested: payload.len(),
        })?;
    owned.extend_from_slice(payload);
    Ok(owned)
}

/// Peak and RMS summary of a PCM block, logged around playback shaping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub min: i16,
    pub max: i16,
    pub rms: f32,
}

impl FrameStats {
    pub fn measure(bytes: &[u8]) -> Self {
        let mut min = i16::MAX;
        let mut max = i16::MIN;
        let mut sum_sq = 0.0f64;
        let mut count = 0usize;

        for pair in bytes.chunks_exact(BYTES_PER_SAMPLE) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            min = min.min(sample);
            max = max.max(sample);
            sum_sq += f64::from(sample) * f64::from(sample);
            count += 1;
        }

        if count == 0 {
            return Self { min: 0, max: 0, rms: 0.0 };
        }
        Self {
            min,
            max,
            rms: (sum_sq / count as f64).sqrt() as f32,
        }
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "min={}, max={}, rms={:.1}", self.min, self.max, self.rms)
    }
}
