//! Lock-free playback volume shared between the panel bridge and the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Volume in percent, always within 0..=100.
///
/// Cloning shares the same value. The pipeline reads it once per inbound
/// message; last write wins.
#[derive(Debug, Clone)]
pub struct VolumeControl {
    percent: Arc<AtomicU8>,
}

impl VolumeControl {
    pub fn new(volume: i32) -> Self {
        Self {
            percent: Arc::new(AtomicU8::new(clamp_volume(volume))),
        }
    }

    /// Store a new volume, clamped, and return the stored value.
    pub fn set(&self, volume: i32) -> u8 {
        let clamped = clamp_volume(volume);
        self.percent.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn get(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(50)
    }
}

fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(0, 100) as u8
}
