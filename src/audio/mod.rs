//! audio - PCM shaping, capture storage and the ALSA device
//!
//! Everything here runs on the blocking pipeline thread; the only shared
//! state is the atomic volume.

pub mod alsa_device;
pub mod capture_buffer;
pub mod compander;
pub mod frame;
mod volume;

pub use alsa_device::{AlsaDevice, AudioDevice, DeviceMode};
pub use capture_buffer::CaptureBuffer;
pub use compander::{CompanderMode, CompanderParams};
pub use frame::AudioFrame;
pub use volume::VolumeControl;
