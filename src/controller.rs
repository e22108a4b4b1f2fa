//! Half-duplex arbitration of the audio device between recording and playback.

use std::time::Duration;

use crate::audio::alsa_device::{AudioDevice, DeviceMode};
use crate::audio::capture_buffer::CaptureBuffer;
use crate::audio::compander::{self, CompanderMode, CompanderParams};
use crate::config::AudioSettings;
use crate::error::{PipelineError, Result};
use crate::gesture::GestureSource;
use crate::net_link::TransportLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    /// Emitting the captured prefix. Always followed by `Idle`.
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BufferFull,
    Released,
    DeviceError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stopped(StopReason),
}

/// Summary of one Recording → Flushing → Idle cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub chunks: usize,
    /// Length of the outbound message, 0 when nothing was sent.
    pub bytes_sent: usize,
    pub stop_reason: StopReason,
    pub send_error: Option<PipelineError>,
}

/// Owns the capture buffer and the recording state machine.
///
/// A session can be driven one chunk at a time with `begin`/`step`/`flush`,
/// or to completion with `run_session`.
pub struct RecordPlaybackController {
    state: RecordingState,
    buffer: CaptureBuffer,
    read_timeout: Duration,
    params: CompanderParams,
    stop_reason: Option<StopReason>,
}

impl RecordPlaybackController {
    pub fn new(buffer: CaptureBuffer, read_timeout: Duration) -> Self {
        Self {
            state: RecordingState::Idle,
            buffer,
            read_timeout,
            params: CompanderParams::CAPTURE,
            stop_reason: None,
        }
    }

    pub fn from_settings(settings: &AudioSettings) -> Result<Self> {
        let buffer = CaptureBuffer::new(settings.chunk_size, settings.max_chunks)?;
        Ok(Self::new(buffer, settings.read_timeout()))
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RecordingState::Idle
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Idle → Recording. Switches the device to capture.
    pub fn begin(&mut self, device: &mut impl AudioDevice) -> Result<()> {
        if self.state != RecordingState::Idle {
            return Err(PipelineError::device("a recording session is already active"));
        }
        if let Err(e) = device.configure(DeviceMode::Capture) {
            log::error!("Failed to switch device to capture: {}", e);
            restore_playback(device);
            return Err(e);
        }

        self.buffer.reset();
        self.stop_reason = None;
        self.state = RecordingState::Recording;
        log::info!(
            "Recording started (capacity {} bytes, {} byte chunks)",
            self.buffer.capacity(),
            self.buffer.chunk_size()
        );
        Ok(())
    }

    /// Pull, compand and append one chunk, then decide whether to keep going.
    pub fn step(
        &mut self,
        device: &mut impl AudioDevice,
        gestures: &mut impl GestureSource,
    ) -> StepOutcome {
        if self.state != RecordingState::Recording {
            return StepOutcome::Stopped(self.stop_reason.unwrap_or(StopReason::Released));
        }

        let timeout = self.read_timeout;
        let params = self.params;
        let appended = self.buffer.append_with(|chunk| {
            device.read_chunk(chunk, timeout)?;
            compander::process(chunk, &params, CompanderMode::Capture)
        });

        let reason = match appended {
            Err(e) => {
                log::error!("Recording stopped - capture read failed: {}", e);
                Some(StopReason::DeviceError)
            }
            Ok(_) if self.buffer.is_full() => {
                log::info!("Recording stopped - Buffer full");
                Some(StopReason::BufferFull)
            }
            Ok(_) if !gestures.current_gesture().pressed => {
                log::info!("Recording stopped - Touch released");
                Some(StopReason::Released)
            }
            Ok(offset) => {
                log::debug!("Captured {} bytes", offset);
                None
            }
        };

        match reason {
            Some(reason) => {
                self.stop_reason = Some(reason);
                self.state = RecordingState::Flushing;
                StepOutcome::Stopped(reason)
            }
            None => StepOutcome::Continue,
        }
    }

    /// Flushing → Idle: send the captured prefix as one message, rewind the
    /// buffer and hand the device back to playback.
    pub fn flush(
        &mut self,
        device: &mut impl AudioDevice,
        transport: &mut impl TransportLink,
    ) -> SessionReport {
        self.state = RecordingState::Flushing;
        let stop_reason = self.stop_reason.take().unwrap_or(StopReason::Released);
        let chunks = self.buffer.chunks();
        let captured = self.buffer.filled();

        let mut bytes_sent = 0;
        let mut send_error = None;
        if !captured.is_empty() {
            match transport.send(captured) {
                Ok(()) => {
                    bytes_sent = captured.len();
                    log::info!("Sent {} bytes to server", bytes_sent);
                }
                Err(e) => {
                    log::error!("Dropping {} captured bytes: {}", captured.len(), e);
                    send_error = Some(e);
                }
            }
        }

        self.buffer.reset();
        restore_playback(device);
        self.state = RecordingState::Idle;

        SessionReport {
            chunks,
            bytes_sent,
            stop_reason,
            send_error,
        }
    }

    /// Run a whole session synchronously. Nothing else is serviced meanwhile.
    pub fn run_session(
        &mut self,
        device: &mut impl AudioDevice,
        gestures: &mut impl GestureSource,
        transport: &mut impl TransportLink,
    ) -> Result<SessionReport> {
        self.begin(device)?;
        while self.step(device, gestures) == StepOutcome::Continue {}
        Ok(self.flush(device, transport))
    }
}

fn restore_playback(device: &mut impl AudioDevice) {
    if let Err(e) = device.configure(DeviceMode::Playback) {
        log::error!("Failed to return device to playback: {}", e);
    }
}
