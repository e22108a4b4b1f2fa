//! ALSA-backed audio device that is either a microphone or a speaker, never both.

use std::time::{Duration, Instant};

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};

use super::frame::BYTES_PER_SAMPLE;
use crate::config::AudioSettings;
use crate::error::{PipelineError, Result};

/// Consecutive failed writes tolerated before the rest of a frame is dropped.
const MAX_RECOVERY_RETRIES: u32 = 3;

/// The two mutually exclusive configurations of the audio hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Capture,
    Playback,
}

/// Half-duplex audio hardware.
///
/// `configure` is expensive and is only called at session boundaries.
/// `read_chunk` requires capture mode, `write` requires playback mode.
pub trait AudioDevice {
    fn configure(&mut self, mode: DeviceMode) -> Result<()>;

    fn mode(&self) -> Option<DeviceMode>;

    /// Fill `chunk` completely or fail once `timeout` has elapsed.
    fn read_chunk(&mut self, chunk: &mut [u8], timeout: Duration) -> Result<()>;

    /// Play `frame`, blocking until it has been accepted or the device's write
    /// deadline passes. Returns the number of bytes accepted.
    fn write(&mut self, frame: &[u8]) -> Result<usize>;

    /// Discard the current configuration without draining it. The next
    /// `configure` reopens the hardware even for the same mode.
    fn reset(&mut self);
}

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Period size in frames
    pub period_size: usize,
}

struct OpenPcm {
    pcm: PCM,
    mode: DeviceMode,
}

pub struct AlsaDevice {
    device: String,
    sample_rate: u32,
    write_timeout: Option<Duration>,
    open: Option<OpenPcm>,
}

impl AlsaDevice {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            device: settings.device.clone(),
            sample_rate: settings.sample_rate,
            write_timeout: settings.write_timeout(),
            open: None,
        }
    }

    fn open_in(&self, mode: DeviceMode) -> Result<&OpenPcm> {
        match &self.open {
            Some(open) if open.mode == mode => Ok(open),
            Some(open) => Err(PipelineError::device(format!(
                "device is configured for {:?}, {:?} requested",
                open.mode, mode
            ))),
            None => Err(PipelineError::device("device is not configured")),
        }
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            if open.mode == DeviceMode::Playback {
                // Let queued samples finish instead of cutting off the tail.
                if let Err(e) = open.pcm.drain() {
                    log::warn!("ALSA playback drain failed: {}", e);
                }
            }
        }
    }
}

impl AudioDevice for AlsaDevice {
    fn configure(&mut self, mode: DeviceMode) -> Result<()> {
        if self.mode() == Some(mode) {
            return Ok(());
        }
        self.close();

        let direction = match mode {
            DeviceMode::Capture => Direction::Capture,
            DeviceMode::Playback => Direction::Playback,
        };
        let (pcm, params) = open_pcm(&self.device, direction, self.sample_rate)
            .map_err(|e| PipelineError::device(format!("{:?} open failed: {}", mode, e)))?;

        if mode == DeviceMode::Capture {
            pcm.start()
                .map_err(|e| PipelineError::device(format!("capture start failed: {}", e)))?;
        }

        log::info!(
            "ALSA {:?}: device={}, rate={}, period_size={}",
            mode,
            self.device,
            params.sample_rate,
            params.period_size,
        );
        self.open = Some(OpenPcm { pcm, mode });
        Ok(())
    }

    fn mode(&self) -> Option<DeviceMode> {
        self.open.as_ref().map(|open| open.mode)
    }

    fn read_chunk(&mut self, chunk: &mut [u8], timeout: Duration) -> Result<()> {
        let open = self.open_in(DeviceMode::Capture)?;
        let pcm = &open.pcm;
        let io = pcm.io_bytes();
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < chunk.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PipelineError::device("capture read timed out"));
            }
            let ready = pcm
                .wait(Some(remaining.as_millis().max(1) as u32))
                .map_err(|e| PipelineError::device(format!("capture wait failed: {}", e)))?;
            if !ready {
                return Err(PipelineError::device("capture read timed out"));
            }

            let wanted = (chunk.len() - filled) / BYTES_PER_SAMPLE;
            let available = pcm.avail_update().map(|n| n.max(0) as usize).unwrap_or(wanted);
            let frames = wanted.min(available.max(1));
            let end = filled + frames * BYTES_PER_SAMPLE;

            match io.readi(&mut chunk[filled..end]) {
                Ok(n) => filled += n * BYTES_PER_SAMPLE,
                Err(e) => {
                    log::warn!("ALSA capture error: {}, recovering...", e);
                    if let Err(e2) = pcm.prepare().and_then(|_| pcm.start()) {
                        log::error!("Failed to recover PCM capture: {}", e2);
                    }
                    return Err(PipelineError::device(format!("capture read failed: {}", e)));
                }
            }
        }
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<usize> {
        let open = self.open_in(DeviceMode::Playback)?;
        let pcm = &open.pcm;
        let io = pcm.io_bytes();
        let deadline = self.write_timeout.map(|t| Instant::now() + t);
        let total_frames = frame.len() / BYTES_PER_SAMPLE;
        let mut frames_written = 0;
        let mut retry_count = 0u32;

        while frames_written < total_frames {
            let wait_ms = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        log::warn!(
                            "Playback write deadline reached, dropping {} frames",
                            total_frames - frames_written
                        );
                        break;
                    }
                    Some(remaining.as_millis().max(1) as u32)
                }
                None => None,
            };
            match pcm.wait(wait_ms) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    return Err(PipelineError::device(format!("playback wait failed: {}", e)));
                }
            }

            let wanted = total_frames - frames_written;
            let available = pcm.avail_update().map(|n| n.max(0) as usize).unwrap_or(wanted);
            let frames = wanted.min(available.max(1));
            let start = frames_written * BYTES_PER_SAMPLE;
            let end = start + frames * BYTES_PER_SAMPLE;

            match io.writei(&frame[start..end]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;

                    if let Err(e2) = pcm.prepare() {
                        return Err(PipelineError::device(format!(
                            "playback recovery failed: {}",
                            e2
                        )));
                    }
                    if retry_count >= MAX_RECOVERY_RETRIES {
                        return Err(PipelineError::device(format!(
                            "playback failed after {} retries, {} frames unwritten: {}",
                            retry_count,
                            total_frames - frames_written,
                            e
                        )));
                    }
                }
            }
        }

        Ok(frames_written * BYTES_PER_SAMPLE)
    }

    fn reset(&mut self) {
        // A PCM that failed recovery may not drain, drop it as is.
        if let Some(open) = self.open.take() {
            log::warn!("Discarding {:?} PCM on {}", open.mode, self.device);
        }
    }
}

impl Drop for AlsaDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
) -> std::result::Result<(PCM, AlsaParams), alsa::Error> {
    let pcm = PCM::new(device, direction, false)?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(1)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let params = {
        let hwp = pcm.hw_params_current()?;
        AlsaParams {
            sample_rate: hwp.get_rate()?,
            period_size: hwp.get_period_size()? as usize,
        }
    };
    if params.sample_rate != sample_rate {
        log::warn!(
            "ALSA negotiated {} Hz instead of {} Hz; the peer expects {} Hz",
            params.sample_rate,
            sample_rate,
            sample_rate
        );
    }

    Ok((pcm, params))
}
