//! The cooperative loop tying the transport, the gesture source and the audio
//! device together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::alsa_device::{AudioDevice, DeviceMode};
use crate::audio::compander::{self, CompanderMode, CompanderParams};
use crate::audio::frame::AudioFrame;
use crate::audio::VolumeControl;
use crate::config::Config;
use crate::controller::{RecordPlaybackController, SessionReport};
use crate::error::Result;
use crate::gesture::{GestureSource, RecordZone};
use crate::net_link::{ConnectionState, TransportEvent, TransportLink};
use crate::protocol::{LinkStatus, StatusUpdate};

/// What happened during one `tick`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub events: usize,
    pub played: usize,
    pub dropped: usize,
    pub session: Option<SessionReport>,
    pub link_lost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The shutdown flag was cleared.
    Shutdown,
    /// The link reported `Disconnected`; a new transport is needed.
    LinkLost,
}

pub struct StreamOrchestrator<T, D, G> {
    transport: T,
    device: D,
    gestures: G,
    controller: RecordPlaybackController,
    volume: VolumeControl,
    zone: RecordZone,
    connection: ConnectionState,
    tick_interval: Duration,
    status: Option<mpsc::Sender<StatusUpdate>>,
}

impl<T, D, G> StreamOrchestrator<T, D, G>
where
    T: TransportLink,
    D: AudioDevice,
    G: GestureSource,
{
    /// The device is expected to be in playback mode already.
    pub fn new(
        config: &Config,
        transport: T,
        device: D,
        gestures: G,
        volume: VolumeControl,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            device,
            gestures,
            controller: RecordPlaybackController::from_settings(&config.audio)?,
            volume,
            zone: config.panel.record_zone,
            connection: ConnectionState::Disconnected,
            tick_interval: config.pipeline.tick(),
            status: None,
        })
    }

    /// Push connection and recording state to a status consumer.
    pub fn with_status(mut self, status: mpsc::Sender<StatusUpdate>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn replace_transport(&mut self, transport: T) {
        self.transport = transport;
        self.connection = ConnectionState::Disconnected;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn controller(&self) -> &RecordPlaybackController {
        &self.controller
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Loop until `running` is cleared or the link drops.
    pub fn run(&mut self, running: &AtomicBool) -> RunExit {
        log::info!("Stream orchestrator started");
        while running.load(Ordering::Relaxed) {
            let report = self.tick();
            if report.link_lost {
                return RunExit::LinkLost;
            }
            std::thread::sleep(self.tick_interval);
        }
        log::info!("Stream orchestrator stopped");
        RunExit::Shutdown
    }

    /// One iteration: drain transport events, read the gesture, play inbound
    /// audio, and run a recording session if the record zone is pressed.
    /// No session starts in a tick that lost the link.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let events = self.transport.poll();
        let gesture = self.gestures.current_gesture();
        report.events = events.len();

        for event in events {
            match event {
                TransportEvent::Connected => {
                    log::info!("WebSocket Connected");
                    self.connection = ConnectionState::Connected;
                    self.notify(StatusUpdate::state(LinkStatus::Connected));
                }
                TransportEvent::Disconnected => {
                    log::warn!("WebSocket Disconnected");
                    self.connection = ConnectionState::Disconnected;
                    report.link_lost = true;
                    self.notify(StatusUpdate::state(LinkStatus::Disconnected));
                }
                TransportEvent::MessageReceived(payload) => match self.play(payload) {
                    Ok(written) => {
                        log::debug!("Played {} bytes", written);
                        report.played += 1;
                    }
                    Err(e) => {
                        log::warn!("Dropped inbound audio: {}", e);
                        report.dropped += 1;
                    }
                },
                TransportEvent::Error(detail) => {
                    log::error!("Transport error: {}", detail);
                }
            }
        }

        if report.link_lost {
            if self.zone.is_hit(&gesture) {
                log::info!("Link lost, ignoring press in record zone");
            }
        } else if self.controller.is_idle() && self.zone.is_hit(&gesture) {
            self.notify(StatusUpdate::state(LinkStatus::Recording));
            match self
                .controller
                .run_session(&mut self.device, &mut self.gestures, &mut self.transport)
            {
                Ok(session) => {
                    log::info!(
                        "Recording session ended ({:?}): {} chunks, {} bytes sent",
                        session.stop_reason,
                        session.chunks,
                        session.bytes_sent
                    );
                    report.session = Some(session);
                }
                Err(e) => log::error!("Recording session aborted: {}", e),
            }
            self.notify(StatusUpdate::state(LinkStatus::Idle));
        }

        report
    }

    // The frame is dropped on every return path, including validation failures.
    fn play(&mut self, payload: Vec<u8>) -> Result<usize> {
        let mut frame = AudioFrame::from_payload(payload)?;
        let before = log::log_enabled!(log::Level::Debug).then(|| frame.stats());

        let params = CompanderParams::playback(i32::from(self.volume.get()));
        compander::process(frame.as_mut_bytes(), &params, CompanderMode::Playback)?;

        if let Some(before) = before {
            log::debug!(
                "Playback chunk {} bytes ({} samples): before [{}], after [{}]",
                frame.len(),
                frame.sample_count(),
                before,
                frame.stats()
            );
        }

        match self.device.write(frame.as_bytes()) {
            Ok(written) => {
                if written < frame.len() {
                    log::warn!("Short playback write: {} of {} bytes", written, frame.len());
                }
                Ok(written)
            }
            Err(e) => {
                // The same PCM may keep failing, reopen it from scratch.
                self.device.reset();
                if let Err(e2) = self.device.configure(DeviceMode::Playback) {
                    log::error!("Failed to restore playback configuration: {}", e2);
                }
                Err(e)
            }
        }
    }

    fn notify(&self, update: StatusUpdate) {
        if let Some(status) = &self.status {
            if let Err(e) = status.try_send(update) {
                log::debug!("Status update dropped: {}", e);
            }
        }
    }
}
