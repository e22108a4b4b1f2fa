//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use walkie_linux_rs::audio::{AudioDevice, DeviceMode};
use walkie_linux_rs::gesture::{Gesture, GestureSource};
use walkie_linux_rs::net_link::{ConnectionState, TransportEvent, TransportLink};
use walkie_linux_rs::{PipelineError, Result};

pub fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|p| i16::from_le_bytes([p[0], p[1]]))
        .collect()
}

/// Device whose capture reads are scripted. Each `Ok(v)` fills a whole chunk
/// with sample `v`; an exhausted script keeps filling with `idle_sample`.
///
/// Like ALSA, configuring the mode it is already in keeps the open stream,
/// and a failed write leaves that stream broken until it is reopened.
pub struct ScriptedDevice {
    pub mode: Option<DeviceMode>,
    pub reads: VecDeque<Result<i16>>,
    pub idle_sample: i16,
    pub reads_done: usize,
    pub writes: Vec<Vec<u8>>,
    pub configures: Vec<DeviceMode>,
    pub fail_capture_configure: bool,
    /// Upcoming writes that fail and break the open stream.
    pub write_failures: usize,
    pub broken: bool,
    pub opens: usize,
    pub resets: usize,
}

impl ScriptedDevice {
    pub fn playback() -> Self {
        Self {
            mode: Some(DeviceMode::Playback),
            reads: VecDeque::new(),
            idle_sample: 0,
            reads_done: 0,
            writes: Vec::new(),
            configures: Vec::new(),
            fail_capture_configure: false,
            write_failures: 0,
            broken: false,
            opens: 0,
            resets: 0,
        }
    }

    pub fn with_reads(reads: impl IntoIterator<Item = Result<i16>>) -> Self {
        Self {
            reads: reads.into_iter().collect(),
            ..Self::playback()
        }
    }
}

impl AudioDevice for ScriptedDevice {
    fn configure(&mut self, mode: DeviceMode) -> Result<()> {
        self.configures.push(mode);
        if mode == DeviceMode::Capture && self.fail_capture_configure {
            return Err(PipelineError::device("no microphone"));
        }
        if self.mode == Some(mode) {
            return Ok(());
        }
        self.mode = Some(mode);
        self.opens += 1;
        self.broken = false;
        Ok(())
    }

    fn mode(&self) -> Option<DeviceMode> {
        self.mode
    }

    fn read_chunk(&mut self, chunk: &mut [u8], _timeout: Duration) -> Result<()> {
        if self.mode != Some(DeviceMode::Capture) {
            return Err(PipelineError::device("read while not capturing"));
        }
        let sample = self.reads.pop_front().unwrap_or(Ok(self.idle_sample))?;
        for pair in chunk.chunks_exact_mut(2) {
            pair.copy_from_slice(&sample.to_le_bytes());
        }
        self.reads_done += 1;
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<usize> {
        if self.mode != Some(DeviceMode::Playback) {
            return Err(PipelineError::device("write while not in playback"));
        }
        if self.write_failures > 0 {
            self.write_failures -= 1;
            self.broken = true;
        }
        if self.broken {
            return Err(PipelineError::device("speaker stalled"));
        }
        self.writes.push(frame.to_vec());
        Ok(frame.len())
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.mode = None;
    }
}

/// Replays gestures in order, then repeats the last one.
pub struct ScriptedGestures {
    script: VecDeque<Gesture>,
    last: Gesture,
    pub polls: usize,
}

impl ScriptedGestures {
    pub fn new(script: impl IntoIterator<Item = Gesture>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: Gesture::default(),
            polls: 0,
        }
    }
}

impl GestureSource for ScriptedGestures {
    fn current_gesture(&mut self) -> Gesture {
        self.polls += 1;
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.last
    }
}

/// Transport that returns scripted event batches and records sends.
pub struct MockTransport {
    pub state: ConnectionState,
    pub batches: VecDeque<Vec<TransportEvent>>,
    pub sent: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn connected() -> Self {
        Self {
            state: ConnectionState::Connected,
            batches: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            ..Self::connected()
        }
    }

    pub fn with_batches(batches: impl IntoIterator<Item = Vec<TransportEvent>>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
            ..Self::disconnected()
        }
    }
}

impl TransportLink for MockTransport {
    fn poll(&mut self) -> Vec<TransportEvent> {
        let batch = self.batches.pop_front().unwrap_or_default();
        for event in &batch {
            match event {
                TransportEvent::Connected => self.state = ConnectionState::Connected,
                TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                _ => {}
            }
        }
        batch
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(PipelineError::connection("not connected"));
        }
        self.sent.push(payload.to_vec());
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}
