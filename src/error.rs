//! Error taxonomy shared by the audio pipeline.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// An inbound message buffer could not be reserved.
    AllocationFailure { requested: usize },
    /// Capture or playback device failure, including read timeouts.
    DeviceIo(String),
    /// Handshake failure, lost link, or a send attempted while disconnected.
    Connection(String),
    /// Zero-length, odd-length or otherwise malformed audio payload.
    ProtocolAnomaly(String),
    /// An append was attempted on a full capture buffer.
    CaptureOverflow { capacity: usize },
    /// Invalid configuration value.
    Config(String),
}

impl PipelineError {
    pub fn device(detail: impl fmt::Display) -> Self {
        Self::DeviceIo(detail.to_string())
    }

    pub fn connection(detail: impl fmt::Display) -> Self {
        Self::Connection(detail.to_string())
    }

    pub fn anomaly(detail: impl fmt::Display) -> Self {
        Self::ProtocolAnomaly(detail.to_string())
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure { requested } => {
                write!(f, "allocation failure: could not reserve {requested} bytes")
            }
            Self::DeviceIo(detail) => write!(f, "device I/O error: {detail}"),
            Self::Connection(detail) => write!(f, "connection error: {detail}"),
            Self::ProtocolAnomaly(detail) => write!(f, "protocol anomaly: {detail}"),
            Self::CaptureOverflow { capacity } => {
                write!(f, "capture buffer full ({capacity} bytes)")
            }
            Self::Config(detail) => write!(f, "invalid configuration: {detail}"),
        }
    }
}

impl std::error::Error for PipelineError {}

pub type Result<T> = std::result::Result<T, PipelineError>;
