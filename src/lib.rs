//! Half-duplex voice link: push-to-talk capture and volume-shaped playback
//! over a single WebSocket connection.

pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod gesture;
pub mod heartbeat;
pub mod net_link;
pub mod orchestrator;
pub mod panel_bridge;
pub mod protocol;

pub use error::{PipelineError, Result};
