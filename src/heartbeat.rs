//! Ping/pong liveness bookkeeping for the WebSocket session.
//!
//! Pure state driven by the caller's clock so the session task and the tests
//! share the same logic.

use std::time::{Duration, Instant};

use crate::config::HeartbeatSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing to do on this tick.
    Idle,
    /// Send a probe now.
    SendProbe,
    /// The miss threshold was just reached. Reported once.
    Expired,
}

#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    threshold: u32,
    next_probe: Instant,
    outstanding: Option<Instant>,
    missed: u32,
    expired: bool,
}

impl Heartbeat {
    /// First probe goes out one `interval` after `now`.
    pub fn new(settings: &HeartbeatSettings, now: Instant) -> Self {
        Self {
            interval: settings.interval(),
            timeout: settings.timeout(),
            threshold: settings.disconnect_threshold.max(1),
            next_probe: now + settings.interval(),
            outstanding: None,
            missed: 0,
            expired: false,
        }
    }

    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if self.expired {
            return HeartbeatAction::Idle;
        }

        if let Some(sent_at) = self.outstanding {
            if now.duration_since(sent_at) < self.timeout {
                return HeartbeatAction::Idle;
            }
            self.outstanding = None;
            self.missed += 1;
            log::warn!("Heartbeat probe missed ({}/{})", self.missed, self.threshold);
            if self.missed >= self.threshold {
                self.expired = true;
                return HeartbeatAction::Expired;
            }
        }

        if now >= self.next_probe {
            self.outstanding = Some(now);
            self.next_probe = now + self.interval;
            return HeartbeatAction::SendProbe;
        }
        HeartbeatAction::Idle
    }

    /// Any pong counts as a response and clears the miss streak.
    pub fn on_response(&mut self) {
        self.outstanding = None;
        self.missed = 0;
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }
}
