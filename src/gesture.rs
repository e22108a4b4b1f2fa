//! Touch gestures from the control surface and the record zone they hit.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Latest touch state of the input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gesture {
    pub x: i32,
    pub y: i32,
    pub pressed: bool,
}

impl Gesture {
    pub fn press(x: i32, y: i32) -> Self {
        Self { x, y, pressed: true }
    }

    pub fn release() -> Self {
        Self::default()
    }
}

/// Half-open rectangle `[x, x + width) × [y, y + height)` that starts a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordZone {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for RecordZone {
    // Bottom-left button of a 320x280 touch surface.
    fn default() -> Self {
        Self {
            x: 0,
            y: 241,
            width: 109,
            height: 39,
        }
    }
}

impl RecordZone {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        // Widened so zones near i32::MAX cannot overflow.
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        x >= left
            && x < left + i64::from(self.width)
            && y >= top
            && y < top + i64::from(self.height)
    }

    /// A press that lands inside the zone.
    pub fn is_hit(&self, gesture: &Gesture) -> bool {
        gesture.pressed && self.contains(gesture.x, gesture.y)
    }
}

/// Where the pipeline reads gestures from, once per iteration.
pub trait GestureSource {
    fn current_gesture(&mut self) -> Gesture;
}

impl GestureSource for watch::Receiver<Gesture> {
    fn current_gesture(&mut self) -> Gesture {
        *self.borrow_and_update()
    }
}
