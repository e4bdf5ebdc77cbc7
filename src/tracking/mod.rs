//! Camera-driven pointer input. Both trackers take normalized MediaPipe
//! landmarks per frame and return the pointer actions the UI should perform.

pub mod gaze;
pub mod hand;

use serde::{Deserialize, Serialize};

pub use gaze::GazeTracker;
pub use hand::{Gesture, HandTracker};

/// A landmark in normalized image coordinates (0.0..=1.0 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn distance_2d(&self, other: &Landmark) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Visible window size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerAction {
    MoveCursor { x: f64, y: f64 },
    Click { x: f64, y: f64 },
    ScrollBy { pixels: i32 },
    GoBack,
}
