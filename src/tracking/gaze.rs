use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::hand::cooled_down;
use super::{Landmark, PointerAction, Viewport};

/// FaceMesh iris centres, present only with landmark refinement enabled.
pub const RIGHT_IRIS: usize = 468;
pub const LEFT_IRIS: usize = 473;

/// Number of raw gaze samples averaged into the cursor position.
pub const GAZE_SMOOTHING_WINDOW: usize = 8;
/// Fraction of the viewport height at the top and bottom that triggers scrolling.
pub const EDGE_ZONE: f64 = 0.10;
pub const EDGE_SCROLL_STEP: i32 = 100;
pub const EDGE_SCROLL_COOLDOWN: Duration = Duration::from_millis(500);

// Iris y only spans roughly the middle half of the frame.
const IRIS_Y_OFFSET: f64 = 0.25;
const IRIS_Y_SPAN: f64 = 0.5;

#[derive(Debug, Default)]
pub struct GazeTracker {
    history: VecDeque<(f64, f64)>,
    last_scroll_at: Option<Instant>,
}

impl GazeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_scroll_at = None;
    }

    fn smooth(&mut self, x: f64, y: f64) -> (f64, f64) {
        self.history.push_back((x, y));
        if self.history.len() > GAZE_SMOOTHING_WINDOW {
            self.history.pop_front();
        }
        let n = self.history.len() as f64;
        let (sx, sy) = self
            .history
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (px, py)| (ax + px, ay + py));
        (sx / n, sy / n)
    }

    pub fn process_frame(
        &mut self,
        landmarks: &[Landmark],
        viewport: Viewport,
        now: Instant,
    ) -> Vec<PointerAction> {
        let (Some(left), Some(right)) = (landmarks.get(LEFT_IRIS), landmarks.get(RIGHT_IRIS))
        else {
            return Vec::new();
        };

        let iris_x = (left.x + right.x) / 2.0;
        let iris_y = (left.y + right.y) / 2.0;

        let raw_x = (1.0 - iris_x) * viewport.width;
        let raw_y = ((iris_y - IRIS_Y_OFFSET) / IRIS_Y_SPAN * viewport.height)
            .clamp(0.0, viewport.height.max(0.0));
        let (x, y) = self.smooth(raw_x, raw_y);

        let mut actions = vec![PointerAction::MoveCursor { x, y }];

        if cooled_down(self.last_scroll_at, now, EDGE_SCROLL_COOLDOWN) {
            let pixels = if y < viewport.height * EDGE_ZONE {
                Some(-EDGE_SCROLL_STEP)
            } else if y > viewport.height * (1.0 - EDGE_ZONE) {
                Some(EDGE_SCROLL_STEP)
            } else {
                None
            };
            if let Some(pixels) = pixels {
                self.last_scroll_at = Some(now);
                actions.push(PointerAction::ScrollBy { pixels });
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_window() {
        let mut tracker = GazeTracker::new();
        for i in 0..10 {
            tracker.smooth(i as f64, 0.0);
        }
        // Window now holds 3..=10.
        let (x, _) = tracker.smooth(10.0, 0.0);
        assert_eq!(tracker.history.len(), GAZE_SMOOTHING_WINDOW);
        assert!((x - 6.5).abs() < 1e-9);
    }
}
