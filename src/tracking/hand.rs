use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{Landmark, PointerAction, Viewport};

/// Thumb tip to index tip distance, in normalized units, below which a pinch is detected.
pub const PINCH_DISTANCE_THRESHOLD: f64 = 0.08;
/// How far (normalized) a fingertip must sit above its PIP joint to count as raised.
pub const FINGER_UP_MARGIN: f64 = 0.02;
/// Pixels scrolled per point/peace gesture.
pub const HAND_SCROLL_STEP: i32 = 80;
pub const HAND_SCROLL_COOLDOWN: Duration = Duration::from_millis(400);
pub const GO_BACK_COOLDOWN: Duration = Duration::from_millis(800);

pub const HAND_LANDMARK_COUNT: usize = 21;

const THUMB_TIP: usize = 4;
const INDEX_PIP: usize = 6;
const INDEX_TIP: usize = 8;
const MIDDLE_PIP: usize = 10;
const MIDDLE_TIP: usize = 12;
const RING_PIP: usize = 14;
const RING_TIP: usize = 16;
const PINKY_PIP: usize = 18;
const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    None,
    Pinch,
    Open,
    Peace,
    Point,
}

fn finger_up(tip: &Landmark, pip: &Landmark) -> bool {
    tip.y < pip.y - FINGER_UP_MARGIN
}

/// Classifies one hand. Pinch wins over every finger pattern.
pub fn classify(landmarks: &[Landmark]) -> Gesture {
    if landmarks.len() < HAND_LANDMARK_COUNT {
        return Gesture::None;
    }
    let lm = landmarks;

    if lm[THUMB_TIP].distance_2d(&lm[INDEX_TIP]) < PINCH_DISTANCE_THRESHOLD {
        return Gesture::Pinch;
    }

    let index = finger_up(&lm[INDEX_TIP], &lm[INDEX_PIP]);
    let middle = finger_up(&lm[MIDDLE_TIP], &lm[MIDDLE_PIP]);
    let ring = finger_up(&lm[RING_TIP], &lm[RING_PIP]);
    let pinky = finger_up(&lm[PINKY_TIP], &lm[PINKY_PIP]);

    match (index, middle, ring, pinky) {
        (true, true, true, true) => Gesture::Open,
        (true, true, false, false) => Gesture::Peace,
        (true, false, false, false) => Gesture::Point,
        _ => Gesture::None,
    }
}

/// Per-hand state carried between frames.
#[derive(Debug)]
pub struct HandTracker {
    pinch_latched: bool,
    last_gesture: Gesture,
    last_scroll_at: Option<Instant>,
    last_back_at: Option<Instant>,
}

impl Default for HandTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HandTracker {
    pub fn new() -> Self {
        Self {
            pinch_latched: false,
            last_gesture: Gesture::None,
            last_scroll_at: None,
            last_back_at: None,
        }
    }

    pub fn last_gesture(&self) -> Gesture {
        self.last_gesture
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Frames without a full hand produce nothing and leave the state untouched.
    pub fn process_frame(
        &mut self,
        landmarks: &[Landmark],
        viewport: Viewport,
        now: Instant,
    ) -> Vec<PointerAction> {
        if landmarks.len() < HAND_LANDMARK_COUNT {
            return Vec::new();
        }

        let tip = landmarks[INDEX_TIP];
        let x = (1.0 - tip.x) * viewport.width;
        let y = tip.y * viewport.height;
        let mut actions = vec![PointerAction::MoveCursor { x, y }];

        let gesture = classify(landmarks);

        if gesture == Gesture::Pinch {
            if !self.pinch_latched {
                self.pinch_latched = true;
                actions.push(PointerAction::Click { x, y });
            }
        } else {
            self.pinch_latched = false;
        }

        let scroll = match gesture {
            Gesture::Point => Some(-HAND_SCROLL_STEP),
            Gesture::Peace => Some(HAND_SCROLL_STEP),
            _ => None,
        };
        if let Some(pixels) = scroll {
            if cooled_down(self.last_scroll_at, now, HAND_SCROLL_COOLDOWN) {
                self.last_scroll_at = Some(now);
                actions.push(PointerAction::ScrollBy { pixels });
            }
        }

        if gesture == Gesture::Open
            && self.last_gesture != Gesture::Open
            && cooled_down(self.last_back_at, now, GO_BACK_COOLDOWN)
        {
            self.last_back_at = Some(now);
            actions.push(PointerAction::GoBack);
        }

        self.last_gesture = gesture;
        actions
    }
}

pub(crate) fn cooled_down(last: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    last.is_none_or(|at| now.saturating_duration_since(at) >= cooldown)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every fingertip level with its PIP joint, thumb far from the index tip.
    fn relaxed_hand() -> Vec<Landmark> {
        let mut lm = vec![Landmark::new(0.5, 0.5); HAND_LANDMARK_COUNT];
        lm[THUMB_TIP] = Landmark::new(0.1, 0.9);
        lm
    }

    fn raise(lm: &mut [Landmark], tip: usize) {
        lm[tip].y = lm[tip - 2].y - 0.1;
    }

    #[test]
    fn test_classify_patterns() {
        assert_eq!(classify(&relaxed_hand()), Gesture::None);

        let mut point = relaxed_hand();
        raise(&mut point, INDEX_TIP);
        assert_eq!(classify(&point), Gesture::Point);

        let mut peace = point.clone();
        raise(&mut peace, MIDDLE_TIP);
        assert_eq!(classify(&peace), Gesture::Peace);

        let mut open = peace.clone();
        raise(&mut open, RING_TIP);
        raise(&mut open, PINKY_TIP);
        assert_eq!(classify(&open), Gesture::Open);

        let mut pinch = open.clone();
        pinch[THUMB_TIP] = Landmark::new(pinch[INDEX_TIP].x + 0.03, pinch[INDEX_TIP].y);
        assert_eq!(classify(&pinch), Gesture::Pinch);
    }

    #[test]
    fn test_margin_is_required() {
        let mut lm = relaxed_hand();
        lm[INDEX_TIP].y = lm[INDEX_PIP].y - 0.01;
        assert_eq!(classify(&lm), Gesture::None);
    }

    #[test]
    fn test_short_landmark_list() {
        assert_eq!(classify(&[Landmark::default(); 5]), Gesture::None);
    }
}
