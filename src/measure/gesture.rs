use crate::measure::geometry::pixel_distance;
use crate::measure::mode::InputMode;
use crate::measure::model::DragGesture;

pub const DEFAULT_MIN_DRAG_DISTANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureOutcome {
    /// Up without a matching down, or the overlay is not measuring.
    Ignored,
    /// Down and up closer than the drag threshold.
    Click { pixel_distance: f64 },
    Drag(DragGesture),
}

/// Turns secondary-button down/up pairs into clicks and drags.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureClassifier {
    min_drag_distance: f64,
    start: Option<(i32, i32)>,
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DRAG_DISTANCE)
    }
}

impl GestureClassifier {
    pub fn new(min_drag_distance: f64) -> Self {
        let min_drag_distance = if min_drag_distance.is_finite() && min_drag_distance > 0.0 {
            min_drag_distance
        } else {
            DEFAULT_MIN_DRAG_DISTANCE
        };
        Self {
            min_drag_distance,
            start: None,
        }
    }

    pub fn min_drag_distance(&self) -> f64 {
        self.min_drag_distance
    }

    pub fn is_open(&self) -> bool {
        self.start.is_some()
    }

    pub fn on_secondary_down(&mut self, position: (i32, i32), mode: InputMode) -> bool {
        if mode != InputMode::Measuring {
            return false;
        }
        if let Some(previous) = self.start.replace(position) {
            tracing::debug!(?previous, ?position, "restarting unfinished gesture");
        }
        true
    }

    pub fn on_secondary_up(&mut self, position: (i32, i32), mode: InputMode) -> GestureOutcome {
        if mode != InputMode::Measuring {
            return GestureOutcome::Ignored;
        }
        let Some(start) = self.start.take() else {
            return GestureOutcome::Ignored;
        };

        let distance = pixel_distance(start, position);
        if distance < self.min_drag_distance {
            tracing::debug!(
                distance_px = distance,
                threshold_px = self.min_drag_distance,
                "gesture below drag threshold, treating as click"
            );
            return GestureOutcome::Click {
                pixel_distance: distance,
            };
        }

        GestureOutcome::Drag(DragGesture {
            start,
            end: position,
        })
    }

    /// Drops any open gesture, e.g. when measuring is switched off mid-drag.
    pub fn cancel(&mut self) {
        self.start = None;
    }
}
