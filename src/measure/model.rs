use crate::measure::calibration::ScaleFactor;
use crate::measure::geometry::{angle_from_vertical, pixel_distance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    SecondaryDown,
    SecondaryUp,
    PrimaryDown,
    PrimaryUp,
    Move,
}

impl PointerKind {
    pub fn is_secondary(self) -> bool {
        matches!(self, Self::SecondaryDown | Self::SecondaryUp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub position: (i32, i32),
}

impl PointerEvent {
    pub const fn new(kind: PointerKind, position: (i32, i32)) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragGesture {
    pub start: (i32, i32),
    pub end: (i32, i32),
}

impl DragGesture {
    pub fn pixel_distance(&self) -> f64 {
        pixel_distance(self.start, self.end)
    }
}

/// A committed measurement. Values are fixed at creation time; a later
/// recalibration does not rescale existing segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: (i32, i32),
    pub end: (i32, i32),
    pub pixel_distance: f64,
    pub distance_meters: f64,
    pub angle_degrees: f64,
}

impl Segment {
    pub fn measure(start: (i32, i32), end: (i32, i32), scale: ScaleFactor) -> Self {
        let pixels = pixel_distance(start, end);
        Self {
            start,
            end,
            pixel_distance: pixels,
            distance_meters: scale.to_meters(pixels),
            angle_degrees: angle_from_vertical(start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentStore {
    segments: Vec<Segment>,
}

impl SegmentStore {
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }
}
