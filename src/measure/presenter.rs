use crate::measure::calibration::{prompt_message, CalibrationState};
use crate::measure::geometry::{arrow_head, midpoint};
use crate::measure::mode::InputMode;
use crate::measure::model::Segment;
use crate::measure::session::MeasureSession;

/// Offset of a segment label from the segment midpoint, in screen pixels.
pub const LABEL_OFFSET: (f64, f64) = (10.0, -10.0);
/// Top-left corner of the status panel, in screen pixels.
pub const STATUS_PANEL_ORIGIN: (f64, f64) = (20.0, 20.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenterStyle {
    pub line_color: [u8; 4],
    pub line_width: f32,
    pub arrow_size: f64,
    pub label_font_size: f32,
}

impl Default for PresenterStyle {
    fn default() -> Self {
        Self {
            line_color: [255, 0, 0, 200],
            line_width: 3.0,
            arrow_size: 10.0,
            label_font_size: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentShape {
    pub start: (f64, f64),
    pub end: (f64, f64),
    /// Tip first, then the two barbs.
    pub arrow: [(f64, f64); 3],
    pub label: String,
    pub label_position: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusPanel {
    pub origin: (f64, f64),
    pub header: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogView {
    pub pixel_distance: f64,
    pub message: String,
}

/// Everything one repaint needs, in screen pixels. Built from the session
/// without touching any rendering backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    pub segments: Vec<SegmentShape>,
    pub status: StatusPanel,
    pub dialog: Option<DialogView>,
}

pub fn format_segment_label(segment: &Segment) -> String {
    format!(
        "{:.2} м, {:.1}°",
        segment.distance_meters, segment.angle_degrees
    )
}

fn segment_shape(segment: &Segment, style: &PresenterStyle) -> SegmentShape {
    let to_f64 = |p: (i32, i32)| (p.0 as f64, p.1 as f64);
    let (mx, my) = midpoint(segment.start, segment.end);
    SegmentShape {
        start: to_f64(segment.start),
        end: to_f64(segment.end),
        arrow: arrow_head(segment.start, segment.end, style.arrow_size),
        label: format_segment_label(segment),
        label_position: (mx + LABEL_OFFSET.0, my + LABEL_OFFSET.1),
    }
}

fn status_header(session: &MeasureSession) -> String {
    let mode = match session.mode() {
        InputMode::Measuring => "Measuring",
        InputMode::PassThrough => "Pass-through",
    };
    let calibration = match session.calibration_state() {
        CalibrationState::Calibrated(scale) => {
            format!("1 px = {:.4} m", scale.meters_per_pixel())
        }
        CalibrationState::PromptOpen { .. } => "calibrating".to_string(),
        CalibrationState::Uncalibrated => "not calibrated".to_string(),
    };
    format!(
        "{mode} | {calibration} | {} lines",
        session.segments().len()
    )
}

pub fn build_frame(session: &MeasureSession, style: &PresenterStyle) -> OverlayFrame {
    OverlayFrame {
        segments: session
            .segments()
            .iter()
            .map(|segment| segment_shape(segment, style))
            .collect(),
        status: StatusPanel {
            origin: STATUS_PANEL_ORIGIN,
            header: status_header(session),
            text: session.status_text().to_string(),
        },
        dialog: session.pending_prompt().map(|pixel_distance| DialogView {
            pixel_distance,
            message: prompt_message(pixel_distance),
        }),
    }
}
