use crate::measure::calibration::{
    prompt_message, CalibrationEngine, CalibrationOutcome, CalibrationPrompt, CalibrationState,
    PromptResponse,
};
use crate::measure::gesture::{GestureClassifier, GestureOutcome};
use crate::measure::messages::{OverlayCommand, OverlayEvent};
use crate::measure::mode::{CaptureState, InputMode, InputModeController};
use crate::measure::model::{DragGesture, PointerEvent, PointerKind, Segment, SegmentStore};

const UNCALIBRATED_STATUS: &str =
    "Not calibrated.\nDrag a known distance with the right button to calibrate.";
const RECALIBRATE_STATUS: &str =
    "Recalibration started.\nDrag a known distance with the right button.";
const CLEARED_STATUS: &str = "All lines cleared.";

/// All mutable overlay state. Owned by the UI loop and mutated nowhere else;
/// input threads only ever see it through [`OverlayEvent`]s.
#[derive(Debug, Clone)]
pub struct MeasureSession {
    mode: InputModeController,
    classifier: GestureClassifier,
    calibration: CalibrationEngine,
    segments: SegmentStore,
    status: String,
    help: String,
    redraw: bool,
    close_requested: bool,
}

impl Default for MeasureSession {
    fn default() -> Self {
        Self::new(GestureClassifier::default(), String::new())
    }
}

impl MeasureSession {
    pub fn new(classifier: GestureClassifier, help: String) -> Self {
        let status = if help.is_empty() {
            UNCALIBRATED_STATUS.to_string()
        } else {
            help.clone()
        };
        Self {
            mode: InputModeController::default(),
            classifier,
            calibration: CalibrationEngine::default(),
            segments: SegmentStore::default(),
            status,
            help,
            redraw: true,
            close_requested: false,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode.mode()
    }

    pub fn capture(&self) -> CaptureState {
        self.mode.capture()
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn pending_prompt(&self) -> Option<f64> {
        self.calibration.pending_prompt()
    }

    pub fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Returns whether a redraw was requested since the last call.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// Applies one queued event. A drag that opens the calibration prompt
    /// leaves it open; the caller answers it later through
    /// [`MeasureSession::resolve_prompt`].
    pub fn handle_event(&mut self, event: OverlayEvent) {
        match event {
            OverlayEvent::Pointer(pointer) => self.handle_pointer(pointer),
            OverlayEvent::Command(command) => self.handle_command(command),
        }
    }

    /// Like [`MeasureSession::handle_event`], but a prompt opened by this
    /// event is answered right away by `prompt`.
    pub fn handle_event_with_prompt(
        &mut self,
        event: OverlayEvent,
        prompt: &mut dyn CalibrationPrompt,
    ) {
        let was_open = self.calibration.state().is_dialog_open();
        self.handle_event(event);
        if was_open {
            return;
        }
        if let Some(pixel_distance) = self.calibration.pending_prompt() {
            let response = prompt.ask_real_length(pixel_distance);
            self.resolve_prompt(response);
        }
    }

    pub fn resolve_prompt(&mut self, response: PromptResponse) -> CalibrationOutcome {
        let outcome = self.calibration.resolve_prompt(response);
        match outcome {
            CalibrationOutcome::Calibrated(scale) => {
                self.mode.restore();
                self.set_status(format!(
                    "Calibrated: 1 px = {:.4} m.\nDrag with the right button to measure.",
                    scale.meters_per_pixel()
                ));
            }
            CalibrationOutcome::Rejected(rejection) => {
                self.mode.restore();
                self.set_status(rejection.status_text().to_string());
            }
            CalibrationOutcome::PromptOpened { .. } => {}
        }
        outcome
    }

    /// Adds a segment measured with the current scale. Returns `None` and
    /// changes nothing while uncalibrated.
    pub fn commit_segment(&mut self, start: (i32, i32), end: (i32, i32)) -> Option<Segment> {
        let Some(scale) = self.calibration.scale_factor() else {
            tracing::debug!(?start, ?end, "segment dropped: not calibrated");
            return None;
        };

        let segment = Segment::measure(start, end, scale);
        self.segments.push(segment);
        tracing::info!(
            distance_m = segment.distance_meters,
            angle_deg = segment.angle_degrees,
            pixels = segment.pixel_distance,
            "segment measured"
        );
        self.set_status(format!(
            "Segment: {:.2} m, {:.1}° ({:.1} px).",
            segment.distance_meters, segment.angle_degrees, segment.pixel_distance
        ));
        Some(segment)
    }

    pub fn clear_all(&mut self) {
        self.segments.clear();
        self.set_status(CLEARED_STATUS.to_string());
    }

    fn handle_pointer(&mut self, pointer: PointerEvent) {
        let mode = self.mode.mode();
        match pointer.kind {
            PointerKind::SecondaryDown => {
                self.classifier.on_secondary_down(pointer.position, mode);
            }
            PointerKind::SecondaryUp => {
                match self.classifier.on_secondary_up(pointer.position, mode) {
                    GestureOutcome::Drag(drag) => self.route_drag(drag),
                    GestureOutcome::Click { .. } | GestureOutcome::Ignored => {}
                }
            }
            PointerKind::PrimaryDown | PointerKind::PrimaryUp | PointerKind::Move => {}
        }
    }

    fn route_drag(&mut self, drag: DragGesture) {
        if !self.calibration.state().is_active() {
            self.commit_segment(drag.start, drag.end);
            return;
        }

        match self.calibration.handle_measured_drag(drag.pixel_distance()) {
            CalibrationOutcome::PromptOpened { pixel_distance } => {
                self.mode.suppress();
                self.set_status(prompt_message(pixel_distance));
            }
            CalibrationOutcome::Rejected(rejection) => {
                self.set_status(rejection.status_text().to_string());
            }
            CalibrationOutcome::Calibrated(_) => {}
        }
    }

    fn handle_command(&mut self, command: OverlayCommand) {
        tracing::debug!(?command, "overlay command");
        match command {
            OverlayCommand::ToggleMeasuring => {
                let mode = self.mode.toggle();
                if mode == InputMode::PassThrough {
                    self.classifier.cancel();
                }
                let status = match (self.calibration.pending_prompt(), mode) {
                    (Some(pixel_distance), _) => prompt_message(pixel_distance),
                    (None, InputMode::Measuring) if self.calibration.state().is_active() => {
                        format!("Measuring ON.\n{UNCALIBRATED_STATUS}")
                    }
                    (None, InputMode::Measuring) => {
                        "Measuring ON.\nDrag with the right button to measure.".to_string()
                    }
                    (None, InputMode::PassThrough) => {
                        "Measuring OFF.\nInput goes to the application.".to_string()
                    }
                };
                self.set_status(status);
            }
            OverlayCommand::Recalibrate => {
                self.calibration.recalibrate();
                self.mode.force_measuring();
                let status = match self.calibration.pending_prompt() {
                    Some(pixel_distance) => prompt_message(pixel_distance),
                    None => RECALIBRATE_STATUS.to_string(),
                };
                self.set_status(status);
            }
            OverlayCommand::ClearAll => self.clear_all(),
            OverlayCommand::Close => {
                self.close_requested = true;
                self.redraw = true;
            }
        }
    }

    fn set_status(&mut self, status: String) {
        self.status = status;
        self.redraw = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::calibration::{CalibrationRejection, ScriptedPrompt};

    fn down(x: i32, y: i32) -> OverlayEvent {
        OverlayEvent::Pointer(PointerEvent::new(PointerKind::SecondaryDown, (x, y)))
    }

    fn up(x: i32, y: i32) -> OverlayEvent {
        OverlayEvent::Pointer(PointerEvent::new(PointerKind::SecondaryUp, (x, y)))
    }

    fn command(command: OverlayCommand) -> OverlayEvent {
        OverlayEvent::Command(command)
    }

    fn measuring_session() -> MeasureSession {
        let mut session = MeasureSession::default();
        session.handle_event(command(OverlayCommand::ToggleMeasuring));
        session.take_redraw();
        session
    }

    #[test]
    fn calibration_drag_opens_prompt_and_suppresses_blocking() {
        let mut session = measuring_session();
        session.handle_event(down(0, 0));
        session.handle_event(up(0, -100));

        assert_eq!(session.pending_prompt(), Some(100.0));
        assert!(session.capture().forward_secondary);
        assert!(!session.capture().block_secondary);
        assert!(session.status_text().contains("100.0 px"));
        assert!(session.take_redraw());
    }

    #[test]
    fn toggling_with_prompt_open_keeps_the_prompt_status() {
        let mut session = measuring_session();
        session.handle_event(down(0, 0));
        session.handle_event(up(0, -100));
        let prompt_status = session.status_text().to_string();

        session.handle_event(command(OverlayCommand::ToggleMeasuring));
        assert_eq!(session.mode(), InputMode::PassThrough);
        assert_eq!(session.status_text(), prompt_status);

        session.handle_event(command(OverlayCommand::ToggleMeasuring));
        assert_eq!(session.mode(), InputMode::Measuring);
        assert_eq!(session.status_text(), prompt_status);
        assert!(session.status_text().contains("100.0 px"));
        assert_eq!(session.pending_prompt(), Some(100.0));
    }

    #[test]
    fn drag_while_prompt_open_is_rejected() {
        let mut session = measuring_session();
        session.handle_event(down(0, 0));
        session.handle_event(up(0, -100));
        session.handle_event(down(0, 0));
        session.handle_event(up(300, 0));

        assert_eq!(session.pending_prompt(), Some(100.0));
        assert_eq!(
            session.status_text(),
            CalibrationRejection::PromptAlreadyOpen.status_text()
        );
    }

    #[test]
    fn resolving_prompt_restores_capture() {
        let mut session = measuring_session();
        session.handle_event(down(0, 0));
        session.handle_event(up(0, -100));
        session.resolve_prompt(PromptResponse::Submitted("abc".into()));

        assert_eq!(session.calibration_state(), CalibrationState::Uncalibrated);
        assert!(session.capture().block_secondary);
        assert_eq!(
            session.status_text(),
            CalibrationRejection::NotANumber.status_text()
        );
    }

    #[test]
    fn click_changes_nothing_and_requests_no_redraw() {
        let mut session = measuring_session();
        session.handle_event(down(10, 10));
        session.handle_event(up(12, 12));

        assert_eq!(session.pending_prompt(), None);
        assert!(!session.take_redraw());
    }

    #[test]
    fn toggling_off_mid_drag_drops_the_gesture() {
        let mut session = measuring_session();
        session.handle_event(down(0, 0));
        session.handle_event(command(OverlayCommand::ToggleMeasuring));
        session.handle_event(command(OverlayCommand::ToggleMeasuring));
        session.handle_event(up(0, 200));

        assert_eq!(session.pending_prompt(), None);
    }

    #[test]
    fn commit_requires_calibration() {
        let mut session = MeasureSession::default();
        assert_eq!(session.commit_segment((0, 0), (10, 10)), None);
        assert!(session.segments().is_empty());
    }

    #[test]
    fn recalibrate_forces_measuring_and_keeps_old_segments() {
        let mut session = measuring_session();
        let mut prompt = ScriptedPrompt::answering("10");
        session.handle_event_with_prompt(down(0, 0), &mut prompt);
        session.handle_event_with_prompt(up(100, 0), &mut prompt);
        session.handle_event(down(0, 0));
        session.handle_event(up(0, 50));
        assert_eq!(session.segments().len(), 1);

        session.handle_event(command(OverlayCommand::ToggleMeasuring));
        session.handle_event(command(OverlayCommand::Recalibrate));

        assert_eq!(session.mode(), InputMode::Measuring);
        assert_eq!(session.calibration_state(), CalibrationState::Uncalibrated);
        assert_eq!(session.segments().len(), 1);
        let first = session.segments().iter().next().map(|s| s.distance_meters);
        assert!((first.unwrap_or_default() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn primary_and_move_events_never_touch_state() {
        let mut session = measuring_session();
        for kind in [PointerKind::PrimaryDown, PointerKind::Move, PointerKind::PrimaryUp] {
            session.handle_event(OverlayEvent::Pointer(PointerEvent::new(kind, (400, 400))));
        }
        assert!(!session.take_redraw());
        assert_eq!(session.pending_prompt(), None);
    }

    #[test]
    fn close_command_sets_flag() {
        let mut session = MeasureSession::default();
        assert!(!session.close_requested());
        session.handle_event(command(OverlayCommand::Close));
        assert!(session.close_requested());
    }

    #[test]
    fn startup_status_is_help_text_when_given() {
        let session = MeasureSession::new(GestureClassifier::default(), "keys".into());
        assert_eq!(session.status_text(), "keys");
        assert_eq!(session.help_text(), "keys");
        assert_eq!(MeasureSession::default().status_text(), UNCALIBRATED_STATUS);
    }
}
