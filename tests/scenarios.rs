use measure_overlay::hotkey::{HotkeyBindings, KeyCode, MockHotkeyHandle, MockHotkeySource};
use measure_overlay::measure::calibration::{
    CalibrationState, PromptResponse, ScriptedPrompt,
};
use measure_overlay::measure::hook::{HookDecision, MockHookBackend, MockHookHandle};
use measure_overlay::measure::messages::{EventDispatcher, OverlayCommand, OverlayEvent};
use measure_overlay::measure::mode::InputMode;
use measure_overlay::measure::model::{PointerEvent, PointerKind};
use measure_overlay::measure::runtime::OverlayRuntime;
use measure_overlay::measure::session::MeasureSession;

fn pointer(kind: PointerKind, x: i32, y: i32) -> OverlayEvent {
    OverlayEvent::Pointer(PointerEvent::new(kind, (x, y)))
}

fn drag(
    session: &mut MeasureSession,
    prompt: &mut ScriptedPrompt,
    start: (i32, i32),
    end: (i32, i32),
) {
    let down = pointer(PointerKind::SecondaryDown, start.0, start.1);
    let up = pointer(PointerKind::SecondaryUp, end.0, end.1);
    session.handle_event_with_prompt(down, prompt);
    session.handle_event_with_prompt(up, prompt);
}

fn measuring() -> MeasureSession {
    let mut session = MeasureSession::default();
    session.handle_event(OverlayEvent::Command(OverlayCommand::ToggleMeasuring));
    session
}

fn calibrated(pixels: i32, meters: &str) -> MeasureSession {
    let mut session = measuring();
    let mut prompt = ScriptedPrompt::answering(meters);
    drag(&mut session, &mut prompt, (0, 0), (0, -pixels));
    assert!(matches!(
        session.calibration_state(),
        CalibrationState::Calibrated(_)
    ));
    session
}

#[test]
fn scenario_a_calibrate_then_measure() {
    let mut session = measuring();
    let mut prompt = ScriptedPrompt::answering("50");
    drag(&mut session, &mut prompt, (0, 0), (0, -100));

    let scale = session
        .calibration_state()
        .scale_factor()
        .expect("calibrated");
    assert!((scale.meters_per_pixel() - 0.5).abs() < 1e-12);
    assert!(session.segments().is_empty());

    drag(&mut session, &mut prompt, (0, 0), (100, 0));
    let segment = session.segments().last().copied().expect("segment");
    assert!((segment.distance_meters - 50.0).abs() < 1e-9);
    assert!((segment.angle_degrees - 90.0).abs() < 1e-9);
    assert_eq!(prompt.asked(), &[100.0]);
}

#[test]
fn scenario_b_short_drag_opens_no_prompt() {
    let mut session = measuring();
    let mut prompt = ScriptedPrompt::answering("1");
    drag(&mut session, &mut prompt, (10, 10), (13, 14));

    assert!(prompt.asked().is_empty());
    assert_eq!(session.calibration_state(), CalibrationState::Uncalibrated);
    assert!(session.segments().is_empty());
}

#[test]
fn scenario_c_cancelled_prompt_stays_uncalibrated() {
    let mut session = measuring();
    let mut prompt = ScriptedPrompt::new([PromptResponse::Cancelled]);
    drag(&mut session, &mut prompt, (0, 0), (200, 0));

    assert_eq!(prompt.asked(), &[200.0]);
    assert_eq!(session.calibration_state(), CalibrationState::Uncalibrated);
    assert!(session.segments().is_empty());
    assert!(session.capture().block_secondary);
}

fn start_runtime() -> (OverlayRuntime, MockHookHandle, MockHotkeyHandle) {
    let (hook, hook_handle) = MockHookBackend::new();
    let (hotkeys, key_handle) = MockHotkeySource::new();
    let (dispatcher, events) = EventDispatcher::channel();
    let runtime = OverlayRuntime::start(
        Box::new(hook),
        Box::new(hotkeys),
        &HotkeyBindings::default(),
        dispatcher,
        events,
    );
    (runtime, hook_handle, key_handle)
}

#[test]
fn scenario_d_toggle_off_forwards_drags_untouched() {
    let (mut runtime, hook, keys) = start_runtime();
    let mut session = calibrated(100, "10");
    runtime.pump(&mut session);
    assert_eq!(session.mode(), InputMode::Measuring);

    assert_eq!(keys.tap(KeyCode::Char('=')), Some(OverlayCommand::ToggleMeasuring));
    runtime.pump(&mut session);
    assert_eq!(session.mode(), InputMode::PassThrough);

    let down = PointerEvent::new(PointerKind::SecondaryDown, (0, 0));
    let up = PointerEvent::new(PointerKind::SecondaryUp, (300, 0));
    assert_eq!(hook.emit(down), HookDecision::PassThrough);
    assert_eq!(hook.emit(up), HookDecision::PassThrough);
    assert_eq!(runtime.pump(&mut session), 0);
    assert!(session.segments().is_empty());
}

#[test]
fn primary_button_and_moves_pass_while_measuring() {
    let (mut runtime, hook, _keys) = start_runtime();
    let mut session = measuring();
    runtime.pump(&mut session);

    for kind in [PointerKind::PrimaryDown, PointerKind::Move, PointerKind::PrimaryUp] {
        assert_eq!(hook.emit(PointerEvent::new(kind, (5, 5))), HookDecision::PassThrough);
    }
    assert_eq!(
        hook.emit(PointerEvent::new(PointerKind::SecondaryDown, (5, 5))),
        HookDecision::ForwardAndBlock
    );
}

#[test]
fn hooked_drag_flows_through_the_queue_into_a_prompt() {
    let (mut runtime, hook, keys) = start_runtime();
    let mut session = MeasureSession::default();
    keys.tap(KeyCode::Char('='));
    runtime.pump(&mut session);

    hook.emit(PointerEvent::new(PointerKind::SecondaryDown, (0, 0)));
    hook.emit(PointerEvent::new(PointerKind::Move, (0, 60)));
    hook.emit(PointerEvent::new(PointerKind::SecondaryUp, (0, 120)));
    assert_eq!(runtime.pump(&mut session), 2);
    assert_eq!(session.pending_prompt(), Some(120.0));

    // Prompt open: secondary events still reach the overlay but the
    // application underneath sees them too.
    assert_eq!(
        hook.emit(PointerEvent::new(PointerKind::SecondaryDown, (0, 0))),
        HookDecision::Forward
    );
    hook.emit(PointerEvent::new(PointerKind::SecondaryUp, (0, 400)));
    runtime.pump(&mut session);
    assert_eq!(session.pending_prompt(), Some(120.0));

    session.resolve_prompt(PromptResponse::Submitted("1,2".into()));
    runtime.sync_capture(&session);
    let scale = session
        .calibration_state()
        .scale_factor()
        .expect("calibrated");
    assert!((scale.meters_per_pixel() - 0.01).abs() < 1e-12);
    assert_eq!(
        hook.emit(PointerEvent::new(PointerKind::SecondaryDown, (0, 0))),
        HookDecision::ForwardAndBlock
    );
}

#[test]
fn scaled_distance_matches_ratio() {
    let cases = [(100, "50", 37), (250, "3.75", 999), (64, "0,5", 12), (1000, "1000", 10)];
    for (calibration_px, meters, measured_px) in cases {
        let mut session = calibrated(calibration_px, meters);
        let mut prompt = ScriptedPrompt::default();
        drag(&mut session, &mut prompt, (7, 7), (7 + measured_px, 7));

        let real: f64 = meters.replace(',', ".").parse().expect("number");
        let expected = measured_px as f64 * (real / calibration_px as f64);
        let segment = session.segments().last().copied().expect("segment");
        assert!(
            (segment.distance_meters - expected).abs() < 1e-6,
            "{calibration_px} px = {meters} m, measured {measured_px} px"
        );
    }
}

#[test]
fn angles_stay_in_range() {
    let mut session = calibrated(100, "1");
    let mut prompt = ScriptedPrompt::default();
    let ends = [(0, -50), (50, 0), (0, 50), (-50, 0), (-1, -300), (30, -40), (-30, 40)];
    for end in ends {
        drag(&mut session, &mut prompt, (0, 0), end);
    }
    let angles: Vec<f64> = session.segments().iter().map(|s| s.angle_degrees).collect();
    assert_eq!(angles.len(), ends.len());
    assert!(angles.iter().all(|a| (0.0..360.0).contains(a)));
    assert!(angles[0].abs() < 1e-9);
    assert!((angles[1] - 90.0).abs() < 1e-9);
    assert!(angles[4] > 359.0);
}

#[test]
fn clear_all_is_idempotent() {
    let mut session = calibrated(100, "1");
    let mut prompt = ScriptedPrompt::default();
    drag(&mut session, &mut prompt, (0, 0), (40, 0));
    drag(&mut session, &mut prompt, (0, 0), (0, 40));
    assert_eq!(session.segments().len(), 2);

    session.clear_all();
    let status = session.status_text().to_string();
    session.clear_all();
    assert!(session.segments().is_empty());
    assert_eq!(session.status_text(), status);
}

#[test]
fn recalibration_requires_a_fresh_prompt() {
    let (mut runtime, _hook, keys) = start_runtime();
    let mut session = calibrated(100, "10");
    let mut prompt = ScriptedPrompt::default();
    drag(&mut session, &mut prompt, (0, 0), (50, 0));
    assert_eq!(session.segments().len(), 1);

    keys.tap(KeyCode::Char('C'));
    runtime.pump(&mut session);
    assert_eq!(session.calibration_state(), CalibrationState::Uncalibrated);

    // The next drag calibrates instead of measuring.
    let mut prompt = ScriptedPrompt::answering("1");
    drag(&mut session, &mut prompt, (0, 0), (100, 0));
    assert_eq!(session.segments().len(), 1);
    drag(&mut session, &mut prompt, (0, 0), (50, 0));

    let meters: Vec<f64> = session.segments().iter().map(|s| s.distance_meters).collect();
    assert!((meters[0] - 5.0).abs() < 1e-9);
    assert!((meters[1] - 0.5).abs() < 1e-9);
}

#[test]
fn clear_sequence_from_hotkeys_empties_the_store() {
    let (mut runtime, _hook, keys) = start_runtime();
    let mut session = calibrated(100, "1");
    let mut prompt = ScriptedPrompt::default();
    drag(&mut session, &mut prompt, (0, 0), (40, 0));

    assert_eq!(keys.tap(KeyCode::Char('-')), None);
    assert_eq!(keys.tap(KeyCode::Char('=')), Some(OverlayCommand::ClearAll));
    runtime.pump(&mut session);

    assert!(session.segments().is_empty());
    assert_eq!(session.mode(), InputMode::Measuring);
}
