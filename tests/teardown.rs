use measure_overlay::hotkey::{HotkeyBindings, KeyCode, MockHotkeyHandle, MockHotkeySource};
use measure_overlay::measure::hook::{CallLog, HookDecision, MockHookBackend, MockHookHandle};
use measure_overlay::measure::messages::{EventDispatcher, OverlayCommand};
use measure_overlay::measure::model::{PointerEvent, PointerKind};
use measure_overlay::measure::runtime::{OverlayRuntime, TeardownStep};
use measure_overlay::measure::session::MeasureSession;

fn start() -> (OverlayRuntime, MockHookHandle, MockHotkeyHandle) {
    let calls = CallLog::default();
    let (hook, hook_handle) = MockHookBackend::with_log(calls.clone());
    let (hotkeys, key_handle) = MockHotkeySource::with_log(calls);
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
fn start_installs_hook_and_registers_hotkeys() {
    let (runtime, hook, keys) = start();
    assert!(runtime.hook_installed());
    assert!(runtime.hotkeys_registered());
    assert_eq!(hook.install_count(), 1);
    assert_eq!(keys.register_count(), 1);
}

#[test]
fn teardown_runs_steps_in_order() {
    let (mut runtime, hook, keys) = start();
    assert_eq!(hook.calls(), ["hook.install", "hotkeys.register"]);
    let report = runtime.teardown();

    assert!(report.is_clean());
    assert_eq!(
        &hook.calls()[2..],
        ["hook.stop_polling", "hotkeys.unregister", "hook.uninstall"]
    );
    assert_eq!(keys.calls(), hook.calls());
    assert_eq!(
        report.steps,
        vec![
            TeardownStep::StopPolling,
            TeardownStep::UnregisterHotkeys,
            TeardownStep::JoinHook
        ]
    );
    assert_eq!(hook.stop_count(), 1);
    assert_eq!(hook.uninstall_count(), 1);
    assert_eq!(keys.unregister_count(), 1);
    assert!(!runtime.hook_installed());
    assert!(!runtime.hotkeys_registered());
}

#[test]
fn close_hotkey_leads_to_teardown() {
    let (mut runtime, _hook, keys) = start();
    let mut session = MeasureSession::default();

    let press = |key| keys.input(measure_overlay::hotkey::KeyInput::Press(key));
    assert_eq!(press(KeyCode::Ctrl), None);
    assert_eq!(press(KeyCode::Shift), None);
    assert_eq!(press(KeyCode::Char('Q')), Some(OverlayCommand::Close));

    runtime.pump(&mut session);
    assert!(session.close_requested());
    assert!(runtime.teardown().is_clean());
}

#[test]
fn failures_do_not_stop_later_steps() {
    let (mut runtime, hook, keys) = start();
    keys.fail_unregister(true);
    hook.fail_uninstall(true);

    let report = runtime.teardown();
    assert_eq!(report.steps.len(), 3);
    let failed: Vec<TeardownStep> = report.errors.iter().map(|(step, _)| *step).collect();
    assert_eq!(
        failed,
        vec![TeardownStep::UnregisterHotkeys, TeardownStep::JoinHook]
    );
    assert_eq!(hook.stop_count(), 1);
    assert_eq!(hook.uninstall_count(), 1);
    assert_eq!(keys.unregister_count(), 1);
}

#[test]
fn nothing_is_forwarded_after_teardown() {
    let (mut runtime, hook, keys) = start();
    let mut session = MeasureSession::default();
    keys.tap(KeyCode::Char('='));
    runtime.pump(&mut session);
    let down = PointerEvent::new(PointerKind::SecondaryDown, (1, 1));
    assert_eq!(hook.emit(down), HookDecision::ForwardAndBlock);

    runtime.teardown();
    assert_eq!(hook.emit(down), HookDecision::PassThrough);
    assert_eq!(keys.tap(KeyCode::Char('=')), None);
    assert_eq!(runtime.pump(&mut session), 1);
}

#[test]
fn teardown_is_idempotent() {
    let (mut runtime, hook, keys) = start();
    runtime.teardown();
    let second = runtime.teardown();
    assert!(second.steps.is_empty());
    drop(runtime);

    assert_eq!(hook.stop_count(), 1);
    assert_eq!(hook.uninstall_count(), 1);
    assert_eq!(keys.unregister_count(), 1);
}
