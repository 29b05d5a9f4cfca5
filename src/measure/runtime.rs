use crate::hotkey::{HotkeyBindings, HotkeySource};
use crate::measure::calibration::CalibrationPrompt;
use crate::measure::hook::PointerHookBackend;
use crate::measure::messages::{drain_events, EventDispatcher, OverlayEvent};
use crate::measure::mode::CaptureState;
use crate::measure::session::MeasureSession;
use std::sync::mpsc::Receiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    StopPolling,
    UnregisterHotkeys,
    JoinHook,
}

/// Outcome of [`OverlayRuntime::teardown`]. Every step is attempted even
/// when an earlier one fails.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
    pub errors: Vec<(TeardownStep, anyhow::Error)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns the input producers and the consumer end of their queue.
///
/// The window itself belongs to the UI toolkit; callers release it after
/// [`OverlayRuntime::teardown`] returns.
pub struct OverlayRuntime {
    hook: Box<dyn PointerHookBackend>,
    hotkeys: Box<dyn HotkeySource>,
    events: Receiver<OverlayEvent>,
    published: Option<CaptureState>,
    torn_down: bool,
}

impl OverlayRuntime {
    /// Installs the hook and registers hotkeys. Either may fail; the
    /// overlay keeps running with whatever input is left.
    pub fn start(
        mut hook: Box<dyn PointerHookBackend>,
        mut hotkeys: Box<dyn HotkeySource>,
        bindings: &HotkeyBindings,
        dispatcher: EventDispatcher,
        events: Receiver<OverlayEvent>,
    ) -> Self {
        if let Err(err) = hook.install(dispatcher.clone()) {
            tracing::error!(?err, "failed to install pointer hook");
        }
        if let Err(err) = hotkeys.register(bindings, dispatcher) {
            tracing::error!(?err, "failed to register overlay hotkeys");
        }
        Self {
            hook,
            hotkeys,
            events,
            published: None,
            torn_down: false,
        }
    }

    pub fn hook_installed(&self) -> bool {
        self.hook.is_installed()
    }

    pub fn hotkeys_registered(&self) -> bool {
        self.hotkeys.is_registered()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Applies every queued event to `session` and republishes the capture
    /// state if it changed. Returns the number of events applied.
    pub fn pump(&mut self, session: &mut MeasureSession) -> usize {
        let events = drain_events(&self.events);
        let count = events.len();
        for event in events {
            session.handle_event(event);
        }
        self.sync_capture(session);
        count
    }

    /// Like [`OverlayRuntime::pump`], answering any prompt synchronously.
    pub fn pump_with_prompt(
        &mut self,
        session: &mut MeasureSession,
        prompt: &mut dyn CalibrationPrompt,
    ) -> usize {
        let events = drain_events(&self.events);
        let count = events.len();
        for event in events {
            session.handle_event_with_prompt(event, prompt);
        }
        self.sync_capture(session);
        count
    }

    pub fn sync_capture(&mut self, session: &MeasureSession) {
        if self.torn_down {
            return;
        }
        let capture = session.capture();
        if self.published != Some(capture) {
            self.hook.publish_capture(capture);
            self.published = Some(capture);
        }
    }

    /// Stops hook polling, unregisters hotkeys, then joins the hook thread.
    /// Runs once; later calls return an empty report.
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down {
            return report;
        }
        self.torn_down = true;

        self.hook.stop_polling();
        report.steps.push(TeardownStep::StopPolling);

        report.steps.push(TeardownStep::UnregisterHotkeys);
        if let Err(err) = self.hotkeys.unregister() {
            tracing::error!(?err, "failed to unregister hotkeys during teardown");
            report.errors.push((TeardownStep::UnregisterHotkeys, err));
        }

        report.steps.push(TeardownStep::JoinHook);
        if let Err(err) = self.hook.uninstall() {
            tracing::error!(?err, "failed to join pointer hook during teardown");
            report.errors.push((TeardownStep::JoinHook, err));
        }

        tracing::info!(clean = report.is_clean(), "overlay input torn down");
        report
    }
}

impl Drop for OverlayRuntime {
    fn drop(&mut self) {
        self.teardown();
    }
}
