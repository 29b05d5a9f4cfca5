use crate::measure::messages::{EventDispatcher, OverlayEvent};
use crate::measure::mode::CaptureState;
use crate::measure::model::{PointerEvent, PointerKind};
use anyhow::anyhow;
#[cfg(windows)]
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Hand the event to the next hook untouched.
    PassThrough,
    /// Queue the event for the overlay and still pass it on.
    Forward,
    /// Queue the event and hide it from the application underneath.
    ForwardAndBlock,
}

impl HookDecision {
    pub fn forwards(self) -> bool {
        !matches!(self, Self::PassThrough)
    }

    pub fn blocks(self) -> bool {
        matches!(self, Self::ForwardAndBlock)
    }
}

/// Decides what the low-level hook does with one pointer event. Primary
/// button and move events always pass through.
pub fn hook_decision(kind: PointerKind, capture: CaptureState) -> HookDecision {
    if !kind.is_secondary() || !capture.forward_secondary {
        return HookDecision::PassThrough;
    }
    if capture.block_secondary {
        HookDecision::ForwardAndBlock
    } else {
        HookDecision::Forward
    }
}

/// Like [`hook_decision`], but keeps each secondary-button press paired: an
/// up is blocked exactly when its down was, so a mode change in the middle
/// of a press never leaves the application with a stuck or orphan button.
pub fn paired_decision(
    kind: PointerKind,
    capture: CaptureState,
    down_blocked: bool,
) -> HookDecision {
    let decision = hook_decision(kind, capture);
    if kind != PointerKind::SecondaryUp {
        return decision;
    }
    match (down_blocked, decision.blocks()) {
        (true, false) => HookDecision::ForwardAndBlock,
        (false, true) => HookDecision::Forward,
        _ => decision,
    }
}

/// OS-level pointer hook. The UI loop publishes the current capture state
/// after every change; the hook reads it lock-free on its own thread.
pub trait PointerHookBackend: Send {
    fn install(&mut self, dispatcher: EventDispatcher) -> anyhow::Result<()>;
    /// Stops forwarding and blocking at once. The hook thread keeps running
    /// until [`PointerHookBackend::uninstall`].
    fn stop_polling(&mut self);
    /// Unhooks and joins the hook thread.
    fn uninstall(&mut self) -> anyhow::Result<()>;
    fn is_installed(&self) -> bool;
    fn publish_capture(&self, capture: CaptureState);
}

#[derive(Default)]
struct CaptureFlags {
    polling: AtomicBool,
    forward: AtomicBool,
    block: AtomicBool,
    down_blocked: AtomicBool,
}

impl CaptureFlags {
    fn publish(&self, capture: CaptureState) {
        self.forward
            .store(capture.forward_secondary, Ordering::Release);
        self.block.store(capture.block_secondary, Ordering::Release);
    }

    fn stop(&self) {
        self.polling.store(false, Ordering::Release);
        self.down_blocked.store(false, Ordering::Release);
    }

    fn decide(&self, kind: PointerKind) -> HookDecision {
        if !self.polling.load(Ordering::Acquire) {
            return HookDecision::PassThrough;
        }
        let capture = CaptureState {
            forward_secondary: self.forward.load(Ordering::Acquire),
            block_secondary: self.block.load(Ordering::Acquire),
        };
        match kind {
            PointerKind::SecondaryDown => {
                let decision = hook_decision(kind, capture);
                self.down_blocked
                    .store(decision.blocks(), Ordering::Release);
                decision
            }
            PointerKind::SecondaryUp => {
                let down_blocked = self.down_blocked.swap(false, Ordering::AcqRel);
                paired_decision(kind, capture, down_blocked)
            }
            _ => hook_decision(kind, capture),
        }
    }
}

#[cfg(windows)]
struct HookDispatch {
    flags: CaptureFlags,
    dispatcher: Mutex<Option<EventDispatcher>>,
}

#[cfg(windows)]
impl HookDispatch {
    fn set_dispatcher(&self, dispatcher: Option<EventDispatcher>) {
        if let Ok(mut guard) = self.dispatcher.lock() {
            *guard = dispatcher;
        }
    }
}

#[cfg(windows)]
static HOOK_DISPATCH: OnceCell<HookDispatch> = OnceCell::new();

#[cfg(windows)]
fn hook_dispatch() -> &'static HookDispatch {
    HOOK_DISPATCH.get_or_init(|| HookDispatch {
        flags: CaptureFlags::default(),
        dispatcher: Mutex::new(None),
    })
}

#[cfg(windows)]
struct HookThread {
    thread_id: u32,
    join: std::thread::JoinHandle<()>,
}

/// `WH_MOUSE_LL` hook running its own message loop thread.
#[cfg(windows)]
#[derive(Default)]
pub struct DefaultHookBackend {
    hook_thread: Option<HookThread>,
}

#[cfg(windows)]
impl PointerHookBackend for DefaultHookBackend {
    fn install(&mut self, dispatcher: EventDispatcher) -> anyhow::Result<()> {
        if self.hook_thread.is_some() {
            return Ok(());
        }

        hook_dispatch().set_dispatcher(Some(dispatcher));
        hook_dispatch().flags.publish(CaptureState::default());
        hook_dispatch().flags.polling.store(true, Ordering::Release);

        use std::time::Duration;
        use windows::Win32::System::LibraryLoader::GetModuleHandleW;
        use windows::Win32::System::Threading::GetCurrentThreadId;
        use windows::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, GetMessageW, PeekMessageW, SetWindowsHookExW, TranslateMessage,
            UnhookWindowsHookEx, MSG, PM_NOREMOVE, WH_MOUSE_LL,
        };

        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<anyhow::Result<u32>>(1);

        let join = std::thread::Builder::new()
            .name("pointer-hook".into())
            .spawn(move || {
                // Force a message queue before anyone posts WM_QUIT to us.
                let mut msg = MSG::default();
                unsafe {
                    let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
                }

                let thread_id = unsafe { GetCurrentThreadId() };

                let hmodule = match unsafe { GetModuleHandleW(None) } {
                    Ok(h) => h,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!(e)));
                        return;
                    }
                };

                let mouse_hook = match unsafe {
                    SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), hmodule, 0)
                } {
                    Ok(h) if !h.0.is_null() => h,
                    Ok(_) => {
                        let _ = ready_tx.send(Err(anyhow!(windows::core::Error::from_win32())));
                        return;
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!(e)));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(thread_id));

                loop {
                    let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                    if r.0 == 0 || r.0 == -1 {
                        break;
                    }
                    unsafe {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }

                unsafe {
                    let _ = UnhookWindowsHookEx(mouse_hook);
                }
            })?;

        let thread_id = match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(err)) => {
                hook_dispatch().flags.stop();
                hook_dispatch().set_dispatcher(None);
                let _ = join.join();
                return Err(err.context("failed to install pointer hook"));
            }
            Err(_) => {
                hook_dispatch().flags.stop();
                hook_dispatch().set_dispatcher(None);
                return Err(anyhow!("pointer hook thread did not signal readiness"));
            }
        };

        tracing::debug!(thread_id, "pointer hook installed");
        self.hook_thread = Some(HookThread { thread_id, join });
        Ok(())
    }

    fn stop_polling(&mut self) {
        hook_dispatch().flags.stop();
        hook_dispatch().flags.publish(CaptureState::default());
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        self.stop_polling();
        hook_dispatch().set_dispatcher(None);

        let Some(th) = self.hook_thread.take() else {
            return Ok(());
        };

        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{PostThreadMessageW, WM_QUIT};
        let posted = unsafe { PostThreadMessageW(th.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        if let Err(err) = posted {
            return Err(anyhow!(err).context("failed to post WM_QUIT to pointer hook thread"));
        }
        th.join
            .join()
            .map_err(|_| anyhow!("pointer hook thread panicked"))?;
        tracing::debug!("pointer hook uninstalled");
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.hook_thread.is_some()
    }

    fn publish_capture(&self, capture: CaptureState) {
        hook_dispatch().flags.publish(capture);
    }
}

#[cfg(windows)]
unsafe extern "system" fn mouse_hook_proc(
    n_code: i32,
    w_param: windows::Win32::Foundation::WPARAM,
    l_param: windows::Win32::Foundation::LPARAM,
) -> windows::Win32::Foundation::LRESULT {
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, HC_ACTION, HHOOK, MSLLHOOKSTRUCT, WM_LBUTTONDOWN, WM_LBUTTONUP,
        WM_RBUTTONDOWN, WM_RBUTTONUP,
    };

    let pass = || CallNextHookEx(HHOOK(std::ptr::null_mut()), n_code, w_param, l_param);

    if n_code != HC_ACTION as i32 {
        return pass();
    }

    let kind = match w_param.0 as u32 {
        WM_RBUTTONDOWN => PointerKind::SecondaryDown,
        WM_RBUTTONUP => PointerKind::SecondaryUp,
        WM_LBUTTONDOWN => PointerKind::PrimaryDown,
        WM_LBUTTONUP => PointerKind::PrimaryUp,
        // Moves and everything else leave before touching shared state.
        _ => return pass(),
    };

    let info = &*(l_param.0 as *const MSLLHOOKSTRUCT);
    // LLMHF_INJECTED | LLMHF_LOWER_IL_INJECTED
    if info.flags & 0x3 != 0 {
        return pass();
    }

    let dispatch = hook_dispatch();
    let decision = dispatch.flags.decide(kind);
    if !decision.forwards() {
        return pass();
    }

    if let Ok(guard) = dispatch.dispatcher.try_lock() {
        if let Some(dispatcher) = guard.as_ref() {
            let event = PointerEvent::new(kind, (info.pt.x, info.pt.y));
            dispatcher.dispatch(OverlayEvent::Pointer(event));
        }
    }

    if decision.blocks() {
        return windows::Win32::Foundation::LRESULT(1);
    }
    pass()
}

#[cfg(not(windows))]
#[derive(Default)]
pub struct DefaultHookBackend;

#[cfg(not(windows))]
impl PointerHookBackend for DefaultHookBackend {
    fn install(&mut self, _dispatcher: EventDispatcher) -> anyhow::Result<()> {
        Err(anyhow!("pointer hooks are not supported on this platform"))
    }

    fn stop_polling(&mut self) {}

    fn uninstall(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }

    fn publish_capture(&self, _capture: CaptureState) {}
}

/// Ordered record of the calls made on mock input sources. One log may be
/// shared between the hook and hotkey mocks to check their relative order.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub(crate) fn record_call(log: &CallLog, call: &'static str) {
    if let Ok(mut calls) = log.lock() {
        calls.push(call);
    }
}

/// In-process stand-in for the OS hook. Events are fed through the paired
/// [`MockHookHandle`] and routed exactly like the real hook routes them.
#[derive(Clone)]
pub struct MockHookBackend {
    state: Arc<MockHookState>,
}

#[derive(Default)]
struct MockHookState {
    flags: CaptureFlags,
    install_count: AtomicUsize,
    stop_count: AtomicUsize,
    uninstall_count: AtomicUsize,
    fail_uninstall: AtomicBool,
    dispatcher: Mutex<Option<EventDispatcher>>,
    calls: CallLog,
}

impl MockHookBackend {
    pub fn new() -> (Self, MockHookHandle) {
        Self::with_log(CallLog::default())
    }

    /// Records `hook.install`, `hook.stop_polling` and `hook.uninstall`
    /// into `calls`.
    pub fn with_log(calls: CallLog) -> (Self, MockHookHandle) {
        let state = Arc::new(MockHookState {
            calls,
            ..MockHookState::default()
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHookHandle { state },
        )
    }
}

impl PointerHookBackend for MockHookBackend {
    fn install(&mut self, dispatcher: EventDispatcher) -> anyhow::Result<()> {
        record_call(&self.state.calls, "hook.install");
        let mut guard = self.state.dispatcher.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_none() {
            self.state.install_count.fetch_add(1, Ordering::SeqCst);
            self.state.flags.polling.store(true, Ordering::Release);
            *guard = Some(dispatcher);
        }
        Ok(())
    }

    fn stop_polling(&mut self) {
        record_call(&self.state.calls, "hook.stop_polling");
        self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        self.state.flags.stop();
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        record_call(&self.state.calls, "hook.uninstall");
        self.state.flags.stop();
        let mut guard = self.state.dispatcher.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_some() {
            self.state.uninstall_count.fetch_add(1, Ordering::SeqCst);
        }
        *guard = None;
        if self.state.fail_uninstall.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated hook join failure"));
        }
        Ok(())
    }

    fn is_installed(&self) -> bool {
        match self.state.dispatcher.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }

    fn publish_capture(&self, capture: CaptureState) {
        self.state.flags.publish(capture);
    }
}

pub struct MockHookHandle {
    state: Arc<MockHookState>,
}

impl MockHookHandle {
    pub fn install_count(&self) -> usize {
        self.state.install_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.state.stop_count.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.state.uninstall_count.load(Ordering::SeqCst)
    }

    pub fn fail_uninstall(&self, fail: bool) {
        self.state.fail_uninstall.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Routes `event` as the OS hook would and reports the decision. Only
    /// forwarded events reach the overlay queue.
    pub fn emit(&self, event: PointerEvent) -> HookDecision {
        let decision = self.state.flags.decide(event.kind);
        if decision.forwards() {
            if let Ok(guard) = self.state.dispatcher.lock() {
                if let Some(dispatcher) = guard.as_ref() {
                    dispatcher.dispatch(OverlayEvent::Pointer(event));
                }
            }
        }
        decision
    }
}
