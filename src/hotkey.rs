use crate::measure::hook::{record_call, CallLog};
use crate::measure::messages::{EventDispatcher, OverlayCommand, OverlayEvent};
use anyhow::anyhow;
use log::info;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Keys the overlay can bind. Anything else arrives as [`KeyCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// `A`-`Z` (upper case), `0`-`9`, `=` and `-`.
    Char(char),
    F(u8),
    Space,
    Tab,
    Enter,
    Escape,
    Delete,
    Backspace,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    Ctrl,
    Shift,
    Alt,
    Other,
}

impl KeyCode {
    pub fn is_modifier(self) -> bool {
        matches!(self, Self::Ctrl | Self::Shift | Self::Alt)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{c}"),
            Self::F(n) => write!(f, "F{n}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Press(KeyCode),
    Release(KeyCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub key: KeyCode,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Hotkey {
    pub const fn plain(key: KeyCode) -> Self {
        Self {
            key,
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    fn matches(&self, key: KeyCode, modifiers: Modifiers) -> bool {
        self.key == key
            && self.ctrl == modifiers.ctrl
            && self.shift == modifiers.shift
            && self.alt == modifiers.alt
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Parse a hotkey string like "Ctrl+Shift+Q" into a [`Hotkey`].
pub fn parse_hotkey(s: &str) -> Option<Hotkey> {
    let mut ctrl = false;
    let mut shift = false;
    let mut alt = false;
    let mut key: Option<KeyCode> = None;

    for part in s.split('+') {
        let upper = part.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => ctrl = true,
            "SHIFT" => shift = true,
            "ALT" => alt = true,
            "" => {}
            _ => {
                // Only one non-modifier key per chord.
                if key.is_some() {
                    return None;
                }
                key = Some(parse_key(&upper)?);
            }
        }
    }

    key.map(|key| Hotkey {
        key,
        ctrl,
        shift,
        alt,
    })
}

fn parse_key(upper: &str) -> Option<KeyCode> {
    match upper {
        "SPACE" => Some(KeyCode::Space),
        "TAB" => Some(KeyCode::Tab),
        "ENTER" | "RETURN" => Some(KeyCode::Enter),
        "ESC" | "ESCAPE" => Some(KeyCode::Escape),
        "DELETE" => Some(KeyCode::Delete),
        "BACKSPACE" => Some(KeyCode::Backspace),
        "HOME" => Some(KeyCode::Home),
        "END" => Some(KeyCode::End),
        "PAGEUP" => Some(KeyCode::PageUp),
        "PAGEDOWN" => Some(KeyCode::PageDown),
        "LEFT" | "LEFTARROW" => Some(KeyCode::Left),
        "RIGHT" | "RIGHTARROW" => Some(KeyCode::Right),
        "UP" | "UPARROW" => Some(KeyCode::Up),
        "DOWN" | "DOWNARROW" => Some(KeyCode::Down),
        "=" | "EQUAL" | "EQUALS" => Some(KeyCode::Char('=')),
        "-" | "MINUS" => Some(KeyCode::Char('-')),
        _ if upper.len() > 1 && upper.starts_with('F') => match upper[1..].parse::<u8>() {
            Ok(n @ 1..=12) => Some(KeyCode::F(n)),
            _ => None,
        },
        _ => {
            let mut chars = upper.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => Some(KeyCode::Char(c)),
                _ => None,
            }
        }
    }
}

/// A single chord or a strict two-chord sequence such as "-,=".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyBinding {
    Chord(Hotkey),
    Sequence(Hotkey, Hotkey),
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chord(hotkey) => write!(f, "{hotkey}"),
            Self::Sequence(first, second) => write!(f, "{first} then {second}"),
        }
    }
}

pub fn parse_binding(s: &str) -> Option<HotkeyBinding> {
    let parts: Vec<&str> = s.split(',').collect();
    match parts.as_slice() {
        [chord] => parse_hotkey(chord).map(HotkeyBinding::Chord),
        [first, second] => Some(HotkeyBinding::Sequence(
            parse_hotkey(first)?,
            parse_hotkey(second)?,
        )),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub toggle: HotkeyBinding,
    pub recalibrate: HotkeyBinding,
    pub clear_all: HotkeyBinding,
    pub close: HotkeyBinding,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            toggle: HotkeyBinding::Chord(Hotkey::plain(KeyCode::Char('='))),
            recalibrate: HotkeyBinding::Chord(Hotkey::plain(KeyCode::Char('C'))),
            clear_all: HotkeyBinding::Sequence(
                Hotkey::plain(KeyCode::Char('-')),
                Hotkey::plain(KeyCode::Char('=')),
            ),
            close: HotkeyBinding::Chord(Hotkey {
                key: KeyCode::Char('Q'),
                ctrl: true,
                shift: true,
                alt: false,
            }),
        }
    }
}

impl HotkeyBindings {
    pub fn entries(&self) -> [(HotkeyBinding, OverlayCommand); 4] {
        [
            (self.clear_all, OverlayCommand::ClearAll),
            (self.toggle, OverlayCommand::ToggleMeasuring),
            (self.recalibrate, OverlayCommand::Recalibrate),
            (self.close, OverlayCommand::Close),
        ]
    }

    /// Startup help listing every active binding.
    pub fn help_text(&self) -> String {
        format!(
            "{}: measuring on/off\n{}: recalibrate\n{}: clear all lines\n{}: close overlay\n\
             Right-drag a known distance to calibrate.",
            self.toggle, self.recalibrate, self.clear_all, self.close
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Modifiers {
    ctrl: bool,
    shift: bool,
    alt: bool,
}

/// Turns a raw key stream into overlay commands.
///
/// Chords need an exact modifier match. A held key fires once; autorepeat
/// presses are dropped until the key is released. A sequence arms on its
/// first chord and fires only if the very next non-modifier press is its
/// second chord. Completing a sequence consumes that press, so a chord bound
/// to the same key does not fire as well.
#[derive(Debug, Clone)]
pub struct HotkeyMatcher {
    bindings: Vec<(HotkeyBinding, OverlayCommand)>,
    modifiers: Modifiers,
    held: HashSet<KeyCode>,
    armed: Option<(Hotkey, OverlayCommand)>,
}

impl HotkeyMatcher {
    pub fn new(bindings: &HotkeyBindings) -> Self {
        Self {
            bindings: bindings.entries().to_vec(),
            modifiers: Modifiers::default(),
            held: HashSet::new(),
            armed: None,
        }
    }

    pub fn process(&mut self, input: KeyInput) -> Option<OverlayCommand> {
        match input {
            KeyInput::Press(key) => self.press(key),
            KeyInput::Release(key) => {
                self.set_modifier(key, false);
                self.held.remove(&key);
                None
            }
        }
    }

    pub fn process_all<I>(&mut self, inputs: I) -> Vec<OverlayCommand>
    where
        I: IntoIterator<Item = KeyInput>,
    {
        inputs
            .into_iter()
            .filter_map(|input| self.process(input))
            .collect()
    }

    fn press(&mut self, key: KeyCode) -> Option<OverlayCommand> {
        if key.is_modifier() {
            self.set_modifier(key, true);
            return None;
        }
        if !self.held.insert(key) {
            return None;
        }

        if let Some((second, command)) = self.armed.take() {
            if second.matches(key, self.modifiers) {
                return Some(command);
            }
        }

        for (binding, command) in &self.bindings {
            if let HotkeyBinding::Chord(hotkey) = binding {
                if hotkey.matches(key, self.modifiers) {
                    return Some(*command);
                }
            }
        }

        for (binding, command) in &self.bindings {
            if let HotkeyBinding::Sequence(first, second) = binding {
                if first.matches(key, self.modifiers) {
                    self.armed = Some((*second, *command));
                    break;
                }
            }
        }
        None
    }

    fn set_modifier(&mut self, key: KeyCode, down: bool) {
        match key {
            KeyCode::Ctrl => self.modifiers.ctrl = down,
            KeyCode::Shift => self.modifiers.shift = down,
            KeyCode::Alt => self.modifiers.alt = down,
            _ => {}
        }
    }
}

/// Global hotkey registration. Registered bindings feed commands into the
/// overlay queue until [`HotkeySource::unregister`] is called.
pub trait HotkeySource: Send {
    fn register(
        &mut self,
        bindings: &HotkeyBindings,
        dispatcher: EventDispatcher,
    ) -> anyhow::Result<()>;
    fn unregister(&mut self) -> anyhow::Result<()>;
    fn is_registered(&self) -> bool;
}

struct ActiveHotkeys {
    matcher: HotkeyMatcher,
    dispatcher: EventDispatcher,
}

impl ActiveHotkeys {
    fn feed(&mut self, input: KeyInput) -> Option<OverlayCommand> {
        let command = self.matcher.process(input)?;
        tracing::debug!(?command, "hotkey matched");
        self.dispatcher.dispatch(OverlayEvent::Command(command));
        Some(command)
    }
}

#[cfg(windows)]
type SharedHotkeys = Arc<Mutex<Option<ActiveHotkeys>>>;

fn log_registered(bindings: &HotkeyBindings) {
    for (binding, command) in bindings.entries() {
        info!("Registered hotkey '{}' for {:?}", binding, command);
    }
}

#[cfg(windows)]
mod listener {
    use super::{KeyCode, KeyInput, SharedHotkeys};
    use once_cell::sync::OnceCell;
    use rdev::{listen, EventType, Key};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    static ACTIVE: OnceCell<SharedHotkeys> = OnceCell::new();

    /// `rdev::listen` cannot be stopped once started, so one listener thread
    /// serves the whole process and registration only swaps what it feeds.
    pub(super) fn shared() -> SharedHotkeys {
        Arc::clone(ACTIVE.get_or_init(|| {
            let active: SharedHotkeys = Arc::new(Mutex::new(None));
            let state = Arc::clone(&active);
            if let Err(err) = thread::Builder::new()
                .name("hotkey-listener".into())
                .spawn(move || listen_forever(state))
            {
                tracing::error!(?err, "failed to spawn hotkey listener");
            }
            active
        }))
    }

    fn listen_forever(state: SharedHotkeys) {
        loop {
            let listener_state = Arc::clone(&state);
            let result = listen(move |event| {
                let Some(input) = key_input(&event.event_type) else {
                    return;
                };
                if let Ok(mut guard) = listener_state.lock() {
                    if let Some(active) = guard.as_mut() {
                        active.feed(input);
                    }
                }
            });

            match result {
                Ok(()) => tracing::warn!("hotkey listener exited unexpectedly, restarting shortly"),
                Err(e) => tracing::warn!("hotkey listener failed: {:?}, retrying shortly", e),
            }
            thread::sleep(Duration::from_millis(500));
        }
    }

    fn key_input(event: &EventType) -> Option<KeyInput> {
        match event {
            EventType::KeyPress(key) => Some(KeyInput::Press(key_code(*key))),
            EventType::KeyRelease(key) => Some(KeyInput::Release(key_code(*key))),
            _ => None,
        }
    }

    fn key_code(key: Key) -> KeyCode {
        match key {
            Key::ControlLeft | Key::ControlRight => KeyCode::Ctrl,
            Key::ShiftLeft | Key::ShiftRight => KeyCode::Shift,
            Key::Alt | Key::AltGr => KeyCode::Alt,
            Key::Equal => KeyCode::Char('='),
            Key::Minus | Key::KpMinus => KeyCode::Char('-'),
            Key::Space => KeyCode::Space,
            Key::Tab => KeyCode::Tab,
            Key::Return | Key::KpReturn => KeyCode::Enter,
            Key::Escape => KeyCode::Escape,
            Key::Delete => KeyCode::Delete,
            Key::Backspace => KeyCode::Backspace,
            Key::Home => KeyCode::Home,
            Key::End => KeyCode::End,
            Key::PageUp => KeyCode::PageUp,
            Key::PageDown => KeyCode::PageDown,
            Key::LeftArrow => KeyCode::Left,
            Key::RightArrow => KeyCode::Right,
            Key::UpArrow => KeyCode::Up,
            Key::DownArrow => KeyCode::Down,
            Key::F1 => KeyCode::F(1),
            Key::F2 => KeyCode::F(2),
            Key::F3 => KeyCode::F(3),
            Key::F4 => KeyCode::F(4),
            Key::F5 => KeyCode::F(5),
            Key::F6 => KeyCode::F(6),
            Key::F7 => KeyCode::F(7),
            Key::F8 => KeyCode::F(8),
            Key::F9 => KeyCode::F(9),
            Key::F10 => KeyCode::F(10),
            Key::F11 => KeyCode::F(11),
            Key::F12 => KeyCode::F(12),
            Key::Num0 => KeyCode::Char('0'),
            Key::Num1 => KeyCode::Char('1'),
            Key::Num2 => KeyCode::Char('2'),
            Key::Num3 => KeyCode::Char('3'),
            Key::Num4 => KeyCode::Char('4'),
            Key::Num5 => KeyCode::Char('5'),
            Key::Num6 => KeyCode::Char('6'),
            Key::Num7 => KeyCode::Char('7'),
            Key::Num8 => KeyCode::Char('8'),
            Key::Num9 => KeyCode::Char('9'),
            Key::KeyA => KeyCode::Char('A'),
            Key::KeyB => KeyCode::Char('B'),
            Key::KeyC => KeyCode::Char('C'),
            Key::KeyD => KeyCode::Char('D'),
            Key::KeyE => KeyCode::Char('E'),
            Key::KeyF => KeyCode::Char('F'),
            Key::KeyG => KeyCode::Char('G'),
            Key::KeyH => KeyCode::Char('H'),
            Key::KeyI => KeyCode::Char('I'),
            Key::KeyJ => KeyCode::Char('J'),
            Key::KeyK => KeyCode::Char('K'),
            Key::KeyL => KeyCode::Char('L'),
            Key::KeyM => KeyCode::Char('M'),
            Key::KeyN => KeyCode::Char('N'),
            Key::KeyO => KeyCode::Char('O'),
            Key::KeyP => KeyCode::Char('P'),
            Key::KeyQ => KeyCode::Char('Q'),
            Key::KeyR => KeyCode::Char('R'),
            Key::KeyS => KeyCode::Char('S'),
            Key::KeyT => KeyCode::Char('T'),
            Key::KeyU => KeyCode::Char('U'),
            Key::KeyV => KeyCode::Char('V'),
            Key::KeyW => KeyCode::Char('W'),
            Key::KeyX => KeyCode::Char('X'),
            Key::KeyY => KeyCode::Char('Y'),
            Key::KeyZ => KeyCode::Char('Z'),
            _ => KeyCode::Other,
        }
    }
}

/// Process-wide keyboard listener backed by `rdev`.
#[derive(Debug, Default)]
pub struct RdevHotkeySource {
    registered: bool,
}

#[cfg(windows)]
impl HotkeySource for RdevHotkeySource {
    fn register(
        &mut self,
        bindings: &HotkeyBindings,
        dispatcher: EventDispatcher,
    ) -> anyhow::Result<()> {
        let shared = listener::shared();
        let mut guard = shared
            .lock()
            .map_err(|_| anyhow!("hotkey state lock poisoned"))?;
        *guard = Some(ActiveHotkeys {
            matcher: HotkeyMatcher::new(bindings),
            dispatcher,
        });
        self.registered = true;
        log_registered(bindings);
        Ok(())
    }

    fn unregister(&mut self) -> anyhow::Result<()> {
        if !self.registered {
            return Ok(());
        }
        self.registered = false;
        let shared = listener::shared();
        let mut guard = shared
            .lock()
            .map_err(|_| anyhow!("hotkey state lock poisoned"))?;
        *guard = None;
        info!("Unregistered overlay hotkeys");
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered
    }
}

#[cfg(not(windows))]
impl HotkeySource for RdevHotkeySource {
    fn register(
        &mut self,
        bindings: &HotkeyBindings,
        _dispatcher: EventDispatcher,
    ) -> anyhow::Result<()> {
        log::warn!("Global hotkeys are not supported on this platform");
        for (binding, command) in bindings.entries() {
            info!("Skipping hotkey '{}' for {:?} (noop)", binding, command);
        }
        Err(anyhow!("global hotkeys are not supported on this platform"))
    }

    fn unregister(&mut self) -> anyhow::Result<()> {
        self.registered = false;
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered
    }
}

/// In-process hotkey source. Keys are typed through the paired
/// [`MockHotkeyHandle`] and go through the same matcher as real input.
#[derive(Clone)]
pub struct MockHotkeySource {
    state: Arc<MockHotkeyState>,
}

#[derive(Default)]
struct MockHotkeyState {
    register_count: AtomicUsize,
    unregister_count: AtomicUsize,
    fail_unregister: AtomicBool,
    active: Mutex<Option<ActiveHotkeys>>,
    calls: CallLog,
}

impl MockHotkeySource {
    pub fn new() -> (Self, MockHotkeyHandle) {
        Self::with_log(CallLog::default())
    }

    /// Records `hotkeys.register` and `hotkeys.unregister` into `calls`.
    pub fn with_log(calls: CallLog) -> (Self, MockHotkeyHandle) {
        let state = Arc::new(MockHotkeyState {
            calls,
            ..MockHotkeyState::default()
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHotkeyHandle { state },
        )
    }
}

impl HotkeySource for MockHotkeySource {
    fn register(
        &mut self,
        bindings: &HotkeyBindings,
        dispatcher: EventDispatcher,
    ) -> anyhow::Result<()> {
        record_call(&self.state.calls, "hotkeys.register");
        let mut guard = self.state.active.lock().map_err(|_| anyhow!("lock"))?;
        *guard = Some(ActiveHotkeys {
            matcher: HotkeyMatcher::new(bindings),
            dispatcher,
        });
        self.state.register_count.fetch_add(1, Ordering::SeqCst);
        log_registered(bindings);
        Ok(())
    }

    fn unregister(&mut self) -> anyhow::Result<()> {
        record_call(&self.state.calls, "hotkeys.unregister");
        let mut guard = self.state.active.lock().map_err(|_| anyhow!("lock"))?;
        if guard.take().is_some() {
            self.state.unregister_count.fetch_add(1, Ordering::SeqCst);
            info!("Unregistered overlay hotkeys");
        }
        if self.state.fail_unregister.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated hotkey unregister failure"));
        }
        Ok(())
    }

    fn is_registered(&self) -> bool {
        match self.state.active.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }
}

pub struct MockHotkeyHandle {
    state: Arc<MockHotkeyState>,
}

impl MockHotkeyHandle {
    pub fn register_count(&self) -> usize {
        self.state.register_count.load(Ordering::SeqCst)
    }

    pub fn unregister_count(&self) -> usize {
        self.state.unregister_count.load(Ordering::SeqCst)
    }

    pub fn fail_unregister(&self, fail: bool) {
        self.state.fail_unregister.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Feeds one key event. Returns the command it queued, if any; nothing
    /// is queued while unregistered.
    pub fn input(&self, input: KeyInput) -> Option<OverlayCommand> {
        let mut guard = self.state.active.lock().ok()?;
        guard.as_mut()?.feed(input)
    }

    /// Press and release of `key` with no modifiers held.
    pub fn tap(&self, key: KeyCode) -> Option<OverlayCommand> {
        let command = self.input(KeyInput::Press(key));
        self.input(KeyInput::Release(key));
        command
    }
}
