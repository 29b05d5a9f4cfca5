#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    PassThrough,
    Measuring,
}

impl InputMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::PassThrough => Self::Measuring,
            Self::Measuring => Self::PassThrough,
        }
    }
}

/// What the input hook should do with secondary-button events.
/// Primary-button and move events are never captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureState {
    /// Queue secondary-button events to the overlay.
    pub forward_secondary: bool,
    /// Hide secondary-button events from the application underneath.
    pub block_secondary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputModeController {
    mode: InputMode,
    suppressed: bool,
}

impl InputModeController {
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn is_measuring(&self) -> bool {
        self.mode == InputMode::Measuring
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn toggle(&mut self) -> InputMode {
        self.mode = self.mode.toggled();
        tracing::debug!(mode = ?self.mode, "input mode toggled");
        self.mode
    }

    pub fn force_measuring(&mut self) {
        self.mode = InputMode::Measuring;
    }

    /// Stops blocking secondary-button events while a modal prompt is up.
    /// Events keep flowing to the overlay so late drags can be rejected.
    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub fn restore(&mut self) {
        self.suppressed = false;
    }

    pub fn capture(&self) -> CaptureState {
        let measuring = self.is_measuring();
        CaptureState {
            forward_secondary: measuring,
            block_secondary: measuring && !self.suppressed,
        }
    }
}
