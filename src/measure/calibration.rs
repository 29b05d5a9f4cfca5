use std::collections::VecDeque;

/// Meters per pixel. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(meters_per_pixel: f64) -> Option<Self> {
        (meters_per_pixel.is_finite() && meters_per_pixel > 0.0).then_some(Self(meters_per_pixel))
    }

    pub fn from_calibration(real_length_meters: f64, pixel_distance: f64) -> Option<Self> {
        if pixel_distance <= 0.0 || !pixel_distance.is_finite() {
            return None;
        }
        Self::new(real_length_meters / pixel_distance)
    }

    pub fn meters_per_pixel(self) -> f64 {
        self.0
    }

    pub fn to_meters(self, pixels: f64) -> f64 {
        pixels * self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationState {
    Uncalibrated,
    PromptOpen { pixel_distance: f64 },
    Calibrated(ScaleFactor),
}

impl CalibrationState {
    /// True while drags feed calibration instead of producing segments.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Calibrated(_))
    }

    pub fn is_dialog_open(self) -> bool {
        matches!(self, Self::PromptOpen { .. })
    }

    pub fn scale_factor(self) -> Option<ScaleFactor> {
        match self {
            Self::Calibrated(scale) => Some(scale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Submitted(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationRejection {
    Cancelled,
    Empty,
    NotANumber,
    NonPositive,
    PromptAlreadyOpen,
    NoPromptOpen,
    AlreadyCalibrated,
}

impl CalibrationRejection {
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Cancelled | Self::Empty => {
                "Calibration cancelled or no number entered.\nDrag again with the right button."
            }
            Self::NotANumber => {
                "Could not read a number. Calibration not applied.\nDrag again with the right button."
            }
            Self::NonPositive => {
                "The length must be greater than zero. Calibration not applied.\nDrag again with the right button."
            }
            Self::PromptAlreadyOpen => {
                "The calibration prompt is already open.\nEnter a number or close the prompt."
            }
            Self::NoPromptOpen => "No calibration prompt is open.",
            Self::AlreadyCalibrated => "Already calibrated. Press the recalibrate hotkey to start over.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationOutcome {
    PromptOpened { pixel_distance: f64 },
    Calibrated(ScaleFactor),
    Rejected(CalibrationRejection),
}

/// Parses a real-world length typed by the user. Both `.` and `,` are
/// accepted as the decimal separator.
pub fn parse_real_length(text: &str) -> Result<f64, CalibrationRejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CalibrationRejection::Empty);
    }

    let value: f64 = trimmed
        .replace(',', ".")
        .parse()
        .map_err(|_| CalibrationRejection::NotANumber)?;
    if !value.is_finite() {
        return Err(CalibrationRejection::NotANumber);
    }
    if value <= 0.0 {
        return Err(CalibrationRejection::NonPositive);
    }
    Ok(value)
}

pub fn prompt_message(pixel_distance: f64) -> String {
    format!("You dragged {pixel_distance:.1} px.\nHow many meters is that?")
}

/// Collaborator that asks the user for the real length of a calibration drag.
pub trait CalibrationPrompt {
    fn ask_real_length(&mut self, pixel_distance: f64) -> PromptResponse;
}

/// Prompt that replays canned answers and records what it was asked.
/// Once the script runs out every further request is cancelled.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    responses: VecDeque<PromptResponse>,
    asked: Vec<f64>,
}

impl ScriptedPrompt {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = PromptResponse>,
    {
        Self {
            responses: responses.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::new([PromptResponse::Submitted(text.to_string())])
    }

    pub fn asked(&self) -> &[f64] {
        &self.asked
    }
}

impl CalibrationPrompt for ScriptedPrompt {
    fn ask_real_length(&mut self, pixel_distance: f64) -> PromptResponse {
        self.asked.push(pixel_distance);
        self.responses
            .pop_front()
            .unwrap_or(PromptResponse::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEngine {
    state: CalibrationState,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self {
            state: CalibrationState::Uncalibrated,
        }
    }
}

impl CalibrationEngine {
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn scale_factor(&self) -> Option<ScaleFactor> {
        self.state.scale_factor()
    }

    pub fn pending_prompt(&self) -> Option<f64> {
        match self.state {
            CalibrationState::PromptOpen { pixel_distance } => Some(pixel_distance),
            _ => None,
        }
    }

    /// Opens the prompt for a drag that passed the click filter.
    pub fn handle_measured_drag(&mut self, pixel_distance: f64) -> CalibrationOutcome {
        match self.state {
            CalibrationState::PromptOpen { .. } => {
                tracing::debug!(pixel_distance, "calibration drag rejected: prompt already open");
                CalibrationOutcome::Rejected(CalibrationRejection::PromptAlreadyOpen)
            }
            CalibrationState::Calibrated(_) => {
                CalibrationOutcome::Rejected(CalibrationRejection::AlreadyCalibrated)
            }
            CalibrationState::Uncalibrated => {
                self.state = CalibrationState::PromptOpen { pixel_distance };
                tracing::debug!(pixel_distance, "calibration prompt opened");
                CalibrationOutcome::PromptOpened { pixel_distance }
            }
        }
    }

    pub fn resolve_prompt(&mut self, response: PromptResponse) -> CalibrationOutcome {
        let CalibrationState::PromptOpen { pixel_distance } = self.state else {
            return CalibrationOutcome::Rejected(CalibrationRejection::NoPromptOpen);
        };

        let parsed = match response {
            PromptResponse::Cancelled => Err(CalibrationRejection::Cancelled),
            PromptResponse::Submitted(text) => parse_real_length(&text),
        };

        match parsed.and_then(|meters| {
            ScaleFactor::from_calibration(meters, pixel_distance)
                .ok_or(CalibrationRejection::NonPositive)
        }) {
            Ok(scale) => {
                self.state = CalibrationState::Calibrated(scale);
                tracing::info!(
                    meters_per_pixel = scale.meters_per_pixel(),
                    "calibration succeeded"
                );
                CalibrationOutcome::Calibrated(scale)
            }
            Err(rejection) => {
                self.state = CalibrationState::Uncalibrated;
                tracing::debug!(?rejection, "calibration failed");
                CalibrationOutcome::Rejected(rejection)
            }
        }
    }

    /// Drops the current scale so the next valid drag calibrates again.
    /// An already open prompt stays open; its answer becomes the new scale.
    pub fn recalibrate(&mut self) {
        if !self.state.is_dialog_open() {
            self.state = CalibrationState::Uncalibrated;
        }
    }
}
