use crate::hotkey::{parse_binding, HotkeyBinding, HotkeyBindings};
use crate::measure::gesture::DEFAULT_MIN_DRAG_DISTANCE;
use crate::measure::presenter::PresenterStyle;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "measure_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSettings {
    /// Flips between pass-through and measuring.
    #[serde(default = "default_toggle_hotkey")]
    pub toggle_hotkey: String,
    #[serde(default = "default_recalibrate_hotkey")]
    pub recalibrate_hotkey: String,
    #[serde(default = "default_exit_hotkey")]
    pub exit_hotkey: String,
    /// Two chords separated by a comma, pressed in order.
    #[serde(default = "default_clear_sequence")]
    pub clear_sequence: String,
    /// Secondary-button drags shorter than this are treated as clicks.
    #[serde(default = "default_min_drag_distance")]
    pub min_drag_distance_px: f64,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_line_color")]
    pub line_color: [u8; 4],
    #[serde(default = "default_line_width")]
    pub line_width: f32,
    #[serde(default = "default_arrow_size")]
    pub arrow_size: f64,
    #[serde(default = "default_label_font_size")]
    pub label_font_size: f32,
}

fn default_toggle_hotkey() -> String {
    "=".into()
}

fn default_recalibrate_hotkey() -> String {
    "C".into()
}

fn default_exit_hotkey() -> String {
    "Ctrl+Shift+Q".into()
}

fn default_clear_sequence() -> String {
    "-,=".into()
}

fn default_min_drag_distance() -> f64 {
    DEFAULT_MIN_DRAG_DISTANCE
}

fn default_line_color() -> [u8; 4] {
    [255, 0, 0, 200]
}

fn default_line_width() -> f32 {
    3.0
}

fn default_arrow_size() -> f64 {
    10.0
}

fn default_label_font_size() -> f32 {
    16.0
}

impl Default for MeasureSettings {
    fn default() -> Self {
        Self {
            toggle_hotkey: default_toggle_hotkey(),
            recalibrate_hotkey: default_recalibrate_hotkey(),
            exit_hotkey: default_exit_hotkey(),
            clear_sequence: default_clear_sequence(),
            min_drag_distance_px: default_min_drag_distance(),
            debug_logging: false,
            log_file: None,
            line_color: default_line_color(),
            line_width: default_line_width(),
            arrow_size: default_arrow_size(),
            label_font_size: default_label_font_size(),
        }
    }
}

pub fn settings_path_from_exe_path(exe_path: &Path) -> Result<PathBuf> {
    let parent = exe_path
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe_path.display()))?;
    Ok(parent.join(SETTINGS_FILE_NAME))
}

fn binding_or_default(name: &str, value: &str, fallback: HotkeyBinding) -> HotkeyBinding {
    match parse_binding(value) {
        Some(binding) => binding,
        None => {
            tracing::warn!(
                "provided {} string '{}' is invalid; using default {}",
                name,
                value,
                fallback
            );
            fallback
        }
    }
}

impl MeasureSettings {
    /// `measure_settings.json` next to the running executable.
    pub fn resolve_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("resolve current executable")?;
        settings_path_from_exe_path(&exe_path)
    }

    /// Missing or empty files yield the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read measure settings file {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("deserialize measure settings file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings folder {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize measure settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("write measure settings file {}", path.display()))
    }

    pub fn bindings(&self) -> HotkeyBindings {
        let defaults = HotkeyBindings::default();
        HotkeyBindings {
            toggle: binding_or_default("toggle_hotkey", &self.toggle_hotkey, defaults.toggle),
            recalibrate: binding_or_default(
                "recalibrate_hotkey",
                &self.recalibrate_hotkey,
                defaults.recalibrate,
            ),
            clear_all: binding_or_default(
                "clear_sequence",
                &self.clear_sequence,
                defaults.clear_all,
            ),
            close: binding_or_default("exit_hotkey", &self.exit_hotkey, defaults.close),
        }
    }

    pub fn min_drag_distance(&self) -> f64 {
        if self.min_drag_distance_px.is_finite() && self.min_drag_distance_px > 0.0 {
            self.min_drag_distance_px
        } else {
            tracing::warn!(
                value = self.min_drag_distance_px,
                "invalid min_drag_distance_px; using {DEFAULT_MIN_DRAG_DISTANCE}"
            );
            DEFAULT_MIN_DRAG_DISTANCE
        }
    }

    pub fn presenter_style(&self) -> PresenterStyle {
        let defaults = PresenterStyle::default();
        let positive_f32 = |v: f32, d: f32| if v.is_finite() && v > 0.0 { v } else { d };
        PresenterStyle {
            line_color: self.line_color,
            line_width: positive_f32(self.line_width, defaults.line_width),
            arrow_size: if self.arrow_size.is_finite() && self.arrow_size > 0.0 {
                self.arrow_size
            } else {
                defaults.arrow_size
            },
            label_font_size: positive_f32(self.label_font_size, defaults.label_font_size),
        }
    }
}
