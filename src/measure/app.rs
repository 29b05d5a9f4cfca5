use crate::hotkey::RdevHotkeySource;
use crate::measure::calibration::PromptResponse;
use crate::measure::gesture::GestureClassifier;
use crate::measure::hook::DefaultHookBackend;
use crate::measure::messages::{EventDispatcher, OverlayCommand, OverlayEvent};
use crate::measure::presenter::{build_frame, OverlayFrame, PresenterStyle, SegmentShape};
use crate::measure::runtime::OverlayRuntime;
use crate::measure::session::MeasureSession;
use crate::settings::MeasureSettings;
use anyhow::anyhow;
use eframe::egui;
use std::time::Duration;

/// How often the cursor is polled while the window ignores the mouse.
const HOVER_POLL: Duration = Duration::from_millis(50);

pub fn native_options() -> eframe::NativeOptions {
    eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Measure overlay")
            .with_transparent(true)
            .with_decorations(false)
            .with_always_on_top()
            .with_fullscreen(true)
            .with_taskbar(false)
            .with_mouse_passthrough(true),
        ..Default::default()
    }
}

/// Runs the overlay until it is torn down.
pub fn run(settings: MeasureSettings) -> anyhow::Result<()> {
    eframe::run_native(
        "measure_overlay",
        native_options(),
        Box::new(move |cc| Box::new(MeasureApp::new(cc, &settings))),
    )
    .map_err(|e| anyhow!("overlay window failed: {e}"))
}

pub struct MeasureApp {
    session: MeasureSession,
    runtime: OverlayRuntime,
    style: PresenterStyle,
    dialog_input: String,
    dialog_needs_focus: bool,
    passthrough: bool,
    panel_rect: Option<egui::Rect>,
    dialog_rect: Option<egui::Rect>,
    closing: bool,
}

impl MeasureApp {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: &MeasureSettings) -> Self {
        let bindings = settings.bindings();
        let ctx = cc.egui_ctx.clone();
        let (dispatcher, events) = EventDispatcher::channel();
        // request_repaint takes the context lock, so it must not run on the
        // hook thread.
        let dispatcher = match dispatcher
            .clone()
            .with_deferred_waker(move || ctx.request_repaint())
        {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                tracing::error!(?err, "failed to start repaint waker");
                dispatcher
            }
        };

        let runtime = OverlayRuntime::start(
            Box::new(DefaultHookBackend::default()),
            Box::new(RdevHotkeySource::default()),
            &bindings,
            dispatcher,
            events,
        );
        let session = MeasureSession::new(
            GestureClassifier::new(settings.min_drag_distance()),
            bindings.help_text(),
        );
        tracing::info!(
            hook = runtime.hook_installed(),
            hotkeys = runtime.hotkeys_registered(),
            "overlay started"
        );

        Self {
            session,
            runtime,
            style: settings.presenter_style(),
            dialog_input: String::new(),
            dialog_needs_focus: false,
            passthrough: true,
            panel_rect: None,
            dialog_rect: None,
            closing: false,
        }
    }

    fn close(&mut self, ctx: &egui::Context) {
        if self.closing {
            return;
        }
        self.closing = true;
        let report = self.runtime.teardown();
        for (step, err) in &report.errors {
            tracing::warn!(?step, ?err, "teardown step failed");
        }
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn apply(&mut self, command: OverlayCommand) {
        self.session.handle_event(OverlayEvent::Command(command));
        self.runtime.sync_capture(&self.session);
    }

    fn paint_segments(&self, ctx: &egui::Context, frame: &OverlayFrame) {
        let ppp = ctx.pixels_per_point();
        let painter = ctx.layer_painter(egui::LayerId::new(
            egui::Order::Background,
            egui::Id::new("measure_segments"),
        ));
        let [r, g, b, a] = self.style.line_color;
        let color = egui::Color32::from_rgba_unmultiplied(r, g, b, a);
        let stroke = egui::Stroke::new(self.style.line_width, color);
        let font = egui::FontId::proportional(self.style.label_font_size);

        for SegmentShape {
            start,
            end,
            arrow,
            label,
            label_position,
        } in &frame.segments
        {
            painter.line_segment([to_pos(*start, ppp), to_pos(*end, ppp)], stroke);
            painter.add(egui::Shape::convex_polygon(
                arrow.iter().map(|p| to_pos(*p, ppp)).collect(),
                color,
                egui::Stroke::NONE,
            ));
            painter.text(
                to_pos(*label_position, ppp),
                egui::Align2::LEFT_BOTTOM,
                label,
                font.clone(),
                color,
            );
        }
    }

    fn show_status_panel(&mut self, ctx: &egui::Context, frame: &OverlayFrame) {
        let ppp = ctx.pixels_per_point();
        let mut clicked = None;
        let response = egui::Area::new(egui::Id::new("measure_status"))
            .fixed_pos(to_pos(frame.status.origin, ppp))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.strong(frame.status.header.as_str());
                        if ui.button("✕").on_hover_text("Close overlay").clicked() {
                            clicked = Some(OverlayCommand::Close);
                        }
                    });
                    ui.label(frame.status.text.as_str());
                    if ui.button("Clear all").clicked() {
                        clicked = Some(OverlayCommand::ClearAll);
                    }
                });
            });
        self.panel_rect = Some(response.response.rect);
        if let Some(command) = clicked {
            self.apply(command);
        }
    }

    fn show_dialog(&mut self, ctx: &egui::Context, frame: &OverlayFrame) {
        let Some(dialog) = &frame.dialog else {
            self.dialog_rect = None;
            self.dialog_input.clear();
            self.dialog_needs_focus = true;
            return;
        };
        if self.dialog_needs_focus {
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }

        let mut response = None;
        let shown = egui::Window::new("Calibration")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(dialog.message.as_str());
                let edit = ui.text_edit_singleline(&mut self.dialog_input);
                if self.dialog_needs_focus {
                    edit.request_focus();
                    self.dialog_needs_focus = false;
                }
                let (enter, escape) = ui.input(|i| {
                    (
                        i.key_pressed(egui::Key::Enter),
                        i.key_pressed(egui::Key::Escape),
                    )
                });
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() || enter {
                        response = Some(PromptResponse::Submitted(self.dialog_input.clone()));
                    }
                    if ui.button("Cancel").clicked() || escape {
                        response = Some(PromptResponse::Cancelled);
                    }
                });
            });
        self.dialog_rect = shown.map(|inner| inner.response.rect);

        if let Some(response) = response {
            self.session.resolve_prompt(response);
            self.runtime.sync_capture(&self.session);
        }
    }

    /// The window takes the mouse only while the cursor is over the status
    /// panel or the calibration dialog. Everywhere else clicks reach the
    /// application underneath, even with the dialog open.
    fn update_passthrough(&mut self, ctx: &egui::Context) {
        let regions: Vec<egui::Rect> = [self.panel_rect, self.dialog_rect]
            .into_iter()
            .flatten()
            .collect();
        let interactive =
            cursor_over_regions(cursor_position(ctx), ctx.pixels_per_point(), &regions);
        let passthrough = !interactive;
        if passthrough != self.passthrough {
            self.passthrough = passthrough;
            ctx.send_viewport_cmd(egui::ViewportCommand::MousePassthrough(passthrough));
        }
        if passthrough {
            ctx.request_repaint_after(HOVER_POLL);
        }
    }
}

impl eframe::App for MeasureApp {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        [0.0, 0.0, 0.0, 0.0]
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.close(ctx);
            return;
        }

        self.runtime.pump(&mut self.session);
        if self.session.close_requested() {
            self.close(ctx);
            return;
        }

        let frame = build_frame(&self.session, &self.style);
        self.paint_segments(ctx, &frame);
        self.show_status_panel(ctx, &frame);
        self.show_dialog(ctx, &frame);

        if self.session.close_requested() {
            self.close(ctx);
            return;
        }
        self.update_passthrough(ctx);
        if self.session.take_redraw() {
            ctx.request_repaint();
        }
    }
}

/// Whether a cursor given in screen pixels lies inside any of `regions`,
/// which are in egui points.
fn cursor_over_regions(
    cursor: Option<(f32, f32)>,
    pixels_per_point: f32,
    regions: &[egui::Rect],
) -> bool {
    let Some((x, y)) = cursor else {
        return false;
    };
    let pos = egui::pos2(x / pixels_per_point, y / pixels_per_point);
    regions.iter().any(|rect| rect.contains(pos))
}

fn to_pos(point: (f64, f64), pixels_per_point: f32) -> egui::Pos2 {
    egui::pos2(
        point.0 as f32 / pixels_per_point,
        point.1 as f32 / pixels_per_point,
    )
}

/// Cursor position in screen pixels.
#[cfg(windows)]
fn cursor_position(_ctx: &egui::Context) -> Option<(f32, f32)> {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

    let mut point = POINT { x: 0, y: 0 };
    if unsafe { GetCursorPos(&mut point).is_ok() } {
        Some((point.x as f32, point.y as f32))
    } else {
        None
    }
}

#[cfg(not(windows))]
fn cursor_position(ctx: &egui::Context) -> Option<(f32, f32)> {
    let ppp = ctx.pixels_per_point();
    ctx.input(|i| i.pointer.hover_pos())
        .map(|pos| (pos.x * ppp, pos.y * ppp))
}
