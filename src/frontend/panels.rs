//! Panel components for the frontend UI
//!
//! Each panel renders one area of the window and reports what the user asked
//! for as [`UiAction`]s; the application applies them after rendering.
//!
//! # Panels
//!
//! - [`ConnectionPanel`] - Port selection, baud rate and connect controls
//! - [`MotorPanel`] - Motor selection, motion, servo and speed controls
//! - [`DeckPanel`] - Record/playback controls and return-to-home
//! - [`LogPanel`] - Scrolling log of traffic and status messages

use crate::console::HELP_TEXT;
use crate::recording::{DeckAction, DeckState};
use crate::types::{
    Command, ConnectionStatus, Motor, MotorSelection, PortInfo, MAX_STEP_DELAY_US,
    MIN_STEP_DELAY_US,
};
use egui::{Color32, RichText, Ui};

use super::log_view::{LogKind, LogView};

/// Baud rates offered in the connection bar
pub const BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 115200, 250000];

/// Something the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    /// Re-enumerate serial ports
    RefreshPorts,
    /// Open a port
    Connect { port: String, baud_rate: u32 },
    /// Close the port
    Disconnect,
    /// Write commands
    Send(Vec<Command>),
    /// Run a deck action
    Deck(DeckAction),
    /// Undo journaled motion
    Home,
    /// Truncate the operation log file
    ResetOperationLog,
    /// Clear the log panel
    ClearLog,
    /// Switch between the mock port and real ports
    #[cfg(feature = "mock-port")]
    UseMockPort(bool),
}

/// Color and text for a connection status
pub fn status_style(status: ConnectionStatus) -> (Color32, &'static str) {
    match status {
        ConnectionStatus::Disconnected => (Color32::GRAY, "Disconnected"),
        ConnectionStatus::Connecting => (Color32::YELLOW, "Connecting..."),
        ConnectionStatus::Connected => (Color32::GREEN, "Connected"),
        ConnectionStatus::Error => (Color32::RED, "Error"),
    }
}

/// Data the connection bar needs
pub struct ConnectionContext<'a> {
    pub ports: &'a [PortInfo],
    pub status: ConnectionStatus,
    pub connected_port: Option<&'a str>,
    #[cfg(feature = "mock-port")]
    pub use_mock: bool,
}

/// Renders the connection bar
pub struct ConnectionPanel;

impl ConnectionPanel {
    /// Render port selection and connect/disconnect controls
    pub fn render(
        ui: &mut Ui,
        ctx: &ConnectionContext<'_>,
        selected_port: &mut Option<String>,
        baud_rate: &mut u32,
        actions: &mut Vec<UiAction>,
    ) {
        ui.horizontal(|ui| {
            let (status_color, status_text) = status_style(ctx.status);
            ui.colored_label(status_color, "●");
            match ctx.connected_port {
                Some(port) if ctx.status == ConnectionStatus::Connected => {
                    ui.label(format!("{}: {}", status_text, port));
                }
                _ => {
                    ui.label(status_text);
                }
            }

            ui.separator();

            let port_text = selected_port
                .clone()
                .unwrap_or_else(|| "Select port...".to_string());
            egui::ComboBox::from_id_salt("connection_port_selector")
                .selected_text(port_text)
                .width(200.0)
                .show_ui(ui, |ui| {
                    if ctx.ports.is_empty() {
                        ui.label("No ports found");
                    }
                    for port in ctx.ports {
                        let selected = selected_port.as_deref() == Some(port.name.as_str());
                        if ui.selectable_label(selected, port.to_string()).clicked() {
                            *selected_port = Some(port.name.clone());
                        }
                    }
                });

            if ui.button("⟳").on_hover_text("Refresh ports").clicked() {
                actions.push(UiAction::RefreshPorts);
            }

            egui::ComboBox::from_id_salt("connection_baud_selector")
                .selected_text(baud_rate.to_string())
                .width(80.0)
                .show_ui(ui, |ui| {
                    for rate in BAUD_RATES {
                        ui.selectable_value(baud_rate, rate, rate.to_string());
                    }
                });

            #[cfg(feature = "mock-port")]
            {
                let mut use_mock = ctx.use_mock;
                if ui.checkbox(&mut use_mock, "Mock").changed() {
                    actions.push(UiAction::UseMockPort(use_mock));
                }
            }

            match ctx.status {
                ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                    let response = ui
                        .add_enabled(selected_port.is_some(), egui::Button::new("🔌 Connect"))
                        .on_hover_text("Open the selected port");
                    if response.clicked() {
                        if let Some(port) = selected_port.clone() {
                            actions.push(UiAction::Connect {
                                port,
                                baud_rate: *baud_rate,
                            });
                        }
                    }
                }
                ConnectionStatus::Connecting => {
                    ui.add_enabled(false, egui::Button::new("⏳ Connecting..."));
                }
                ConnectionStatus::Connected => {
                    if ui.button("🔌 Disconnect").clicked() {
                        actions.push(UiAction::Disconnect);
                    }
                }
            }
        });
    }
}

/// Renders motor, servo and speed controls
pub struct MotorPanel;

impl MotorPanel {
    /// Render the motor controls
    ///
    /// Motion buttons fan out to every checked motor; servo buttons always
    /// address the servo.
    pub fn render(
        ui: &mut Ui,
        enabled: bool,
        selection: &mut MotorSelection,
        step_delay: &mut u16,
        actions: &mut Vec<UiAction>,
    ) {
        ui.heading("Motors");
        ui.horizontal(|ui| {
            for motor in Motor::steppers() {
                let mut checked = selection.contains(motor);
                let label = format!("{} {}", motor, motor.label());
                if ui.checkbox(&mut checked, label).changed() {
                    selection.set(motor, checked);
                }
            }
        });
        ui.horizontal(|ui| {
            if ui.button("All").clicked() {
                for motor in Motor::steppers() {
                    selection.set(motor, true);
                }
            }
            if ui.button("None").clicked() {
                selection.clear();
            }
            ui.label(
                RichText::new(if selection.is_empty() {
                    "no motor selected".to_string()
                } else {
                    selection.to_string()
                })
                .weak(),
            );
        });

        ui.add_enabled_ui(enabled && !selection.is_empty(), |ui| {
            ui.horizontal(|ui| {
                for command in [Command::Backward, Command::Stop, Command::Forward] {
                    let text = match command {
                        Command::Backward => "◀ Backward (a)",
                        Command::Stop => "■ Stop (w)",
                        _ => "Forward (d) ▶",
                    };
                    if ui.button(text).clicked() {
                        actions.push(UiAction::Send(selection.fan_out(command)));
                    }
                }
            });
        });

        ui.separator();
        ui.heading("Gripper servo");
        ui.add_enabled_ui(enabled, |ui| {
            ui.horizontal(|ui| {
                let servo = [
                    (Command::Backward, "-60°"),
                    (Command::ServoDown, "-15°"),
                    (Command::ServoZero, "0°"),
                    (Command::ServoUp, "+15°"),
                    (Command::Forward, "+60°"),
                ];
                for (command, text) in servo {
                    if ui
                        .button(text)
                        .on_hover_text(command.description())
                        .clicked()
                    {
                        actions.push(UiAction::Send(vec![
                            Command::SelectMotor(Motor::SERVO),
                            command,
                        ]));
                    }
                }
            });
        });

        ui.separator();
        ui.heading("Speed");
        ui.add_enabled_ui(enabled, |ui| {
            ui.horizontal(|ui| {
                ui.label("Step delay:");
                let response = ui.add(
                    egui::Slider::new(step_delay, MIN_STEP_DELAY_US..=MAX_STEP_DELAY_US)
                        .suffix(" µs")
                        .logarithmic(true),
                );
                // Only send once the value settles
                if response.drag_stopped() || (response.changed() && !response.dragged()) {
                    actions.push(UiAction::Send(vec![Command::step_delay(*step_delay)]));
                }
            });
        });
    }
}

/// Data the deck panel needs
pub struct DeckContext<'a> {
    pub state: DeckState,
    pub enabled: bool,
    pub recorded_events: Option<usize>,
    pub pending_events: usize,
    pub elapsed_secs: Option<f64>,
    pub status: Option<&'a str>,
}

/// Renders record/playback controls
pub struct DeckPanel;

impl DeckPanel {
    /// Render the deck controls
    pub fn render(
        ui: &mut Ui,
        ctx: &DeckContext<'_>,
        loop_playback: &mut bool,
        actions: &mut Vec<UiAction>,
    ) {
        ui.heading("Record / Playback");

        ui.horizontal(|ui| {
            let state_color = match ctx.state {
                DeckState::Idle => Color32::GRAY,
                DeckState::Recording => Color32::RED,
                DeckState::Playing => Color32::GREEN,
            };
            ui.colored_label(state_color, format!("● {}", ctx.state));
            if let Some(secs) = ctx.elapsed_secs {
                ui.label(RichText::new(format!("{:.1}s", secs)).monospace());
            }
            match ctx.state {
                DeckState::Recording => {
                    ui.label(format!("{} commands", ctx.pending_events));
                }
                _ => {
                    if let Some(count) = ctx.recorded_events {
                        ui.label(format!("{} commands recorded", count));
                    }
                }
            }
        });

        ui.horizontal(|ui| {
            let idle = ctx.state.is_idle();
            let buttons = [
                (DeckAction::StartRecording, "⏺ Record", idle),
                (DeckAction::StopRecording, "⏹ Stop rec", ctx.state.is_recording()),
                (
                    DeckAction::Play,
                    "▶ Play",
                    idle && ctx.enabled && ctx.recorded_events.is_some_and(|n| n > 0),
                ),
                (DeckAction::StopPlayback, "⏹ Stop", ctx.state.is_playing()),
            ];
            for (action, text, enabled) in buttons {
                let response = ui
                    .add_enabled(enabled, egui::Button::new(text))
                    .on_hover_text(format!("{} ({})", action.label(), action.key()));
                if response.clicked() {
                    actions.push(UiAction::Deck(action));
                }
            }
            if ui.checkbox(loop_playback, "Loop").changed() {
                actions.push(UiAction::Deck(DeckAction::ToggleLoop));
            }
        });

        ui.horizontal(|ui| {
            let idle = ctx.state.is_idle();
            if ui
                .add_enabled(idle, egui::Button::new("📂 Load..."))
                .clicked()
            {
                actions.push(UiAction::Deck(DeckAction::Load));
            }
            if ui
                .add_enabled(ctx.recorded_events.is_some(), egui::Button::new("💾 Save..."))
                .clicked()
            {
                actions.push(UiAction::Deck(DeckAction::Save));
            }
            ui.separator();
            if ui
                .add_enabled(idle && ctx.enabled, egui::Button::new("🏠 Home"))
                .on_hover_text("Reverse recent motion (G)")
                .clicked()
            {
                actions.push(UiAction::Home);
            }
        });

        if let Some(status) = ctx.status {
            ui.label(RichText::new(status).weak());
        }
    }
}

/// Renders the scrolling log
pub struct LogPanel;

impl LogPanel {
    /// Render the log with its toolbar
    pub fn render(ui: &mut Ui, log: &LogView, show_help: &mut bool, actions: &mut Vec<UiAction>) {
        ui.horizontal(|ui| {
            ui.heading("Log");
            if ui.button("Clear").clicked() {
                actions.push(UiAction::ClearLog);
            }
            if ui
                .button("Reset ops log")
                .on_hover_text("Truncate the operation log file")
                .clicked()
            {
                actions.push(UiAction::ResetOperationLog);
            }
            ui.toggle_value(show_help, "Keys");
        });

        if *show_help {
            ui.label(RichText::new(HELP_TEXT).monospace().small());
            ui.separator();
        }

        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for line in log.lines() {
                    let (color, prefix) = match line.kind {
                        LogKind::Sent => (Color32::LIGHT_BLUE, ">"),
                        LogKind::Received => (Color32::LIGHT_GREEN, "<"),
                        LogKind::Info => (Color32::GRAY, "·"),
                        LogKind::Error => (Color32::LIGHT_RED, "!"),
                    };
                    ui.label(
                        RichText::new(format!("{} {} {}", line.time, prefix, line.text))
                            .monospace()
                            .color(color),
                    );
                }
                if !log.partial().is_empty() {
                    ui.label(
                        RichText::new(format!("  < {}", log.partial()))
                            .monospace()
                            .color(Color32::LIGHT_GREEN),
                    );
                }
            });
    }
}
