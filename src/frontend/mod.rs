//! Frontend module for egui UI
//!
//! This module provides the robot control window using eframe/egui. It sends
//! commands to the backend through crossbeam channels and renders the
//! connection state, the record/playback deck and the traffic log.
//!
//! # Main Types
//!
//! - [`RobotControlApp`] - Main application state implementing [`eframe::App`]
//!
//! # Submodules
//!
//! - `panels` - Connection, motor, deck and log panels
//! - `log_view` - Bounded scrollback for the log panel

mod log_view;
mod panels;

pub use log_view::{LogKind, LogLine, LogView};
pub use panels::*;

use std::path::PathBuf;

use crate::backend::{BackendMessage, FrontendReceiver};
use crate::config::{AppConfig, RECORDING_FILE_EXTENSION};
use crate::console::{ConsoleAction, KeyParser};
use crate::error::RobotError;
use crate::oplog::OperationLog;
use crate::recording::{DeckAction, PlaybackEvent, PlaybackOutcome, RecordingDeck};
use crate::types::{Command, ConnectionStatus, Motor, MotorSelection, PortInfo, DEFAULT_STEP_DELAY_US};

/// Main application state for the robot control window
pub struct RobotControlApp {
    // === Communication ===
    frontend: FrontendReceiver,

    // === Configuration ===
    config: AppConfig,

    // === Connection ===
    ports: Vec<PortInfo>,
    selected_port: Option<String>,
    baud_rate: u32,
    connection_status: ConnectionStatus,
    connected_port: Option<String>,
    #[cfg(feature = "mock-port")]
    use_mock: bool,

    // === Controls ===
    selection: MotorSelection,
    step_delay: u16,
    key_parser: KeyParser,

    // === Record / playback ===
    deck: RecordingDeck,
    recording_path: PathBuf,
    deck_status: Option<String>,

    // === Log ===
    log: LogView,
    show_help: bool,
}

impl RobotControlApp {
    /// Create the application and request an initial port list
    pub fn new(_cc: &eframe::CreationContext<'_>, frontend: FrontendReceiver, config: AppConfig) -> Self {
        let mut deck =
            RecordingDeck::new().with_operation_log(OperationLog::from_config(&config.operation_log));
        deck.set_loop_playback(config.recording.loop_playback);

        let mut selection = MotorSelection::new();
        if let Some(first) = Motor::new(1) {
            selection.set(first, true);
        }

        frontend.refresh_ports();

        Self {
            baud_rate: config.serial.baud_rate,
            selected_port: config.serial.preferred_port.clone(),
            recording_path: config.recording.default_path.clone(),
            frontend,
            config,
            ports: Vec::new(),
            connection_status: ConnectionStatus::Disconnected,
            connected_port: None,
            #[cfg(feature = "mock-port")]
            use_mock: false,
            selection,
            step_delay: DEFAULT_STEP_DELAY_US,
            key_parser: KeyParser::new(),
            deck,
            deck_status: None,
            log: LogView::default(),
            show_help: false,
        }
    }

    fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    /// Apply backend messages; returns true if anything arrived
    fn process_backend_messages(&mut self) -> bool {
        let messages = self.frontend.drain();
        let had_messages = !messages.is_empty();

        for msg in messages {
            match msg {
                BackendMessage::ConnectionStatus(status) => {
                    self.connection_status = status;
                    if status != ConnectionStatus::Connected {
                        self.connected_port = None;
                    }
                }
                BackendMessage::Connected { port, baud_rate } => {
                    self.log
                        .push(LogKind::Info, format!("Connected to {} @ {} baud", port, baud_rate));
                    self.selected_port = Some(port.clone());
                    self.connected_port = Some(port);
                }
                BackendMessage::ConnectionError(err) => {
                    self.log.push(LogKind::Error, err);
                }
                BackendMessage::Received(text) => {
                    self.log.push_received(&text);
                }
                BackendMessage::Sent { command, at } => {
                    self.deck.note_sent_at(command, at);
                    self.log.push(LogKind::Sent, command.to_string());
                }
                BackendMessage::SendError(err) => {
                    self.log.push(LogKind::Error, format!("Send failed: {}", err));
                }
                BackendMessage::PortList(ports) => {
                    tracing::debug!("Received {} ports", ports.len());
                    let still_present = self
                        .selected_port
                        .as_ref()
                        .is_some_and(|p| ports.iter().any(|info| &info.name == p));
                    if !still_present {
                        self.selected_port = ports.first().map(|p| p.name.clone());
                    }
                    self.ports = ports;
                }
                BackendMessage::Shutdown => {
                    tracing::info!("Backend shutdown received");
                }
            }
        }

        for event in self.deck.drain_events() {
            match event {
                PlaybackEvent::Sent { command, .. } => {
                    self.log.push(LogKind::Sent, command.to_string());
                }
                PlaybackEvent::Finished(outcome) => {
                    let kind = if matches!(outcome, PlaybackOutcome::Failed { .. }) {
                        LogKind::Error
                    } else {
                        LogKind::Info
                    };
                    let text = outcome.to_string();
                    self.log.push(kind, text.clone());
                    self.deck_status = Some(text);
                }
                PlaybackEvent::Started { .. } => {}
            }
        }

        had_messages
    }

    /// Feed typed characters through the console key map
    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }

        let typed: Vec<char> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|e| match e {
                    egui::Event::Text(text) => Some(text.chars().collect::<Vec<_>>()),
                    _ => None,
                })
                .flatten()
                .collect()
        });

        for ch in typed {
            let Some(action) = self.key_parser.feed(ch) else {
                continue;
            };
            match action {
                ConsoleAction::Quit => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
                ConsoleAction::Help => self.show_help = !self.show_help,
                ConsoleAction::Send(command) => self.apply(UiAction::Send(vec![command])),
                ConsoleAction::Deck(action) => self.apply(UiAction::Deck(action)),
                ConsoleAction::Home => self.apply(UiAction::Home),
                ConsoleAction::Invalid(input) => {
                    self.log
                        .push(LogKind::Error, format!("Unrecognized input {:?}", input));
                }
            }
        }
    }

    /// Ask for a recording path; `None` when the dialog was cancelled
    fn pick_recording_path(&self, save: bool) -> Option<PathBuf> {
        let dialog = rfd::FileDialog::new()
            .add_filter("Robot recording", &[RECORDING_FILE_EXTENSION])
            .set_file_name(
                self.recording_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "recording.json".to_string()),
            );
        let dialog = match self.recording_path.parent() {
            Some(dir) if dir.is_dir() => dialog.set_directory(dir),
            _ => dialog,
        };

        if save {
            dialog.set_title("Save Recording").save_file()
        } else {
            dialog.set_title("Load Recording").pick_file()
        }
    }

    fn run_deck_action(&mut self, action: DeckAction) {
        let path = match action {
            DeckAction::Load => self.pick_recording_path(false),
            DeckAction::Save => self.pick_recording_path(true),
            _ => Some(self.recording_path.clone()),
        };
        let Some(path) = path else {
            return;
        };

        match self.deck.handle_action(action, &self.frontend.session, &path) {
            Ok(status) => {
                if matches!(action, DeckAction::Load | DeckAction::Save) {
                    self.recording_path = path;
                }
                self.log.push(LogKind::Info, status.clone());
                self.deck_status = Some(status);
            }
            Err(e) => {
                tracing::warn!("{:?} failed: {}", action, e);
                self.log.push(LogKind::Error, e.to_string());
                self.deck_status = Some(e.to_string());
            }
        }
    }

    /// Apply one user action
    fn apply(&mut self, action: UiAction) {
        match action {
            UiAction::RefreshPorts => self.frontend.refresh_ports(),
            UiAction::Connect { port, baud_rate } => {
                self.log
                    .push(LogKind::Info, format!("Connecting to {} @ {} baud...", port, baud_rate));
                self.frontend.connect(port, baud_rate);
            }
            UiAction::Disconnect => {
                if self.deck.state().is_playing() {
                    let _ = self.deck.stop_playback();
                }
                self.frontend.disconnect();
                self.log.push(LogKind::Info, "Disconnected");
            }
            UiAction::Send(commands) => {
                if !self.is_connected() {
                    self.log.push(LogKind::Error, RobotError::NotConnected.to_string());
                    return;
                }
                if let Some(Command::StepDelay(us)) = commands.last() {
                    self.step_delay = *us;
                }
                self.frontend.send(commands);
            }
            UiAction::Deck(action) => self.run_deck_action(action),
            UiAction::Home => match self.deck.return_home(&self.frontend.session) {
                Ok(count) => {
                    self.log
                        .push(LogKind::Info, format!("Returning home ({} commands)", count));
                }
                Err(RobotError::EmptyRecording) => {
                    self.log.push(LogKind::Info, "Already at home");
                }
                Err(e) => self.log.push(LogKind::Error, e.to_string()),
            },
            UiAction::ResetOperationLog => {
                match self.deck.operation_log() {
                    Some(oplog) => {
                        oplog.reset();
                        self.log.push(
                            LogKind::Info,
                            format!("Operation log reset ({})", oplog.path().display()),
                        );
                    }
                    None => self.log.push(LogKind::Info, "Operation log is disabled"),
                }
            }
            UiAction::ClearLog => self.log.clear(),
            #[cfg(feature = "mock-port")]
            UiAction::UseMockPort(use_mock) => {
                self.use_mock = use_mock;
                self.selected_port = None;
                self.frontend.use_mock_port(use_mock);
            }
        }
    }
}

impl eframe::App for RobotControlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let had_messages = self.process_backend_messages();
        self.handle_keyboard(ctx);

        if had_messages || self.is_connected() || !self.deck.state().is_idle() {
            ctx.request_repaint();
        }

        let mut actions = Vec::new();

        egui::TopBottomPanel::top("connection_bar").show(ctx, |ui| {
            let connection_ctx = ConnectionContext {
                ports: &self.ports,
                status: self.connection_status,
                connected_port: self.connected_port.as_deref(),
                #[cfg(feature = "mock-port")]
                use_mock: self.use_mock,
            };
            ConnectionPanel::render(
                ui,
                &connection_ctx,
                &mut self.selected_port,
                &mut self.baud_rate,
                &mut actions,
            );
        });

        egui::SidePanel::left("controls")
            .resizable(false)
            .min_width(360.0)
            .show(ctx, |ui| {
                let connected = self.is_connected();
                MotorPanel::render(
                    ui,
                    connected,
                    &mut self.selection,
                    &mut self.step_delay,
                    &mut actions,
                );

                ui.separator();

                let deck_ctx = DeckContext {
                    state: self.deck.state(),
                    enabled: connected,
                    recorded_events: self.deck.recording().map(|r| r.len()),
                    pending_events: self.deck.pending_events(),
                    elapsed_secs: self.deck.elapsed().map(|d| d.as_secs_f64()),
                    status: self.deck_status.as_deref(),
                };
                let mut loop_playback = self.deck.loop_playback();
                DeckPanel::render(ui, &deck_ctx, &mut loop_playback, &mut actions);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            LogPanel::render(ui, &self.log, &mut self.show_help, &mut actions);
        });

        for action in actions {
            self.apply(action);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if self.deck.state().is_playing() {
            let _ = self.deck.stop_playback();
        }
        self.frontend.shutdown();

        if self.config.recording.default_path != self.recording_path {
            tracing::debug!("Last recording path: {:?}", self.recording_path);
        }
    }
}
