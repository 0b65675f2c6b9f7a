//! Backend Worker Thread Implementation
//!
//! This module contains the main worker loop that runs in a separate thread
//! and owns all interactive serial traffic. It communicates with the UI
//! thread through crossbeam channels.
//!
//! # Responsibilities
//!
//! - **Command processing**: connect, disconnect, send and port refresh
//!   requests from the UI
//! - **Receive polling**: drains bytes the robot sends and forwards them as
//!   text
//! - **Link supervision**: notices when the connection was dropped elsewhere
//!   (for example by a failed playback write) and reports it
//!
//! The worker shares the [`SharedSession`] with the playback thread, so a
//! batch of commands is always written under one lock and never interleaves
//! with playback output.

use crate::backend::session::{connect_shared, SharedSession};
use crate::backend::{BackendCommand, BackendMessage};
use crate::config::AppConfig;
use crate::types::{Command, ConnectionStatus};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "mock-port")]
use crate::backend::{MockPortDriver, SystemPortDriver};

/// The backend worker that runs the polling loop
pub struct BackendWorker {
    /// Application configuration
    config: AppConfig,
    /// Command receiver from the UI
    command_rx: Receiver<BackendCommand>,
    /// Message sender to the UI
    message_tx: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Serial session shared with playback
    session: SharedSession,
    /// Whether currently using the mock port (only with mock-port feature)
    #[cfg(feature = "mock-port")]
    is_mock_port: bool,
    /// Current connection status
    connection_status: ConnectionStatus,
    /// Last poll time for rate limiting
    last_poll_time: Instant,
}

impl BackendWorker {
    /// Create a new backend worker
    pub fn new(
        config: AppConfig,
        session: SharedSession,
        command_rx: Receiver<BackendCommand>,
        message_tx: Sender<BackendMessage>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            command_rx,
            message_tx,
            running,
            session,
            #[cfg(feature = "mock-port")]
            is_mock_port: false,
            connection_status: ConnectionStatus::Disconnected,
            last_poll_time: Instant::now(),
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Backend worker started");

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();

            if self.connection_status == ConnectionStatus::Connected {
                self.poll_incoming();
            }

            self.rate_limit();
        }

        self.session.lock().disconnect();

        let _ = self.message_tx.send(BackendMessage::Shutdown);
        tracing::info!("Backend worker stopped");
    }

    /// Process pending commands from the UI
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::Connect { port, baud_rate } => {
                self.handle_connect(Some(port), baud_rate);
            }
            BackendCommand::ConnectAuto { baud_rate } => {
                self.handle_connect(None, baud_rate);
            }
            BackendCommand::Disconnect => {
                self.handle_disconnect();
            }
            BackendCommand::Send(commands) => {
                self.send_commands(&commands);
            }
            BackendCommand::RefreshPorts => {
                self.refresh_ports();
            }
            BackendCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
            #[cfg(feature = "mock-port")]
            BackendCommand::UseMockPort(use_mock) => {
                if use_mock != self.is_mock_port {
                    if self.connection_status != ConnectionStatus::Disconnected {
                        self.update_connection_status(ConnectionStatus::Disconnected);
                    }
                    let mut session = self.session.lock();
                    if use_mock {
                        session.set_driver(Box::new(MockPortDriver::new()));
                        tracing::info!("Switched to mock port");
                    } else {
                        session.set_driver(Box::new(SystemPortDriver));
                        tracing::info!("Switched to system ports");
                    }
                    drop(session);
                    self.is_mock_port = use_mock;
                    self.refresh_ports();
                }
            }
        }
    }

    /// Refresh the port list and send to UI
    fn refresh_ports(&self) {
        let result = self.session.lock().list_ports();
        match result {
            Ok(ports) => {
                tracing::debug!("Found {} serial port(s)", ports.len());
                let _ = self.message_tx.send(BackendMessage::PortList(ports));
            }
            Err(e) => {
                tracing::warn!("Port enumeration failed: {}", e);
                let _ = self
                    .message_tx
                    .send(BackendMessage::ConnectionError(format!("Port enumeration failed: {}", e)));
            }
        }
    }

    /// Handle connect command (`None` means auto-detect)
    fn handle_connect(&mut self, port: Option<String>, baud_rate: u32) {
        self.update_connection_status(ConnectionStatus::Connecting);

        let result = connect_shared(&self.session, port.as_deref(), baud_rate).map(|c| c.port);

        match result {
            Ok(name) => {
                self.update_connection_status(ConnectionStatus::Connected);
                let _ = self.message_tx.send(BackendMessage::Connected {
                    port: name,
                    baud_rate,
                });
            }
            Err(e) => {
                self.update_connection_status(ConnectionStatus::Error);
                let error_msg = format!("Failed to connect: {}", e);
                tracing::error!("{}", error_msg);
                let _ = self
                    .message_tx
                    .send(BackendMessage::ConnectionError(error_msg));
            }
        }
    }

    /// Handle disconnect command
    fn handle_disconnect(&mut self) {
        self.session.lock().disconnect();
        self.update_connection_status(ConnectionStatus::Disconnected);
    }

    /// Write a batch of commands under one session lock
    fn send_commands(&mut self, commands: &[Command]) {
        let mut session = self.session.lock();
        for command in commands {
            match session.send(*command) {
                Ok(()) => {
                    let _ = self.message_tx.try_send(BackendMessage::Sent {
                        command: *command,
                        at: Instant::now(),
                    });
                }
                Err(e) => {
                    let link_lost = e.is_link_failure() && !session.is_connected();
                    drop(session);
                    tracing::warn!("Send of {} failed: {}", command, e);
                    let _ = self
                        .message_tx
                        .send(BackendMessage::SendError(format!("{}: {}", command, e)));
                    if link_lost && self.connection_status == ConnectionStatus::Connected {
                        self.update_connection_status(ConnectionStatus::Error);
                    }
                    return;
                }
            }
        }
    }

    /// Forward bytes received from the robot
    fn poll_incoming(&mut self) {
        let result = {
            let mut session = self.session.lock();
            if !session.is_connected() {
                None
            } else {
                Some(session.read_available())
            }
        };

        match result {
            None => {
                tracing::warn!("Serial connection closed");
                let _ = self
                    .message_tx
                    .send(BackendMessage::ConnectionError("Connection lost".to_string()));
                self.update_connection_status(ConnectionStatus::Error);
            }
            Some(Ok(bytes)) => {
                if !bytes.is_empty() {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    let _ = self.message_tx.try_send(BackendMessage::Received(text));
                }
            }
            Some(Err(e)) => {
                let _ = self
                    .message_tx
                    .send(BackendMessage::ConnectionError(format!("Read failed: {}", e)));
                self.update_connection_status(ConnectionStatus::Error);
            }
        }
    }

    /// Sleep out the remainder of the poll interval
    fn rate_limit(&mut self) {
        let target_interval = self.config.serial.poll_interval();
        let elapsed = self.last_poll_time.elapsed();

        if elapsed < target_interval {
            std::thread::sleep(target_interval - elapsed);
        }

        self.last_poll_time = Instant::now();
    }

    /// Update connection status and notify UI
    fn update_connection_status(&mut self, status: ConnectionStatus) {
        self.connection_status = status;
        let _ = self
            .message_tx
            .send(BackendMessage::ConnectionStatus(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_port::{MockPort, MockPortDriver};
    use crate::backend::session::SerialSession;
    use crate::config::SerialConfig;
    use crate::types::Motor;
    use crossbeam_channel::bounded;

    fn create_test_worker() -> (
        BackendWorker,
        Receiver<BackendMessage>,
        Sender<BackendCommand>,
        MockPort,
    ) {
        let (cmd_tx, cmd_rx) = bounded(16);
        let (msg_tx, msg_rx) = bounded(64);
        let running = Arc::new(AtomicBool::new(true));
        let mut config = AppConfig::default();
        config.serial = SerialConfig {
            reset_delay_ms: 0,
            ..Default::default()
        };

        let driver = MockPortDriver::with_ports(&["COM_TEST"]);
        let port = driver.handle();
        let session = SerialSession::new(Box::new(driver), config.serial.clone()).into_shared();
        let worker = BackendWorker::new(config, session, cmd_rx, msg_tx, running);

        (worker, msg_rx, cmd_tx, port)
    }

    fn drain(rx: &Receiver<BackendMessage>) -> Vec<BackendMessage> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_worker_creation() {
        let (worker, _, _, _) = create_test_worker();
        assert_eq!(worker.connection_status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_connect_and_send() {
        let (mut worker, msg_rx, _, port) = create_test_worker();

        worker.handle_command(BackendCommand::Connect {
            port: "COM_TEST".to_string(),
            baud_rate: 9600,
        });
        assert_eq!(worker.connection_status, ConnectionStatus::Connected);

        let motor = Motor::new(2).unwrap();
        worker.handle_command(BackendCommand::Send(vec![
            Command::SelectMotor(motor),
            Command::Forward,
        ]));
        assert_eq!(port.written(), b"2d");

        let messages = drain(&msg_rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, BackendMessage::Connected { port, baud_rate: 9600 } if port == "COM_TEST")));
        let sent: Vec<Command> = messages
            .iter()
            .filter_map(|m| match m {
                BackendMessage::Sent { command, .. } => Some(*command),
                _ => None,
            })
            .collect();
        assert_eq!(sent, vec![Command::SelectMotor(motor), Command::Forward]);
    }

    #[test]
    fn test_connect_failure_reports_error() {
        let (mut worker, msg_rx, _, _) = create_test_worker();
        worker.handle_command(BackendCommand::Connect {
            port: "COM_MISSING".to_string(),
            baud_rate: 9600,
        });
        assert_eq!(worker.connection_status, ConnectionStatus::Error);
        assert!(drain(&msg_rx)
            .iter()
            .any(|m| matches!(m, BackendMessage::ConnectionError(_))));
    }

    #[test]
    fn test_auto_connect() {
        let (mut worker, _, _, port) = create_test_worker();
        worker.handle_command(BackendCommand::ConnectAuto { baud_rate: 9600 });
        assert_eq!(worker.connection_status, ConnectionStatus::Connected);
        assert_eq!(port.open_port().as_deref(), Some("COM_TEST"));
    }

    #[test]
    fn test_send_while_disconnected() {
        let (mut worker, msg_rx, _, port) = create_test_worker();
        worker.handle_command(BackendCommand::Send(vec![Command::Stop]));
        assert!(port.written().is_empty());
        assert!(drain(&msg_rx)
            .iter()
            .any(|m| matches!(m, BackendMessage::SendError(_))));
    }

    #[test]
    fn test_poll_forwards_received_text() {
        let (mut worker, msg_rx, _, port) = create_test_worker();
        worker.handle_command(BackendCommand::Connect {
            port: "COM_TEST".to_string(),
            baud_rate: 9600,
        });
        drain(&msg_rx);

        port.push_incoming(b"Motor 1 ileri\n");
        worker.poll_incoming();
        let messages = drain(&msg_rx);
        assert!(matches!(
            messages.as_slice(),
            [BackendMessage::Received(text)] if text == "Motor 1 ileri\n"
        ));
    }

    #[test]
    fn test_detects_connection_closed_elsewhere() {
        let (mut worker, msg_rx, _, port) = create_test_worker();
        worker.handle_command(BackendCommand::Connect {
            port: "COM_TEST".to_string(),
            baud_rate: 9600,
        });

        // A failed write on another thread drops the link
        port.set_fail_writes(true);
        let _ = worker.session.lock().send(Command::Forward);
        drain(&msg_rx);

        worker.poll_incoming();
        assert_eq!(worker.connection_status, ConnectionStatus::Error);
        assert!(drain(&msg_rx)
            .iter()
            .any(|m| matches!(m, BackendMessage::ConnectionError(msg) if msg == "Connection lost")));
    }

    #[test]
    fn test_refresh_ports() {
        let (mut worker, msg_rx, _, _) = create_test_worker();
        worker.handle_command(BackendCommand::RefreshPorts);
        let messages = drain(&msg_rx);
        assert!(matches!(
            messages.as_slice(),
            [BackendMessage::PortList(ports)] if ports.len() == 1 && ports[0].name == "COM_TEST"
        ));
    }

    #[test]
    fn test_shutdown_stops_loop() {
        let (mut worker, msg_rx, cmd_tx, port) = create_test_worker();
        worker.handle_command(BackendCommand::Connect {
            port: "COM_TEST".to_string(),
            baud_rate: 9600,
        });
        cmd_tx.send(BackendCommand::Shutdown).unwrap();
        worker.run();

        assert!(!worker.running.load(Ordering::SeqCst));
        assert!(!port.is_open());
        assert!(drain(&msg_rx)
            .iter()
            .any(|m| matches!(m, BackendMessage::Shutdown)));
    }
}
