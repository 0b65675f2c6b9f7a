//! Backend module for serial communication with the robot
//!
//! This module handles all serial I/O in a separate thread to keep the UI
//! responsive. It uses crossbeam channels for thread-safe communication with
//! the frontend.
//!
//! # Architecture
//!
//! The backend runs in a separate thread from the UI, communicating via channels:
//!
//! - [`BackendCommand`] - Messages sent from UI to backend (connect, send, etc.)
//! - [`BackendMessage`] - Messages sent from backend to UI (text, status, errors)
//! - [`FrontendReceiver`] - UI-side handle for sending commands and receiving messages
//! - [`SerialBackend`] - Main backend entry point that runs the worker loop
//!
//! # Components
//!
//! - [`SerialSession`] - Owner of the one serial connection, shared with playback
//! - [`SystemPortDriver`] - `serialport` interface for real hardware
//! - `MockPortDriver` - Simulated port for testing without hardware (feature-gated)
//! - [`BackendWorker`] - Worker loop that processes commands and polls for input
//!
//! # Example
//!
//! ```ignore
//! use robot_serial::backend::SerialBackend;
//! use robot_serial::config::AppConfig;
//!
//! let config = AppConfig::default();
//! let (backend, frontend) = SerialBackend::new(config);
//!
//! // Spawn backend thread
//! std::thread::spawn(move || backend.run());
//!
//! // Send commands from UI
//! frontend.connect("COM3".to_string(), 9600);
//! frontend.send(vec![Command::Forward]);
//!
//! // Receive messages
//! for msg in frontend.drain() {
//!     if let BackendMessage::Received(text) = msg {
//!         print!("{}", text);
//!     }
//! }
//! ```

#[cfg(any(test, feature = "mock-port"))]
pub mod mock_port;
pub mod port;
pub mod port_trait;
pub mod session;
pub mod worker;

#[cfg(any(test, feature = "mock-port"))]
pub use mock_port::{MockPort, MockPortDriver, MOCK_PORT_NAME};
pub use port::SystemPortDriver;
pub use port_trait::{LinkSettings, PortDriver, SerialLink};
pub use session::{connect_shared, Connection, LinkStats, PendingLink, SerialSession, SharedSession};
pub use worker::BackendWorker;

use crate::config::AppConfig;
use crate::oplog::OperationLog;
use crate::types::{Command, ConnectionStatus, PortInfo};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Message sent from the UI to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Open a named port
    Connect {
        /// Port name
        port: String,
        /// Baud rate
        baud_rate: u32,
    },
    /// Open the preferred or first available port
    ConnectAuto {
        /// Baud rate
        baud_rate: u32,
    },
    /// Close the current port
    Disconnect,
    /// Write commands in order, without interleaving playback output
    Send(Vec<Command>),
    /// Request port list refresh
    RefreshPorts,
    /// Shutdown the backend
    Shutdown,
    /// Use the mock port instead of real hardware (only available with mock-port feature)
    #[cfg(feature = "mock-port")]
    UseMockPort(bool),
}

/// Message sent from the backend to the UI
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Connection status changed
    ConnectionStatus(ConnectionStatus),
    /// A port was opened
    Connected { port: String, baud_rate: u32 },
    /// Connection error occurred
    ConnectionError(String),
    /// Text received from the robot
    Received(String),
    /// A command was written
    Sent {
        command: Command,
        /// When the write completed
        at: Instant,
    },
    /// A command could not be written
    SendError(String),
    /// Port list update (response to RefreshPorts)
    PortList(Vec<PortInfo>),
    /// Backend is shutting down
    Shutdown,
}

/// Frontend receiver for backend messages
pub struct FrontendReceiver {
    /// Receiver for backend messages
    pub receiver: Receiver<BackendMessage>,
    /// Sender for commands to the backend
    pub command_sender: Sender<BackendCommand>,
    /// Session shared with the worker, used to start playback
    pub session: SharedSession,
}

impl FrontendReceiver {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<BackendMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<BackendMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send a command to the backend
    pub fn send_command(&self, cmd: BackendCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Request connection to a named port
    pub fn connect(&self, port: String, baud_rate: u32) {
        let _ = self
            .command_sender
            .send(BackendCommand::Connect { port, baud_rate });
    }

    /// Request connection to the preferred or first available port
    pub fn connect_auto(&self, baud_rate: u32) {
        let _ = self
            .command_sender
            .send(BackendCommand::ConnectAuto { baud_rate });
    }

    /// Request disconnection
    pub fn disconnect(&self) {
        let _ = self.command_sender.send(BackendCommand::Disconnect);
    }

    /// Write commands to the robot
    pub fn send(&self, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }
        let _ = self.command_sender.send(BackendCommand::Send(commands));
    }

    /// Request a fresh port list
    pub fn refresh_ports(&self) {
        let _ = self.command_sender.send(BackendCommand::RefreshPorts);
    }

    /// Set whether to use the mock port (only available with mock-port feature)
    #[cfg(feature = "mock-port")]
    pub fn use_mock_port(&self, use_mock: bool) {
        let _ = self
            .command_sender
            .send(BackendCommand::UseMockPort(use_mock));
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(BackendCommand::Shutdown);
    }
}

/// The serial backend that runs in a separate thread
pub struct SerialBackend {
    /// Configuration
    config: AppConfig,
    /// Session shared with the frontend
    session: SharedSession,
    /// Receiver for commands from the UI
    command_receiver: Receiver<BackendCommand>,
    /// Sender for messages to the UI
    message_sender: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl SerialBackend {
    /// Create a backend on the system's serial ports
    pub fn new(config: AppConfig) -> (Self, FrontendReceiver) {
        Self::with_driver(config, Box::new(SystemPortDriver))
    }

    /// Create a backend using the given port driver
    pub fn with_driver(config: AppConfig, driver: Box<dyn PortDriver>) -> (Self, FrontendReceiver) {
        let session = SerialSession::new(driver, config.serial.clone())
            .with_operation_log(OperationLog::from_config(&config.operation_log))
            .into_shared();

        let (cmd_tx, cmd_rx) = bounded(256);
        // Bounded for backpressure if the UI stalls
        let (msg_tx, msg_rx) = bounded(10_000);

        let backend = Self {
            config,
            session: Arc::clone(&session),
            command_receiver: cmd_rx,
            message_sender: msg_tx,
            running: Arc::new(AtomicBool::new(true)),
        };

        let frontend = FrontendReceiver {
            receiver: msg_rx,
            command_sender: cmd_tx,
            session,
        };

        (backend, frontend)
    }

    /// Run the backend loop
    pub fn run(self) {
        let mut worker = BackendWorker::new(
            self.config,
            self.session,
            self.command_receiver,
            self.message_sender,
            self.running,
        );
        worker.run();
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}
