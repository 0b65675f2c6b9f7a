//! # Robot Serial: robot arm command sender
//!
//! Sends single-character motion commands to a robot arm controller over a
//! serial port, and records timed command sequences for later playback.
//!
//! ## Architecture
//!
//! - **Backend**: Owns the serial session and polls incoming text on a worker thread
//! - **Recording**: Recorder, timed player, motion journal and the deck state machine
//! - **Frontend**: eframe/egui control window
//! - **Console**: Key-at-a-time terminal front end (`robot-console` binary)
//! - **Communication**: Crossbeam channels between the backend and the frontends
//!
//! ## Configuration
//!
//! `config.toml` and the operation log live in the platform data directory
//! under `dev.robot-serial`:
//!
//! - **Linux**: `~/.local/share/dev.robot-serial/`
//! - **macOS**: `~/Library/Application Support/dev.robot-serial/`
//! - **Windows**: `%APPDATA%\dev.robot-serial\`
//!
//! ## Example
//!
//! ```ignore
//! use robot_serial::{backend::{SerialSession, SystemPortDriver}, config::AppConfig, Command};
//!
//! let config = AppConfig::load_or_default(None);
//! let mut session = SerialSession::new(Box::new(SystemPortDriver), config.serial.clone());
//! session.connect("/dev/ttyACM0", 9600)?;
//! session.send(Command::SelectMotor(robot_serial::Motor::new(1).unwrap()))?;
//! session.send(Command::Forward)?;
//! ```

pub mod backend;
pub mod config;
pub mod console;
pub mod error;
pub mod frontend;
pub mod logging;
pub mod oplog;
pub mod recording;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendCommand, BackendMessage, FrontendReceiver, SerialBackend, SerialSession};
pub use config::AppConfig;
pub use error::{Result, RobotError};
pub use frontend::RobotControlApp;
pub use recording::{DeckAction, DeckState, Recording, RecordingDeck};
pub use types::{Command, ConnectionStatus, Motor, MotorSelection, PortInfo};
