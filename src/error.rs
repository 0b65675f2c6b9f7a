//! Error handling for robot-serial
//!
//! This module defines the error type shared by the serial session, the
//! record/playback deck and the configuration layer, plus a Result alias.

use thiserror::Error;

use crate::recording::DeckState;

/// Main error type for robot-serial operations
#[derive(Error, Debug)]
pub enum RobotError {
    /// Auto-detect found no usable serial port
    #[error("No serial port found")]
    NoPortFound,

    /// Opening a serial port failed
    #[error("Failed to open {port}: {message}")]
    Connection { port: String, message: String },

    /// A send or read was attempted without an open port
    #[error("Not connected to a serial port")]
    NotConnected,

    /// IO errors (write/read failure, file access)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the serial port layer
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A deck operation was issued in the wrong state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: DeckState,
    },

    /// Playback or save requested without recorded commands
    #[error("Recording is empty")]
    EmptyRecording,

    /// Input outside the command alphabet
    #[error("Unrecognized command {0:?}")]
    InvalidCommand(String),

    /// Malformed recording file
    #[error("Recording format error: {0}")]
    Format(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RobotError>,
    },
}

impl RobotError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RobotError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error means the link to the device is gone
    pub fn is_link_failure(&self) -> bool {
        match self {
            RobotError::Io(_) | RobotError::Serial(_) | RobotError::NotConnected => true,
            RobotError::WithContext { source, .. } => source.is_link_failure(),
            _ => false,
        }
    }
}

/// Result type alias for robot-serial operations
pub type Result<T> = std::result::Result<T, RobotError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
