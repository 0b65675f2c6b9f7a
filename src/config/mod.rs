//! Configuration module for robot-serial
//!
//! This module handles the application configuration file, covering:
//! - Serial port defaults (baud rate, preferred port, timeouts)
//! - Recording defaults (file path, loop playback)
//! - The operation log file
//! - Logging filter and log file output
//!
//! # App Data Location
//!
//! Configuration and logs are stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.robot-serial/`
//! - **macOS**: `~/Library/Application Support/dev.robot-serial/`
//! - **Windows**: `%APPDATA%\dev.robot-serial\`
//!
//! # Files
//!
//! - `config.toml` - Application configuration (all keys optional)
//! - `logs/` - Rolling log files when file logging is enabled
//!
//! # Example
//!
//! ```toml
//! [serial]
//! baud_rate = 9600
//! preferred_port = "COM6"
//! reset_delay_ms = 2000
//!
//! [recording]
//! default_path = "recording.json"
//! loop_playback = false
//! ```

use crate::error::{Result, RobotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.robot-serial";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Recording file extension
pub const RECORDING_FILE_EXTENSION: &str = "json";

/// Default baud rate of the robot firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default serial I/O timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Time the board needs to come out of reset after the port opens
pub const DEFAULT_RESET_DELAY_MS: u64 = 2000;

/// Default interval between serial reads in the backend worker
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        RobotError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            RobotError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serial port settings
    #[serde(default)]
    pub serial: SerialConfig,

    /// Record/playback settings
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Operation log settings
    #[serde(default)]
    pub operation_log: OperationLogConfig,

    /// Diagnostic logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RobotError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            RobotError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load configuration from `path` (or the default location), falling back
    /// to defaults when the file is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(config_path) {
            Some(path) => path,
            None => return Self::default(),
        };

        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RobotError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RobotError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            RobotError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== Serial Config ====================

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Baud rate used when none is given explicitly
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Port preferred by auto-detect and pre-selected in the GUI
    #[serde(default)]
    pub preferred_port: Option<String>,

    /// Hide Bluetooth serial ports from port lists and auto-detect
    #[serde(default = "default_true")]
    pub skip_bluetooth: bool,

    /// Serial I/O timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Wait after opening the port before the first command
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,

    /// Interval between reads in the backend worker
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_reset_delay_ms() -> u64 {
    DEFAULT_RESET_DELAY_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            preferred_port: None,
            skip_bluetooth: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            reset_delay_ms: DEFAULT_RESET_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SerialConfig {
    /// Serial I/O timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Post-open reset delay
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    /// Backend poll interval (at least 1 ms)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ==================== Recording Config ====================

/// Record/playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// File used by the load (L) and save (V) keys
    #[serde(default = "default_recording_path")]
    pub default_path: PathBuf,

    /// Restart playback from the beginning when it finishes
    #[serde(default)]
    pub loop_playback: bool,
}

fn default_recording_path() -> PathBuf {
    PathBuf::from(format!("recording.{}", RECORDING_FILE_EXTENSION))
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            default_path: default_recording_path(),
            loop_playback: false,
        }
    }
}

// ==================== Operation Log Config ====================

/// Settings for the plain-text operation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogConfig {
    /// Whether operations are appended to the log file
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path of the operation log file
    #[serde(default = "default_operation_log_path")]
    pub path: PathBuf,
}

fn default_operation_log_path() -> PathBuf {
    PathBuf::from("operations.txt")
}

impl Default for OperationLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_operation_log_path(),
        }
    }
}

// ==================== Logging Config ====================

/// Diagnostic logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Also write logs to a daily rolling file in the app data directory
    #[serde(default)]
    pub file: bool,
}

fn default_log_filter() -> String {
    "info,robot_serial=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert!(config.serial.skip_bluetooth);
        assert_eq!(config.serial.reset_delay(), Duration::from_secs(2));
        assert_eq!(config.recording.default_path, PathBuf::from("recording.json"));
        assert!(config.operation_log.enabled);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [serial]
            baud_rate = 115200
            preferred_port = "COM6"
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.preferred_port.as_deref(), Some("COM6"));
        assert_eq!(config.serial.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.recording, RecordingConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.serial.preferred_port = Some("/dev/ttyACM0".to_string());
        config.recording.loop_playback = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_with_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "serial = [not toml").unwrap();

        let config = AppConfig::load_or_default(Some(&path));
        assert_eq!(config, AppConfig::default());
        assert!(matches!(AppConfig::load(&path), Err(RobotError::Config(_))));
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let serial = SerialConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(serial.poll_interval(), Duration::from_millis(1));
    }
}
