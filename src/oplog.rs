//! Plain-text operation log
//!
//! Every command sent to the robot (and every notable action) is appended to
//! a file as `[YYYY-MM-DD HH:MM:SS.mmm] <line>` so a session can be
//! reconstructed afterwards. Write failures are reported through `tracing`
//! and never interrupt device I/O.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::OperationLogConfig;

/// Timestamp layout used for every entry
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Append-only operation log file
#[derive(Debug, Clone)]
pub struct OperationLog {
    path: PathBuf,
}

impl OperationLog {
    /// Create a log writing to `path` (the file is created on first write)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a log from config, or `None` when disabled
    pub fn from_config(config: &OperationLogConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(&config.path))
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format a log entry with the current local time
    pub fn format_entry(line: &str) -> String {
        format!("[{}] {}", chrono::Local::now().format(TIMESTAMP_FORMAT), line)
    }

    /// Append one entry
    pub fn append(&self, line: &str) {
        let entry = Self::format_entry(line);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", entry));

        if let Err(e) = result {
            tracing::warn!("Failed to write operation log {:?}: {}", self.path, e);
        }
    }

    /// Truncate the log and record the reset
    pub fn reset(&self) {
        if let Err(e) = File::create(&self.path) {
            tracing::warn!("Failed to reset operation log {:?}: {}", self.path, e);
            return;
        }
        self.append("RESET");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::new(dir.path().join("operations.txt"));

        log.append("SEND d");
        log.append("SEND w");
        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] SEND d"));
        assert!(lines[1].ends_with("] SEND w"));

        log.reset();
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.trim_end().ends_with("RESET"));
    }

    #[test]
    fn test_disabled_config() {
        let config = OperationLogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(OperationLog::from_config(&config).is_none());
    }

    #[test]
    fn test_unwritable_path_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::new(dir.path().join("missing").join("ops.txt"));
        log.append("SEND d");
        assert!(!log.path().exists());
    }
}
