//! Command recorder for capturing sent commands with their timing

use std::time::{Duration, Instant};

use crate::types::Command;

use super::types::{CommandEvent, Recording, RecordingMetadata};

/// Captures commands with their offset from the start of recording
#[derive(Debug, Default)]
pub struct CommandRecorder {
    /// Start time of recording, `None` when not recording
    start_time: Option<Instant>,
    /// Recording in progress
    recording: Recording,
}

impl CommandRecorder {
    /// Create an idle recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if recording
    pub fn is_recording(&self) -> bool {
        self.start_time.is_some()
    }

    /// Time since recording started
    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|t| t.elapsed())
    }

    /// Number of events captured so far
    pub fn event_count(&self) -> usize {
        self.recording.len()
    }

    /// Start a new recording, discarding any unsealed events
    pub fn start(&mut self, metadata: RecordingMetadata) {
        self.recording = Recording::new(metadata);
        self.start_time = Some(Instant::now());
    }

    /// Record a command at the current time
    ///
    /// Returns `false` if the recorder is not running.
    pub fn record(&mut self, command: Command) -> bool {
        self.record_instant(command, Instant::now())
    }

    /// Record a command written at `at`
    ///
    /// Returns `false` if the recorder is not running.
    pub fn record_instant(&mut self, command: Command, at: Instant) -> bool {
        match self.start_time {
            Some(start) => self.record_at(command, at.saturating_duration_since(start)),
            None => false,
        }
    }

    /// Record a command at an explicit offset
    ///
    /// Offsets are truncated to whole milliseconds, the resolution of the
    /// recording file. Offsets earlier than the last event are clamped up to it.
    pub fn record_at(&mut self, command: Command, elapsed: Duration) -> bool {
        if !self.is_recording() {
            return false;
        }

        let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
        let timestamp = elapsed.max(self.recording.duration());
        self.recording.events.push(CommandEvent::new(command, timestamp));
        true
    }

    /// Stop and seal the recording
    pub fn stop(&mut self) -> Option<Recording> {
        self.start_time.take()?;
        let mut recording = std::mem::take(&mut self.recording);
        recording.finalize();
        Some(recording)
    }
}
