//! Recording data types and file format

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, RobotError};
use crate::types::Command;

/// Value of the `format` field in recording files
pub const RECORDING_FORMAT: &str = "robot-serial-recording";

/// Recording file version written by this build
pub const RECORDING_VERSION: u32 = 1;

/// State of the record/playback deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeckState {
    /// Neither recording nor playing
    #[default]
    Idle,
    /// Capturing sent commands
    Recording,
    /// Replaying a recording
    Playing,
}

impl DeckState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, DeckState::Recording)
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        matches!(self, DeckState::Playing)
    }

    /// Check if idle
    pub fn is_idle(&self) -> bool {
        matches!(self, DeckState::Idle)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            DeckState::Idle => "Idle",
            DeckState::Recording => "Recording",
            DeckState::Playing => "Playing",
        }
    }
}

impl fmt::Display for DeckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One recorded command and when it was sent, relative to recording start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEvent {
    /// Command that was sent
    pub command: Command,
    /// Offset from the start of the recording
    pub timestamp: Duration,
}

impl CommandEvent {
    /// Create an event
    pub fn new(command: Command, timestamp: Duration) -> Self {
        Self { command, timestamp }
    }
}

/// Metadata for a recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMetadata {
    /// Name of the recording
    pub name: String,
    /// When recording started
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    /// Offset of the last event
    pub duration: Duration,
}

impl Default for RecordingMetadata {
    fn default() -> Self {
        Self {
            name: String::from("Untitled Recording"),
            recorded_at: chrono::Utc::now(),
            duration: Duration::ZERO,
        }
    }
}

impl RecordingMetadata {
    /// Create new metadata with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// An ordered, timestamped sequence of commands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    /// Recording metadata
    pub metadata: RecordingMetadata,
    /// Events sorted by timestamp
    pub events: Vec<CommandEvent>,
}

impl Recording {
    /// Create an empty recording
    pub fn new(metadata: RecordingMetadata) -> Self {
        Self {
            metadata,
            events: Vec::new(),
        }
    }

    /// Build a recording from events, rejecting decreasing timestamps
    pub fn from_events(metadata: RecordingMetadata, events: Vec<CommandEvent>) -> Result<Self> {
        if let Some(i) = events.windows(2).position(|w| w[1].timestamp < w[0].timestamp) {
            return Err(RobotError::Format(format!(
                "event {} is earlier than the event before it",
                i + 1
            )));
        }
        let mut recording = Self { metadata, events };
        recording.finalize();
        Ok(recording)
    }

    /// Offset of the last event
    pub fn duration(&self) -> Duration {
        self.events
            .last()
            .map(|e| e.timestamp)
            .unwrap_or(Duration::ZERO)
    }

    /// Check if the recording has no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Commands in playback order
    pub fn commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.events.iter().map(|e| e.command)
    }

    /// Update metadata from the events
    pub fn finalize(&mut self) {
        self.metadata.duration = self.duration();
    }

    /// Save recording to a file (JSON format)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&RecordingFile::from(self))
            .map_err(|e| RobotError::Format(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate a recording file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse and validate recording JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RecordingFile =
            serde_json::from_str(json).map_err(|e| RobotError::Format(e.to_string()))?;
        file.try_into()
    }
}

/// On-disk layout of a recording
#[derive(Debug, Serialize, Deserialize)]
struct RecordingFile {
    format: String,
    version: u32,
    name: String,
    recorded_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    duration_ms: u64,
    events: Vec<EventRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventRecord {
    at_ms: u64,
    command: Command,
}

impl From<&Recording> for RecordingFile {
    fn from(recording: &Recording) -> Self {
        Self {
            format: RECORDING_FORMAT.to_string(),
            version: RECORDING_VERSION,
            name: recording.metadata.name.clone(),
            recorded_at: recording.metadata.recorded_at,
            duration_ms: recording.duration().as_millis() as u64,
            events: recording
                .events
                .iter()
                .map(|e| EventRecord {
                    at_ms: e.timestamp.as_millis() as u64,
                    command: e.command,
                })
                .collect(),
        }
    }
}

impl TryFrom<RecordingFile> for Recording {
    type Error = RobotError;

    fn try_from(file: RecordingFile) -> Result<Self> {
        if file.format != RECORDING_FORMAT {
            return Err(RobotError::Format(format!(
                "unknown format {:?}",
                file.format
            )));
        }
        if file.version != RECORDING_VERSION {
            return Err(RobotError::Format(format!(
                "unsupported version {}",
                file.version
            )));
        }

        let metadata = RecordingMetadata {
            name: file.name,
            recorded_at: file.recorded_at,
            duration: Duration::ZERO,
        };
        let events = file
            .events
            .into_iter()
            .map(|e| CommandEvent::new(e.command, Duration::from_millis(e.at_ms)))
            .collect();

        Recording::from_events(metadata, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Motor;
    use proptest::prelude::*;

    fn sample() -> Recording {
        Recording::from_events(
            RecordingMetadata::new("wave"),
            vec![
                CommandEvent::new(Command::SelectMotor(Motor::new(1).unwrap()), Duration::ZERO),
                CommandEvent::new(Command::Forward, Duration::from_millis(0)),
                CommandEvent::new(Command::Backward, Duration::from_millis(300)),
                CommandEvent::new(Command::StepDelay(1500), Duration::from_millis(450)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_deck_state() {
        assert!(DeckState::Recording.is_recording());
        assert!(DeckState::Playing.is_playing());
        assert!(DeckState::Idle.is_idle());
        assert_eq!(DeckState::Playing.to_string(), "Playing");
    }

    #[test]
    fn test_recording_basics() {
        let recording = sample();
        assert_eq!(recording.len(), 4);
        assert!(!recording.is_empty());
        assert_eq!(recording.duration(), Duration::from_millis(450));
        assert_eq!(recording.metadata.duration, Duration::from_millis(450));
        assert_eq!(
            recording.commands().map(|c| c.to_string()).collect::<Vec<_>>(),
            vec!["1", "d", "a", "Z1500"]
        );
    }

    #[test]
    fn test_decreasing_timestamps_rejected() {
        let result = Recording::from_events(
            RecordingMetadata::default(),
            vec![
                CommandEvent::new(Command::Forward, Duration::from_millis(100)),
                CommandEvent::new(Command::Stop, Duration::from_millis(50)),
            ],
        );
        assert!(matches!(result, Err(RobotError::Format(_))));
    }

    #[test]
    fn test_file_layout() {
        let json = serde_json::to_value(RecordingFile::from(&sample())).unwrap();
        assert_eq!(json["format"], RECORDING_FORMAT);
        assert_eq!(json["version"], 1);
        assert_eq!(json["name"], "wave");
        assert_eq!(json["duration_ms"], 450);
        assert_eq!(json["events"][2]["at_ms"], 300);
        assert_eq!(json["events"][2]["command"], "a");
        assert_eq!(json["events"][3]["command"], "Z1500");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.json");
        let recording = sample();
        recording.save_to_file(&path).unwrap();

        let loaded = Recording::load_from_file(&path).unwrap();
        assert_eq!(loaded.events, recording.events);
        assert_eq!(loaded.metadata.name, "wave");
    }

    #[test]
    fn test_invalid_files_rejected() {
        let base = r#"{"format":"robot-serial-recording","version":1,"name":"x","recorded_at":"2026-10-19T10:00:00Z","events":[]}"#;
        assert!(Recording::from_json(base).unwrap().is_empty());

        let wrong_format = base.replace("robot-serial-recording", "session");
        assert!(matches!(Recording::from_json(&wrong_format), Err(RobotError::Format(_))));

        let wrong_version = base.replace("\"version\":1", "\"version\":2");
        assert!(matches!(Recording::from_json(&wrong_version), Err(RobotError::Format(_))));

        let bad_command = base.replace(
            "\"events\":[]",
            "\"events\":[{\"at_ms\":0,\"command\":\"x\"}]",
        );
        assert!(matches!(Recording::from_json(&bad_command), Err(RobotError::Format(_))));

        let out_of_order = base.replace(
            "\"events\":[]",
            "\"events\":[{\"at_ms\":10,\"command\":\"d\"},{\"at_ms\":5,\"command\":\"w\"}]",
        );
        assert!(matches!(Recording::from_json(&out_of_order), Err(RobotError::Format(_))));

        assert!(matches!(Recording::from_json("not json"), Err(RobotError::Format(_))));
    }

    fn arb_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            (1u8..=6).prop_map(|n| Command::SelectMotor(Motor::new(n).unwrap())),
            Just(Command::Forward),
            Just(Command::Backward),
            Just(Command::Stop),
            Just(Command::ServoUp),
            Just(Command::ServoDown),
            Just(Command::ServoZero),
            (150u16..=4000).prop_map(Command::StepDelay),
        ]
    }

    proptest! {
        #[test]
        fn prop_save_load_preserves_events(
            steps in proptest::collection::vec((arb_command(), 0u64..2000), 0..40)
        ) {
            let mut at = 0u64;
            let events: Vec<CommandEvent> = steps
                .into_iter()
                .map(|(cmd, gap)| {
                    at += gap;
                    CommandEvent::new(cmd, Duration::from_millis(at))
                })
                .collect();
            let recording = Recording::from_events(RecordingMetadata::new("prop"), events).unwrap();

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.json");
            recording.save_to_file(&path).unwrap();
            let loaded = Recording::load_from_file(&path).unwrap();

            prop_assert_eq!(&loaded.events, &recording.events);
            prop_assert_eq!(loaded.duration(), recording.duration());
        }
    }
}
