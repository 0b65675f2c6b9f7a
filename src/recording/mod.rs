//! Command recording and playback module
//!
//! This module captures the commands sent to the robot together with their
//! timing and replays them later with the same gaps between commands.
//!
//! # Features
//!
//! - Record sent commands with millisecond timing
//! - Save and load recordings as versioned JSON
//! - Replay on a background thread, optionally looping, with immediate stop
//! - Return the arm to its starting pose by reversing journaled motion

pub mod controller;
pub mod journal;
pub mod player;
pub mod recorder;
pub mod types;

pub use controller::{DeckAction, RecordingDeck};
pub use journal::{MotionJournal, ReverseAction};
pub use player::{CommandPlayer, PlaybackEvent, PlaybackHandle, PlaybackOptions, PlaybackOutcome};
pub use recorder::CommandRecorder;
pub use types::{CommandEvent, DeckState, Recording, RecordingMetadata};
