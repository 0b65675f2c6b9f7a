//! Console key handling
//!
//! Turns typed characters into robot commands and deck actions. The same
//! key map drives the console tool and the GUI's keyboard shortcuts.
//!
//! | Key            | Action                          |
//! |----------------|---------------------------------|
//! | command chars  | sent to the robot               |
//! | `Z####`        | step delay in µs                |
//! | `R S P T L V O`| record/playback deck            |
//! | `G`            | return to home                  |
//! | `h` / `?`      | help                            |
//! | `q`            | quit                            |

use std::path::PathBuf;

use crate::backend::SharedSession;
use crate::error::Result;
use crate::recording::{DeckAction, PlaybackEvent, RecordingDeck};
use crate::types::Command;

/// Key help printed by the console and shown in the GUI
pub const HELP_TEXT: &str = "\
Motors:   1-5 select stepper, 6 select servo
Motion:   d forward / +60deg   a backward / -60deg   w stop
Servo:    [ +15deg   ] -15deg   c zero
Speed:    Z#### step delay in microseconds (0150-4000)
Deck:     R record   S stop recording   P play   T stop playback
          L load     V save             O toggle loop
Other:    G return to home   h help   q quit";

/// What a key press asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Leave the program
    Quit,
    /// Show key help
    Help,
    /// Send a command to the robot
    Send(Command),
    /// Run a deck action
    Deck(DeckAction),
    /// Undo journaled motion
    Home,
    /// Input that maps to nothing
    Invalid(String),
}

/// Incremental key parser
///
/// Most keys map to an action on their own; `Z` starts a four-digit step
/// delay that completes on the fourth digit.
#[derive(Debug, Default)]
pub struct KeyParser {
    speed_digits: Option<String>,
}

impl KeyParser {
    /// Create a parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a `Z####` sequence is in progress
    pub fn is_pending(&self) -> bool {
        self.speed_digits.is_some()
    }

    /// Feed one character
    ///
    /// Returns `None` while a multi-key sequence is incomplete and for
    /// whitespace.
    pub fn feed(&mut self, ch: char) -> Option<ConsoleAction> {
        if let Some(mut digits) = self.speed_digits.take() {
            if !ch.is_ascii_digit() {
                return Some(ConsoleAction::Invalid(format!("Z{}{}", digits, ch)));
            }
            digits.push(ch);
            if digits.len() < 4 {
                self.speed_digits = Some(digits);
                return None;
            }
            let input = format!("Z{}", digits);
            return Some(match input.parse::<Command>() {
                Ok(cmd) => ConsoleAction::Send(cmd),
                Err(_) => ConsoleAction::Invalid(input),
            });
        }

        if ch.is_whitespace() {
            return None;
        }
        if let Ok(cmd) = Command::from_char(ch) {
            return Some(ConsoleAction::Send(cmd));
        }

        let action = match ch {
            'Z' | 'z' => {
                self.speed_digits = Some(String::new());
                return None;
            }
            'q' | 'Q' => ConsoleAction::Quit,
            'h' | 'H' | '?' => ConsoleAction::Help,
            'g' | 'G' => ConsoleAction::Home,
            other => match DeckAction::from_key(other) {
                Some(action) => ConsoleAction::Deck(action),
                None => ConsoleAction::Invalid(other.to_string()),
            },
        };
        Some(action)
    }
}

/// Result of handling one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleStep {
    /// Nothing to report
    Quiet,
    /// A status line to show
    Line(String),
    /// The user asked to quit
    Quit,
}

/// Interactive console driving a shared session and a deck
pub struct Console {
    session: SharedSession,
    deck: RecordingDeck,
    parser: KeyParser,
    recording_path: PathBuf,
}

impl Console {
    /// Create a console on a connected session
    pub fn new(session: SharedSession, recording_path: PathBuf, loop_playback: bool) -> Self {
        let oplog = session.lock().operation_log().cloned();
        let mut deck = RecordingDeck::new().with_operation_log(oplog);
        deck.set_loop_playback(loop_playback);
        Self {
            session,
            deck,
            parser: KeyParser::new(),
            recording_path,
        }
    }

    /// The record/playback deck
    pub fn deck(&self) -> &RecordingDeck {
        &self.deck
    }

    /// Check if the session is still connected
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_connected()
    }

    /// Handle one typed character
    pub fn handle_char(&mut self, ch: char) -> ConsoleStep {
        let Some(action) = self.parser.feed(ch) else {
            return ConsoleStep::Quiet;
        };

        match action {
            ConsoleAction::Quit => ConsoleStep::Quit,
            ConsoleAction::Help => ConsoleStep::Line(HELP_TEXT.to_string()),
            ConsoleAction::Invalid(input) => {
                ConsoleStep::Line(format!("Unrecognized input {:?} (h for help)", input))
            }
            ConsoleAction::Send(cmd) => {
                let result = self.session.lock().send(cmd);
                match result {
                    Ok(()) => {
                        self.deck.note_sent(cmd);
                        ConsoleStep::Quiet
                    }
                    Err(e) => ConsoleStep::Line(format!("Send failed: {}", e)),
                }
            }
            ConsoleAction::Deck(action) => {
                match self
                    .deck
                    .handle_action(action, &self.session, &self.recording_path)
                {
                    Ok(status) => ConsoleStep::Line(status),
                    Err(e) => ConsoleStep::Line(e.to_string()),
                }
            }
            ConsoleAction::Home => match self.deck.return_home(&self.session) {
                Ok(count) => ConsoleStep::Line(format!("Returning home ({} commands)", count)),
                Err(crate::error::RobotError::EmptyRecording) => {
                    ConsoleStep::Line("Already at home".to_string())
                }
                Err(e) => ConsoleStep::Line(e.to_string()),
            },
        }
    }

    /// Read whatever the robot sent since the last call
    pub fn read_incoming(&mut self) -> Result<Option<String>> {
        let bytes = self.session.lock().read_available()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Status lines for playback that finished since the last call
    pub fn playback_updates(&mut self) -> Vec<String> {
        self.deck
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                PlaybackEvent::Finished(outcome) => Some(outcome.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Stop playback and close the port
    pub fn shutdown(&mut self) {
        if self.deck.state().is_playing() {
            let _ = self.deck.stop_playback();
        }
        self.session.lock().disconnect();
    }
}
