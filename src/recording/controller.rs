//! Record/playback deck
//!
//! [`RecordingDeck`] is the state machine behind the record and playback
//! controls of both the GUI and the console. It owns the sealed recording,
//! the recorder, the motion journal and at most one playback thread.
//!
//! ```text
//!        start_recording            play / play_recording
//!   Idle ───────────────► Recording      Idle ─────────────► Playing
//!    ▲                        │           ▲                     │
//!    └──── stop_recording ────┘           └─ stop_playback / ───┘
//!                                            finish / failure
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::backend::SharedSession;
use crate::error::{Result, RobotError};
use crate::oplog::OperationLog;
use crate::types::Command;

use super::journal::MotionJournal;
use super::player::{CommandPlayer, PlaybackEvent, PlaybackHandle, PlaybackOptions, PlaybackOutcome};
use super::recorder::CommandRecorder;
use super::types::{DeckState, Recording, RecordingMetadata};

/// Capacity of the playback event queue
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// A deck operation bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckAction {
    /// Begin capturing sent commands
    StartRecording,
    /// Seal the capture
    StopRecording,
    /// Replay the sealed recording
    Play,
    /// Cancel playback
    StopPlayback,
    /// Load a recording file
    Load,
    /// Save the sealed recording
    Save,
    /// Toggle loop playback
    ToggleLoop,
}

impl DeckAction {
    /// All actions in display order
    pub const ALL: [DeckAction; 7] = [
        DeckAction::StartRecording,
        DeckAction::StopRecording,
        DeckAction::Play,
        DeckAction::StopPlayback,
        DeckAction::Load,
        DeckAction::Save,
        DeckAction::ToggleLoop,
    ];

    /// Map a key to an action
    pub fn from_key(key: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.key() == key.to_ascii_uppercase())
    }

    /// Key bound to this action
    pub fn key(&self) -> char {
        match self {
            DeckAction::StartRecording => 'R',
            DeckAction::StopRecording => 'S',
            DeckAction::Play => 'P',
            DeckAction::StopPlayback => 'T',
            DeckAction::Load => 'L',
            DeckAction::Save => 'V',
            DeckAction::ToggleLoop => 'O',
        }
    }

    /// Button and help label
    pub fn label(&self) -> &'static str {
        match self {
            DeckAction::StartRecording => "Record",
            DeckAction::StopRecording => "Stop recording",
            DeckAction::Play => "Play",
            DeckAction::StopPlayback => "Stop playback",
            DeckAction::Load => "Load",
            DeckAction::Save => "Save",
            DeckAction::ToggleLoop => "Loop",
        }
    }
}

struct ActivePlayback {
    handle: PlaybackHandle,
    started: Instant,
}

/// Record/playback state machine
pub struct RecordingDeck {
    recorder: CommandRecorder,
    recording: Option<Arc<Recording>>,
    playback: Option<ActivePlayback>,
    /// Whether sends of the current playback feed the journal
    journal_playback: bool,
    loop_playback: bool,
    journal: MotionJournal,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
    last_outcome: Option<PlaybackOutcome>,
    oplog: Option<OperationLog>,
}

impl Default for RecordingDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDeck {
    /// Create an idle deck with nothing recorded
    pub fn new() -> Self {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAPACITY);
        Self {
            recorder: CommandRecorder::new(),
            recording: None,
            playback: None,
            journal_playback: true,
            loop_playback: false,
            journal: MotionJournal::new(),
            events_tx,
            events_rx,
            last_outcome: None,
            oplog: None,
        }
    }

    /// Append action status lines to an operation log
    pub fn with_operation_log(mut self, oplog: Option<OperationLog>) -> Self {
        self.oplog = oplog;
        self
    }

    /// The operation log, if one is configured
    pub fn operation_log(&self) -> Option<&OperationLog> {
        self.oplog.as_ref()
    }

    /// Current state
    pub fn state(&self) -> DeckState {
        if self.playback.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            DeckState::Playing
        } else if self.recorder.is_recording() {
            DeckState::Recording
        } else {
            DeckState::Idle
        }
    }

    /// The sealed recording, if any
    pub fn recording(&self) -> Option<&Recording> {
        self.recording.as_deref()
    }

    /// Time since the current recording or playback started
    pub fn elapsed(&self) -> Option<Duration> {
        match self.state() {
            DeckState::Recording => self.recorder.elapsed(),
            DeckState::Playing => self.playback.as_ref().map(|p| p.started.elapsed()),
            DeckState::Idle => None,
        }
    }

    /// Number of events captured by the recording in progress
    pub fn pending_events(&self) -> usize {
        self.recorder.event_count()
    }

    /// Outcome of the most recently finished playback
    pub fn last_outcome(&self) -> Option<&PlaybackOutcome> {
        self.last_outcome.as_ref()
    }

    /// Whether playback loops
    pub fn loop_playback(&self) -> bool {
        self.loop_playback
    }

    /// Set loop playback (takes effect on the next play)
    pub fn set_loop_playback(&mut self, enabled: bool) {
        self.loop_playback = enabled;
    }

    /// The motion journal
    pub fn journal(&self) -> &MotionJournal {
        &self.journal
    }

    /// Start capturing, discarding the previous sealed recording
    pub fn start_recording(&mut self) -> Result<()> {
        self.require(DeckState::Idle, "start recording")?;
        let name = format!("Recording {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        self.recording = None;
        self.recorder.start(RecordingMetadata::new(name));
        tracing::info!("Recording started");
        Ok(())
    }

    /// Capture a command at the current time
    pub fn record_event(&mut self, command: Command) -> Result<()> {
        self.require(DeckState::Recording, "record")?;
        self.recorder.record(command);
        Ok(())
    }

    /// Capture a command at an explicit offset from recording start
    pub fn record_event_at(&mut self, command: Command, elapsed: Duration) -> Result<()> {
        self.require(DeckState::Recording, "record")?;
        self.recorder.record_at(command, elapsed);
        Ok(())
    }

    /// Account for a command sent by the user
    ///
    /// The command is captured when recording and always fed to the journal.
    pub fn note_sent(&mut self, command: Command) {
        self.note_sent_at(command, Instant::now());
    }

    /// Account for a command the user sent at `at`
    pub fn note_sent_at(&mut self, command: Command, at: Instant) {
        if self.recorder.is_recording() {
            self.recorder.record_instant(command, at);
        }
        self.journal.observe(command, at);
    }

    /// Seal the recording in progress
    pub fn stop_recording(&mut self) -> Result<Arc<Recording>> {
        self.require(DeckState::Recording, "stop recording")?;
        let recording = Arc::new(self.recorder.stop().unwrap_or_default());
        tracing::info!(
            "Recording stopped: {} commands over {:?}",
            recording.len(),
            recording.duration()
        );
        self.recording = Some(Arc::clone(&recording));
        Ok(recording)
    }

    /// Replay the sealed recording
    pub fn play(&mut self, session: &SharedSession) -> Result<()> {
        self.require(DeckState::Idle, "play")?;
        let recording = self
            .recording
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or(RobotError::EmptyRecording)?;
        self.spawn(recording, session, true)
    }

    /// Replay an ad-hoc recording, leaving the sealed recording untouched
    pub fn play_recording(&mut self, recording: Recording, session: &SharedSession) -> Result<()> {
        self.require(DeckState::Idle, "play")?;
        if recording.is_empty() {
            return Err(RobotError::EmptyRecording);
        }
        self.spawn(Arc::new(recording), session, true)
    }

    /// Undo the journaled motion
    ///
    /// Returns the number of commands scheduled.
    pub fn return_home(&mut self, session: &SharedSession) -> Result<usize> {
        self.require(DeckState::Idle, "return home")?;
        let home = self.journal.home_recording(Instant::now());
        if home.is_empty() {
            return Err(RobotError::EmptyRecording);
        }
        let count = home.len();
        self.spawn(Arc::new(home), session, false)?;
        Ok(count)
    }

    /// Cancel playback and wait for the player to exit
    pub fn stop_playback(&mut self) -> Result<PlaybackOutcome> {
        self.require(DeckState::Playing, "stop playback")?;
        let outcome = match self.playback.take() {
            Some(active) => active.handle.cancel(),
            None => PlaybackOutcome::Cancelled { sent: 0 },
        };
        self.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Load a recording file as the sealed recording
    pub fn load(&mut self, path: &Path) -> Result<Arc<Recording>> {
        self.require(DeckState::Idle, "load")?;
        let recording = Arc::new(Recording::load_from_file(path)?);
        tracing::info!("Loaded {} commands from {:?}", recording.len(), path);
        self.recording = Some(Arc::clone(&recording));
        Ok(recording)
    }

    /// Save the sealed recording
    pub fn save(&self, path: &Path) -> Result<()> {
        let recording = self.recording.as_ref().ok_or(RobotError::EmptyRecording)?;
        recording.save_to_file(path)?;
        tracing::info!("Saved {} commands to {:?}", recording.len(), path);
        Ok(())
    }

    /// Collect the outcome of a finished playback thread
    pub fn reap(&mut self) -> Option<PlaybackOutcome> {
        if !self.playback.as_ref().is_some_and(|p| p.handle.is_finished()) {
            return None;
        }
        let outcome = self.playback.take()?.handle.join();
        self.last_outcome = Some(outcome.clone());
        Some(outcome)
    }

    /// Pending playback events, oldest first
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        let events: Vec<PlaybackEvent> = self.events_rx.try_iter().collect();
        if self.journal_playback {
            for event in &events {
                if let PlaybackEvent::Sent { command, at, .. } = event {
                    self.journal.observe(*command, *at);
                }
            }
        }
        self.reap();
        events
    }

    /// Run a deck action and describe the result for the log
    pub fn handle_action(
        &mut self,
        action: DeckAction,
        session: &SharedSession,
        path: &Path,
    ) -> Result<String> {
        let status = match action {
            DeckAction::StartRecording => {
                self.start_recording()?;
                "Recording started".to_string()
            }
            DeckAction::StopRecording => {
                let recording = self.stop_recording()?;
                format!(
                    "Recording stopped ({} commands, {:.1}s)",
                    recording.len(),
                    recording.duration().as_secs_f64()
                )
            }
            DeckAction::Play => {
                self.play(session)?;
                let count = self.recording.as_ref().map(|r| r.len()).unwrap_or(0);
                if self.loop_playback {
                    format!("Playing {} commands (loop)", count)
                } else {
                    format!("Playing {} commands", count)
                }
            }
            DeckAction::StopPlayback => self.stop_playback()?.to_string(),
            DeckAction::Load => {
                let recording = self.load(path)?;
                format!("Loaded {} commands from {}", recording.len(), path.display())
            }
            DeckAction::Save => {
                self.save(path)?;
                let count = self.recording.as_ref().map(|r| r.len()).unwrap_or(0);
                format!("Saved {} commands to {}", count, path.display())
            }
            DeckAction::ToggleLoop => {
                self.loop_playback = !self.loop_playback;
                format!("Loop playback {}", if self.loop_playback { "on" } else { "off" })
            }
        };

        if let Some(ref oplog) = self.oplog {
            oplog.append(&status);
        }
        Ok(status)
    }

    fn spawn(&mut self, recording: Arc<Recording>, session: &SharedSession, journal: bool) -> Result<()> {
        // Drop events left over from an earlier run
        self.drain_events();
        let options = PlaybackOptions {
            loop_playback: self.loop_playback && journal,
        };
        tracing::info!("Playback started: {} commands", recording.len());
        let handle = CommandPlayer::spawn(recording, Arc::clone(session), options, self.events_tx.clone())?;
        self.journal_playback = journal;
        self.playback = Some(ActivePlayback {
            handle,
            started: Instant::now(),
        });
        Ok(())
    }

    fn require(&mut self, expected: DeckState, operation: &'static str) -> Result<()> {
        self.reap();
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(RobotError::InvalidState { operation, state })
        }
    }
}

impl Drop for RecordingDeck {
    fn drop(&mut self) {
        if let Some(active) = self.playback.take() {
            active.handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_port::{MockPort, MockPortDriver};
    use crate::backend::SerialSession;
    use crate::config::SerialConfig;
    use crate::types::Motor;

    fn connected_session() -> (SharedSession, MockPort) {
        let driver = MockPortDriver::with_ports(&["COM_TEST"]);
        let port = driver.handle();
        let config = SerialConfig {
            reset_delay_ms: 0,
            ..Default::default()
        };
        let mut session = SerialSession::new(Box::new(driver), config);
        session.connect("COM_TEST", 9600).unwrap();
        (session.into_shared(), port)
    }

    fn record(deck: &mut RecordingDeck, events: &[(Command, u64)]) {
        deck.start_recording().unwrap();
        for (cmd, ms) in events {
            deck.record_event_at(*cmd, Duration::from_millis(*ms)).unwrap();
        }
        deck.stop_recording().unwrap();
    }

    fn wait_idle(deck: &mut RecordingDeck) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while deck.state() != DeckState::Idle && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        deck.reap();
    }

    #[test]
    fn test_key_map() {
        for action in DeckAction::ALL {
            assert_eq!(DeckAction::from_key(action.key()), Some(action));
        }
        assert_eq!(DeckAction::from_key('p'), Some(DeckAction::Play));
        assert_eq!(DeckAction::from_key('x'), None);
    }

    #[test]
    fn test_state_guards() {
        let (session, _port) = connected_session();
        let mut deck = RecordingDeck::new();

        assert!(matches!(
            deck.record_event(Command::Forward),
            Err(RobotError::InvalidState { state: DeckState::Idle, .. })
        ));
        assert!(matches!(deck.stop_recording(), Err(RobotError::InvalidState { .. })));
        assert!(matches!(deck.stop_playback(), Err(RobotError::InvalidState { .. })));

        deck.start_recording().unwrap();
        assert_eq!(deck.state(), DeckState::Recording);
        assert!(matches!(
            deck.play(&session),
            Err(RobotError::InvalidState { state: DeckState::Recording, .. })
        ));
        assert!(matches!(deck.start_recording(), Err(RobotError::InvalidState { .. })));
    }

    #[test]
    fn test_play_with_nothing_recorded() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();

        assert!(matches!(deck.play(&session), Err(RobotError::EmptyRecording)));
        assert_eq!(deck.state(), DeckState::Idle);

        record(&mut deck, &[]);
        assert!(matches!(deck.play(&session), Err(RobotError::EmptyRecording)));
        assert_eq!(deck.state(), DeckState::Idle);
        assert!(port.written().is_empty());
    }

    #[test]
    fn test_playback_preserves_timing() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();
        record(&mut deck, &[(Command::Forward, 0), (Command::Backward, 300)]);

        let started = Instant::now();
        deck.play(&session).unwrap();
        assert_eq!(deck.state(), DeckState::Playing);
        wait_idle(&mut deck);

        assert_eq!(port.written(), b"da");
        let writes = port.writes();
        assert!(writes[1].at.duration_since(started) >= Duration::from_millis(300));
        assert_eq!(deck.last_outcome(), Some(&PlaybackOutcome::Completed { sent: 2 }));
    }

    #[test]
    fn test_gap_not_compressed() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();
        let m1 = Command::SelectMotor(Motor::new(1).unwrap());
        record(&mut deck, &[(m1, 0), (Command::Forward, 0), (Command::Stop, 500)]);

        deck.play(&session).unwrap();
        wait_idle(&mut deck);

        let writes = port.writes();
        assert_eq!(port.written(), b"1dw");
        assert!(writes[2].at.duration_since(writes[1].at) >= Duration::from_millis(450));
    }

    #[test]
    fn test_stop_playback_discards_remaining() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();
        record(&mut deck, &[(Command::Forward, 0), (Command::Backward, 500)]);

        deck.play(&session).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let outcome = deck.stop_playback().unwrap();

        assert_eq!(outcome, PlaybackOutcome::Cancelled { sent: 1 });
        assert_eq!(deck.state(), DeckState::Idle);
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(port.written(), b"d");
    }

    #[test]
    fn test_link_loss_during_playback() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();
        record(&mut deck, &[(Command::Forward, 0), (Command::Stop, 50)]);
        port.set_fail_writes(true);

        deck.play(&session).unwrap();
        wait_idle(&mut deck);

        assert_eq!(deck.state(), DeckState::Idle);
        assert!(matches!(deck.last_outcome(), Some(PlaybackOutcome::Failed { .. })));
        assert!(!session.lock().is_connected());
    }

    #[test]
    fn test_recording_captures_user_sends() {
        let mut deck = RecordingDeck::new();
        deck.note_sent(Command::Forward);
        deck.start_recording().unwrap();
        deck.note_sent(Command::Backward);
        deck.note_sent(Command::Stop);
        let recording = deck.stop_recording().unwrap();

        let commands: Vec<Command> = recording.commands().collect();
        assert_eq!(commands, vec![Command::Backward, Command::Stop]);
    }

    #[test]
    fn test_user_send_recorded_at_write_time() {
        let mut deck = RecordingDeck::new();
        deck.start_recording().unwrap();
        let written = Instant::now();
        std::thread::sleep(Duration::from_millis(30));
        deck.note_sent_at(Command::Forward, written);
        let recording = deck.stop_recording().unwrap();

        assert!(recording.events[0].timestamp < Duration::from_millis(30));
    }

    #[test]
    fn test_status_logging_does_not_wait_for_session() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OperationLog::new(dir.path().join("ops.txt"));
        let path = dir.path().join("rec.json");
        let (session, _port) = connected_session();
        let mut deck = RecordingDeck::new().with_operation_log(Some(oplog.clone()));

        // Another thread keeps the session busy, as during a board reset
        let (locked_tx, locked_rx) = bounded(1);
        let busy = Arc::clone(&session);
        let holder = std::thread::spawn(move || {
            let _guard = busy.lock();
            let _ = locked_tx.send(());
            std::thread::sleep(Duration::from_millis(800));
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let status = deck.handle_action(DeckAction::ToggleLoop, &session, &path).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(status, "Loop playback on");

        holder.join().unwrap();
        let content = std::fs::read_to_string(oplog.path()).unwrap();
        assert!(content.contains("Loop playback on"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.json");
        let mut deck = RecordingDeck::new();

        assert!(matches!(deck.save(&path), Err(RobotError::EmptyRecording)));

        record(&mut deck, &[(Command::Forward, 0), (Command::Stop, 120)]);
        deck.save(&path).unwrap();

        let mut other = RecordingDeck::new();
        let loaded = other.load(&path).unwrap();
        assert_eq!(loaded.events, deck.recording().unwrap().events);
    }

    #[test]
    fn test_handle_action_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();

        assert_eq!(
            deck.handle_action(DeckAction::StartRecording, &session, &path).unwrap(),
            "Recording started"
        );
        deck.record_event_at(Command::ServoZero, Duration::ZERO).unwrap();
        let status = deck.handle_action(DeckAction::StopRecording, &session, &path).unwrap();
        assert!(status.starts_with("Recording stopped (1 commands"));

        assert_eq!(
            deck.handle_action(DeckAction::ToggleLoop, &session, &path).unwrap(),
            "Loop playback on"
        );
        deck.handle_action(DeckAction::ToggleLoop, &session, &path).unwrap();

        deck.handle_action(DeckAction::Save, &session, &path).unwrap();
        assert!(path.exists());

        deck.handle_action(DeckAction::Play, &session, &path).unwrap();
        wait_idle(&mut deck);
        assert_eq!(port.written(), b"c");

        assert!(deck.handle_action(DeckAction::StopPlayback, &session, &path).is_err());
    }

    #[test]
    fn test_return_home() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();

        assert!(matches!(deck.return_home(&session), Err(RobotError::EmptyRecording)));

        deck.note_sent(Command::SelectMotor(Motor::new(4).unwrap()));
        deck.note_sent(Command::Forward);
        std::thread::sleep(Duration::from_millis(60));
        deck.note_sent(Command::Stop);

        let count = deck.return_home(&session).unwrap();
        assert_eq!(count, 3);
        wait_idle(&mut deck);
        deck.drain_events();

        assert_eq!(port.written(), b"4aw");
        // Homing moves are not journaled themselves
        assert!(deck.journal().is_empty());
    }

    #[test]
    fn test_loop_until_stopped() {
        let (session, port) = connected_session();
        let mut deck = RecordingDeck::new();
        record(&mut deck, &[(Command::Forward, 0), (Command::Stop, 60)]);
        deck.set_loop_playback(true);

        deck.play(&session).unwrap();
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(deck.state(), DeckState::Playing);
        deck.stop_playback().unwrap();

        let written = port.written();
        assert!(written.len() >= 4, "written {:?}", written);
        assert!(written.starts_with(b"dwdw"));
    }
}
