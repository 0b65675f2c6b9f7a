//! Command player for replaying recordings on a background thread
//!
//! Each event is sent once the time since playback start reaches the event's
//! timestamp, so gaps between commands are reproduced as recorded. Waiting
//! happens on the cancellation channel, which makes a stop request take
//! effect immediately instead of after the current gap.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::backend::SharedSession;
use crate::error::Result;
use crate::types::Command;

use super::types::Recording;

/// Shortest time one loop iteration may take
pub const MIN_LOOP_PERIOD: Duration = Duration::from_millis(100);

/// Playback settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackOptions {
    /// Restart from the first event after the last one
    pub loop_playback: bool,
}

/// How a playback run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every event was sent
    Completed { sent: usize },
    /// Stopped on request
    Cancelled { sent: usize },
    /// A send failed; the session has been disconnected
    Failed { sent: usize, error: String },
}

impl PlaybackOutcome {
    /// Number of commands written
    pub fn sent(&self) -> usize {
        match self {
            PlaybackOutcome::Completed { sent }
            | PlaybackOutcome::Cancelled { sent }
            | PlaybackOutcome::Failed { sent, .. } => *sent,
        }
    }
}

impl std::fmt::Display for PlaybackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackOutcome::Completed { sent } => write!(f, "Playback finished ({} sent)", sent),
            PlaybackOutcome::Cancelled { sent } => write!(f, "Playback stopped ({} sent)", sent),
            PlaybackOutcome::Failed { sent, error } => {
                write!(f, "Playback failed after {} sent: {}", sent, error)
            }
        }
    }
}

/// Progress notifications from the playback thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Playback began
    Started { events: usize },
    /// An event was sent
    Sent {
        index: usize,
        command: Command,
        at: Instant,
    },
    /// Playback ended
    Finished(PlaybackOutcome),
}

/// Handle to a running playback thread
#[derive(Debug)]
pub struct PlaybackHandle {
    cancel_tx: Sender<()>,
    thread: JoinHandle<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Check if the playback thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop playback and wait for the thread to exit
    ///
    /// A command already being written completes before the thread exits.
    pub fn cancel(self) -> PlaybackOutcome {
        let _ = self.cancel_tx.try_send(());
        self.join()
    }

    /// Wait for playback to end on its own
    pub fn join(self) -> PlaybackOutcome {
        self.thread.join().unwrap_or_else(|_| PlaybackOutcome::Failed {
            sent: 0,
            error: "playback thread panicked".to_string(),
        })
    }
}

/// Spawns playback threads
pub struct CommandPlayer;

impl CommandPlayer {
    /// Start replaying `recording` through `session`
    pub fn spawn(
        recording: Arc<Recording>,
        session: SharedSession,
        options: PlaybackOptions,
        events: Sender<PlaybackEvent>,
    ) -> Result<PlaybackHandle> {
        let (cancel_tx, cancel_rx) = bounded(1);

        let thread = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let _ = events.try_send(PlaybackEvent::Started {
                    events: recording.len(),
                });
                let outcome = run(&recording, &session, options, &cancel_rx, &events);
                match outcome {
                    PlaybackOutcome::Failed { ref error, .. } => {
                        tracing::error!("Playback failed: {}", error)
                    }
                    ref other => tracing::info!("{}", other),
                }
                let _ = events.try_send(PlaybackEvent::Finished(outcome.clone()));
                outcome
            })?;

        Ok(PlaybackHandle { cancel_tx, thread })
    }
}

fn run(
    recording: &Recording,
    session: &SharedSession,
    options: PlaybackOptions,
    cancel_rx: &Receiver<()>,
    events: &Sender<PlaybackEvent>,
) -> PlaybackOutcome {
    let mut sent = 0;

    loop {
        let start = Instant::now();

        for (index, event) in recording.events.iter().enumerate() {
            if wait_until(cancel_rx, start + event.timestamp) {
                return PlaybackOutcome::Cancelled { sent };
            }

            let result = session.lock().send(event.command);
            if let Err(e) = result {
                return PlaybackOutcome::Failed {
                    sent,
                    error: e.to_string(),
                };
            }
            sent += 1;
            let _ = events.try_send(PlaybackEvent::Sent {
                index,
                command: event.command,
                at: Instant::now(),
            });
        }

        if !options.loop_playback {
            return PlaybackOutcome::Completed { sent };
        }

        let cycle_end = start + recording.duration().max(MIN_LOOP_PERIOD);
        if wait_until(cancel_rx, cycle_end) {
            return PlaybackOutcome::Cancelled { sent };
        }
        tracing::debug!("Looping playback");
    }
}

/// Block until `deadline`; returns `true` if cancelled first
fn wait_until(cancel_rx: &Receiver<()>, deadline: Instant) -> bool {
    let timeout = deadline.saturating_duration_since(Instant::now());
    match cancel_rx.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}
