//! Motion journal for returning the arm to its starting pose
//!
//! The robot has no position feedback, so the journal estimates motion from
//! the commands that were sent: each stepper run (a direction command up to
//! the next direction change or stop) is remembered with its duration, and
//! the servo angle is tracked from the relative servo commands. Returning
//! home replays the inverse runs newest-first.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::types::{Command, Motor, SERVO_MAX_ANGLE};

use super::types::{CommandEvent, Recording, RecordingMetadata};

/// Degrees moved by `[` and `]`
const SERVO_FINE_STEP: i32 = 15;

/// Degrees moved by `d` and `a` while the servo is selected
const SERVO_COARSE_STEP: i32 = 60;

/// A stepper run that undoes a recorded one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseAction {
    /// Motor to drive
    pub motor: Motor,
    /// Direction opposite to the recorded run
    pub command: Command,
    /// How long to run
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy)]
struct OpenRun {
    direction: Command,
    started: Instant,
}

/// Estimated motion history since the last home
#[derive(Debug, Default)]
pub struct MotionJournal {
    selected: Option<Motor>,
    running: BTreeMap<Motor, OpenRun>,
    reverse: Vec<ReverseAction>,
    servo_angle: u16,
}

impl MotionJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated servo angle in degrees
    pub fn servo_angle(&self) -> u16 {
        self.servo_angle
    }

    /// Completed runs, oldest first
    pub fn reverse_actions(&self) -> &[ReverseAction] {
        &self.reverse
    }

    /// Motors believed to be running
    pub fn running_motors(&self) -> impl Iterator<Item = Motor> + '_ {
        self.running.keys().copied()
    }

    /// Check if there is nothing to undo
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty() && self.running.is_empty() && self.servo_angle == 0
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.running.clear();
        self.reverse.clear();
        self.servo_angle = 0;
    }

    /// Account for a command sent at `at`
    pub fn observe(&mut self, command: Command, at: Instant) {
        match command {
            Command::SelectMotor(motor) => self.selected = Some(motor),
            Command::Forward | Command::Backward => match self.selected {
                Some(motor) if motor.is_servo() => {
                    let step = if command == Command::Forward {
                        SERVO_COARSE_STEP
                    } else {
                        -SERVO_COARSE_STEP
                    };
                    self.turn_servo(step);
                }
                Some(motor) => {
                    self.close_run(motor, at);
                    self.running.insert(
                        motor,
                        OpenRun {
                            direction: command,
                            started: at,
                        },
                    );
                }
                None => {}
            },
            Command::Stop => {
                if let Some(motor) = self.selected.filter(|m| !m.is_servo()) {
                    self.close_run(motor, at);
                }
            }
            Command::ServoUp | Command::ServoDown | Command::ServoZero => {
                if self.selected.is_some_and(|m| m.is_servo()) {
                    match command {
                        Command::ServoUp => self.turn_servo(SERVO_FINE_STEP),
                        Command::ServoDown => self.turn_servo(-SERVO_FINE_STEP),
                        _ => self.servo_angle = 0,
                    }
                }
            }
            Command::StepDelay(_) => {}
        }
    }

    /// Build the sequence that undoes the journal, then clear it
    ///
    /// Running motors are stopped and the servo zeroed first; the recorded
    /// runs are then reversed newest-first, each followed by a stop once its
    /// duration has elapsed.
    pub fn home_recording(&mut self, now: Instant) -> Recording {
        let running: Vec<Motor> = self.running.keys().copied().collect();
        for motor in &running {
            self.close_run(*motor, now);
        }

        let mut events = Vec::new();
        let mut at = Duration::ZERO;
        let mut push = |command: Command, at: Duration| events.push(CommandEvent::new(command, at));

        for motor in running {
            push(Command::SelectMotor(motor), at);
            push(Command::Stop, at);
        }
        if self.servo_angle != 0 {
            push(Command::SelectMotor(Motor::SERVO), at);
            push(Command::ServoZero, at);
        }
        for action in self.reverse.iter().rev() {
            push(Command::SelectMotor(action.motor), at);
            push(action.command, at);
            at += action.duration;
            push(Command::Stop, at);
        }

        self.reset();
        self.selected = events
            .iter()
            .rev()
            .find_map(|e| match e.command {
                Command::SelectMotor(m) => Some(m),
                _ => None,
            })
            .or(self.selected);

        let mut recording = Recording::new(RecordingMetadata::new("Return to home"));
        recording.events = events;
        recording.finalize();
        recording
    }

    fn close_run(&mut self, motor: Motor, at: Instant) {
        if let Some(run) = self.running.remove(&motor) {
            let duration = at.saturating_duration_since(run.started);
            if duration.is_zero() {
                return;
            }
            let command = if run.direction == Command::Forward {
                Command::Backward
            } else {
                Command::Forward
            };
            self.reverse.push(ReverseAction {
                motor,
                command,
                duration,
            });
        }
    }

    fn turn_servo(&mut self, delta: i32) {
        let angle = (self.servo_angle as i32 + delta).clamp(0, SERVO_MAX_ANGLE as i32);
        self.servo_angle = angle as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor(n: u8) -> Motor {
        Motor::new(n).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_servo_angle_tracking() {
        let mut journal = MotionJournal::new();
        let t = Instant::now();

        // Servo commands are ignored until the servo is selected
        journal.observe(Command::ServoUp, t);
        assert_eq!(journal.servo_angle(), 0);

        journal.observe(Command::SelectMotor(Motor::SERVO), t);
        journal.observe(Command::Forward, t);
        journal.observe(Command::ServoUp, t);
        assert_eq!(journal.servo_angle(), 75);

        for _ in 0..5 {
            journal.observe(Command::Forward, t);
        }
        assert_eq!(journal.servo_angle(), 180);

        journal.observe(Command::ServoDown, t);
        assert_eq!(journal.servo_angle(), 165);
        journal.observe(Command::ServoZero, t);
        assert_eq!(journal.servo_angle(), 0);
        journal.observe(Command::Backward, t);
        assert_eq!(journal.servo_angle(), 0);
        assert!(journal.reverse_actions().is_empty());
    }

    #[test]
    fn test_runs_become_reverse_actions() {
        let mut journal = MotionJournal::new();
        let t0 = Instant::now();

        journal.observe(Command::SelectMotor(motor(1)), t0);
        journal.observe(Command::Forward, t0);
        journal.observe(Command::Backward, t0 + ms(300));
        journal.observe(Command::Stop, t0 + ms(400));

        assert_eq!(
            journal.reverse_actions(),
            &[
                ReverseAction {
                    motor: motor(1),
                    command: Command::Backward,
                    duration: ms(300)
                },
                ReverseAction {
                    motor: motor(1),
                    command: Command::Forward,
                    duration: ms(100)
                },
            ]
        );
        assert_eq!(journal.running_motors().count(), 0);
    }

    #[test]
    fn test_home_recording() {
        let mut journal = MotionJournal::new();
        let t0 = Instant::now();

        journal.observe(Command::SelectMotor(motor(1)), t0);
        journal.observe(Command::Forward, t0);
        journal.observe(Command::Stop, t0 + ms(500));
        journal.observe(Command::SelectMotor(motor(2)), t0 + ms(600));
        journal.observe(Command::Backward, t0 + ms(600));
        journal.observe(Command::Stop, t0 + ms(800));
        journal.observe(Command::SelectMotor(motor(3)), t0 + ms(900));
        journal.observe(Command::Forward, t0 + ms(900));
        journal.observe(Command::SelectMotor(Motor::SERVO), t0 + ms(950));
        journal.observe(Command::ServoUp, t0 + ms(950));

        let home = journal.home_recording(t0 + ms(1000));
        let got: Vec<(String, u64)> = home
            .events
            .iter()
            .map(|e| (e.command.to_string(), e.timestamp.as_millis() as u64))
            .collect();
        let expected: Vec<(String, u64)> = [
            ("3", 0),
            ("w", 0),
            ("6", 0),
            ("c", 0),
            // Motor 3 ran forward for 100 ms
            ("3", 0),
            ("a", 0),
            ("w", 100),
            ("2", 100),
            ("d", 100),
            ("w", 300),
            ("1", 300),
            ("a", 300),
            ("w", 800),
        ]
        .iter()
        .map(|(c, t)| (c.to_string(), *t))
        .collect();
        assert_eq!(got, expected);
        assert_eq!(home.duration(), ms(800));

        assert!(journal.is_empty());
        assert!(journal.home_recording(t0 + ms(2000)).is_empty());
    }
}
