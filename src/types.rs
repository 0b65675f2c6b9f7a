//! Core data types for robot-serial
//!
//! This module contains the command alphabet understood by the robot
//! firmware, motor identifiers and selections, and the serial-port
//! descriptions shared between the backend and the frontends.
//!
//! # Command alphabet
//!
//! | Wire    | Command                 | Stepper        | Servo      |
//! |---------|-------------------------|----------------|------------|
//! | `1`-`5` | [`Command::SelectMotor`]| select stepper |            |
//! | `6`     | [`Command::SelectMotor`]|                | select     |
//! | `d`     | [`Command::Forward`]    | forward        | +60°       |
//! | `a`     | [`Command::Backward`]   | backward       | -60°       |
//! | `w`     | [`Command::Stop`]       | stop           | hold       |
//! | `[`     | [`Command::ServoUp`]    |                | +15°       |
//! | `]`     | [`Command::ServoDown`]  |                | -15°       |
//! | `c`     | [`Command::ServoZero`]  |                | 0°         |
//! | `Z####` | [`Command::StepDelay`]  | step delay µs  |            |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RobotError};

/// Slowest step delay the firmware accepts (microseconds)
pub const MAX_STEP_DELAY_US: u16 = 4000;

/// Fastest step delay the firmware accepts (microseconds)
pub const MIN_STEP_DELAY_US: u16 = 150;

/// Step delay used by the firmware after reset (microseconds)
pub const DEFAULT_STEP_DELAY_US: u16 = 3000;

/// Servo angle range in degrees
pub const SERVO_MAX_ANGLE: u16 = 180;

/// A motor channel on the robot (1-5 steppers, 6 the gripper servo)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Motor(u8);

impl Motor {
    /// Number of motor channels
    pub const COUNT: u8 = 6;

    /// The gripper servo channel
    pub const SERVO: Motor = Motor(6);

    /// Create a motor from its channel number
    pub fn new(number: u8) -> Option<Self> {
        (1..=Self::COUNT).contains(&number).then_some(Motor(number))
    }

    /// All motor channels in ascending order
    pub fn all() -> impl Iterator<Item = Motor> {
        (1..=Self::COUNT).map(Motor)
    }

    /// Stepper channels only
    pub fn steppers() -> impl Iterator<Item = Motor> {
        Self::all().filter(|m| !m.is_servo())
    }

    /// Channel number (1-6)
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Check if this channel drives the servo
    pub fn is_servo(&self) -> bool {
        *self == Self::SERVO
    }

    /// Human-readable joint name
    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Head",
            2 => "Head pan",
            3 => "Neck",
            4 => "Body",
            5 => "Base",
            _ => "Gripper",
        }
    }
}

impl fmt::Display for Motor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// A command from the robot's closed command alphabet
///
/// Commands are validated when parsed; characters outside the alphabet are
/// rejected rather than forwarded to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Command {
    /// Select the motor that subsequent commands apply to
    SelectMotor(Motor),
    /// Stepper forward / servo +60°
    Forward,
    /// Stepper backward / servo -60°
    Backward,
    /// Stepper stop / servo hold
    Stop,
    /// Servo +15°
    ServoUp,
    /// Servo -15°
    ServoDown,
    /// Servo to 0°
    ServoZero,
    /// Stepper step delay in microseconds
    StepDelay(u16),
}

impl Command {
    /// Parse a single command character
    pub fn from_char(ch: char) -> Result<Self> {
        let cmd = match ch {
            '1'..='6' => {
                let n = ch as u8 - b'0';
                Command::SelectMotor(Motor(n))
            }
            'd' => Command::Forward,
            'a' => Command::Backward,
            'w' => Command::Stop,
            '[' => Command::ServoUp,
            ']' => Command::ServoDown,
            'c' => Command::ServoZero,
            other => return Err(RobotError::InvalidCommand(other.to_string())),
        };
        Ok(cmd)
    }

    /// Build a step delay command, clamped to the firmware range
    pub fn step_delay(micros: u16) -> Self {
        Command::StepDelay(micros.clamp(MIN_STEP_DELAY_US, MAX_STEP_DELAY_US))
    }

    /// The single wire character, if this is a one-byte command
    pub fn as_char(&self) -> Option<char> {
        let ch = match self {
            Command::SelectMotor(m) => (b'0' + m.number()) as char,
            Command::Forward => 'd',
            Command::Backward => 'a',
            Command::Stop => 'w',
            Command::ServoUp => '[',
            Command::ServoDown => ']',
            Command::ServoZero => 'c',
            Command::StepDelay(_) => return None,
        };
        Some(ch)
    }

    /// Bytes written to the serial port for this command
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Whether this command moves or stops a stepper
    pub fn is_motion(&self) -> bool {
        matches!(self, Command::Forward | Command::Backward | Command::Stop)
    }

    /// Short description for buttons and help output
    pub fn description(&self) -> &'static str {
        match self {
            Command::SelectMotor(m) if m.is_servo() => "select servo",
            Command::SelectMotor(_) => "select stepper",
            Command::Forward => "forward / +60°",
            Command::Backward => "backward / -60°",
            Command::Stop => "stop / hold",
            Command::ServoUp => "servo +15°",
            Command::ServoDown => "servo -15°",
            Command::ServoZero => "servo 0°",
            Command::StepDelay(_) => "step delay (µs)",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StepDelay(us) => write!(f, "Z{:04}", (*us).min(9999)),
            other => match other.as_char() {
                Some(ch) => write!(f, "{}", ch),
                None => Ok(()),
            },
        }
    }
}

impl FromStr for Command {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Command::from_char(ch),
            (Some('Z'), Some(_)) => {
                let digits = &s[1..];
                if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(RobotError::InvalidCommand(s.to_string()));
                }
                let micros: u16 = digits
                    .parse()
                    .map_err(|_| RobotError::InvalidCommand(s.to_string()))?;
                if !(MIN_STEP_DELAY_US..=MAX_STEP_DELAY_US).contains(&micros) {
                    return Err(RobotError::InvalidCommand(s.to_string()));
                }
                Ok(Command::StepDelay(micros))
            }
            _ => Err(RobotError::InvalidCommand(s.to_string())),
        }
    }
}

impl TryFrom<char> for Command {
    type Error = RobotError;

    fn try_from(ch: char) -> Result<Self> {
        Command::from_char(ch)
    }
}

impl TryFrom<String> for Command {
    type Error = RobotError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Command> for String {
    fn from(cmd: Command) -> Self {
        cmd.to_string()
    }
}

/// A set of motors that receive the same command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotorSelection {
    motors: BTreeSet<Motor>,
}

impl MotorSelection {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or remove a motor
    pub fn set(&mut self, motor: Motor, selected: bool) {
        if selected {
            self.motors.insert(motor);
        } else {
            self.motors.remove(&motor);
        }
    }

    /// Check if a motor is selected
    pub fn contains(&self, motor: Motor) -> bool {
        self.motors.contains(&motor)
    }

    /// Select every motor
    pub fn select_all(&mut self) {
        self.motors.extend(Motor::all());
    }

    /// Deselect every motor
    pub fn clear(&mut self) {
        self.motors.clear();
    }

    /// Check if nothing is selected
    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    /// Selected motors in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Motor> + '_ {
        self.motors.iter().copied()
    }

    /// Expand a command into select-then-command pairs for every selected motor
    pub fn fan_out(&self, command: Command) -> Vec<Command> {
        self.motors
            .iter()
            .flat_map(|m| [Command::SelectMotor(*m), command])
            .collect()
    }
}

impl fmt::Display for MotorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.motors.iter().map(|m| m.to_string()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Connection status with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected to any port
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection error occurred
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Kind of serial port, as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// USB serial adapter
    Usb {
        vendor_id: u16,
        product_id: u16,
        product: Option<String>,
    },
    /// Bluetooth serial link
    Bluetooth,
    /// PCI serial card
    Pci,
    /// Anything else
    Unknown,
}

/// A serial port available on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g. `COM3`, `/dev/ttyUSB0`)
    pub name: String,
    /// Port kind
    pub kind: PortKind,
}

impl PortInfo {
    /// Create a port description
    pub fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Check if this is a Bluetooth port
    pub fn is_bluetooth(&self) -> bool {
        matches!(self.kind, PortKind::Bluetooth)
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PortKind::Usb {
                vendor_id,
                product_id,
                product: Some(product),
            } => write!(
                f,
                "{} - {} ({:04x}:{:04x})",
                self.name, product, vendor_id, product_id
            ),
            PortKind::Usb {
                vendor_id,
                product_id,
                product: None,
            } => write!(f, "{} ({:04x}:{:04x})", self.name, vendor_id, product_id),
            PortKind::Bluetooth => write!(f, "{} - Bluetooth", self.name),
            PortKind::Pci => write!(f, "{} - PCI", self.name),
            PortKind::Unknown => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_alphabet() {
        for ch in ['1', '2', '3', '4', '5', '6', 'd', 'a', 'w', '[', ']', 'c'] {
            let cmd = Command::from_char(ch).unwrap();
            assert_eq!(cmd.as_char(), Some(ch));
            assert_eq!(cmd.to_bytes(), vec![ch as u8]);
        }
    }

    #[test]
    fn test_unknown_characters_rejected() {
        for ch in ['0', '7', 'x', 'D', 'Z', ' ', '\n'] {
            assert!(matches!(
                Command::from_char(ch),
                Err(RobotError::InvalidCommand(_))
            ));
        }
    }

    #[test]
    fn test_step_delay_parsing() {
        assert_eq!("Z1800".parse::<Command>().unwrap(), Command::StepDelay(1800));
        assert_eq!(Command::StepDelay(400).to_string(), "Z0400");
        assert_eq!(Command::StepDelay(400).to_bytes(), b"Z0400".to_vec());
        assert!("Z180".parse::<Command>().is_err());
        assert!("Z18000".parse::<Command>().is_err());
        assert!("Z12a4".parse::<Command>().is_err());
        assert!("Z0100".parse::<Command>().is_err());
        assert!("dw".parse::<Command>().is_err());
    }

    #[test]
    fn test_step_delay_clamped() {
        assert_eq!(Command::step_delay(10), Command::StepDelay(MIN_STEP_DELAY_US));
        assert_eq!(Command::step_delay(9000), Command::StepDelay(MAX_STEP_DELAY_US));
    }

    #[test]
    fn test_command_serde() {
        let json = serde_json::to_string(&Command::SelectMotor(Motor::SERVO)).unwrap();
        assert_eq!(json, "\"6\"");
        let cmd: Command = serde_json::from_str("\"Z2000\"").unwrap();
        assert_eq!(cmd, Command::StepDelay(2000));
        assert!(serde_json::from_str::<Command>("\"q\"").is_err());
    }

    #[test]
    fn test_motor_range() {
        assert!(Motor::new(0).is_none());
        assert!(Motor::new(7).is_none());
        assert!(Motor::new(6).unwrap().is_servo());
        assert_eq!(Motor::steppers().count(), 5);
        assert_eq!(Motor::all().count(), 6);
    }

    #[test]
    fn test_selection_fan_out() {
        let mut selection = MotorSelection::new();
        assert!(selection.fan_out(Command::Forward).is_empty());

        selection.set(Motor::new(3).unwrap(), true);
        selection.set(Motor::new(1).unwrap(), true);
        let cmds = selection.fan_out(Command::Forward);
        let wire: String = cmds.iter().map(|c| c.to_string()).collect();
        assert_eq!(wire, "1d3d");
        assert_eq!(selection.to_string(), "M1, M3");

        selection.set(Motor::new(1).unwrap(), false);
        assert!(!selection.contains(Motor::new(1).unwrap()));

        selection.select_all();
        assert_eq!(selection.iter().count(), 6);
        selection.clear();
        assert!(selection.is_empty());
    }

    #[test]
    fn test_port_info_display() {
        let port = PortInfo::new(
            "COM3",
            PortKind::Usb {
                vendor_id: 0x2341,
                product_id: 0x0043,
                product: Some("Arduino Uno".to_string()),
            },
        );
        assert_eq!(port.to_string(), "COM3 - Arduino Uno (2341:0043)");
        assert!(PortInfo::new("COM9", PortKind::Bluetooth).is_bluetooth());
    }
}
