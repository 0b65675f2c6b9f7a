//! Mock Serial Port for Testing
//!
//! This module provides a simulated serial port that can be used to run the
//! application without a robot attached and to observe exactly what the
//! session writes.
//!
//! # Features
//!
//! - **Write capture**: every write is recorded with the instant it happened
//! - **Echo**: optionally loop written bytes back, like the robot firmware
//! - **Scripted input**: queue bytes for the session to read
//! - **Fault injection**: make opens, writes or reads fail
//!
//! # Example
//!
//! ```ignore
//! use robot_serial::backend::mock_port::MockPortDriver;
//!
//! let driver = MockPortDriver::with_ports(&["COM_TEST"]);
//! let port = driver.handle();
//! let mut session = SerialSession::new(Box::new(driver), config);
//! session.connect("COM_TEST", 9600)?;
//! session.send(Command::Forward)?;
//! assert_eq!(port.written(), b"d");
//! ```
//!
//! # Enabling
//!
//! Outside of tests the mock port is only available with the `mock-port`
//! feature:
//!
//! ```bash
//! cargo run --features mock-port
//! ```

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::port_trait::{LinkSettings, PortDriver, SerialLink};
use crate::error::{Result, RobotError};
use crate::types::{PortInfo, PortKind};

/// Name of the port offered by [`MockPortDriver::new`]
pub const MOCK_PORT_NAME: &str = "MOCK0";

/// One captured write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockWrite {
    /// When the write happened
    pub at: Instant,
    /// Bytes written
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockPortState {
    open_port: Option<String>,
    baud_rate: Option<u32>,
    open_count: usize,
    writes: Vec<MockWrite>,
    incoming: VecDeque<u8>,
    echo: bool,
    fail_open: bool,
    fail_writes: bool,
    fail_reads: bool,
}

/// Shared handle for inspecting and scripting the mock port
#[derive(Debug, Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<MockPortState>>,
}

impl MockPort {
    /// All bytes written since creation, in order
    pub fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .flat_map(|w| w.bytes.iter().copied())
            .collect()
    }

    /// Individual writes with their timestamps
    pub fn writes(&self) -> Vec<MockWrite> {
        self.state.lock().writes.clone()
    }

    /// Check if a link is currently open
    pub fn is_open(&self) -> bool {
        self.state.lock().open_port.is_some()
    }

    /// Name of the currently open port
    pub fn open_port(&self) -> Option<String> {
        self.state.lock().open_port.clone()
    }

    /// Baud rate of the most recent open
    pub fn baud_rate(&self) -> Option<u32> {
        self.state.lock().baud_rate
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Queue bytes for the session to read
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes.iter().copied());
    }

    /// Loop written bytes back as incoming data
    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Make subsequent opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Make subsequent writes fail (simulates an unplugged device)
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make subsequent reads fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }
}

/// Port driver that serves simulated ports
#[derive(Debug, Clone)]
pub struct MockPortDriver {
    ports: Vec<PortInfo>,
    port: MockPort,
}

impl Default for MockPortDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPortDriver {
    /// Create a driver offering a single echoing port named [`MOCK_PORT_NAME`]
    pub fn new() -> Self {
        let driver = Self::with_ports(&[MOCK_PORT_NAME]);
        driver.port.set_echo(true);
        driver
    }

    /// Create a driver offering the given port names
    pub fn with_ports(names: &[&str]) -> Self {
        let ports = names
            .iter()
            .map(|name| PortInfo::new(*name, PortKind::Unknown))
            .collect();
        Self::with_port_info(ports)
    }

    /// Create a driver offering fully described ports
    pub fn with_port_info(ports: Vec<PortInfo>) -> Self {
        Self {
            ports,
            port: MockPort::default(),
        }
    }

    /// Handle for inspecting the simulated port
    pub fn handle(&self) -> MockPort {
        self.port.clone()
    }
}

impl PortDriver for MockPortDriver {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self.ports.clone())
    }

    fn open(&self, port: &str, settings: &LinkSettings) -> Result<Box<dyn SerialLink>> {
        let mut state = self.port.state.lock();

        if state.fail_open || !self.ports.iter().any(|p| p.name == port) {
            return Err(RobotError::Connection {
                port: port.to_string(),
                message: "No such device".to_string(),
            });
        }
        if state.open_port.is_some() {
            return Err(RobotError::Connection {
                port: port.to_string(),
                message: "Device or resource busy".to_string(),
            });
        }

        state.open_port = Some(port.to_string());
        state.baud_rate = Some(settings.baud_rate);
        state.open_count += 1;
        state.incoming.clear();

        Ok(Box::new(MockLink {
            name: port.to_string(),
            state: Arc::clone(&self.port.state),
        }))
    }
}

/// An open simulated port; closing happens on drop
struct MockLink {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "device unplugged").into());
        }

        state.writes.push(MockWrite {
            at: Instant::now(),
            bytes: bytes.to_vec(),
        });
        if state.echo {
            state.incoming.extend(bytes.iter().copied());
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut state = self.state.lock();
        if state.fail_reads {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "device unplugged").into());
        }

        let n = state.incoming.len();
        buf.extend(state.incoming.drain(..));
        Ok(n)
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.open_port.as_deref() == Some(self.name.as_str()) {
            state.open_port = None;
        }
    }
}

/// Ports offered when the mock port is enabled in the GUI
pub fn list_mock_ports() -> Vec<PortInfo> {
    vec![PortInfo::new(MOCK_PORT_NAME, PortKind::Unknown)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> LinkSettings {
        LinkSettings {
            baud_rate: 9600,
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_open_and_close() {
        let driver = MockPortDriver::with_ports(&["COM_TEST"]);
        let port = driver.handle();
        assert!(!port.is_open());

        let link = driver.open("COM_TEST", &settings()).unwrap();
        assert_eq!(link.name(), "COM_TEST");
        assert!(port.is_open());
        assert_eq!(port.baud_rate(), Some(9600));

        drop(link);
        assert!(!port.is_open());
    }

    #[test]
    fn test_unknown_port_rejected() {
        let driver = MockPortDriver::with_ports(&["COM_TEST"]);
        assert!(matches!(
            driver.open("COM99", &settings()),
            Err(RobotError::Connection { .. })
        ));
    }

    #[test]
    fn test_busy_port_rejected() {
        let driver = MockPortDriver::with_ports(&["COM_TEST"]);
        let _link = driver.open("COM_TEST", &settings()).unwrap();
        assert!(driver.open("COM_TEST", &settings()).is_err());
    }

    #[test]
    fn test_echo() {
        let driver = MockPortDriver::new();
        let mut link = driver.open(MOCK_PORT_NAME, &settings()).unwrap();
        link.write_all(b"d").unwrap();

        let mut buf = Vec::new();
        assert_eq!(link.read_available(&mut buf).unwrap(), 1);
        assert_eq!(buf, b"d");
        assert_eq!(link.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_fault_injection() {
        let driver = MockPortDriver::with_ports(&["COM_TEST"]);
        let port = driver.handle();
        let mut link = driver.open("COM_TEST", &settings()).unwrap();

        port.set_fail_writes(true);
        assert!(link.write_all(b"w").is_err());
        assert!(port.written().is_empty());

        port.set_fail_reads(true);
        assert!(link.read_available(&mut Vec::new()).is_err());
    }
}
