//! Port traits for a unified serial interface
//!
//! This module provides the seam between the serial session and the
//! operating system: a [`PortDriver`] enumerates and opens ports, and each
//! open port is a [`SerialLink`]. Both real hardware (via `serialport`) and
//! the mock port used in tests implement these traits.

use std::time::Duration;

use crate::error::Result;
use crate::types::PortInfo;

/// Parameters used when opening a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout
    pub timeout: Duration,
}

/// An open serial connection
///
/// Implementations must be `Send` so the link can move between the worker
/// and playback threads behind the session lock.
pub trait SerialLink: Send {
    /// Name of the port this link is attached to
    fn name(&self) -> &str;

    /// Write every byte, blocking until done or failed
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Append whatever bytes are waiting to `buf` without blocking
    ///
    /// Returns the number of bytes appended; zero when nothing is pending.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize>;
}

/// Enumerates and opens serial ports
pub trait PortDriver: Send {
    /// List ports currently present on the system
    fn list_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open a port
    ///
    /// # Arguments
    /// * `port` - Port name as reported by [`PortDriver::list_ports`]
    /// * `settings` - Baud rate and timeout
    fn open(&self, port: &str, settings: &LinkSettings) -> Result<Box<dyn SerialLink>>;
}
