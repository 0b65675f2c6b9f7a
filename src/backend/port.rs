//! System serial port backend
//!
//! This module provides the [`PortDriver`] used with real hardware. It wraps
//! the `serialport` crate for port discovery and I/O.
//!
//! # Example
//!
//! ```ignore
//! use robot_serial::backend::{PortDriver, SystemPortDriver, LinkSettings};
//!
//! let driver = SystemPortDriver;
//! for port in driver.list_ports()? {
//!     println!("Found: {}", port);
//! }
//! ```

use std::io::{ErrorKind, Read, Write};

use serialport::{SerialPort, SerialPortType};

use super::port_trait::{LinkSettings, PortDriver, SerialLink};
use crate::error::{Result, RobotError};
use crate::types::{PortInfo, PortKind};

/// Largest chunk read from the port in one call
const READ_CHUNK: usize = 1024;

/// Port driver backed by the operating system's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortDriver;

impl PortDriver for SystemPortDriver {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let kind = match p.port_type {
                    SerialPortType::UsbPort(info) => PortKind::Usb {
                        vendor_id: info.vid,
                        product_id: info.pid,
                        product: info.product,
                    },
                    SerialPortType::BluetoothPort => PortKind::Bluetooth,
                    SerialPortType::PciPort => PortKind::Pci,
                    SerialPortType::Unknown => PortKind::Unknown,
                };
                PortInfo::new(p.port_name, kind)
            })
            .collect())
    }

    fn open(&self, port: &str, settings: &LinkSettings) -> Result<Box<dyn SerialLink>> {
        let handle = serialport::new(port, settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| RobotError::Connection {
                port: port.to_string(),
                message: e.to_string(),
            })?;

        Ok(Box::new(SystemLink {
            name: port.to_string(),
            port: handle,
        }))
    }
}

/// An open OS serial port
struct SystemLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(0);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let want = pending.min(READ_CHUNK);
        match self.port.read(&mut chunk[..want]) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
