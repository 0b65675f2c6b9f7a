//! Serial session
//!
//! The [`SerialSession`] owns the lifetime of one serial connection. It is
//! the only object that writes to or reads from the device, and it is shared
//! between the backend worker, the playback thread and the console as a
//! [`SharedSession`] so every access is serialized by one lock.
//!
//! Every send and receive is mirrored to `tracing` and, when configured, to
//! the [`OperationLog`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::port_trait::{LinkSettings, PortDriver, SerialLink};
use crate::config::SerialConfig;
use crate::error::{Result, RobotError};
use crate::oplog::OperationLog;
use crate::types::{Command, PortInfo};

/// A serial session shared between threads
pub type SharedSession = Arc<Mutex<SerialSession>>;

/// The port and baud rate of an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
}

/// Traffic counters for the current connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Commands written
    pub commands_sent: u64,
    /// Bytes written
    pub bytes_sent: u64,
    /// Bytes read
    pub bytes_received: u64,
}

/// A port that has been opened but not yet installed in a session
pub struct PendingLink {
    link: Box<dyn SerialLink>,
    connection: Connection,
    reset_delay: Duration,
}

impl PendingLink {
    /// The port and baud rate being connected
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Sleep while the board resets after the port opened
    pub fn wait_for_reset(&self) {
        if !self.reset_delay.is_zero() {
            std::thread::sleep(self.reset_delay);
        }
    }
}

impl std::fmt::Debug for PendingLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLink")
            .field("connection", &self.connection)
            .field("reset_delay", &self.reset_delay)
            .finish()
    }
}

/// Connect a shared session, holding its lock only to open and to install
///
/// `port` of `None` picks the preferred or first port. Other users of the
/// session (playback, status logging, reads) are not blocked during the
/// board reset delay; they see a disconnected session until it ends.
pub fn connect_shared(
    session: &SharedSession,
    port: Option<&str>,
    baud_rate: u32,
) -> Result<Connection> {
    let pending = {
        let mut session = session.lock();
        let port = match port {
            Some(port) => port.to_string(),
            None => session.auto_port()?,
        };
        session.open_link(&port, baud_rate)?
    };

    pending.wait_for_reset();

    let mut session = session.lock();
    Ok(session.install(pending).clone())
}

/// Owner of the single serial connection to the robot
pub struct SerialSession {
    driver: Box<dyn PortDriver>,
    config: SerialConfig,
    link: Option<Box<dyn SerialLink>>,
    connection: Option<Connection>,
    stats: LinkStats,
    oplog: Option<OperationLog>,
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("connection", &self.connection)
            .field("stats", &self.stats)
            .finish()
    }
}

impl SerialSession {
    /// Create a disconnected session
    pub fn new(driver: Box<dyn PortDriver>, config: SerialConfig) -> Self {
        Self {
            driver,
            config,
            link: None,
            connection: None,
            stats: LinkStats::default(),
            oplog: None,
        }
    }

    /// Mirror traffic to an operation log
    pub fn with_operation_log(mut self, oplog: Option<OperationLog>) -> Self {
        self.oplog = oplog;
        self
    }

    /// Wrap the session for sharing between threads
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Replace the port driver, closing any open connection
    pub fn set_driver(&mut self, driver: Box<dyn PortDriver>) {
        self.disconnect();
        self.driver = driver;
    }

    /// Serial settings in use
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// List available ports, honoring `skip_bluetooth`
    pub fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = self.driver.list_ports()?;
        Ok(ports
            .into_iter()
            .filter(|p| !(self.config.skip_bluetooth && p.is_bluetooth()))
            .collect())
    }

    /// Open `port` at `baud_rate`, replacing any current connection
    ///
    /// Blocks for the configured reset delay. Use [`connect_shared`] when the
    /// session is shared so the lock is not held while waiting.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> Result<&Connection> {
        let pending = self.open_link(port, baud_rate)?;
        pending.wait_for_reset();
        Ok(self.install(pending))
    }

    /// Connect to the preferred port if present, otherwise the first port found
    pub fn connect_auto(&mut self, baud_rate: u32) -> Result<&Connection> {
        let port = self.auto_port()?;
        self.connect(&port, baud_rate)
    }

    /// Pick the preferred port if present, otherwise the first port found
    pub fn auto_port(&self) -> Result<String> {
        let ports = self.list_ports()?;
        let preferred = self
            .config
            .preferred_port
            .as_deref()
            .and_then(|name| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));

        let port = preferred
            .or_else(|| ports.first())
            .map(|p| p.name.clone())
            .ok_or(RobotError::NoPortFound)?;

        tracing::debug!("Auto-detected port {}", port);
        Ok(port)
    }

    /// Close any current connection and open `port`, without installing it
    ///
    /// The returned link is not usable until the board has reset and it is
    /// passed to [`SerialSession::install`].
    pub fn open_link(&mut self, port: &str, baud_rate: u32) -> Result<PendingLink> {
        self.disconnect();

        let settings = LinkSettings {
            baud_rate,
            timeout: self.config.timeout(),
        };
        tracing::info!("Connecting to {} @ {} baud", port, baud_rate);
        let link = self.driver.open(port, &settings).map_err(|e| match e {
            e @ RobotError::Connection { .. } => e,
            other => RobotError::Connection {
                port: port.to_string(),
                message: other.to_string(),
            },
        })?;

        Ok(PendingLink {
            link,
            connection: Connection {
                port: port.to_string(),
                baud_rate,
            },
            reset_delay: self.config.reset_delay(),
        })
    }

    /// Make an opened link the current connection
    pub fn install(&mut self, pending: PendingLink) -> &Connection {
        self.disconnect();

        let PendingLink {
            link, connection, ..
        } = pending;
        self.link = Some(link);
        self.stats = LinkStats::default();
        self.log_operation(&format!(
            "CONNECT {} @ {}",
            connection.port, connection.baud_rate
        ));
        tracing::info!("Connected to {}", connection.port);

        self.connection.insert(connection)
    }

    /// Close the connection (no-op when already closed)
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            let name = link.name().to_string();
            drop(link);
            self.log_operation(&format!("DISCONNECT {}", name));
            tracing::info!("Disconnected from {}", name);
        }
        self.connection = None;
    }

    /// Check if a port is open
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Current connection, if any
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Traffic counters for the current connection
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Transmit one command
    ///
    /// A write failure closes the connection before the error is returned.
    pub fn send(&mut self, command: Command) -> Result<()> {
        let link = self.link.as_mut().ok_or(RobotError::NotConnected)?;
        let bytes = command.to_bytes();

        match link.write_all(&bytes) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                self.stats.bytes_sent += bytes.len() as u64;
                tracing::debug!("Sent {}", command);
                self.log_operation(&format!("SEND {}", command));
                Ok(())
            }
            Err(e) => {
                tracing::error!("Write of {} failed: {}", command, e);
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Transmit several commands in order, stopping at the first failure
    pub fn send_all(&mut self, commands: &[Command]) -> Result<()> {
        commands.iter().try_for_each(|cmd| self.send(*cmd))
    }

    /// Read whatever the device has sent since the last call
    ///
    /// Returns an empty vector when nothing is pending. A read failure closes
    /// the connection before the error is returned.
    pub fn read_available(&mut self) -> Result<Vec<u8>> {
        let link = self.link.as_mut().ok_or(RobotError::NotConnected)?;
        let mut buf = Vec::new();

        match link.read_available(&mut buf) {
            Ok(n) => {
                if n > 0 {
                    self.stats.bytes_received += n as u64;
                    let text = String::from_utf8_lossy(&buf);
                    tracing::debug!("Received {:?}", text);
                    self.log_operation(&format!("RECV {}", text.trim_end()));
                }
                Ok(buf)
            }
            Err(e) => {
                tracing::error!("Read failed: {}", e);
                self.disconnect();
                Err(e)
            }
        }
    }

    /// The operation log, if one is configured
    pub fn operation_log(&self) -> Option<&OperationLog> {
        self.oplog.as_ref()
    }

    /// Append a line to the operation log, if one is configured
    pub fn log_operation(&self, line: &str) {
        if let Some(ref oplog) = self.oplog {
            oplog.append(line);
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
