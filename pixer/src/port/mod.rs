//! Port abstraction for the device byte stream.
//!
//! The Pixer firmware speaks a plain-text protocol over a single TCP
//! connection. Everything above this module (command exchange, file transfer,
//! upgrade orchestration) talks to the device through the [`Port`] trait so the
//! protocol layer stays independent of the socket and can be driven by an
//! in-memory port in tests.
//!
//! ```text
//! +---------------------------+
//! |  Upgrade orchestrator     |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! | Command channel / transfer|
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |        Port trait         |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |   TcpPort (std::net)      |
//! +---------------------------+
//! ```

pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use log::trace;

use crate::error::{Error, Result};

/// Default device address on the appliance's own Wi-Fi network.
pub const DEFAULT_HOST: &str = "192.168.1.1";

/// Default control port.
pub const DEFAULT_PORT: u16 = 6000;

/// Default connect and command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Buffer size used while draining residual bytes.
const DRAIN_CHUNK_SIZE: usize = 256;

/// Upper bound on reads performed by a single drain.
const DRAIN_MAX_READS: usize = 4096;

/// TCP connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Device host name or IP address.
    pub host: String,
    /// Device control port.
    pub port: u16,
    /// Connect timeout and initial read/write timeout.
    pub timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TcpConfig {
    /// Create a new configuration with host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port` string used for resolution and log messages.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Returns `true` when an I/O error kind means "the read timed out".
///
/// Unix sockets report an elapsed `SO_RCVTIMEO` as `WouldBlock`, Windows as
/// `TimedOut`.
pub fn is_timeout_kind(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

/// Byte stream to a single device.
///
/// The protocol is strictly one request at a time, so every method takes
/// `&mut self` and the active timeout is only ever changed by the operation
/// currently holding the port.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout for subsequent operations.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the peer name (for log messages).
    fn name(&self) -> &str;

    /// Close the connection.
    ///
    /// Must be idempotent: closing an already closed or failed port is not an
    /// error.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }

    /// Read at most `max` bytes.
    ///
    /// Returns the bytes actually read (possibly fewer than `max`, or none if
    /// the peer closed the stream). An elapsed timeout is reported as
    /// [`Error::Timeout`] so callers can treat it as "no data yet".
    fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        match self.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            },
            Err(e) if is_timeout_kind(e.kind()) => Err(Error::Timeout(format!(
                "no data from {} within {:?}",
                self.name(),
                self.timeout()
            ))),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Discard everything the peer has already sent.
    ///
    /// Reads with `timeout` until a read times out, returns zero bytes or
    /// fails. Never fails itself; returns the number of bytes discarded.
    fn drain(&mut self, timeout: Duration) -> usize {
        if let Err(e) = self.set_timeout(timeout) {
            trace!("Drain: cannot set timeout (ignoring): {e}");
        }

        let mut discarded = 0;
        for _ in 0..DRAIN_MAX_READS {
            match self.read_chunk(DRAIN_CHUNK_SIZE) {
                Ok(data) if data.is_empty() => break,
                Ok(data) => {
                    trace!(
                        "Drained {} bytes: {:?}",
                        data.len(),
                        String::from_utf8_lossy(&data)
                    );
                    discarded += data.len();
                },
                Err(_) => break,
            }
        }
        discarded
    }
}

pub use tcp::TcpPort;
