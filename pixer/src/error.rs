//! Error types for pixer.

use std::io;
use thiserror::Error;

/// Result type for pixer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pixer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The device could not be reached.
    #[error("Connection to {addr} failed: {reason}")]
    Connection {
        /// Address that was dialed.
        addr: String,
        /// Why the connection failed.
        reason: String,
    },

    /// A read did not produce data before the active timeout elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The device did not answer a command that gates further progress.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A version or battery string could not be parsed.
    #[error("Cannot parse {what} from '{input}'")]
    Parse {
        /// Name of the value being parsed.
        what: &'static str,
        /// The raw device reply.
        input: String,
    },

    /// Payload exceeds what the device accepts in one transfer.
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        limit: usize,
    },

    /// The device never confirmed a completed transfer.
    #[error("Transfer of {path} not confirmed after {attempts} attempts")]
    TransferTimeout {
        /// Destination path on the device.
        path: String,
        /// Number of completion polls performed.
        attempts: u32,
    },

    /// One or more firmware binaries are missing on the host.
    #[error("Firmware files not found: {}", .0.join(", "))]
    MissingFirmware(Vec<String>),

    /// Battery too low to upgrade safely.
    #[error("Battery level too low for upgrade: {percent}% (must be above {threshold}%)")]
    BatteryTooLow {
        /// Reported battery percentage.
        percent: u32,
        /// Highest percentage that still blocks upgrades.
        threshold: u32,
    },

    /// Image conversion failed.
    #[error("Image error: {0}")]
    Image(String),
}

impl Error {
    /// Returns `true` for read timeouts, which callers treat as "no data yet".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
