//! Command/response exchange.
//!
//! Commands are ASCII strings written verbatim. The device answers with a short
//! text reply that is not delimited in any way: one read returns one reply.
//! The device is not always ready right after a write, so the first few reads
//! may time out; the channel retries a bounded number of times before giving
//! up with [`Reply::NoResponse`].

use crate::error::{Error, Result};
use crate::port::Port;
use log::{debug, trace, warn};
use std::io::ErrorKind;

/// Default maximum size of a single reply.
pub const DEFAULT_REPLY_SIZE: usize = 64;

/// Default number of read attempts after a command.
pub const DEFAULT_RETRIES: u32 = 5;

/// Outcome of a command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// First non-empty read after the command, decoded as text.
    Data(String),
    /// Every read attempt timed out or returned nothing.
    NoResponse,
}

impl Reply {
    /// Reply text, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Data(text) => Some(text),
            Self::NoResponse => None,
        }
    }

    /// Reply text, or `default` when the device stayed silent.
    pub fn or_default(self, default: &str) -> String {
        match self {
            Self::Data(text) => text,
            Self::NoResponse => default.to_string(),
        }
    }

    /// Whether the device stayed silent.
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::NoResponse)
    }
}

/// Errors after which the connection is unusable; retrying the read is pointless.
fn is_connection_lost(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
    )
}

/// Sends commands and collects replies over a borrowed port.
pub struct CommandChannel<'a, P: Port> {
    port: &'a mut P,
    reply_size: usize,
    retries: u32,
}

impl<'a, P: Port> CommandChannel<'a, P> {
    /// Create a channel with the default reply size and retry count.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            reply_size: DEFAULT_REPLY_SIZE,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Set the maximum reply size.
    #[must_use]
    pub fn with_reply_size(mut self, reply_size: usize) -> Self {
        self.reply_size = reply_size.max(1);
        self
    }

    /// Set the number of read attempts.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Send a text command.
    pub fn send_str(&mut self, command: &str) -> Result<Reply> {
        self.send(command.as_bytes())
    }

    /// Send a command and wait for its reply.
    ///
    /// A failed write is an error. Read timeouts and empty reads only use up
    /// an attempt; when all attempts are used the result is
    /// [`Reply::NoResponse`].
    pub fn send(&mut self, command: &[u8]) -> Result<Reply> {
        debug!(
            "Sending '{}' ({} bytes)",
            String::from_utf8_lossy(command),
            command.len()
        );
        self.port.write_all_bytes(command)?;

        for attempt in 1..=self.retries {
            match self.port.read_chunk(self.reply_size) {
                Ok(data) if !data.is_empty() => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    debug!("Reply on attempt {attempt}/{}: '{text}'", self.retries);
                    return Ok(Reply::Data(text));
                },
                Ok(_) => {
                    trace!("Empty read (attempt {attempt}/{})", self.retries);
                },
                Err(e) if e.is_timeout() => {
                    trace!("Read timeout (attempt {attempt}/{})", self.retries);
                },
                Err(Error::Io(e)) if is_connection_lost(e.kind()) => {
                    return Err(Error::Io(e));
                },
                Err(e) => {
                    debug!("Read error (attempt {attempt}/{}, ignoring): {e}", self.retries);
                },
            }
        }

        warn!(
            "No reply to '{}' after {} attempts",
            String::from_utf8_lossy(command),
            self.retries
        );
        Ok(Reply::NoResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockPort, ReadEvent};

    #[test]
    fn test_send_returns_first_non_empty_read() {
        let mut port = MockPort::with_responder(|cmd| {
            assert_eq!(cmd, b"#TEST#");
            vec![
                ReadEvent::Timeout,
                ReadEvent::Eof,
                ReadEvent::Data(b"Hello PC!".to_vec()),
                ReadEvent::Data(b"trailing".to_vec()),
            ]
        });

        let reply = CommandChannel::new(&mut port).send_str("#TEST#").unwrap();
        assert_eq!(reply, Reply::Data("Hello PC!".into()));
        assert_eq!(port.reads, 3);
        assert_eq!(port.written_text(), vec!["#TEST#"]);
    }

    #[test]
    fn test_send_no_response_after_exactly_retries_reads() {
        let mut port = MockPort::new();

        let reply = CommandChannel::new(&mut port).send_str("bleVersion").unwrap();
        assert!(reply.is_no_response());
        assert_eq!(port.reads, DEFAULT_RETRIES as usize);

        let mut port = MockPort::new();
        let reply = CommandChannel::new(&mut port)
            .with_retries(3)
            .send_str("bleVersion")
            .unwrap();
        assert!(reply.is_no_response());
        assert_eq!(port.reads, 3);
    }

    #[test]
    fn test_send_reply_size_limits_read() {
        let mut port =
            MockPort::with_responder(|_| vec![ReadEvent::Data(b"0123456789".to_vec())]);

        let reply = CommandChannel::new(&mut port)
            .with_reply_size(4)
            .send_str("mcuVersion")
            .unwrap();
        assert_eq!(reply.as_str(), Some("0123"));
    }

    #[test]
    fn test_send_write_failure_is_error() {
        let mut port = MockPort::new().fail_writes_after(0);
        let result = CommandChannel::new(&mut port).send_str("#TEST#");
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(port.reads, 0);
    }

    #[test]
    fn test_send_connection_lost_is_error() {
        let mut port =
            MockPort::with_responder(|_| vec![ReadEvent::Fail(ErrorKind::ConnectionReset)]);
        let result = CommandChannel::new(&mut port).send_str("batteryLevel");
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(port.reads, 1);
    }

    #[test]
    fn test_send_transient_read_error_is_retried() {
        let mut port = MockPort::with_responder(|_| {
            vec![
                ReadEvent::Fail(ErrorKind::Interrupted),
                ReadEvent::Data(b"80".to_vec()),
            ]
        });
        let reply = CommandChannel::new(&mut port).send_str("batteryLevel").unwrap();
        assert_eq!(reply.or_default("0"), "80");
    }

    #[test]
    fn test_reply_defaults() {
        assert_eq!(Reply::NoResponse.or_default("0.0.0"), "0.0.0");
        assert_eq!(Reply::Data("1.0.3".into()).or_default("0.0.0"), "1.0.3");
        assert_eq!(Reply::NoResponse.as_str(), None);
    }
}
