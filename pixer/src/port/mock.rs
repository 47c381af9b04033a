//! In-memory port for protocol tests.
//!
//! Reads are served from an inbox of [`ReadEvent`]s; an empty inbox behaves
//! like an elapsed read timeout. Every write is recorded as one entry and can
//! be fed to a responder closure that queues the device's reaction, so the
//! tests can model a device that only answers after it has received a command.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

/// What the next `read` call produces.
#[derive(Debug, Clone)]
pub(crate) enum ReadEvent {
    Data(Vec<u8>),
    Timeout,
    Eof,
    Fail(ErrorKind),
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<ReadEvent> + Send>;

pub(crate) struct MockPort {
    inbox: VecDeque<ReadEvent>,
    responder: Responder,
    fail_writes_after: Option<usize>,
    timeout: Duration,
    closed: bool,
    /// Every successful write, one entry per `write` call.
    pub writes: Vec<Vec<u8>>,
    /// Every timeout passed to `set_timeout`, in order.
    pub timeouts: Vec<Duration>,
    /// Number of `read` calls served.
    pub reads: usize,
    /// Number of `close` calls.
    pub close_calls: usize,
}

impl MockPort {
    /// A port whose peer never says anything.
    pub fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            responder: Box::new(|_| Vec::new()),
            fail_writes_after: None,
            timeout: Duration::from_millis(2000),
            closed: false,
            writes: Vec::new(),
            timeouts: Vec::new(),
            reads: 0,
            close_calls: 0,
        }
    }

    /// A port that serves `events` in order regardless of what is written.
    pub fn scripted(events: Vec<ReadEvent>) -> Self {
        let mut port = Self::new();
        port.inbox.extend(events);
        port
    }

    /// A port whose peer reacts to each write.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<ReadEvent> + Send + 'static,
    {
        let mut port = Self::new();
        port.responder = Box::new(responder);
        port
    }

    /// Fail every write once `count` writes have succeeded.
    #[must_use]
    pub fn fail_writes_after(mut self, count: usize) -> Self {
        self.fail_writes_after = Some(count);
        self
    }

    /// Writes decoded as text, one entry per write.
    pub fn written_text(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        match self.inbox.pop_front() {
            Some(ReadEvent::Data(data)) => {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.inbox.push_front(ReadEvent::Data(data[n..].to_vec()));
                }
                Ok(n)
            },
            Some(ReadEvent::Eof) => Ok(0),
            Some(ReadEvent::Fail(kind)) => Err(io::Error::new(kind, "mock failure")),
            Some(ReadEvent::Timeout) | None => Err(io::Error::new(ErrorKind::TimedOut, "mock timeout")),
        }
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(ErrorKind::NotConnected, "mock closed"));
        }
        if self
            .fail_writes_after
            .is_some_and(|limit| self.writes.len() >= limit)
        {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "mock write failure"));
        }

        self.writes.push(buf.to_vec());
        let reaction = (self.responder)(buf);
        self.inbox.extend(reaction);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeouts.push(timeout);
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        self.closed = true;
        Ok(())
    }
}
