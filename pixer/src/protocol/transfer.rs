//! File transfer to the device's flash file system.
//!
//! ## Protocol Overview
//!
//! ```text
//! host                                    device
//!  | -- "sendFile" ------------------------> |
//!  | <------------------------------ reply - |
//!  | -- "<device path>" -------------------> |   (no reply)
//!  | -- "<decimal size>" ------------------> |
//!  | <------------------------------ reply - |
//!  | -- payload, 1024-byte chunks ---------> |   (no per-chunk ack)
//!  | <-------------------------------- OK! - |   (polled, up to 180 s)
//!  |    drain residual bytes, settle         |
//! ```
//!
//! Every phase runs with its own socket timeout. Residual bytes are always
//! drained after the network phases, whatever their result, so the next
//! command starts on a clean stream.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::command::CommandChannel;
use log::{debug, error, info, trace};
use std::thread;
use std::time::Duration;

/// Largest payload the device accepts in one transfer.
pub const MAX_FILE_SIZE: usize = 1024 * 1024;

/// Payload chunk size; matches the device's receive buffer.
pub const CHUNK_SIZE: usize = 1024;

/// Maximum size of one completion poll read.
pub const COMPLETION_READ_SIZE: usize = 256;

/// Command that opens a transfer.
pub const START_COMMAND: &str = "sendFile";

/// Reply that confirms a completed transfer.
pub const COMPLETION_ACK: &str = "OK!";

/// Timing of the transfer phases.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Timeout for the `sendFile` / size handshake.
    pub start_timeout: Duration,
    /// Timeout while streaming payload chunks.
    pub stream_timeout: Duration,
    /// Read timeout of each completion poll.
    pub poll_timeout: Duration,
    /// Number of completion polls before giving up.
    pub poll_attempts: u32,
    /// Pause between completion polls.
    pub poll_interval: Duration,
    /// Timeout used while draining residual bytes.
    pub drain_timeout: Duration,
    /// Pause after draining, giving the device time to process the file.
    pub settle_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_millis(5000),
            stream_timeout: Duration::from_millis(30000),
            poll_timeout: Duration::from_millis(5000),
            poll_attempts: 180,
            poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Pushes one file at a time to the device.
pub struct FileTransfer<'a, P: Port> {
    port: &'a mut P,
    config: TransferConfig,
}

impl<'a, P: Port> FileTransfer<'a, P> {
    /// Create a transfer handler with default timing.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: TransferConfig::default(),
        }
    }

    /// Create a transfer handler with custom timing.
    pub fn with_config(port: &'a mut P, config: TransferConfig) -> Self {
        Self { port, config }
    }

    /// Send `payload` to `device_path`.
    ///
    /// # Arguments
    ///
    /// * `device_path` - Destination path on the device (e.g. `ble_new.bin`)
    /// * `payload` - File contents, at most [`MAX_FILE_SIZE`] bytes
    /// * `progress` - Progress callback (bytes_sent, total_bytes)
    pub fn send_file<F>(&mut self, device_path: &str, payload: &[u8], progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        if payload.len() > MAX_FILE_SIZE {
            error!(
                "{device_path}: file too large ({} > {MAX_FILE_SIZE} bytes)",
                payload.len()
            );
            return Err(Error::FileTooLarge {
                size: payload.len(),
                limit: MAX_FILE_SIZE,
            });
        }

        info!("Sending {} bytes to {device_path}", payload.len());
        let result = self.run(device_path, payload, progress);
        if let Err(ref e) = result {
            error!("Transfer to {device_path} failed: {e}");
        }

        self.drain();
        result
    }

    fn run<F>(&mut self, device_path: &str, payload: &[u8], progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.announce(device_path, payload.len())?;
        self.stream(payload, progress)?;
        let attempt = self.wait_for_completion(device_path)?;
        info!("{device_path} confirmed by device (poll {attempt})");
        Ok(())
    }

    /// Open the transfer and announce path and size.
    fn announce(&mut self, device_path: &str, size: usize) -> Result<()> {
        self.port.set_timeout(self.config.start_timeout)?;

        let reply = CommandChannel::new(self.port).send_str(START_COMMAND)?;
        if reply.is_no_response() {
            return Err(Error::Protocol(format!(
                "no response to '{START_COMMAND}'"
            )));
        }

        trace!("Announcing path {device_path}");
        self.port.write_all_bytes(device_path.as_bytes())?;

        let reply = CommandChannel::new(self.port).send_str(&size.to_string())?;
        if reply.is_no_response() {
            return Err(Error::Protocol(format!(
                "no response to size announcement ({size})"
            )));
        }

        Ok(())
    }

    /// Write the payload in fixed-size chunks without waiting for acks.
    fn stream<F>(&mut self, payload: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.port.set_timeout(self.config.stream_timeout)?;

        let total = payload.len();
        let mut sent = 0;
        for (index, chunk) in payload.chunks(CHUNK_SIZE).enumerate() {
            self.port.write_all_bytes(chunk)?;
            sent += chunk.len();
            progress(sent, total);

            if (index + 1) % 100 == 0 {
                debug!("Sent {sent}/{total} bytes");
            }
        }

        debug!("Payload streamed ({sent} bytes)");
        Ok(())
    }

    /// Poll until the device reports `OK!`; returns the successful attempt.
    fn wait_for_completion(&mut self, device_path: &str) -> Result<u32> {
        self.port.set_timeout(self.config.poll_timeout)?;

        let attempts = self.config.poll_attempts;
        for attempt in 1..=attempts {
            match self.port.read_chunk(COMPLETION_READ_SIZE) {
                Ok(data) if !data.is_empty() => {
                    let text = String::from_utf8_lossy(&data);
                    let message = text.trim();
                    if message == COMPLETION_ACK {
                        return Ok(attempt);
                    }
                    debug!("{device_path}: device status '{message}' (poll {attempt}/{attempts})");
                },
                Ok(_) => {
                    trace!("{device_path}: empty read (poll {attempt}/{attempts})");
                },
                Err(e) if e.is_timeout() => {
                    trace!("{device_path}: still waiting (poll {attempt}/{attempts})");
                },
                Err(e) => {
                    debug!("{device_path}: read error (poll {attempt}/{attempts}, ignoring): {e}");
                },
            }

            if attempt < attempts {
                thread::sleep(self.config.poll_interval);
            }
        }

        Err(Error::TransferTimeout {
            path: device_path.to_string(),
            attempts,
        })
    }

    /// Discard residual output and give the device time to settle.
    fn drain(&mut self) {
        let discarded = self.port.drain(self.config.drain_timeout);
        if discarded > 0 {
            debug!("Drained {discarded} residual bytes");
        }
        thread::sleep(self.config.settle_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockPort, ReadEvent};
    use std::io::ErrorKind;

    fn fast_config() -> TransferConfig {
        TransferConfig {
            poll_attempts: 5,
            poll_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Device that acknowledges the handshake and the size, then answers `OK!`
    /// once the full payload has arrived.
    fn accepting_device() -> MockPort {
        let mut stage = 0;
        let mut remaining = 0usize;
        MockPort::with_responder(move |data| match stage {
            0 => {
                assert_eq!(data, START_COMMAND.as_bytes());
                stage = 1;
                vec![ReadEvent::Data(b"ready".to_vec())]
            },
            1 => {
                stage = 2;
                Vec::new()
            },
            2 => {
                remaining = String::from_utf8_lossy(data).parse().unwrap();
                stage = 3;
                vec![ReadEvent::Data(b"size ok".to_vec())]
            },
            _ => {
                remaining -= data.len();
                if remaining == 0 {
                    vec![ReadEvent::Data(b"OK!\r\n".to_vec())]
                } else {
                    Vec::new()
                }
            },
        })
    }

    #[test]
    fn test_send_file_chunks_payload() {
        let mut port = accepting_device();
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();

        let mut progress_calls = Vec::new();
        FileTransfer::with_config(&mut port, fast_config())
            .send_file("ble_new.bin", &payload, |current, total| {
                progress_calls.push((current, total));
            })
            .unwrap();

        let text = port.written_text();
        assert_eq!(text[0], "sendFile");
        assert_eq!(text[1], "ble_new.bin");
        assert_eq!(text[2], "2500");

        let chunks = &port.writes[3..];
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(chunks.concat(), payload);
        assert_eq!(progress_calls, vec![(1024, 2500), (2048, 2500), (2500, 2500)]);
    }

    #[test]
    fn test_send_file_exact_multiple_of_chunk_size() {
        let mut port = accepting_device();
        let payload = vec![0xAB; CHUNK_SIZE * 3];

        FileTransfer::with_config(&mut port, fast_config())
            .send_file("ite_new.bin", &payload, |_, _| {})
            .unwrap();

        let sizes: Vec<usize> = port.writes[3..].iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE; 3]);
    }

    #[test]
    fn test_send_file_phase_timeouts() {
        let mut port = accepting_device();
        FileTransfer::with_config(&mut port, fast_config())
            .send_file("ota_info.bin", &[1, 0, 0, 0], |_, _| {})
            .unwrap();

        assert_eq!(
            port.timeouts,
            vec![
                Duration::from_millis(5000),
                Duration::from_millis(30000),
                Duration::from_millis(5000),
                Duration::from_millis(200),
            ]
        );
    }

    #[test]
    fn test_send_file_too_large_performs_no_io() {
        let mut port = accepting_device();
        let payload = vec![0u8; MAX_FILE_SIZE + 1];

        let result =
            FileTransfer::with_config(&mut port, fast_config()).send_file("pixer.bin", &payload, |_, _| {});

        assert!(matches!(result, Err(Error::FileTooLarge { size, .. }) if size == MAX_FILE_SIZE + 1));
        assert!(port.writes.is_empty());
        assert_eq!(port.reads, 0);
    }

    #[test]
    fn test_send_file_max_size_is_accepted() {
        let mut port = accepting_device();
        let payload = vec![0u8; MAX_FILE_SIZE];

        FileTransfer::with_config(&mut port, fast_config())
            .send_file("/sys/mcuimg2.bin", &payload, |_, _| {})
            .unwrap();
        assert_eq!(port.writes.len(), 3 + MAX_FILE_SIZE / CHUNK_SIZE);
    }

    #[test]
    fn test_send_file_no_handshake_reply() {
        let mut port = MockPort::new();

        let result =
            FileTransfer::with_config(&mut port, fast_config()).send_file("ble_new.bin", b"data", |_, _| {});

        assert!(matches!(result, Err(Error::Protocol(_))));
        assert_eq!(port.written_text(), vec!["sendFile"]);
        // Drain still ran.
        assert_eq!(port.timeouts.last(), Some(&Duration::from_millis(200)));
    }

    #[test]
    fn test_send_file_no_size_reply() {
        let mut stage = 0;
        let mut port = MockPort::with_responder(move |_| {
            stage += 1;
            if stage == 1 {
                vec![ReadEvent::Data(b"ready".to_vec())]
            } else {
                Vec::new()
            }
        });

        let result =
            FileTransfer::with_config(&mut port, fast_config()).send_file("ble_new.bin", b"data", |_, _| {});

        assert!(matches!(result, Err(Error::Protocol(_))));
        assert_eq!(port.written_text(), vec!["sendFile", "ble_new.bin", "4"]);
    }

    #[test]
    fn test_send_file_write_failure_still_drains() {
        // Handshake, path and size succeed; the first payload chunk fails.
        let mut stage = 0;
        let mut port = MockPort::with_responder(move |_| {
            stage += 1;
            match stage {
                1 | 3 => vec![ReadEvent::Data(b"ok".to_vec()), ReadEvent::Timeout],
                _ => Vec::new(),
            }
        })
        .fail_writes_after(3);

        let result = FileTransfer::with_config(&mut port, fast_config()).send_file(
            "ite_new.bin",
            &[7u8; 4000],
            |_, _| {},
        );

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(port.timeouts.last(), Some(&Duration::from_millis(200)));
    }

    #[test]
    fn test_wait_for_completion_ignores_interim_status() {
        let mut events: Vec<ReadEvent> = (0..9)
            .map(|_| ReadEvent::Data(b"pending".to_vec()))
            .collect();
        events.push(ReadEvent::Data(b"OK!".to_vec()));
        let mut port = MockPort::scripted(events);

        let config = TransferConfig {
            poll_attempts: 180,
            ..fast_config()
        };
        let attempt = FileTransfer::with_config(&mut port, config)
            .wait_for_completion("ble_new.bin")
            .unwrap();

        assert_eq!(attempt, 10);
        assert_eq!(port.reads, 10);
    }

    #[test]
    fn test_wait_for_completion_swallows_timeouts_and_errors() {
        let mut port = MockPort::scripted(vec![
            ReadEvent::Timeout,
            ReadEvent::Fail(ErrorKind::Interrupted),
            ReadEvent::Eof,
            ReadEvent::Data(b"  OK!\n".to_vec()),
        ]);

        let attempt = FileTransfer::with_config(&mut port, fast_config())
            .wait_for_completion("ble_new.bin")
            .unwrap();
        assert_eq!(attempt, 4);
    }

    #[test]
    fn test_wait_for_completion_gives_up() {
        let mut port = MockPort::new();

        let result = FileTransfer::with_config(&mut port, fast_config()).wait_for_completion("pixer.bin");

        assert!(matches!(
            result,
            Err(Error::TransferTimeout { attempts: 5, .. })
        ));
        assert_eq!(port.reads, 5);
    }

    #[test]
    fn test_send_file_completion_timeout_drains() {
        // Acknowledge handshake and size, never confirm completion.
        let mut stage = 0;
        let mut port = MockPort::with_responder(move |_| {
            stage += 1;
            if stage == 1 || stage == 3 {
                vec![ReadEvent::Data(b"ok".to_vec())]
            } else {
                Vec::new()
            }
        });

        let result = FileTransfer::with_config(&mut port, fast_config()).send_file(
            "ble_new.bin",
            &[1u8; 10],
            |_, _| {},
        );

        assert!(matches!(result, Err(Error::TransferTimeout { .. })));
        assert_eq!(port.timeouts.last(), Some(&Duration::from_millis(200)));
    }
}
