//! Image upload session.
//!
//! Pushing a picture needs no handshake: the packed bitmap (which carries its
//! own `#file#` header) is streamed in large chunks and the session ends with
//! the `#MOVE#d` tail command, which makes the device display the new image.

use crate::error::Result;
use crate::port::{Port, TcpConfig, TcpPort};
use log::{debug, info};
use std::time::Duration;

/// Upload chunk size.
pub const UPLOAD_CHUNK_SIZE: usize = 4096;

/// Read/write timeout for the upload session.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Tail command sent after the bitmap.
pub const TAIL_COMMAND: &[u8] = b"#MOVE#d";

/// Connection attempts for an upload session.
pub const UPLOAD_CONNECT_ATTEMPTS: usize = 10;

/// Pause between connection attempts.
pub const UPLOAD_CONNECT_DELAY: Duration = Duration::from_secs(2);

/// Open a fresh connection, upload `data` and close again.
///
/// The device may still be rebooting after an upgrade, so connecting is
/// retried [`UPLOAD_CONNECT_ATTEMPTS`] times.
pub fn upload_to_device<F>(config: &TcpConfig, data: &[u8], progress: F) -> Result<()>
where
    F: FnMut(usize, usize),
{
    let mut port =
        TcpPort::connect_with_retry(config, UPLOAD_CONNECT_ATTEMPTS, UPLOAD_CONNECT_DELAY)?;
    let result = upload_image(&mut port, data, progress);
    if let Err(e) = port.close() {
        debug!("Close failed (ignoring): {e}");
    }
    result
}

/// Stream a packed bitmap to the device, then send the tail command.
///
/// # Arguments
///
/// * `port` - Connected port
/// * `data` - Header-prefixed bitmap produced by [`crate::bitmap`]
/// * `progress` - Progress callback (bytes_sent, total_bytes)
pub fn upload_image<P, F>(port: &mut P, data: &[u8], mut progress: F) -> Result<()>
where
    P: Port,
    F: FnMut(usize, usize),
{
    port.set_timeout(UPLOAD_TIMEOUT)?;

    let total = data.len();
    info!("Uploading image ({total} bytes) to {}", port.name());

    let mut sent = 0;
    for chunk in data.chunks(UPLOAD_CHUNK_SIZE) {
        port.write_all_bytes(chunk)?;
        sent += chunk.len();
        progress(sent, total);
    }

    debug!("Sending tail command");
    port.write_all_bytes(TAIL_COMMAND)?;

    info!("Image uploaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::port::mock::MockPort;

    #[test]
    fn test_upload_chunks_and_tail() {
        let mut port = MockPort::new();
        let data = vec![0x5A; UPLOAD_CHUNK_SIZE * 2 + 10];

        let mut last = (0, 0);
        upload_image(&mut port, &data, |current, total| last = (current, total)).unwrap();

        let sizes: Vec<usize> = port.writes.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![UPLOAD_CHUNK_SIZE, UPLOAD_CHUNK_SIZE, 10, TAIL_COMMAND.len()]);
        assert_eq!(port.writes.last().map(Vec::as_slice), Some(TAIL_COMMAND));
        assert_eq!(last, (data.len(), data.len()));
        assert_eq!(port.timeouts, vec![UPLOAD_TIMEOUT]);
    }

    #[test]
    fn test_upload_write_failure() {
        let mut port = MockPort::new().fail_writes_after(1);
        let data = vec![0u8; UPLOAD_CHUNK_SIZE * 3];

        let result = upload_image(&mut port, &data, |_, _| {});
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(port.writes.len(), 1);
    }
}
