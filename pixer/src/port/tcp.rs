//! TCP port implementation using `std::net`.

use {
    crate::{
        error::{Error, Result},
        port::{Port, TcpConfig},
    },
    log::{debug, trace, warn},
    std::{
        io::{Read, Write},
        net::{Shutdown, TcpStream, ToSocketAddrs},
        thread,
        time::Duration,
    },
};

/// Smallest timeout applied to the socket; `std` rejects a zero timeout.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// TCP connection to a Pixer device.
pub struct TcpPort {
    stream: Option<TcpStream>,
    name: String,
    timeout: Duration,
}

impl TcpPort {
    /// Connect to the device.
    ///
    /// Every resolved address is tried once with `config.timeout`. The same
    /// timeout becomes the initial read/write timeout.
    pub fn connect(config: &TcpConfig) -> Result<Self> {
        let addr = config.addr();
        debug!("Connecting to {addr} (timeout {:?})", config.timeout);

        let resolved = addr.to_socket_addrs().map_err(|e| Error::Connection {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

        let mut last_error = None;
        for socket_addr in resolved {
            match TcpStream::connect_timeout(&socket_addr, config.timeout.max(MIN_TIMEOUT)) {
                Ok(stream) => {
                    let mut port = Self {
                        stream: Some(stream),
                        name: addr,
                        timeout: config.timeout,
                    };
                    port.set_timeout(config.timeout)?;
                    if let Some(ref stream) = port.stream {
                        // Commands are tiny; do not let Nagle hold them back.
                        let _ = stream.set_nodelay(true);
                    }
                    debug!("Connected to {}", port.name);
                    return Ok(port);
                },
                Err(e) => {
                    trace!("Connect to {socket_addr} failed: {e}");
                    last_error = Some(e);
                },
            }
        }

        Err(Error::Connection {
            addr,
            reason: last_error.map_or_else(|| "address did not resolve".to_string(), |e| e.to_string()),
        })
    }

    /// Connect with a fixed number of attempts and a fixed delay between them.
    pub fn connect_with_retry(config: &TcpConfig, attempts: usize, delay: Duration) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match Self::connect(config) {
                Ok(port) => {
                    if attempt > 1 {
                        debug!("Connected on attempt {attempt}");
                    }
                    return Ok(port);
                },
                Err(e) => {
                    warn!("Connection attempt {attempt}/{attempts} failed: {e}");
                    last_error = Some(e);

                    if attempt < attempts {
                        thread::sleep(delay);
                    }
                },
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Connection {
            addr: config.addr(),
            reason: "no connection attempts made".to_string(),
        }))
    }

    fn closed_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "connection closed")
    }
}

impl Port for TcpPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref stream) = self.stream {
            let effective = timeout.max(MIN_TIMEOUT);
            stream.set_read_timeout(Some(effective))?;
            stream.set_write_timeout(Some(effective))?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            trace!("Closing connection to {}", self.name);
            // The peer may already be gone; dropping the stream closes it anyway.
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }
}

impl Read for TcpPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|s| s.read(buf))
    }
}

impl Write for TcpPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|s| s.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(Write::flush)
    }
}

impl Drop for TcpPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
