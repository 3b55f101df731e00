//! serialport-based transport implementation.

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::traits::{Transport, TransportError};
use crate::protocol::constants::DEFAULT_BAUD_RATE;

/// Granularity of a single blocking read on the port.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Line settings for opening a port.
#[derive(Debug, Clone, Copy)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Deadline for one `read_exact`. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: None,
        }
    }
}

/// Serial port transport (8N1, no flow control).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    read_timeout: Option<Duration>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port.name())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl SerialTransport {
    /// Open a serial port with the given settings.
    #[instrument(level = "info", skip(settings), fields(baud = settings.baud_rate))]
    pub fn open(name: &str, settings: SerialSettings) -> Result<Self, TransportError> {
        let port = serialport::new(name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_SLICE)
            .open()
            .map_err(|e| TransportError::Unavailable {
                port: name.to_string(),
                message: e.to_string(),
            })?;

        info!(port = %name, baud = settings.baud_rate, "Opened serial port");

        Ok(Self {
            port,
            read_timeout: settings.read_timeout,
        })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        let start = Instant::now();

        while filled < len {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(TransportError::Closed {
                        expected: len,
                        received: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if let Some(timeout) = self.read_timeout {
                        if start.elapsed() >= timeout {
                            return Err(TransportError::Timeout {
                                timeout_ms: timeout.as_millis() as u64,
                                expected: len,
                                received: filled,
                            });
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e)
                    if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof) =>
                {
                    return Err(TransportError::Closed {
                        expected: len,
                        received: filled,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf)
    }
}

/// List serial ports that can currently be opened.
///
/// Each candidate is opened and immediately closed again; busy or
/// permission-denied ports are dropped.
pub fn discover_ports() -> Vec<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "Port enumeration failed");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| match serialport::new(name, DEFAULT_BAUD_RATE).open() {
            Ok(_) => true,
            Err(e) => {
                debug!(port = %name, error = %e, "Skipping port");
                false
            }
        })
        .collect()
}
