//! Byte stream transport abstraction.
//!
//! Defines the `Transport` trait the protocol session drives,
//! allowing different implementations (serial port, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Port {port} unavailable: {message}")]
    Unavailable { port: String, message: String },

    #[error("Transport closed after {received} of {expected} bytes")]
    Closed { expected: usize, received: usize },

    #[error("Timeout after {timeout_ms}ms ({received} of {expected} bytes received)")]
    Timeout {
        timeout_ms: u64,
        expected: usize,
        received: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered, reliable, full-duplex byte stream.
pub trait Transport {
    /// Write bytes in order.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Block until exactly `len` bytes have been read.
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Write one byte per `write` call.
    fn write_bytewise(&mut self, data: &[u8]) -> Result<(), TransportError> {
        for b in data {
            self.write(std::slice::from_ref(b))?;
        }
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read_exact(len)
    }

    fn write_bytewise(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_bytewise(data)
    }
}
