//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{Transport, TransportError};
use crate::protocol::hex::decode_hex;

/// Mock transport for unit testing the session logic.
///
/// Responses are queued up front and handed out in order; clones share
/// the same queue and write log so a test can keep a handle.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued bytes returned by reads.
    rx_queue: Arc<Mutex<VecDeque<u8>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Whether the stream is still open.
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw response bytes.
    pub fn queue(&self, bytes: &[u8]) {
        self.rx_queue.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Queue a response given as hex text, e.g. `"5ff5affa"`.
    ///
    /// Panics on malformed hex; intended for test fixtures.
    pub fn queue_hex(&self, hex: &str) {
        let bytes = decode_hex(hex).unwrap();
        self.queue(&bytes);
    }

    /// Queue a big-endian u32 response.
    pub fn queue_u32(&self, value: u32) {
        self.queue(&value.to_be_bytes());
    }

    /// Bytes still waiting to be read.
    pub fn pending(&self) -> usize {
        self.rx_queue.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.write_log.lock().unwrap().concat()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate the device going away.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Closed {
                expected: 0,
                received: 0,
            });
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Closed {
                expected: len,
                received: 0,
            });
        }
        let mut queue = self.rx_queue.lock().unwrap();
        if queue.len() < len {
            // Consumed bytes are not returned; the session treats this as terminal anyway.
            let received = queue.len();
            queue.clear();
            return Err(TransportError::Timeout {
                timeout_ms: 5000,
                expected: len,
                received,
            });
        }
        Ok(queue.drain(..len).collect())
    }
}
