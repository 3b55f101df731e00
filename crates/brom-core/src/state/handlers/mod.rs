//! Step handlers - one per protocol phase.
//!
//! This module is split into submodules by functionality:
//! - `handshake`: probe sequence
//! - `identify`: preloader check and SoC ID query
//! - `auth`: auth certificate upload
//! - `qualify`: host qualification (SLA challenge)
//! - `download`: download agent upload
//!
//! A handler either advances the session, short-circuits it
//! (`HandleResult::Stopped`), or fails with a fatal `ProtocolError`.

mod auth;
mod download;
mod handshake;
mod identify;
mod qualify;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::events::{BromEvent, BromObserver, LogLevel};
use crate::payload::{AuthBlob, DaBlob, ImageError};
use crate::protocol::Command;
use crate::protocol::hex::encode_hex;
use crate::session::SessionConfig;
use crate::state::machine::{SessionState, StateMachineContext};
use crate::transport::{Transport, TransportError};

use auth::handle_send_auth;
use download::handle_send_da;
use handshake::handle_handshake;
use identify::{handle_preloader_check, handle_soc_id};
use qualify::handle_qualify_host;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Handshake failed: device answered {}", encode_hex(.response))]
    HandshakeFailed { response: Vec<u8> },

    #[error("Preloader connection: GET_BL_VER echoed {byte:02x}, preloader mode is not supported")]
    UnexpectedEcho { byte: u8 },

    #[error("Get SoC ID failed: ack {}", encode_hex(.ack))]
    SocIdQueryFailed { ack: Vec<u8> },

    #[error("Auth upload rejected at {stage}: expected {}, got {}", encode_hex(.expected), encode_hex(.actual))]
    AuthUploadRejected {
        stage: &'static str,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("Auth file send failed: status {}", encode_hex(.status))]
    AuthUploadFailed { status: Vec<u8> },

    #[error("Host qualification failed at {stage}: expected {}, got {}", encode_hex(.expected), encode_hex(.actual))]
    HostQualificationFailed {
        stage: &'static str,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("DA upload aborted at {stage}: expected {}, got {}", encode_hex(.expected), encode_hex(.actual))]
    DaUploadAborted {
        stage: &'static str,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("No serial port found after {waited_secs}s")]
    DiscoveryTimeout { waited_secs: u64 },
}

impl ProtocolError {
    /// True for device-side protocol violations, false for I/O and
    /// environment problems.
    pub fn is_protocol_failure(&self) -> bool {
        !matches!(
            self,
            ProtocolError::Transport(_)
                | ProtocolError::Image(_)
                | ProtocolError::DiscoveryTimeout { .. }
        )
    }
}

/// Result of handling one step.
#[derive(Debug)]
pub enum HandleResult {
    /// Step validated, state advanced.
    Continue,
    /// Terminal state reached.
    Complete,
    /// Non-fatal short-circuit; the session stops where it is.
    Stopped(ProtocolError),
}

/// One write and the bytes the device echoed back.
#[derive(Debug)]
pub(crate) struct Echo {
    pub sent: Vec<u8>,
    pub received: Vec<u8>,
}

impl Echo {
    pub fn matches(&self) -> bool {
        self.sent == self.received
    }
}

/// Handler context containing all resources.
pub struct HandlerContext<'a, T: Transport, O: BromObserver> {
    pub transport: &'a mut T,
    pub observer: &'a O,
    pub state: &'a mut StateMachineContext,
    pub config: &'a SessionConfig,
    pub auth: &'a AuthBlob,
    pub da: &'a DaBlob,
}

impl<'a, T: Transport, O: BromObserver> HandlerContext<'a, T, O> {
    pub(crate) fn emit(&self, event: BromEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(BromEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub(crate) fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        Ok(self.transport.write(data)?)
    }

    pub(crate) fn send_bytewise(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        Ok(self.transport.write_bytewise(data)?)
    }

    pub(crate) fn recv(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.transport.read_exact(len)?)
    }

    /// Write a command byte and read its one-byte ack.
    pub(crate) fn command(&mut self, cmd: Command) -> Result<Vec<u8>, ProtocolError> {
        self.send(&[cmd.as_byte()])?;
        self.recv(1)
    }

    /// Write a big-endian u32 parameter and read the 4-byte echo.
    pub(crate) fn send_u32(&mut self, value: u32) -> Result<Echo, ProtocolError> {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, value);
        self.send(&buf)?;
        let received = self.recv(buf.len())?;
        Ok(Echo {
            sent: buf.to_vec(),
            received,
        })
    }

    /// Move to the next state and report it.
    pub(crate) fn advance(&mut self, to: SessionState) -> Result<HandleResult, ProtocolError> {
        let from = self.state.state;
        if !self.state.goto_state(to) {
            return Err(ProtocolError::InvalidTransition { from, to });
        }
        self.emit(BromEvent::StateChanged { from, to });
        if to.is_terminal() {
            Ok(HandleResult::Complete)
        } else {
            Ok(HandleResult::Continue)
        }
    }

    /// Stop the session without a fatal error.
    pub(crate) fn stop(&self, reason: ProtocolError) -> HandleResult {
        self.log(LogLevel::Warn, format!("Stopping: {}", reason));
        HandleResult::Stopped(reason)
    }
}

/// Run the step belonging to the current state.
pub fn handle_state<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    match ctx.state.state {
        SessionState::Disconnected => handle_handshake(ctx),
        SessionState::HandshakeDone => handle_preloader_check(ctx),
        SessionState::PreloaderVerified => handle_soc_id(ctx),
        SessionState::SocIdRead => handle_send_auth(ctx),
        SessionState::AuthSent => handle_qualify_host(ctx),
        SessionState::Qualified | SessionState::SlaSkipped => handle_send_da(ctx),
        SessionState::DaSent => Ok(HandleResult::Complete),
    }
}
