//! Boot ROM handshake.

use crate::events::{BromObserver, LogLevel};
use crate::protocol::constants::{HANDSHAKE_PROBE, HANDSHAKE_REPLY};
use crate::state::machine::SessionState;
use crate::transport::Transport;
use tracing::debug;

use super::{HandleResult, HandlerContext, ProtocolError};

/// Write the probe one byte at a time and check the complemented reply.
pub fn handle_handshake<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    ctx.log(LogLevel::Info, "Attempting handshake");

    let mut response = Vec::with_capacity(HANDSHAKE_PROBE.len());
    for byte in HANDSHAKE_PROBE {
        ctx.send(&[byte])?;
        response.extend(ctx.recv(1)?);
    }
    debug!(response = ?response, "Handshake response");

    if response == HANDSHAKE_REPLY {
        ctx.log(LogLevel::Info, "Handshake success! Found boot ROM");
    } else if response == HANDSHAKE_PROBE {
        ctx.state.handshake_echoed = true;
        ctx.log(
            LogLevel::Warn,
            "Handshake complete. Warning: device returned input data",
        );
    } else {
        return Err(ProtocolError::HandshakeFailed { response });
    }

    ctx.advance(SessionState::HandshakeDone)
}
