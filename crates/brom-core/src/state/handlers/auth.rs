//! Auth certificate upload.

use crate::events::{BromEvent, BromObserver, LogLevel};
use crate::protocol::Command;
use crate::protocol::constants::{AUTH_FILE_LENGTH, STATUS_OK, STATUS_SIZE};
use crate::state::machine::SessionState;
use crate::transport::Transport;

use super::{HandleResult, HandlerContext, ProtocolError};

/// SEND_AUTH: ack, fixed length field, certificate bytes, status.
pub fn handle_send_auth<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    ctx.log(LogLevel::Info, "Loading and sending auth file");

    let ack = ctx.command(Command::SendAuth)?;
    if !Command::SendAuth.is_ack(&ack) {
        return Err(ProtocolError::AuthUploadRejected {
            stage: "SEND_AUTH ack",
            expected: vec![Command::SendAuth.as_byte()],
            actual: ack,
        });
    }

    let echo = ctx.send_u32(AUTH_FILE_LENGTH)?;
    if !echo.matches() {
        return Err(ProtocolError::AuthUploadRejected {
            stage: "length field",
            expected: echo.sent,
            actual: echo.received,
        });
    }
    ctx.recv(STATUS_SIZE)?;

    let auth = ctx.auth;
    if auth.len() != AUTH_FILE_LENGTH as usize {
        ctx.log(
            LogLevel::Warn,
            format!(
                "Auth file is {} bytes, length field announces {}",
                auth.len(),
                AUTH_FILE_LENGTH
            ),
        );
    }
    ctx.send_bytewise(auth.as_bytes())?;
    ctx.emit(BromEvent::Progress {
        operation: "AUTH".to_string(),
        current: auth.len() as u64,
        total: auth.len() as u64,
    });

    ctx.recv(STATUS_SIZE)?;
    let status = ctx.recv(STATUS_SIZE)?;
    if status != STATUS_OK {
        return Err(ProtocolError::AuthUploadFailed { status });
    }

    ctx.log(LogLevel::Info, "Auth file send success!");
    ctx.advance(SessionState::AuthSent)
}
