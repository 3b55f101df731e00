//! Host qualification (SLA challenge).

use crate::events::{BromObserver, LogLevel};
use crate::protocol::Command;
use crate::protocol::constants::{
    SLA_CHALLENGE_SIZE, SLA_LENGTH_FIELD_SIZE, SLA_PARAM, STATUS_SIZE,
};
use crate::protocol::hex::encode_hex;
use crate::state::machine::SessionState;
use crate::transport::Transport;

use super::{HandleResult, HandlerContext, ProtocolError};

/// QUALIFY_HOST, or a no-op when `skip_host_qualification` is set.
pub fn handle_qualify_host<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    if ctx.config.skip_host_qualification {
        ctx.log(LogLevel::Info, "Skipping qualify host (SLA challenge)");
        return ctx.advance(SessionState::SlaSkipped);
    }

    ctx.log(LogLevel::Info, "Qualify host");

    let ack = ctx.command(Command::QualifyHost)?;
    if !Command::QualifyHost.is_ack(&ack) {
        return Err(ProtocolError::HostQualificationFailed {
            stage: "QUALIFY_HOST ack",
            expected: vec![Command::QualifyHost.as_byte()],
            actual: ack,
        });
    }

    ctx.recv(STATUS_SIZE)?;
    ctx.recv(SLA_LENGTH_FIELD_SIZE)?;
    let challenge = ctx.recv(SLA_CHALLENGE_SIZE)?;
    ctx.log(
        LogLevel::Debug,
        format!("SLA challenge: {}", encode_hex(&challenge)),
    );

    let echo = ctx.send_u32(SLA_PARAM)?;
    if !echo.matches() {
        return Err(ProtocolError::HostQualificationFailed {
            stage: "SLA parameter",
            expected: echo.sent,
            actual: echo.received,
        });
    }
    ctx.recv(STATUS_SIZE)?;

    ctx.send(&challenge)?;
    ctx.recv(STATUS_SIZE)?;

    ctx.advance(SessionState::Qualified)
}
