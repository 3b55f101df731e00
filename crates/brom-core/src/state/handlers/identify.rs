//! Preloader check and SoC ID query.

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;

use crate::events::{BromObserver, LogLevel};
use crate::protocol::Command;
use crate::protocol::constants::{SOC_ID_LENGTH_FIELD_SIZE, SOC_ID_PAYLOAD_SIZE, STATUS_SIZE};
use crate::protocol::hex::encode_hex;
use crate::state::machine::SessionState;
use crate::transport::Transport;

use super::{HandleResult, HandlerContext, ProtocolError};

/// GET_BL_VER. The boot ROM answers with version data, a preloader echoes
/// the command byte back.
pub fn handle_preloader_check<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    ctx.log(LogLevel::Info, "Checking preloader version");

    let response = ctx.command(Command::GetBlVersion)?;
    if Command::GetBlVersion.is_ack(&response) {
        return Err(ProtocolError::UnexpectedEcho {
            byte: Command::GetBlVersion.as_byte(),
        });
    }

    let version = response[0];
    ctx.state.bl_version = Some(version);
    ctx.log(
        LogLevel::Info,
        format!("BROM connection (BL version byte 0x{:02x})", version),
    );

    ctx.advance(SessionState::PreloaderVerified)
}

/// GET_SOC_ID. The payload is kept but not interpreted.
pub fn handle_soc_id<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    ctx.log(LogLevel::Info, "Querying SoC ID");

    let ack = ctx.command(Command::GetSocId)?;
    if !Command::GetSocId.is_ack(&ack) {
        return Err(ProtocolError::SocIdQueryFailed { ack });
    }

    let length_field = ctx.recv(SOC_ID_LENGTH_FIELD_SIZE)?;
    let soc_id = ctx.recv(SOC_ID_PAYLOAD_SIZE)?;
    let status = ctx.recv(STATUS_SIZE)?;
    debug!(
        length = BigEndian::read_u32(&length_field),
        status = %encode_hex(&status),
        "SoC ID response"
    );

    ctx.log(LogLevel::Info, format!("SoC ID: {}", encode_hex(&soc_id)));
    ctx.state.soc_id = Some(soc_id);

    ctx.advance(SessionState::SocIdRead)
}
