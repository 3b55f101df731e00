//! Download agent upload.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::events::{BromEvent, BromObserver, LogLevel};
use crate::protocol::Command;
use crate::protocol::constants::{
    DA_CHUNK_SIZE, DA_LENGTH_PARAM, DA_LOAD_ADDR, DA_SIGNATURE_PARAM, STATUS_SIZE,
};
use crate::protocol::hex::encode_hex;
use crate::state::machine::SessionState;
use crate::transport::Transport;

use super::{HandleResult, HandlerContext, ProtocolError};

/// SEND_DA: ack, three echoed parameters, then the image in paced chunks.
///
/// Mismatches here stop the session without a fatal error.
pub fn handle_send_da<T: Transport, O: BromObserver>(
    ctx: &mut HandlerContext<'_, T, O>,
) -> Result<HandleResult, ProtocolError> {
    ctx.log(LogLevel::Info, "Send DA");

    let ack = ctx.command(Command::SendDa)?;
    if !Command::SendDa.is_ack(&ack) {
        return Ok(ctx.stop(ProtocolError::DaUploadAborted {
            stage: "SEND_DA ack",
            expected: vec![Command::SendDa.as_byte()],
            actual: ack,
        }));
    }

    let params = [
        ("load address", DA_LOAD_ADDR),
        ("length", DA_LENGTH_PARAM),
        ("signature length", DA_SIGNATURE_PARAM),
    ];
    for (stage, value) in params {
        let echo = ctx.send_u32(value)?;
        if !echo.matches() {
            return Ok(ctx.stop(ProtocolError::DaUploadAborted {
                stage,
                expected: echo.sent,
                actual: echo.received,
            }));
        }
    }
    ctx.recv(STATUS_SIZE)?;

    let da = ctx.da;
    let delay = Duration::from_millis(ctx.config.chunk_delay_ms);
    let chunks = da.chunks(DA_CHUNK_SIZE, ctx.config.send_partial_chunk);
    let total = chunks.total();
    if chunks.dropped_bytes() > 0 {
        ctx.log(
            LogLevel::Debug,
            format!("Trailing {} DA bytes not sent", chunks.dropped_bytes()),
        );
    }

    for (i, chunk) in chunks.enumerate() {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        ctx.send(chunk)?;
        ctx.state.da_chunks_sent += 1;
        ctx.emit(BromEvent::Progress {
            operation: "DA".to_string(),
            current: (i + 1) as u64,
            total: total as u64,
        });
    }
    debug!(chunks = ctx.state.da_chunks_sent, "DA chunks written");

    let checksum = ctx.recv(STATUS_SIZE)?;
    let status = ctx.recv(STATUS_SIZE)?;
    ctx.log(
        LogLevel::Info,
        format!(
            "DA transmitted (checksum {}, status {})",
            encode_hex(&checksum),
            encode_hex(&status)
        ),
    );

    ctx.advance(SessionState::DaSent)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;

    fn queue_params(h: &Harness) {
        h.mock.queue_hex("d7");
        h.mock.queue_hex("00200000");
        h.mock.queue_hex("000361a8");
        h.mock.queue_hex("00000100");
        h.mock.queue_hex("0000");
    }

    #[test]
    fn test_da_upload() {
        let mut h = Harness::at(SessionState::SlaSkipped);
        queue_params(&h);
        h.mock.queue_hex("1234");
        h.mock.queue_hex("0000");

        assert!(matches!(h.step(), Ok(HandleResult::Complete)));
        assert_eq!(h.state.state, SessionState::DaSent);
        // 4500 bytes: two full chunks, the 500-byte tail is dropped
        assert_eq!(h.state.da_chunks_sent, 2);

        let writes = h.mock.get_writes();
        assert_eq!(writes.len(), 4 + 2);
        assert_eq!(writes[0], vec![0xd7]);
        assert_eq!(writes[1], vec![0x00, 0x20, 0x00, 0x00]);
        assert_eq!(writes[2], vec![0x00, 0x03, 0x61, 0xa8]);
        assert_eq!(writes[3], vec![0x00, 0x00, 0x01, 0x00]);
        assert_eq!(writes[4], h.da.as_bytes()[..DA_CHUNK_SIZE].to_vec());
        assert_eq!(
            writes[5],
            h.da.as_bytes()[DA_CHUNK_SIZE..2 * DA_CHUNK_SIZE].to_vec()
        );
    }

    #[test]
    fn test_da_upload_with_partial_chunk() {
        let mut h = Harness::at(SessionState::Qualified);
        h.config.send_partial_chunk = true;
        queue_params(&h);
        h.mock.queue_hex("00000000");

        assert!(matches!(h.step(), Ok(HandleResult::Complete)));
        assert_eq!(h.state.da_chunks_sent, 3);
        let writes = h.mock.get_writes();
        assert_eq!(writes.last().map(|w| w.len()), Some(500));
    }

    #[test]
    fn test_bad_ack_stops_silently() {
        let mut h = Harness::at(SessionState::SlaSkipped);
        h.mock.queue_hex("00");

        match h.step() {
            Ok(HandleResult::Stopped(ProtocolError::DaUploadAborted { stage, .. })) => {
                assert_eq!(stage, "SEND_DA ack");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.state.state, SessionState::SlaSkipped);
        assert_eq!(h.mock.get_writes(), vec![vec![0xd7]]);
    }

    #[test]
    fn test_param_mismatch_stops_before_image() {
        let mut h = Harness::at(SessionState::SlaSkipped);
        h.mock.queue_hex("d7");
        h.mock.queue_hex("00200000");
        h.mock.queue_hex("00000000");

        match h.step() {
            Ok(HandleResult::Stopped(ProtocolError::DaUploadAborted {
                stage, actual, ..
            })) => {
                assert_eq!(stage, "length");
                assert_eq!(actual, vec![0, 0, 0, 0]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.state.da_chunks_sent, 0);
        assert_eq!(h.mock.get_writes().len(), 3);
    }

    #[test]
    fn test_load_address_mismatch_stops() {
        let mut h = Harness::at(SessionState::SlaSkipped);
        h.mock.queue_hex("d7");
        h.mock.queue_hex("00200001");

        match h.step() {
            Ok(HandleResult::Stopped(ProtocolError::DaUploadAborted { stage, .. })) => {
                assert_eq!(stage, "load address");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.state.state, SessionState::SlaSkipped);
        assert_eq!(h.mock.get_writes().len(), 2);
    }

    #[test]
    fn test_signature_mismatch_stops() {
        let mut h = Harness::at(SessionState::Qualified);
        h.mock.queue_hex("d7");
        h.mock.queue_hex("00200000");
        h.mock.queue_hex("000361a8");
        h.mock.queue_hex("00000101");

        match h.step() {
            Ok(HandleResult::Stopped(ProtocolError::DaUploadAborted {
                stage, expected, ..
            })) => {
                assert_eq!(stage, "signature length");
                assert_eq!(expected, vec![0x00, 0x00, 0x01, 0x00]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.state.state, SessionState::Qualified);
        assert_eq!(h.state.da_chunks_sent, 0);
        assert_eq!(h.mock.get_writes().len(), 4);
    }
}
