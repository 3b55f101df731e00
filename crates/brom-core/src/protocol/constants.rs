//! Fixed protocol literals.
//!
//! The DA geometry and the auth length field below belong to one SoC / DA image pairing
//! (MT6765/MT6785 "AllInOne" DA with the SV5 auth certificate). Supporting another image
//! only requires changing this table.

use std::time::Duration;

/// Default serial line speed for the BROM.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Probe bytes written one at a time during the handshake.
pub const HANDSHAKE_PROBE: [u8; 4] = [0xa0, 0x0a, 0x50, 0x05];
/// Bitwise complement of the probe, returned by a live boot ROM.
pub const HANDSHAKE_REPLY: [u8; 4] = [0x5f, 0xf5, 0xaf, 0xfa];

// SoC ID response layout after the ack byte
pub const SOC_ID_LENGTH_FIELD_SIZE: usize = 4;
pub const SOC_ID_PAYLOAD_SIZE: usize = 32;
pub const STATUS_SIZE: usize = 2;

/// Length field sent ahead of the auth certificate. Not derived from the file.
pub const AUTH_FILE_LENGTH: u32 = 0x0000_08d0;
/// Status word reported by the device after a successful auth upload.
pub const STATUS_OK: [u8; 2] = [0x00, 0x00];

// Host qualification (SLA) exchange
/// Length field preceding the SLA challenge, discarded.
pub const SLA_LENGTH_FIELD_SIZE: usize = 4;
pub const SLA_CHALLENGE_SIZE: usize = 16;
pub const SLA_PARAM: u32 = 0x0000_0100;

// Download agent parameters
pub const DA_LOAD_ADDR: u32 = 0x0020_0000;
pub const DA_LENGTH_PARAM: u32 = 0x0003_61a8;
pub const DA_SIGNATURE_PARAM: u32 = 0x0000_0100;

/// Offset of the DA image inside the AllInOne file.
pub const DA_FILE_OFFSET: u64 = 0x39DC;
/// Number of DA bytes read from the AllInOne file.
pub const DA_IMAGE_LEN: usize = 229_376;
pub const DA_CHUNK_SIZE: usize = 2000;
pub const DA_CHUNK_DELAY: Duration = Duration::from_millis(10);

pub const DEFAULT_AUTH_FILE: &str = "auth_sv5.auth";
pub const DEFAULT_DA_FILE: &str = "MTK_AllInOne_DA_mt6765_mt6785.bin";

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
