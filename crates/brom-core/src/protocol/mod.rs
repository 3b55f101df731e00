//! Protocol module - BROM command bytes, literals and framing.

pub mod command;
pub mod constants;
pub mod hex;

pub use command::Command;
pub use constants::*;
pub use hex::{HexError, decode_hex, encode_hex, trace};
