//! Hex framing used for byte literals and TX/RX traces.

use std::fmt::Write;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("Malformed hex: odd length {len}")]
    MalformedHex { len: usize },
    #[error("Invalid hex digit {digit:?} at position {position}")]
    InvalidDigit { digit: char, position: usize },
}

/// Encode bytes as lowercase hex, two digits per byte, no separator.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing into a String cannot fail.
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Decode a hex string produced by [`encode_hex`]. Upper-case digits are accepted.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, HexError> {
    if text.len() % 2 != 0 {
        return Err(HexError::MalformedHex { len: text.len() });
    }

    text.as_bytes()
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let hi = nibble(pair[0], i * 2)?;
            let lo = nibble(pair[1], i * 2 + 1)?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn nibble(digit: u8, position: usize) -> Result<u8, HexError> {
    (digit as char)
        .to_digit(16)
        .map(|v| v as u8)
        .ok_or(HexError::InvalidDigit {
            digit: digit as char,
            position,
        })
}

/// Bracketed trace form: `[ a0 0a 50 05 ]`.
pub fn trace(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + 4);
    out.push_str("[ ");
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", b);
    }
    out.push_str(" ]");
    out
}
