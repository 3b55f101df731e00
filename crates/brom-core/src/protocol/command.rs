//! BROM command bytes.

use std::fmt;

/// Single-byte BROM command. The device acknowledges a command by echoing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Get bootloader version.
    GetBlVersion = 0xfe,
    GetSocId = 0xe7,
    /// Upload the auth certificate.
    SendAuth = 0xe2,
    /// SLA challenge.
    QualifyHost = 0xe3,
    /// Upload the download agent.
    SendDa = 0xd7,
}

impl Command {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Check a one-byte ack against this command.
    pub fn is_ack(self, response: &[u8]) -> bool {
        response == [self.as_byte()]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::GetBlVersion => "GET_BL_VER",
            Command::GetSocId => "GET_SOC_ID",
            Command::SendAuth => "SEND_AUTH",
            Command::QualifyHost => "QUALIFY_HOST",
            Command::SendDa => "SEND_DA",
        };
        write!(f, "{}({:02x})", name, self.as_byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::GetBlVersion.as_byte(), 0xfe);
        assert_eq!(Command::SendDa.as_byte(), 0xd7);
        assert_eq!(Command::SendAuth.as_byte(), 0xe2);
    }

    #[test]
    fn test_ack_match() {
        assert!(Command::GetSocId.is_ack(&[0xe7]));
        assert!(!Command::GetSocId.is_ack(&[0xe6]));
        assert!(!Command::GetSocId.is_ack(&[0xe7, 0x00]));
        assert_eq!(Command::QualifyHost.to_string(), "QUALIFY_HOST(e3)");
    }
}
