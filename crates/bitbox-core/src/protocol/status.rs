//! Single-byte status replies to plaintext bootstrap opcodes.

use std::fmt;

use super::constants::{OP_STATUS_FAILURE, OP_STATUS_FAILURE_UNINITIALIZED, OP_STATUS_SUCCESS};

/// Parsed status byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpStatus {
    Success,
    Failure,
    Uninitialized,
    /// Device-defined code not known to this driver.
    Other(u8),
}

impl OpStatus {
    /// Parse the first byte of a reply. Empty replies yield `None`.
    pub fn from_reply(reply: &[u8]) -> Option<Self> {
        reply.first().map(|&b| Self::from_byte(b))
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            OP_STATUS_SUCCESS => Self::Success,
            OP_STATUS_FAILURE => Self::Failure,
            OP_STATUS_FAILURE_UNINITIALIZED => Self::Uninitialized,
            other => Self::Other(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStatus::Success => write!(f, "SUCCESS"),
            OpStatus::Failure => write!(f, "FAILURE"),
            OpStatus::Uninitialized => write!(f, "FAILURE_UNINITIALIZED"),
            OpStatus::Other(b) => write!(f, "0x{:02X}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(OpStatus::from_byte(0x00), OpStatus::Success);
        assert_eq!(OpStatus::from_byte(0x01), OpStatus::Failure);
        assert_eq!(OpStatus::from_byte(0x02), OpStatus::Uninitialized);
        assert_eq!(OpStatus::from_byte(0x7F), OpStatus::Other(0x7F));
    }

    #[test]
    fn test_from_reply() {
        assert_eq!(OpStatus::from_reply(&[]), None);
        assert!(OpStatus::from_reply(&[0x00, 0xFF]).unwrap().is_success());
        assert_eq!(OpStatus::Uninitialized.to_string(), "FAILURE_UNINITIALIZED");
    }
}
