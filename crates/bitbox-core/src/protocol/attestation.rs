//! Attestation reply layout.
//!
//! The host sends [`OP_ATTESTATION`](super::constants::OP_ATTESTATION) plus a
//! 32 byte challenge; the device answers with a status byte followed by the
//! fixed-size fields below. Checking the signatures against the root keys is
//! left to the caller.

use std::io::{Cursor, Read};

use thiserror::Error;

use super::status::OpStatus;

#[derive(Error, Debug)]
pub enum AttestationError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Device refused attestation: {0}")]
    Refused(OpStatus),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed attestation reply (257 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationReport {
    /// Hash of the installed bootloader.
    pub bootloader_hash: [u8; 32],
    /// Uncompressed P-256 device attestation pubkey (X || Y).
    pub device_pubkey: [u8; 64],
    /// Root signature over `bootloader_hash || device_pubkey`.
    pub certificate: [u8; 64],
    /// Identifies which root key signed `certificate`.
    pub root_pubkey_identifier: [u8; 32],
    /// Device signature over the host challenge.
    pub challenge_signature: [u8; 64],
}

impl AttestationReport {
    pub const SIZE: usize = 1 + 32 + 64 + 64 + 32 + 64;

    pub fn from_bytes(data: &[u8]) -> Result<Self, AttestationError> {
        let status = OpStatus::from_reply(data).ok_or(AttestationError::BufferTooSmall {
            expected: Self::SIZE,
            actual: 0,
        })?;
        if !status.is_success() {
            return Err(AttestationError::Refused(status));
        }
        if data.len() < Self::SIZE {
            return Err(AttestationError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[1..]);
        let mut report = Self {
            bootloader_hash: [0; 32],
            device_pubkey: [0; 64],
            certificate: [0; 64],
            root_pubkey_identifier: [0; 32],
            challenge_signature: [0; 64],
        };
        cursor.read_exact(&mut report.bootloader_hash)?;
        cursor.read_exact(&mut report.device_pubkey)?;
        cursor.read_exact(&mut report.certificate)?;
        cursor.read_exact(&mut report.root_pubkey_identifier)?;
        cursor.read_exact(&mut report.challenge_signature)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        let mut data = vec![0u8; AttestationReport::SIZE];
        data[1] = 0xAA; // first byte of bootloader hash
        data[1 + 32] = 0xBB; // first byte of device pubkey
        data[AttestationReport::SIZE - 1] = 0xCC; // last byte of signature

        let report = AttestationReport::from_bytes(&data).unwrap();
        assert_eq!(report.bootloader_hash[0], 0xAA);
        assert_eq!(report.device_pubkey[0], 0xBB);
        assert_eq!(report.challenge_signature[63], 0xCC);
    }

    #[test]
    fn test_short_reply() {
        let err = AttestationReport::from_bytes(&[0x00; 10]).unwrap_err();
        assert!(matches!(
            err,
            AttestationError::BufferTooSmall {
                expected: 257,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_refused() {
        let err = AttestationReport::from_bytes(&[0x01]).unwrap_err();
        assert!(matches!(err, AttestationError::Refused(OpStatus::Failure)));
    }
}
