//! Driver error type.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::StoreError;
use crate::protocol::AttestationError;
use crate::transport::TransportError;
use crate::version::SemVer;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure talking to the device, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Channel negotiation failed; reconnect from scratch.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Encrypting or decrypting on an established channel failed.
    #[error("Secure channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Pairing code was declined")]
    PairingDeclined,

    /// Pairing has not been confirmed on both sides yet.
    #[error("Pairing must be confirmed before sending commands")]
    NotPaired,

    #[error("Unexpected response: expected {expected}, got {actual}")]
    ProtocolMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Firmware {version} is not supported by this host")]
    VersionUnsupported { version: SemVer },

    /// Request rejected locally; nothing was sent.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Failed to decode response: {0}")]
    Codec(#[from] prost::DecodeError),

    #[error("Attestation failed: {0}")]
    Attestation(#[from] AttestationError),

    /// The session is over (reboot issued or transport closed).
    #[error("Device disconnected")]
    Disconnected,

    #[error("Config store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Transport failures are the only errors worth retrying on the same
    /// physical connection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
