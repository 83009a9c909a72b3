//! Transport layer abstraction.
//!
//! Defines the `Transport` trait the driver talks through, allowing
//! different implementations (nusb HID, mock, simulated device).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Frame-level connection to one device.
///
/// The protocol is half-duplex: `query` blocks until exactly one reply frame
/// arrives. Implementations take `&self`; callers must not issue two
/// operations concurrently.
pub trait Transport: Send + Sync {
    /// Send one frame without waiting for a reply.
    fn send_frame(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Send one frame and block for the reply frame.
    fn query(&self, data: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Release the connection. Calling it more than once is a no-op.
    fn close(&self);
}
