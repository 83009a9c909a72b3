//! Protocol constants for the BitBox02 USB interface.

use crate::version::SemVer;

// ============================================================================
// Device Identification
// ============================================================================

/// Microchip (formerly Atmel) Vendor ID used by the BitBox02
pub const BITBOX02_VENDOR_ID: u16 = 0x03EB;

/// BitBox02 Product ID (firmware mode)
pub const BITBOX02_PRODUCT_ID: u16 = 0x2403;

/// HID interface carrying the hardware wallet endpoint
pub const BITBOX02_HID_INTERFACE: u8 = 0;

// ============================================================================
// Bootstrap Opcodes (Host -> Device, plaintext)
// ============================================================================

/// Attestation challenge, followed by 32 random bytes
pub const OP_ATTESTATION: u8 = b'a';

/// Unlock the device (user enters the password on-device)
pub const OP_UNLOCK: u8 = b'u';

/// Begin the Noise handshake
pub const OP_I_CAN_HAS_HANDSHAKE: u8 = b'h';

/// Ask the device to confirm the pairing code
pub const OP_I_CAN_HAS_PAIRIN_VERIFICASHUN: u8 = b'v';

/// Encrypted command prefix (firmware >= 4.0.0)
pub const OP_NOISE_MSG: u8 = b'n';

// ============================================================================
// Status Bytes (Device -> Host)
// ============================================================================

pub const OP_STATUS_SUCCESS: u8 = 0x00;
/// Generic failure; after the last handshake message it means
/// "pairing verification required".
pub const OP_STATUS_FAILURE: u8 = 0x01;
pub const OP_STATUS_FAILURE_UNINITIALIZED: u8 = 0x02;

// ============================================================================
// Noise Parameters
// ============================================================================

/// Noise protocol name, also used as the handshake prologue.
pub const NOISE_PROTOCOL_NAME: &str = "Noise_XX_25519_ChaChaPoly_SHA256";

/// Largest Noise message (handshake or transport).
pub const NOISE_MAX_MESSAGE_LEN: usize = 65535;

/// ChaChaPoly authentication tag length.
pub const NOISE_TAG_LEN: usize = 16;

/// Length of an X25519 static public key.
pub const NOISE_PUBKEY_LEN: usize = 32;

/// Random challenge appended to [`OP_ATTESTATION`].
pub const ATTESTATION_CHALLENGE_LEN: usize = 32;

// ============================================================================
// Feature Gates
// ============================================================================

/// Attestation and explicit unlock exist from this firmware on. Before it,
/// the device unlocked itself before USB communication started.
pub const ATTESTATION_SINCE: SemVer = SemVer::new(2, 0, 0);

/// Encrypted frames carry [`OP_NOISE_MSG`] from this firmware on.
pub const NOISE_OPCODE_SINCE: SemVer = SemVer::new(4, 0, 0);

// ============================================================================
// Request Limits
// ============================================================================

/// Maximum device name length in bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 64;
