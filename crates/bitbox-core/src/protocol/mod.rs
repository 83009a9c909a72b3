//! Protocol module - opcodes, status bytes, attestation layout and messages.

pub mod attestation;
pub mod constants;
pub mod messages;
pub mod status;

pub use attestation::{AttestationError, AttestationReport};
pub use constants::*;
pub use status::OpStatus;
