//! BitBox-Core: host-side driver for BitBox02-family hardware wallets.
//!
//! This crate handles the connection lifecycle between a host application
//! and the device: firmware version gating, the Noise XX secure channel,
//! pairing-code confirmation, status classification, the reboot into the
//! bootloader for outdated firmware, and typed encrypted commands.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, status bytes, attestation layout, protobuf messages
//! - **Transport**: Frame-level abstraction (nusb HID, mock, simulated device)
//! - **Channel**: Noise handshake and transport ciphers
//! - **Pairing**: Plaintext bootstrap opcodes and the pairing decision
//! - **Dispatch**: Encrypted request/response round trips
//! - **Status**: Pure status classification
//! - **Upgrade**: Reboot into the bootloader
//! - **Device**: The façade tying it together, plus the typed commands
//! - **Config**: Persisted pairing identities
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use bitbox_core::{Device, DeviceStatus, FileConfig, NusbTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = NusbTransport::open()?;
//! let descriptor = transport.descriptor();
//! let config = FileConfig::open("bitbox.toml")?;
//!
//! let mut device = Device::new(transport, config, descriptor.version, descriptor.product);
//! if device.init()? == DeviceStatus::RequirePairingConfirmation {
//!     // Show `device.channel_hash()` to the user, then:
//!     device.channel_hash_verify(true)?;
//! }
//! println!("{:02x?}", device.random_number()?);
//! # Ok(())
//! # }
//! ```

pub mod channel;
mod commands;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pairing;
pub mod product;
pub mod protocol;
pub mod status;
pub mod transport;
pub mod upgrade;
pub mod version;

// Re-exports for convenience
pub use channel::{ChannelError, ChannelPhase, NoiseKeypair, SecureChannel};
pub use config::{ConfigStore, FileConfig, MemoryConfig, PairingConfig, StoreError};
pub use device::Device;
pub use dispatch::Framing;
pub use error::{Error, Result};
pub use events::{DeviceEvent, DeviceObserver, NullObserver, TracingObserver};
pub use pairing::{PairingGate, format_channel_hash};
pub use product::{Product, SUPPORT_TABLE, SupportTable};
pub use protocol::{AttestationReport, OpStatus};
pub use status::{DeviceFacts, DeviceStatus, PairingState, classify};
#[cfg(any(test, feature = "simulator"))]
pub use transport::SimulatedDevice;
pub use transport::{DeviceDescriptor, MockTransport, NusbTransport, Transport, TransportError};
pub use upgrade::UpgradeOrchestrator;
pub use version::SemVer;
