//! Transport layer module.

pub mod mock;
pub mod nusb;
#[cfg(any(test, feature = "simulator"))]
pub mod simulator;
pub mod traits;
pub mod u2fhid;

pub use mock::{FrameKind, MockTransport};
pub use nusb::{DeviceDescriptor, NusbTransport};
#[cfg(any(test, feature = "simulator"))]
pub use simulator::SimulatedDevice;
pub use traits::{Transport, TransportError};
