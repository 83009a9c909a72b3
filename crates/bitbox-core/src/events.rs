//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow the connection lifecycle
//! and show pairing codes without being wired into the driver itself.

use std::fmt;

use crate::status::DeviceStatus;

/// Frame direction on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted by a [`Device`](crate::Device).
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Status changed.
    StatusChanged { from: DeviceStatus, to: DeviceStatus },
    /// A pairing code is available or its device-side confirmation changed.
    ChannelHashChanged { hash: String, device_verified: bool },
    /// Attestation response parsed.
    AttestationReceived { root_pubkey_identifier: String },
    /// Frame sent or received. `opcode` is the leading byte, if any.
    Frame {
        direction: PacketDirection,
        opcode: Option<u8>,
        length: usize,
    },
}

/// Observer trait for receiving device events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DeviceObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DeviceEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DeviceObserver for NullObserver {
    fn on_event(&self, _event: &DeviceEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DeviceObserver for TracingObserver {
    fn on_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::StatusChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Status changed");
            }
            DeviceEvent::ChannelHashChanged {
                hash,
                device_verified,
            } => {
                tracing::info!(
                    code = %hash.replace('\n', " "),
                    device_verified = device_verified,
                    "Pairing code"
                );
            }
            DeviceEvent::AttestationReceived {
                root_pubkey_identifier,
            } => {
                tracing::debug!(root = %root_pubkey_identifier, "Attestation received");
            }
            DeviceEvent::Frame {
                direction,
                opcode,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    opcode = ?opcode.map(char::from),
                    len = length,
                    "Frame"
                );
            }
        }
    }
}

impl<O: DeviceObserver + ?Sized> DeviceObserver for std::sync::Arc<O> {
    fn on_event(&self, event: &DeviceEvent) {
        (**self).on_event(event)
    }
}
