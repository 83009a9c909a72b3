//! Device status classification.

use std::fmt;

use crate::product::{Product, SupportTable};
use crate::version::SemVer;

/// Operational status of a connected device.
///
/// Derived from [`DeviceFacts`] by [`classify`]; the device caches the
/// result for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Channel established, waiting for the device to confirm the pairing code.
    Unpaired,
    /// The device confirmed the pairing code; the host still has to.
    RequirePairingConfirmation,
    /// The pairing code was declined. The session is untrusted.
    PairingRejected,
    /// Paired, but the device has no seed yet.
    Uninitialized,
    /// Paired and seeded; the full command surface is available.
    Initialized,
    /// The firmware is outside what this host supports. Nothing was sent.
    RequireAppUpgrade,
    /// The firmware is too old for this product and must be upgraded.
    RequireFirmwareUpgrade,
}

impl DeviceStatus {
    /// No further refinement happens from these states within a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceStatus::PairingRejected
                | DeviceStatus::RequireAppUpgrade
                | DeviceStatus::RequireFirmwareUpgrade
        )
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Unpaired => write!(f, "Unpaired"),
            DeviceStatus::RequirePairingConfirmation => write!(f, "Require Pairing Confirmation"),
            DeviceStatus::PairingRejected => write!(f, "Pairing Rejected"),
            DeviceStatus::Uninitialized => write!(f, "Uninitialized"),
            DeviceStatus::Initialized => write!(f, "Initialized"),
            DeviceStatus::RequireAppUpgrade => write!(f, "Require App Upgrade"),
            DeviceStatus::RequireFirmwareUpgrade => write!(f, "Require Firmware Upgrade"),
        }
    }
}

/// Where the pairing-code confirmation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingState {
    /// Waiting for the device side.
    #[default]
    Pending,
    /// Device accepted; host confirmation outstanding.
    DeviceConfirmed,
    /// Both sides accepted, or the device was already known.
    Confirmed,
    /// Either side declined.
    Declined,
}

/// Everything the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFacts {
    pub version: SemVer,
    pub product: Product,
    pub pairing: PairingState,
    /// `None` until the device has been asked.
    pub initialized: Option<bool>,
}

/// Compute the status for `facts`. First matching rule wins:
///
/// 1. version outside the host's range: `RequireAppUpgrade`
/// 2. version below the product minimum: `RequireFirmwareUpgrade`
/// 3. pairing declined: `PairingRejected`
/// 4. pairing not yet confirmed on both sides: `Unpaired` or
///    `RequirePairingConfirmation`
/// 5. device not initialized: `Uninitialized`
/// 6. otherwise `Initialized`
///
/// # Panics
///
/// Panics if `facts.product` is missing from `support`.
pub fn classify(support: &SupportTable, facts: &DeviceFacts) -> DeviceStatus {
    if !support.host_supports(facts.version) {
        return DeviceStatus::RequireAppUpgrade;
    }
    if support.requires_firmware_upgrade(facts.version, facts.product) {
        return DeviceStatus::RequireFirmwareUpgrade;
    }
    match facts.pairing {
        PairingState::Declined => DeviceStatus::PairingRejected,
        PairingState::Pending => DeviceStatus::Unpaired,
        PairingState::DeviceConfirmed => DeviceStatus::RequirePairingConfirmation,
        PairingState::Confirmed => match facts.initialized {
            Some(true) => DeviceStatus::Initialized,
            _ => DeviceStatus::Uninitialized,
        },
    }
}
