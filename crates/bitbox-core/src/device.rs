//! Device façade.
//!
//! [`Device`] owns the transport, the secure channel and the per-session
//! state. The connection lifecycle is:
//!
//! 1. [`Device::init`]: version gate, attestation and unlock, handshake,
//!    pairing decision, and the firmware-upgrade reboot when needed.
//! 2. [`Device::channel_hash_verify`]: the host's answer to the pairing code,
//!    followed by an initialization probe.
//! 3. Typed commands (see `commands.rs`), each one encrypted round trip.
//!
//! A `Device` is meant for one caller at a time. Methods that touch the
//! channel take `&mut self`; share it behind a `Mutex` if several threads
//! need it.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::channel::{NoiseKeypair, SecureChannel};
use crate::config::ConfigStore;
use crate::dispatch::{Framing, dispatch, mismatch};
use crate::error::{Error, Result};
use crate::events::{DeviceEvent, DeviceObserver, TracingObserver};
use crate::pairing::{PairingGate, format_channel_hash};
use crate::product::{Product, SUPPORT_TABLE, SupportTable};
use crate::protocol::attestation::AttestationReport;
use crate::protocol::constants::ATTESTATION_SINCE;
use crate::protocol::messages::{DeviceInfoRequest, request, response};
use crate::status::{DeviceFacts, DeviceStatus, PairingState, classify};
use crate::transport::Transport;
use crate::upgrade::UpgradeOrchestrator;
use crate::version::SemVer;

/// One connected device.
pub struct Device<T: Transport, C: ConfigStore, O: DeviceObserver = TracingObserver> {
    transport: T,
    config: C,
    observer: Arc<O>,
    support: &'static SupportTable,
    version: SemVer,
    product: Product,
    framing: Framing,
    channel: SecureChannel,
    pairing: PairingState,
    initialized: Option<bool>,
    status: DeviceStatus,
    channel_hash: Option<String>,
    attestation: Option<AttestationReport>,
    disconnected: bool,
}

impl<T: Transport, C: ConfigStore> Device<T, C, TracingObserver> {
    /// Create a device with the default tracing observer.
    pub fn new(transport: T, config: C, version: SemVer, product: Product) -> Self {
        Self::with_observer(transport, config, version, product, Arc::new(TracingObserver))
    }
}

impl<T: Transport, C: ConfigStore, O: DeviceObserver> Device<T, C, O> {
    /// Create a device with a custom observer.
    pub fn with_observer(
        transport: T,
        config: C,
        version: SemVer,
        product: Product,
        observer: Arc<O>,
    ) -> Self {
        Self {
            transport,
            config,
            observer,
            support: &SUPPORT_TABLE,
            version,
            product,
            framing: Framing::for_version(version),
            channel: SecureChannel::new(),
            pairing: PairingState::Pending,
            initialized: None,
            status: DeviceStatus::Unpaired,
            channel_hash: None,
            attestation: None,
            disconnected: false,
        }
    }

    /// Use a different firmware support table.
    pub fn with_support_table(mut self, support: &'static SupportTable) -> Self {
        self.support = support;
        self
    }

    pub fn version(&self) -> SemVer {
        self.version
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Pairing code and whether the device side has confirmed it.
    pub fn channel_hash(&self) -> Option<(&str, bool)> {
        let verified = matches!(
            self.pairing,
            PairingState::DeviceConfirmed | PairingState::Confirmed
        );
        self.channel_hash.as_deref().map(|h| (h, verified))
    }

    /// Attestation reply from the last `init`, if the firmware supports it
    /// and the device answered.
    pub fn attestation(&self) -> Option<&AttestationReport> {
        self.attestation.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Run the bootstrap sequence and return the resulting status.
    ///
    /// Firmware outside the host's range yields `RequireAppUpgrade` without
    /// sending a single byte. Firmware below the product minimum gets the
    /// reboot-into-bootloader request right after the handshake. If sending
    /// it fails the error is returned and the status stays
    /// `RequireFirmwareUpgrade`; calling `init` again retries over a fresh
    /// handshake.
    #[instrument(skip(self), fields(version = %self.version, product = %self.product))]
    pub fn init(&mut self) -> Result<DeviceStatus> {
        if self.disconnected {
            return Err(Error::Disconnected);
        }
        if !self.support.host_supports(self.version) {
            warn!("Firmware not supported by this host");
            self.refresh_status();
            return Ok(self.status);
        }

        self.channel.reset();
        self.pairing = PairingState::Pending;
        self.initialized = None;
        self.channel_hash = None;
        self.refresh_status();

        let keypair = self.app_keypair()?;
        let gate = PairingGate::new(&self.transport, &self.config, &*self.observer);

        if self.version.at_least(ATTESTATION_SINCE) {
            self.attestation = match gate.attest() {
                Ok(report) => Some(report),
                Err(Error::Attestation(e)) => {
                    warn!(error = %e, "Attestation failed");
                    None
                }
                Err(e) => return Err(e),
            };
            gate.unlock()?;
        }

        let device_requested = gate.handshake(&mut self.channel, &keypair)?;
        let remote_static = self
            .channel
            .remote_static()
            .copied()
            .ok_or_else(|| Error::Handshake("no device static key".into()))?;
        let pairing_required = gate.requires_pairing_verification(&remote_static, device_requested);

        if self.support.requires_firmware_upgrade(self.version, self.product) {
            self.refresh_status();
            self.upgrade_firmware()?;
            return Ok(self.status);
        }

        let hash = self
            .channel
            .handshake_hash()
            .map(format_channel_hash)
            .unwrap_or_default();
        self.channel_hash = Some(hash.clone());

        if !pairing_required {
            info!("Device already paired");
            self.confirm_pairing(PairingState::Pending)?;
            return Ok(self.status);
        }

        self.observer.on_event(&DeviceEvent::ChannelHashChanged {
            hash: hash.clone(),
            device_verified: false,
        });

        let gate = PairingGate::new(&self.transport, &self.config, &*self.observer);
        let accepted = gate.verify()?;
        if accepted {
            self.pairing = PairingState::DeviceConfirmed;
        } else {
            self.pairing = PairingState::Declined;
            self.channel.reset();
        }
        self.observer.on_event(&DeviceEvent::ChannelHashChanged {
            hash,
            device_verified: accepted,
        });
        self.refresh_status();
        Ok(self.status)
    }

    /// The host's answer to the pairing code.
    ///
    /// Declining makes the session untrusted for good, also for a device
    /// that was already known. Accepting only counts once the device has
    /// confirmed too; then the device key is stored and the device is asked
    /// whether it is initialized. If that question fails the status stays
    /// `RequirePairingConfirmation`. Terminal statuses are returned
    /// unchanged.
    #[instrument(skip(self))]
    pub fn channel_hash_verify(&mut self, ok: bool) -> Result<DeviceStatus> {
        if self.disconnected {
            return Err(Error::Disconnected);
        }
        if self.status.is_terminal() {
            return Ok(self.status);
        }

        match (ok, self.pairing) {
            (_, PairingState::Declined) | (true, PairingState::Confirmed) => {}
            (false, _) => {
                info!("Pairing code declined");
                self.pairing = PairingState::Declined;
                self.channel.reset();
                self.refresh_status();
            }
            (true, PairingState::Pending) => {
                warn!("Pairing code not yet confirmed on the device");
            }
            (true, PairingState::DeviceConfirmed) => {
                let gate = PairingGate::new(&self.transport, &self.config, &*self.observer);
                if let Some(key) = self.channel.remote_static()
                    && let Err(e) = gate.accept(key)
                {
                    warn!(error = %e, "Could not store device key");
                }
                self.confirm_pairing(PairingState::DeviceConfirmed)?;
            }
        }
        Ok(self.status)
    }

    /// Reboot into the bootloader so a new firmware can be installed.
    ///
    /// Needs an established channel. Afterwards the session is over and
    /// every call returns [`Error::Disconnected`]. If the request could not
    /// be sent the channel is dropped and the pairing falls back to
    /// unconfirmed; call [`Device::init`] to reconnect.
    pub fn upgrade_firmware(&mut self) -> Result<()> {
        if self.status != DeviceStatus::RequireFirmwareUpgrade {
            self.ensure_ready()?;
        } else if self.disconnected {
            return Err(Error::Disconnected);
        }

        let result = UpgradeOrchestrator::new(&self.transport, self.framing)
            .reboot_into_bootloader(&mut self.channel, &*self.observer);
        // Whether or not the frame arrived, the nonces can no longer be trusted.
        self.channel.reset();
        if let Err(e) = result {
            self.pairing = PairingState::Pending;
            self.initialized = None;
            self.refresh_status();
            return Err(e);
        }
        self.disconnected = true;
        Ok(())
    }

    /// Release the transport. Further calls return [`Error::Disconnected`].
    pub fn close(&mut self) {
        self.transport.close();
        self.channel.reset();
        self.disconnected = true;
        info!("Device closed");
    }

    /// Dispatch `request` if the session allows commands.
    pub(crate) fn query(&mut self, request: request::Request) -> Result<response::Response> {
        self.ensure_ready()?;
        dispatch(
            &self.transport,
            &mut self.channel,
            self.framing,
            &*self.observer,
            request,
        )
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.disconnected {
            return Err(Error::Disconnected);
        }
        match self.status {
            DeviceStatus::Initialized | DeviceStatus::Uninitialized => Ok(()),
            DeviceStatus::Unpaired | DeviceStatus::RequirePairingConfirmation => {
                Err(Error::NotPaired)
            }
            DeviceStatus::PairingRejected => Err(Error::PairingDeclined),
            DeviceStatus::RequireAppUpgrade | DeviceStatus::RequireFirmwareUpgrade => {
                Err(Error::VersionUnsupported {
                    version: self.version,
                })
            }
        }
    }

    /// Mark the pairing confirmed and ask the device whether it is
    /// initialized. On failure the pairing falls back to `previous` and the
    /// status is left alone; a transport failure also drops the channel.
    fn confirm_pairing(&mut self, previous: PairingState) -> Result<()> {
        self.pairing = PairingState::Confirmed;
        match self.probe_initialized() {
            Ok(initialized) => {
                self.initialized = Some(initialized);
                self.refresh_status();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Initialization probe failed");
                self.pairing = previous;
                if e.is_retryable() {
                    self.channel.reset();
                }
                Err(e)
            }
        }
    }

    fn probe_initialized(&mut self) -> Result<bool> {
        match dispatch(
            &self.transport,
            &mut self.channel,
            self.framing,
            &*self.observer,
            request::Request::DeviceInfo(DeviceInfoRequest {}),
        )? {
            response::Response::DeviceInfo(info) => Ok(info.initialized),
            other => Err(mismatch("device_info", &other)),
        }
    }

    fn app_keypair(&self) -> Result<NoiseKeypair> {
        if let Some(keypair) = self.config.app_noise_static_keypair() {
            return Ok(keypair);
        }
        let keypair = NoiseKeypair::generate().map_err(|e| Error::Handshake(e.to_string()))?;
        if let Err(e) = self.config.set_app_noise_static_keypair(&keypair) {
            warn!(error = %e, "Could not store app keypair");
        }
        Ok(keypair)
    }

    fn refresh_status(&mut self) {
        let status = classify(
            self.support,
            &DeviceFacts {
                version: self.version,
                product: self.product,
                pairing: self.pairing,
                initialized: self.initialized,
            },
        );
        if status != self.status {
            self.observer.on_event(&DeviceEvent::StatusChanged {
                from: self.status,
                to: status,
            });
            self.status = status;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::events::NullObserver;
    use crate::transport::SimulatedDevice;

    pub type SimDevice = Device<SimulatedDevice, MemoryConfig, NullObserver>;

    pub const VERSIONS: [SemVer; 8] = [
        SemVer::new(1, 0, 0),
        SemVer::new(2, 0, 0),
        SemVer::new(3, 0, 0),
        SemVer::new(4, 1, 0),
        SemVer::new(4, 1, 1),
        SemVer::new(4, 2, 0),
        SemVer::new(4, 2, 1),
        SemVer::new(4, 3, 0),
    ];

    pub fn device(sim: SimulatedDevice, version: SemVer, product: Product) -> SimDevice {
        Device::with_observer(
            sim,
            MemoryConfig::new(),
            version,
            product,
            Arc::new(NullObserver),
        )
    }

    /// Every (version, product) pair that reaches a usable session.
    pub fn usable_configurations() -> Vec<(SemVer, Product)> {
        VERSIONS
            .iter()
            .flat_map(|&v| Product::ALL.iter().map(move |&p| (v, p)))
            .filter(|&(v, p)| !SUPPORT_TABLE.requires_firmware_upgrade(v, p))
            .collect()
    }

    /// A device that went through `init` and host pairing confirmation.
    pub fn paired(version: SemVer, product: Product) -> SimDevice {
        let mut device = device(SimulatedDevice::new(version), version, product);
        assert_eq!(
            device.init().unwrap(),
            DeviceStatus::RequirePairingConfirmation
        );
        assert_eq!(
            device.channel_hash_verify(true).unwrap(),
            DeviceStatus::Uninitialized
        );
        device.transport().clear_frames();
        device
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::test_support::*;
    use super::*;
    use crate::config::MemoryConfig;
    use crate::protocol::constants::{OP_I_CAN_HAS_PAIRIN_VERIFICASHUN, OP_NOISE_MSG};
    use crate::transport::{FrameKind, SimulatedDevice, TransportError};

    #[test]
    fn test_unsupported_range_sends_nothing() {
        for version in [SemVer::new(0, 9, 0), SemVer::new(5, 0, 0), SemVer::new(7, 1, 0)] {
            for product in Product::ALL {
                let mut device = device(SimulatedDevice::new(version), version, product);
                assert_eq!(device.init().unwrap(), DeviceStatus::RequireAppUpgrade);
                assert!(device.transport().frames().is_empty());
                assert!(matches!(
                    device.random_number(),
                    Err(Error::VersionUnsupported { .. })
                ));
                assert!(device.transport().frames().is_empty());
            }
        }
    }

    #[test]
    fn test_firmware_upgrade_sends_one_reboot() {
        for version in VERSIONS {
            for product in Product::ALL {
                if !SUPPORT_TABLE.requires_firmware_upgrade(version, product) {
                    continue;
                }
                let mut device = device(SimulatedDevice::new(version), version, product);
                assert_eq!(
                    device.init().unwrap(),
                    DeviceStatus::RequireFirmwareUpgrade,
                    "{version} {product}"
                );

                let sends: Vec<Vec<u8>> = device
                    .transport()
                    .frames()
                    .into_iter()
                    .filter(|(kind, _)| *kind == FrameKind::SendOnly)
                    .map(|(_, frame)| frame)
                    .collect();
                assert_eq!(sends.len(), 1, "{version} {product}");

                // `reboot {}` is two protobuf bytes plus the AEAD tag.
                if version.at_least(SemVer::new(4, 0, 0)) {
                    assert_eq!(sends[0][0], OP_NOISE_MSG);
                    assert_eq!(sends[0].len(), 1 + 2 + 16);
                } else {
                    assert_eq!(sends[0].len(), 2 + 16);
                }

                let requests = device.transport().requests();
                assert_eq!(requests.len(), 1);
                assert!(matches!(requests[0], request::Request::Reboot(_)));
                assert!(device.transport().is_rebooted());

                assert!(device.is_disconnected());
                assert!(matches!(device.random_number(), Err(Error::Disconnected)));
                assert!(matches!(device.init(), Err(Error::Disconnected)));
            }
        }
    }

    #[test]
    fn test_scenario_old_multi_firmware() {
        let version = SemVer::new(1, 0, 0);
        let mut device = device(
            SimulatedDevice::new(version),
            version,
            Product::BitBox02Multi,
        );
        assert_eq!(device.init().unwrap(), DeviceStatus::RequireFirmwareUpgrade);
        assert_eq!(device.status(), DeviceStatus::RequireFirmwareUpgrade);
        // No attestation or unlock before 2.0.0
        assert!(device.attestation().is_none());
        assert!(matches!(
            device.set_device_name("Satoshi"),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn test_reboot_send_failure_can_be_retried() {
        let version = SemVer::new(4, 1, 0);
        let sim = SimulatedDevice::new(version);
        sim.fail_next_send(TransportError::WriteFailed("stall".into()));
        let mut device = device(sim, version, Product::BitBox02BtcOnly);

        let err = device.init().unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::WriteFailed(ref m)) if m == "stall"
        ));
        assert!(err.is_retryable());
        assert_eq!(device.status(), DeviceStatus::RequireFirmwareUpgrade);
        assert!(!device.is_disconnected());

        assert!(matches!(device.upgrade_firmware(), Err(Error::Channel(_))));

        assert_eq!(device.init().unwrap(), DeviceStatus::RequireFirmwareUpgrade);
        assert!(device.transport().is_rebooted());
        assert!(device.is_disconnected());
    }

    #[test]
    fn test_pairing_flow() {
        for (version, product) in usable_configurations() {
            let mut device = device(SimulatedDevice::new(version), version, product);
            assert_eq!(
                device.init().unwrap(),
                DeviceStatus::RequirePairingConfirmation
            );
            if version.at_least(ATTESTATION_SINCE) {
                assert!(device.attestation().is_some());
            }

            let expected = format_channel_hash(&device.transport().handshake_hash().unwrap());
            assert_eq!(device.channel_hash(), Some((expected.as_str(), true)));
            assert!(matches!(device.random_number(), Err(Error::NotPaired)));

            assert_eq!(
                device.channel_hash_verify(true).unwrap(),
                DeviceStatus::Uninitialized
            );
            assert!(
                device
                    .config()
                    .contains_device_static_pubkey(device.transport().static_pubkey())
            );
            assert!(device.config().app_noise_static_keypair().is_some());
            assert_eq!(device.version(), version);
            assert_eq!(device.product(), product);
        }
    }

    #[test]
    fn test_known_device_skips_verification() {
        let version = SemVer::new(4, 2, 1);
        let sim = SimulatedDevice::new(version).initialized(true);
        let config = MemoryConfig::new();
        config
            .add_device_static_pubkey(sim.static_pubkey())
            .unwrap();
        let mut device = Device::with_observer(
            sim,
            config,
            version,
            Product::BitBox02Multi,
            Arc::new(crate::events::NullObserver),
        );

        assert_eq!(device.init().unwrap(), DeviceStatus::Initialized);
        assert!(
            !device
                .transport()
                .frames()
                .iter()
                .any(|(_, f)| f.as_slice() == [OP_I_CAN_HAS_PAIRIN_VERIFICASHUN])
        );
    }

    #[test]
    fn test_host_declines_known_device() {
        let version = SemVer::new(4, 2, 1);
        let sim = SimulatedDevice::new(version).initialized(true);
        let config = MemoryConfig::new();
        config
            .add_device_static_pubkey(sim.static_pubkey())
            .unwrap();
        let mut device = Device::with_observer(
            sim,
            config,
            version,
            Product::BitBox02Multi,
            Arc::new(crate::events::NullObserver),
        );

        assert_eq!(device.init().unwrap(), DeviceStatus::Initialized);
        assert_eq!(
            device.channel_hash_verify(false).unwrap(),
            DeviceStatus::PairingRejected
        );
        let before = device.transport().frames().len();
        assert!(matches!(device.random_number(), Err(Error::PairingDeclined)));
        assert_eq!(device.transport().frames().len(), before);

        // Accepting afterwards does not undo the decline.
        assert_eq!(
            device.channel_hash_verify(true).unwrap(),
            DeviceStatus::PairingRejected
        );
    }

    #[test]
    fn test_known_device_accept_is_noop() {
        let version = SemVer::new(4, 2, 1);
        let sim = SimulatedDevice::new(version);
        let config = MemoryConfig::new();
        config
            .add_device_static_pubkey(sim.static_pubkey())
            .unwrap();
        let mut device = Device::with_observer(
            sim,
            config,
            version,
            Product::BitBox02Multi,
            Arc::new(crate::events::NullObserver),
        );
        assert_eq!(device.init().unwrap(), DeviceStatus::Uninitialized);
        assert_eq!(
            device.channel_hash_verify(true).unwrap(),
            DeviceStatus::Uninitialized
        );
    }

    #[test]
    fn test_device_requested_pairing_overrides_store() {
        let version = SemVer::new(4, 2, 1);
        let sim = SimulatedDevice::new(version).require_pairing(true);
        let config = MemoryConfig::new();
        config
            .add_device_static_pubkey(sim.static_pubkey())
            .unwrap();
        let mut device = Device::with_observer(
            sim,
            config,
            version,
            Product::BitBox02Multi,
            Arc::new(crate::events::NullObserver),
        );
        assert_eq!(
            device.init().unwrap(),
            DeviceStatus::RequirePairingConfirmation
        );
    }

    #[test]
    fn test_device_declines_pairing() {
        let version = SemVer::new(4, 3, 0);
        let sim = SimulatedDevice::new(version).confirm_pairing(false);
        let mut device = device(sim, version, Product::BitBoxBaseStandard);

        assert_eq!(device.init().unwrap(), DeviceStatus::PairingRejected);
        assert_eq!(device.channel_hash().map(|(_, v)| v), Some(false));
        assert_eq!(
            device.channel_hash_verify(true).unwrap(),
            DeviceStatus::PairingRejected
        );
        assert!(matches!(device.random_number(), Err(Error::PairingDeclined)));
    }

    #[test]
    fn test_host_declines_pairing() {
        let version = SemVer::new(4, 2, 0);
        let sim = SimulatedDevice::new(version).initialized(true);
        let mut device = device(sim, version, Product::BitBox02Multi);

        device.init().unwrap();
        assert_eq!(
            device.channel_hash_verify(false).unwrap(),
            DeviceStatus::PairingRejected
        );
        assert!(
            !device
                .config()
                .contains_device_static_pubkey(device.transport().static_pubkey())
        );
        let before = device.transport().frames().len();
        assert!(matches!(
            device.set_device_name("Satoshi"),
            Err(Error::PairingDeclined)
        ));
        assert_eq!(device.transport().frames().len(), before);
    }

    #[test]
    fn test_initialized_device() {
        let version = SemVer::new(4, 2, 0);
        let sim = SimulatedDevice::new(version).initialized(true);
        let mut device = device(sim, version, Product::BitBox02Multi);
        device.init().unwrap();
        assert_eq!(
            device.channel_hash_verify(true).unwrap(),
            DeviceStatus::Initialized
        );
    }

    #[test]
    fn test_failed_initialization_probe_keeps_confirmation_pending() {
        let version = SemVer::new(4, 2, 0);
        let mut device = device(SimulatedDevice::new(version), version, Product::BitBox02Multi);
        assert_eq!(
            device.init().unwrap(),
            DeviceStatus::RequirePairingConfirmation
        );

        device
            .transport()
            .fail_with(Some(TransportError::Timeout { timeout_ms: 1 }));
        assert!(matches!(
            device.channel_hash_verify(true),
            Err(Error::Transport(TransportError::Timeout { timeout_ms: 1 }))
        ));
        assert_eq!(device.status(), DeviceStatus::RequirePairingConfirmation);
        assert!(matches!(device.random_number(), Err(Error::NotPaired)));

        // The key was accepted before the probe, so reconnecting skips the
        // pairing code.
        device.transport().fail_with(None);
        assert_eq!(device.init().unwrap(), DeviceStatus::Uninitialized);
    }

    #[test]
    fn test_mismatched_initialization_probe_can_be_retried() {
        let version = SemVer::new(3, 0, 0);
        let sim = SimulatedDevice::new(version).with_handler(|r| match r {
            request::Request::DeviceInfo(_) => {
                Some(response::Response::Success(crate::protocol::messages::Success {}))
            }
            _ => None,
        });
        let mut device = device(sim, version, Product::BitBox02Multi);
        device.init().unwrap();

        assert!(matches!(
            device.channel_hash_verify(true),
            Err(Error::ProtocolMismatch {
                expected: "device_info",
                actual: "success"
            })
        ));
        assert_eq!(device.status(), DeviceStatus::RequirePairingConfirmation);

        device.transport().set_handler(|_| None);
        assert_eq!(
            device.channel_hash_verify(true).unwrap(),
            DeviceStatus::Uninitialized
        );
    }

    #[test]
    fn test_custom_support_table() {
        static STRICT: SupportTable = SupportTable {
            lowest_supported: SemVer::new(1, 0, 0),
            lowest_non_supported: SemVer::new(5, 0, 0),
            product_minimums: &[
                (Product::BitBox02Multi, SemVer::new(4, 2, 0)),
                (Product::BitBox02BtcOnly, SemVer::new(4, 2, 0)),
                (Product::BitBoxBaseStandard, SemVer::new(4, 3, 0)),
            ],
        };

        let version = SemVer::new(4, 1, 0);
        let mut device = device(SimulatedDevice::new(version), version, Product::BitBox02Multi)
            .with_support_table(&STRICT);
        assert_eq!(device.init().unwrap(), DeviceStatus::RequireFirmwareUpgrade);
        assert!(device.transport().is_rebooted());
    }

    #[test]
    fn test_close() {
        for (version, product) in usable_configurations() {
            let mut device = paired(version, product);
            device.close();
            device.close();
            assert_eq!(device.transport().close_count(), 2);
            assert!(matches!(device.random_number(), Err(Error::Disconnected)));
        }
    }

    #[test]
    fn test_explicit_upgrade_on_paired_device() {
        let version = SemVer::new(4, 2, 0);
        let mut device = paired(version, Product::BitBox02Multi);
        device.upgrade_firmware().unwrap();
        assert!(device.transport().is_rebooted());
        assert!(matches!(device.upgrade_firmware(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_failed_explicit_upgrade_requires_reconnect() {
        let version = SemVer::new(4, 2, 0);
        let mut device = paired(version, Product::BitBox02Multi);
        device
            .transport()
            .fail_next_send(TransportError::WriteFailed("stall".into()));

        assert!(matches!(
            device.upgrade_firmware(),
            Err(Error::Transport(TransportError::WriteFailed(_)))
        ));
        assert!(!device.is_disconnected());
        assert_eq!(device.status(), DeviceStatus::Unpaired);
        assert!(matches!(device.random_number(), Err(Error::NotPaired)));

        assert_eq!(device.init().unwrap(), DeviceStatus::Uninitialized);
        device.upgrade_firmware().unwrap();
        assert!(device.transport().is_rebooted());
    }

    #[test]
    fn test_status_events() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<DeviceEvent>>);

        impl DeviceObserver for Recorder {
            fn on_event(&self, event: &DeviceEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }

        let version = SemVer::new(4, 2, 0);
        let recorder = Arc::new(Recorder::default());
        let mut device = Device::with_observer(
            SimulatedDevice::new(version).initialized(true),
            MemoryConfig::new(),
            version,
            Product::BitBox02Multi,
            Arc::clone(&recorder),
        );
        device.init().unwrap();
        device.channel_hash_verify(true).unwrap();

        let events = recorder.0.lock().unwrap();
        let statuses: Vec<DeviceStatus> = events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::StatusChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                DeviceStatus::RequirePairingConfirmation,
                DeviceStatus::Initialized
            ]
        );
        let hashes: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::ChannelHashChanged {
                    device_verified, ..
                } => Some(*device_verified),
                _ => None,
            })
            .collect();
        assert_eq!(hashes, vec![false, true]);
    }
}
