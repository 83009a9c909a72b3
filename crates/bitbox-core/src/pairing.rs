//! Plaintext bootstrap opcodes and the pairing decision.
//!
//! Everything here happens before the channel is trusted: attestation,
//! unlock, the three handshake messages and the pairing-code confirmation.

use tracing::{debug, info, instrument, warn};

use crate::channel::{NoiseKeypair, Role, SecureChannel};
use crate::config::{ConfigStore, StoreError};
use crate::error::{Error, Result};
use crate::events::{DeviceEvent, DeviceObserver, PacketDirection};
use crate::protocol::attestation::AttestationReport;
use crate::protocol::constants::{
    ATTESTATION_CHALLENGE_LEN, OP_ATTESTATION, OP_I_CAN_HAS_HANDSHAKE,
    OP_I_CAN_HAS_PAIRIN_VERIFICASHUN, OP_STATUS_FAILURE, OP_UNLOCK,
};
use crate::protocol::status::OpStatus;
use crate::transport::Transport;

/// Bootstrap exchanges over one transport, with the identity store used to
/// decide whether the user has to compare a pairing code.
pub struct PairingGate<'a, T: Transport + ?Sized, C: ConfigStore + ?Sized> {
    transport: &'a T,
    config: &'a C,
    observer: &'a dyn DeviceObserver,
}

impl<'a, T: Transport + ?Sized, C: ConfigStore + ?Sized> PairingGate<'a, T, C> {
    pub fn new(transport: &'a T, config: &'a C, observer: &'a dyn DeviceObserver) -> Self {
        Self {
            transport,
            config,
            observer,
        }
    }

    fn query(&self, frame: &[u8]) -> Result<Vec<u8>> {
        self.observer.on_event(&DeviceEvent::Frame {
            direction: PacketDirection::Tx,
            opcode: frame.first().copied(),
            length: frame.len(),
        });
        let reply = self.transport.query(frame)?;
        self.observer.on_event(&DeviceEvent::Frame {
            direction: PacketDirection::Rx,
            opcode: reply.first().copied(),
            length: reply.len(),
        });
        Ok(reply)
    }

    /// Send a random challenge and parse the attestation reply.
    ///
    /// Signatures are not checked here.
    #[instrument(level = "debug", skip(self))]
    pub fn attest(&self) -> Result<AttestationReport> {
        let challenge: [u8; ATTESTATION_CHALLENGE_LEN] = rand::random();
        let mut frame = Vec::with_capacity(1 + ATTESTATION_CHALLENGE_LEN);
        frame.push(OP_ATTESTATION);
        frame.extend_from_slice(&challenge);

        let reply = self.query(&frame)?;
        let report = AttestationReport::from_bytes(&reply)?;
        self.observer.on_event(&DeviceEvent::AttestationReceived {
            root_pubkey_identifier: hex::encode(report.root_pubkey_identifier),
        });
        Ok(report)
    }

    /// Ask the device to unlock. An uninitialized device answers with
    /// [`OpStatus::Uninitialized`], which is not an error.
    #[instrument(level = "debug", skip(self))]
    pub fn unlock(&self) -> Result<OpStatus> {
        let reply = self.query(&[OP_UNLOCK])?;
        let status = OpStatus::from_reply(&reply)
            .ok_or_else(|| Error::MalformedFrame("empty unlock reply".into()))?;
        debug!(status = %status, "Unlock");
        Ok(status)
    }

    /// Run the Noise XX handshake as initiator.
    ///
    /// Returns whether the device itself asked for pairing verification.
    /// Any cryptographic failure leaves `channel` failed and is reported as
    /// [`Error::Handshake`]; transport errors pass through.
    #[instrument(level = "info", skip_all)]
    pub fn handshake(&self, channel: &mut SecureChannel, keypair: &NoiseKeypair) -> Result<bool> {
        let reply = self.query(&[OP_I_CAN_HAS_HANDSHAKE])?;
        match OpStatus::from_reply(&reply) {
            Some(OpStatus::Success) => {}
            other => {
                return Err(Error::Handshake(format!(
                    "device refused handshake ({})",
                    other.map_or_else(|| "empty reply".to_string(), |s| s.to_string())
                )));
            }
        }

        channel.begin(Role::Initiator, keypair).map_err(handshake_err)?;
        let msg1 = channel.write_handshake_message().map_err(handshake_err)?;
        let msg2 = self.query(&msg1)?;
        channel.read_handshake_message(&msg2).map_err(handshake_err)?;
        let msg3 = channel.write_handshake_message().map_err(handshake_err)?;
        let reply = self.query(&msg3)?;

        if !channel.is_established() {
            return Err(Error::Handshake(format!(
                "pattern incomplete (channel is {})",
                channel.phase()
            )));
        }

        let device_requested = reply.first() == Some(&OP_STATUS_FAILURE);
        info!(device_requested, "Handshake complete");
        Ok(device_requested)
    }

    /// True if the user must compare the pairing code: the device asked for
    /// it, or its static key is not known to the store.
    pub fn requires_pairing_verification(
        &self,
        device_static_pubkey: &[u8],
        device_requested: bool,
    ) -> bool {
        device_requested || !self.config.contains_device_static_pubkey(device_static_pubkey)
    }

    /// Ask the device to show the pairing code and wait for the user's
    /// answer on the device. Returns whether it was accepted.
    #[instrument(level = "info", skip(self))]
    pub fn verify(&self) -> Result<bool> {
        let reply = self.query(&[OP_I_CAN_HAS_PAIRIN_VERIFICASHUN])?;
        let status = OpStatus::from_reply(&reply)
            .ok_or_else(|| Error::MalformedFrame("empty pairing reply".into()))?;
        if !status.is_success() {
            warn!(status = %status, "Pairing code not confirmed on device");
        }
        Ok(status.is_success())
    }

    /// Remember the device key so the next connection skips verification.
    pub fn accept(&self, device_static_pubkey: &[u8]) -> Result<(), StoreError> {
        self.config.add_device_static_pubkey(device_static_pubkey)
    }
}

fn handshake_err(e: crate::channel::ChannelError) -> Error {
    Error::Handshake(e.to_string())
}

/// Human-comparable pairing code: the first 20 characters of the base32
/// handshake hash, as two lines of two groups.
pub fn format_channel_hash(handshake_hash: &[u8]) -> String {
    let encoded = data_encoding::BASE32.encode(handshake_hash);
    let code = encoded.get(..20).unwrap_or(&encoded);
    let groups: Vec<&str> = code
        .as_bytes()
        .chunks(5)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .collect();
    match groups.as_slice() {
        [a, b, c, d] => format!("{a} {b}\n{c} {d}"),
        _ => groups.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::events::NullObserver;
    use crate::transport::{MockTransport, SimulatedDevice};
    use crate::version::SemVer;

    #[test]
    fn test_format_channel_hash() {
        let code = format_channel_hash(&[0u8; 32]);
        assert_eq!(code, "AAAAA AAAAA\nAAAAA AAAAA");

        let code = format_channel_hash(&[0xFF; 32]);
        assert_eq!(code, "77777 77777\n77777 77777");
    }

    #[test]
    fn test_requires_verification() {
        let mock = MockTransport::new();
        let config = MemoryConfig::new();
        let gate = PairingGate::new(&mock, &config, &NullObserver);
        let key = [9u8; 32];

        assert!(gate.requires_pairing_verification(&key, false));
        gate.accept(&key).unwrap();
        assert!(!gate.requires_pairing_verification(&key, false));
        assert!(gate.requires_pairing_verification(&key, true));
    }

    #[test]
    fn test_handshake_with_simulator() {
        let sim = SimulatedDevice::new(SemVer::new(4, 2, 0)).require_pairing(true);
        let config = MemoryConfig::new();
        let gate = PairingGate::new(&sim, &config, &NullObserver);
        let mut channel = SecureChannel::new();

        let requested = gate
            .handshake(&mut channel, &NoiseKeypair::generate().unwrap())
            .unwrap();
        assert!(requested);
        assert!(channel.is_established());
        assert_eq!(channel.handshake_hash().map(<[u8]>::to_vec), sim.handshake_hash());
        assert_eq!(&channel.remote_static().unwrap()[..], sim.static_pubkey());
        assert!(gate.verify().unwrap());
    }

    #[test]
    fn test_refused_handshake() {
        let mock = MockTransport::new();
        mock.queue_reply(&[OP_STATUS_FAILURE]);
        let config = MemoryConfig::new();
        let gate = PairingGate::new(&mock, &config, &NullObserver);
        let mut channel = SecureChannel::new();

        let err = gate
            .handshake(&mut channel, &NoiseKeypair::generate().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
        assert_eq!(mock.get_writes(), vec![vec![OP_I_CAN_HAS_HANDSHAKE]]);
    }

    #[test]
    fn test_garbage_handshake_reply_fails_channel() {
        let mock = MockTransport::new();
        mock.queue_reply(&[0x00]);
        mock.queue_reply(&[0xAB; 96]);
        let config = MemoryConfig::new();
        let gate = PairingGate::new(&mock, &config, &NullObserver);
        let mut channel = SecureChannel::new();

        let err = gate
            .handshake(&mut channel, &NoiseKeypair::generate().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
        assert_eq!(channel.phase(), crate::channel::ChannelPhase::Failed);
    }

    #[test]
    fn test_attestation_and_unlock() {
        let sim = SimulatedDevice::new(SemVer::new(4, 2, 0));
        let config = MemoryConfig::new();
        let gate = PairingGate::new(&sim, &config, &NullObserver);

        let report = gate.attest().unwrap();
        assert_eq!(report.bootloader_hash, [0x11; 32]);
        assert_eq!(gate.unlock().unwrap(), OpStatus::Uninitialized);

        let frames = sim.frames();
        assert_eq!(frames[0].1.len(), 1 + ATTESTATION_CHALLENGE_LEN);
        assert_eq!(frames[0].1[0], OP_ATTESTATION);
    }
}
