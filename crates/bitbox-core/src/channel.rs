//! Noise XX secure channel.
//!
//! The channel owns the handshake while it is in flight and, once the
//! pattern completes, the directional cipher pair. Both ciphers live inside
//! [`CipherPair`], so there is no state in which only one of them exists.

use std::fmt;

use snow::{Builder, HandshakeState, TransportState};
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::protocol::constants::{
    NOISE_MAX_MESSAGE_LEN, NOISE_PROTOCOL_NAME, NOISE_PUBKEY_LEN, NOISE_TAG_LEN,
};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Noise error: {0}")]
    Noise(#[from] snow::Error),
    #[error("No handshake in progress (channel is {0})")]
    NotHandshaking(ChannelPhase),
    #[error("Channel not established (channel is {0})")]
    NotEstablished(ChannelPhase),
    #[error("Device static key has {0} bytes, expected {NOISE_PUBKEY_LEN}")]
    BadRemoteStatic(usize),
}

/// X25519 static keypair. The private half is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct NoiseKeypair {
    pub private: Vec<u8>,
    pub public: Vec<u8>,
}

impl NoiseKeypair {
    /// Generate a fresh keypair for the channel's DH function.
    pub fn generate() -> Result<Self, ChannelError> {
        let keypair = Builder::new(NOISE_PROTOCOL_NAME.parse()?).generate_keypair()?;
        Ok(Self {
            private: keypair.private,
            public: keypair.public,
        })
    }
}

impl fmt::Debug for NoiseKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseKeypair")
            .field("public", &hex::encode(&self.public))
            .finish_non_exhaustive()
    }
}

/// Which side of the handshake this channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The host.
    Initiator,
    /// The device (only used by the simulator).
    Responder,
}

/// Coarse channel phase, for logging and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Idle,
    Handshaking,
    Established,
    Failed,
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelPhase::Idle => write!(f, "IDLE"),
            ChannelPhase::Handshaking => write!(f, "HANDSHAKING"),
            ChannelPhase::Established => write!(f, "ESTABLISHED"),
            ChannelPhase::Failed => write!(f, "FAILED"),
        }
    }
}

/// Send and receive cipher states produced by a completed handshake.
pub struct CipherPair {
    transport: TransportState,
    handshake_hash: Vec<u8>,
    remote_static: [u8; NOISE_PUBKEY_LEN],
}

impl CipherPair {
    fn from_handshake(handshake: HandshakeState) -> Result<Self, ChannelError> {
        let handshake_hash = handshake.get_handshake_hash().to_vec();
        let remote = handshake.get_remote_static().unwrap_or_default();
        let remote_static: [u8; NOISE_PUBKEY_LEN] = remote
            .try_into()
            .map_err(|_| ChannelError::BadRemoteStatic(remote.len()))?;
        let transport = handshake.into_transport_mode()?;
        Ok(Self {
            transport,
            handshake_hash,
            remote_static,
        })
    }
}

enum ChannelState {
    Idle,
    Handshaking(Box<HandshakeState>),
    Established(Box<CipherPair>),
    Failed,
}

impl ChannelState {
    fn phase(&self) -> ChannelPhase {
        match self {
            ChannelState::Idle => ChannelPhase::Idle,
            ChannelState::Handshaking(_) => ChannelPhase::Handshaking,
            ChannelState::Established(_) => ChannelPhase::Established,
            ChannelState::Failed => ChannelPhase::Failed,
        }
    }
}

/// Handshake state machine plus post-handshake encryption.
///
/// `Idle -> Handshaking -> Established`, or `-> Failed` on any
/// cryptographic error. A failed channel stays failed until [`reset`].
///
/// Cipher nonces advance on every `encrypt`/`decrypt`, hence `&mut self`.
///
/// [`reset`]: SecureChannel::reset
pub struct SecureChannel {
    state: ChannelState,
}

impl SecureChannel {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Idle,
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        self.state.phase()
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, ChannelState::Established(_))
    }

    /// Drop any handshake or cipher state and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = ChannelState::Idle;
    }

    /// Start a handshake with our static `keypair`, replacing any previous
    /// state.
    pub fn begin(&mut self, role: Role, keypair: &NoiseKeypair) -> Result<(), ChannelError> {
        let builder = Builder::new(NOISE_PROTOCOL_NAME.parse()?)
            .local_private_key(&keypair.private)
            .prologue(NOISE_PROTOCOL_NAME.as_bytes());
        let built = match role {
            Role::Initiator => builder.build_initiator(),
            Role::Responder => builder.build_responder(),
        };
        match built {
            Ok(handshake) => {
                debug!(role = ?role, "Handshake started");
                self.state = ChannelState::Handshaking(Box::new(handshake));
                Ok(())
            }
            Err(e) => {
                self.state = ChannelState::Failed;
                Err(e.into())
            }
        }
    }

    /// Produce the next outgoing handshake message.
    pub fn write_handshake_message(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.handshake_step(|hs| {
            let mut buf = vec![0u8; NOISE_MAX_MESSAGE_LEN];
            let n = hs.write_message(&[], &mut buf)?;
            buf.truncate(n);
            Ok(buf)
        })
    }

    /// Consume the peer's next handshake message.
    pub fn read_handshake_message(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        self.handshake_step(|hs| {
            let mut buf = vec![0u8; NOISE_MAX_MESSAGE_LEN];
            hs.read_message(message, &mut buf)?;
            Ok(())
        })
    }

    fn handshake_step<R>(
        &mut self,
        step: impl FnOnce(&mut HandshakeState) -> Result<R, snow::Error>,
    ) -> Result<R, ChannelError> {
        // Anything that returns early below leaves the channel Failed.
        let mut handshake = match std::mem::replace(&mut self.state, ChannelState::Failed) {
            ChannelState::Handshaking(hs) => hs,
            other => {
                let phase = other.phase();
                self.state = other;
                return Err(ChannelError::NotHandshaking(phase));
            }
        };

        let out = step(&mut *handshake)?;

        if handshake.is_handshake_finished() {
            let pair = CipherPair::from_handshake(*handshake)?;
            debug!("Handshake complete");
            self.state = ChannelState::Established(Box::new(pair));
        } else {
            self.state = ChannelState::Handshaking(handshake);
        }
        Ok(out)
    }

    /// Handshake hash (channel binding), once established.
    pub fn handshake_hash(&self) -> Option<&[u8]> {
        match &self.state {
            ChannelState::Established(pair) => Some(&pair.handshake_hash),
            _ => None,
        }
    }

    /// Peer's static public key, once established.
    pub fn remote_static(&self) -> Option<&[u8; NOISE_PUBKEY_LEN]> {
        match &self.state {
            ChannelState::Established(pair) => Some(&pair.remote_static),
            _ => None,
        }
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let pair = self.established_mut()?;
        let mut buf = vec![0u8; plaintext.len() + NOISE_TAG_LEN];
        let n = pair.transport.write_message(plaintext, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let pair = self.established_mut()?;
        let mut buf = vec![0u8; ciphertext.len()];
        let n = pair.transport.read_message(ciphertext, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn established_mut(&mut self) -> Result<&mut CipherPair, ChannelError> {
        match &mut self.state {
            ChannelState::Established(pair) => Ok(pair),
            other => Err(ChannelError::NotEstablished(other.phase())),
        }
    }
}

impl Default for SecureChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_pair() -> (SecureChannel, SecureChannel) {
        let mut host = SecureChannel::new();
        let mut device = SecureChannel::new();
        host.begin(Role::Initiator, &NoiseKeypair::generate().unwrap())
            .unwrap();
        device
            .begin(Role::Responder, &NoiseKeypair::generate().unwrap())
            .unwrap();

        let m1 = host.write_handshake_message().unwrap();
        device.read_handshake_message(&m1).unwrap();
        let m2 = device.write_handshake_message().unwrap();
        host.read_handshake_message(&m2).unwrap();
        assert_eq!(host.phase(), ChannelPhase::Handshaking);
        let m3 = host.write_handshake_message().unwrap();
        assert!(host.is_established());
        device.read_handshake_message(&m3).unwrap();
        assert!(device.is_established());
        (host, device)
    }

    #[test]
    fn test_handshake_and_round_trip() {
        let (mut host, mut device) = handshake_pair();
        assert_eq!(host.handshake_hash(), device.handshake_hash());
        assert_eq!(host.handshake_hash().unwrap().len(), 32);

        for msg in [&b""[..], b"x", &[0xAB; 1000][..]] {
            let ct = host.encrypt(msg).unwrap();
            assert_eq!(ct.len(), msg.len() + NOISE_TAG_LEN);
            assert_eq!(device.decrypt(&ct).unwrap(), msg);

            let ct = device.encrypt(msg).unwrap();
            assert_eq!(host.decrypt(&ct).unwrap(), msg);
        }
    }

    #[test]
    fn test_remote_static_matches_peer_key() {
        let host_key = NoiseKeypair::generate().unwrap();
        let device_key = NoiseKeypair::generate().unwrap();
        let mut host = SecureChannel::new();
        let mut device = SecureChannel::new();
        host.begin(Role::Initiator, &host_key).unwrap();
        device.begin(Role::Responder, &device_key).unwrap();
        let m1 = host.write_handshake_message().unwrap();
        device.read_handshake_message(&m1).unwrap();
        let m2 = device.write_handshake_message().unwrap();
        host.read_handshake_message(&m2).unwrap();
        let m3 = host.write_handshake_message().unwrap();
        device.read_handshake_message(&m3).unwrap();

        assert_eq!(&host.remote_static().unwrap()[..], &device_key.public[..]);
        assert_eq!(&device.remote_static().unwrap()[..], &host_key.public[..]);
    }

    #[test]
    fn test_tampered_message_fails_channel() {
        let mut host = SecureChannel::new();
        let mut device = SecureChannel::new();
        host.begin(Role::Initiator, &NoiseKeypair::generate().unwrap())
            .unwrap();
        device
            .begin(Role::Responder, &NoiseKeypair::generate().unwrap())
            .unwrap();
        let m1 = host.write_handshake_message().unwrap();
        device.read_handshake_message(&m1).unwrap();
        let mut m2 = device.write_handshake_message().unwrap();
        let last = m2.len() - 1;
        m2[last] ^= 0x01;

        assert!(matches!(
            host.read_handshake_message(&m2),
            Err(ChannelError::Noise(_))
        ));
        assert_eq!(host.phase(), ChannelPhase::Failed);
        assert!(matches!(
            host.write_handshake_message(),
            Err(ChannelError::NotHandshaking(ChannelPhase::Failed))
        ));
    }

    #[test]
    fn test_encrypt_requires_established() {
        let mut channel = SecureChannel::new();
        assert!(matches!(
            channel.encrypt(b"hello"),
            Err(ChannelError::NotEstablished(ChannelPhase::Idle))
        ));
    }

    #[test]
    fn test_decrypt_rejects_forged_ciphertext() {
        let (mut host, mut device) = handshake_pair();
        let mut ct = host.encrypt(b"hello").unwrap();
        ct[0] ^= 0xFF;
        assert!(matches!(device.decrypt(&ct), Err(ChannelError::Noise(_))));
        assert_eq!(device.phase(), ChannelPhase::Established);
    }

    #[test]
    fn test_reset() {
        let (mut host, _) = handshake_pair();
        host.reset();
        assert_eq!(host.phase(), ChannelPhase::Idle);
        assert!(host.handshake_hash().is_none());
    }
}
