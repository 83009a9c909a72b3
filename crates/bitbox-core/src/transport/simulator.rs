//! Simulated device for end-to-end tests.
//!
//! Plays the device side of the protocol behind the [`Transport`] trait:
//! plaintext bootstrap opcodes, the Noise XX responder, and encrypted
//! protobuf dispatch with version-dependent framing.

use std::sync::Mutex;

use prost::Message;

use super::mock::FrameKind;
use super::traits::{Transport, TransportError};
use crate::channel::{NoiseKeypair, Role, SecureChannel};
use crate::protocol::attestation::AttestationReport;
use crate::protocol::constants::{
    ATTESTATION_SINCE, NOISE_OPCODE_SINCE, OP_ATTESTATION, OP_I_CAN_HAS_HANDSHAKE,
    OP_I_CAN_HAS_PAIRIN_VERIFICASHUN, OP_NOISE_MSG, OP_STATUS_FAILURE,
    OP_STATUS_FAILURE_UNINITIALIZED, OP_STATUS_SUCCESS, OP_UNLOCK,
};
use crate::protocol::messages::{
    CheckSdCardResponse, DeviceInfoResponse, RandomNumberResponse, Request, Response, Success,
    request, response,
};
use crate::version::SemVer;

/// Custom request handler. Returning `None` falls back to the built-in one.
pub type RequestHandler =
    Box<dyn FnMut(&request::Request) -> Option<response::Response> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Bootstrap,
    AwaitMessage1,
    AwaitMessage3,
    Established,
    Rebooted,
}

struct State {
    phase: Phase,
    channel: SecureChannel,
    name: String,
    passphrase_enabled: bool,
    handler: Option<RequestHandler>,
    frames: Vec<(FrameKind, Vec<u8>)>,
    requests: Vec<request::Request>,
    failure: Option<TransportError>,
    send_failure: Option<TransportError>,
    closed: bool,
    close_count: usize,
}

/// In-process device speaking the real protocol.
pub struct SimulatedDevice {
    version: SemVer,
    keypair: NoiseKeypair,
    require_pairing: bool,
    confirm_pairing: bool,
    initialized: bool,
    state: Mutex<State>,
}

impl SimulatedDevice {
    /// A device running firmware `version` that accepts pairing and is not
    /// initialized.
    ///
    /// # Panics
    ///
    /// Panics if no X25519 keypair can be generated.
    pub fn new(version: SemVer) -> Self {
        let keypair = NoiseKeypair::generate().expect("X25519 keypair generation");
        Self {
            version,
            keypair,
            require_pairing: false,
            confirm_pairing: true,
            initialized: false,
            state: Mutex::new(State {
                phase: Phase::Bootstrap,
                channel: SecureChannel::new(),
                name: "My BitBox".into(),
                passphrase_enabled: false,
                handler: None,
                frames: Vec::new(),
                requests: Vec::new(),
                failure: None,
                send_failure: None,
                closed: false,
                close_count: 0,
            }),
        }
    }

    /// Ask for pairing-code verification after the handshake.
    pub fn require_pairing(mut self, require: bool) -> Self {
        self.require_pairing = require;
        self
    }

    /// Whether the user "confirms" the pairing code on the device.
    pub fn confirm_pairing(mut self, confirm: bool) -> Self {
        self.confirm_pairing = confirm;
        self
    }

    pub fn initialized(mut self, initialized: bool) -> Self {
        self.initialized = initialized;
        self
    }

    /// Install a handler consulted before the built-in one.
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: FnMut(&request::Request) -> Option<response::Response> + Send + 'static,
    {
        self.set_handler(handler);
        self
    }

    /// Replace the custom handler on a running device.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: FnMut(&request::Request) -> Option<response::Response> + Send + 'static,
    {
        self.state.lock().unwrap().handler = Some(Box::new(handler));
    }

    /// Make every following `query`/`send_frame` fail with `err`
    /// (`None` restores normal operation). Failed calls are not recorded.
    pub fn fail_with(&self, err: Option<TransportError>) {
        self.state.lock().unwrap().failure = err;
    }

    /// Make only the next `send_frame` fail with `err`.
    pub fn fail_next_send(&self, err: TransportError) {
        self.state.lock().unwrap().send_failure = Some(err);
    }

    /// Device static public key.
    pub fn static_pubkey(&self) -> &[u8] {
        &self.keypair.public
    }

    /// Handshake hash on the device side, once established.
    pub fn handshake_hash(&self) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .channel
            .handshake_hash()
            .map(<[u8]>::to_vec)
    }

    /// Every frame the device received, in order.
    pub fn frames(&self) -> Vec<(FrameKind, Vec<u8>)> {
        self.state.lock().unwrap().frames.clone()
    }

    /// Encrypted requests decoded so far, in order.
    pub fn requests(&self) -> Vec<request::Request> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn clear_frames(&self) {
        let mut state = self.state.lock().unwrap();
        state.frames.clear();
        state.requests.clear();
    }

    pub fn device_name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    pub fn is_rebooted(&self) -> bool {
        self.state.lock().unwrap().phase == Phase::Rebooted
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    fn check_usable(&self, state: &State) -> Result<(), TransportError> {
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        if state.closed || state.phase == Phase::Rebooted {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    fn framing_prefixed(&self) -> bool {
        self.version.at_least(NOISE_OPCODE_SINCE)
    }

    fn handle_query(&self, state: &mut State, msg: &[u8]) -> Result<Vec<u8>, TransportError> {
        match state.phase {
            Phase::AwaitMessage1 => {
                state.channel.read_handshake_message(msg).map_err(frame_err)?;
                let reply = state.channel.write_handshake_message().map_err(frame_err)?;
                state.phase = Phase::AwaitMessage3;
                return Ok(reply);
            }
            Phase::AwaitMessage3 => {
                state.channel.read_handshake_message(msg).map_err(frame_err)?;
                state.phase = Phase::Established;
                let status = if self.require_pairing {
                    OP_STATUS_FAILURE
                } else {
                    OP_STATUS_SUCCESS
                };
                return Ok(vec![status]);
            }
            Phase::Bootstrap | Phase::Established | Phase::Rebooted => {}
        }

        match msg {
            [OP_I_CAN_HAS_HANDSHAKE] => {
                state
                    .channel
                    .begin(Role::Responder, &self.keypair)
                    .map_err(frame_err)?;
                state.phase = Phase::AwaitMessage1;
                Ok(vec![OP_STATUS_SUCCESS])
            }
            [OP_I_CAN_HAS_PAIRIN_VERIFICASHUN] if state.phase == Phase::Established => {
                Ok(vec![if self.confirm_pairing {
                    OP_STATUS_SUCCESS
                } else {
                    OP_STATUS_FAILURE
                }])
            }
            // Bare ciphertext could start with these bytes, so after the
            // handshake they are only recognized with prefixed framing.
            [OP_ATTESTATION, challenge @ ..]
                if state.phase == Phase::Bootstrap || self.framing_prefixed() =>
            {
                if !self.version.at_least(ATTESTATION_SINCE) || challenge.len() != 32 {
                    return Ok(vec![OP_STATUS_FAILURE]);
                }
                let mut reply = vec![0u8; AttestationReport::SIZE];
                reply[0] = OP_STATUS_SUCCESS;
                reply[1..33].fill(0x11);
                Ok(reply)
            }
            [OP_UNLOCK] if state.phase == Phase::Bootstrap || self.framing_prefixed() => {
                Ok(vec![if self.initialized {
                    OP_STATUS_SUCCESS
                } else {
                    OP_STATUS_FAILURE_UNINITIALIZED
                }])
            }
            _ if state.phase == Phase::Established => {
                let request = self.decrypt_request(state, msg)?;
                let response = self.respond(state, &request);
                let ciphertext = state
                    .channel
                    .encrypt(&Response::from(response).encode_to_vec())
                    .map_err(frame_err)?;
                Ok(self.wrap(ciphertext))
            }
            _ => Err(TransportError::Frame(format!(
                "unexpected frame of {} bytes before handshake",
                msg.len()
            ))),
        }
    }

    fn decrypt_request(
        &self,
        state: &mut State,
        msg: &[u8],
    ) -> Result<request::Request, TransportError> {
        let ciphertext = if self.framing_prefixed() {
            match msg.split_first() {
                Some((&OP_NOISE_MSG, rest)) => rest,
                _ => return Err(TransportError::Frame("missing noise opcode".into())),
            }
        } else {
            msg
        };
        let plaintext = state.channel.decrypt(ciphertext).map_err(frame_err)?;
        let request = Request::decode(plaintext.as_slice())
            .map_err(|e| TransportError::Frame(e.to_string()))?
            .request
            .ok_or_else(|| TransportError::Frame("empty request".into()))?;
        state.requests.push(request.clone());
        Ok(request)
    }

    fn wrap(&self, ciphertext: Vec<u8>) -> Vec<u8> {
        if self.framing_prefixed() {
            let mut frame = vec![OP_NOISE_MSG];
            frame.extend_from_slice(&ciphertext);
            frame
        } else {
            ciphertext
        }
    }

    fn respond(&self, state: &mut State, request: &request::Request) -> response::Response {
        if let Some(handler) = state.handler.as_mut()
            && let Some(response) = handler(request)
        {
            return response;
        }

        match request {
            request::Request::RandomNumber(_) => {
                response::Response::RandomNumber(RandomNumberResponse {
                    number: rand::random::<[u8; 32]>().to_vec(),
                })
            }
            request::Request::DeviceName(r) => {
                state.name = r.name.clone();
                response::Response::Success(Success {})
            }
            request::Request::DeviceInfo(_) => response::Response::DeviceInfo(DeviceInfoResponse {
                name: state.name.clone(),
                initialized: self.initialized,
                version: self.version.to_string(),
                mnemonic_passphrase_enabled: state.passphrase_enabled,
            }),
            request::Request::SetMnemonicPassphraseEnabled(r) => {
                state.passphrase_enabled = r.enabled;
                response::Response::Success(Success {})
            }
            request::Request::CheckSdCard(_) => {
                response::Response::CheckSdCard(CheckSdCardResponse { inserted: false })
            }
            request::Request::Reboot(_) => {
                state.phase = Phase::Rebooted;
                response::Response::Success(Success {})
            }
        }
    }
}

fn frame_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Frame(e.to_string())
}

impl Transport for SimulatedDevice {
    fn send_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        self.check_usable(&state)?;
        if let Some(err) = state.send_failure.take() {
            return Err(err);
        }
        state.frames.push((FrameKind::SendOnly, data.to_vec()));
        if state.phase == Phase::Established {
            let request = self.decrypt_request(&mut state, data)?;
            if matches!(request, request::Request::Reboot(_)) {
                state.phase = Phase::Rebooted;
            }
        }
        Ok(())
    }

    fn query(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock().unwrap();
        self.check_usable(&state)?;
        state.frames.push((FrameKind::Query, data.to_vec()));
        self.handle_query(&mut state, data)
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.close_count += 1;
    }
}
