//! Encrypted request/response round trips.
//!
//! One dispatch is: serialize, encrypt, frame, query, unframe, decrypt,
//! deserialize, check the response variant. Framing depends on the firmware
//! version: from 4.0.0 every encrypted frame carries the `'n'` opcode in
//! both directions, before that the ciphertext is sent bare.

use prost::Message;
use tracing::{instrument, warn};

use crate::channel::SecureChannel;
use crate::error::{Error, Result};
use crate::events::{DeviceEvent, DeviceObserver, PacketDirection};
use crate::protocol::constants::{NOISE_OPCODE_SINCE, OP_NOISE_MSG};
use crate::protocol::messages::{Request, Response, request, response};
use crate::transport::Transport;
use crate::version::SemVer;

/// How encrypted payloads are framed for a given firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Ciphertext only (firmware before 4.0.0).
    Bare,
    /// `'n'` followed by the ciphertext.
    Prefixed,
}

impl Framing {
    pub fn for_version(version: SemVer) -> Self {
        if version.at_least(NOISE_OPCODE_SINCE) {
            Framing::Prefixed
        } else {
            Framing::Bare
        }
    }

    /// Add the opcode prefix if this framing uses one.
    pub fn wrap(&self, ciphertext: Vec<u8>) -> Vec<u8> {
        match self {
            Framing::Bare => ciphertext,
            Framing::Prefixed => {
                let mut frame = Vec::with_capacity(ciphertext.len() + 1);
                frame.push(OP_NOISE_MSG);
                frame.extend_from_slice(&ciphertext);
                frame
            }
        }
    }

    /// Remove the opcode prefix from a reply.
    pub fn strip<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8]> {
        match self {
            Framing::Bare => Ok(frame),
            Framing::Prefixed => match frame.split_first() {
                Some((&OP_NOISE_MSG, rest)) => Ok(rest),
                Some((&op, _)) => Err(Error::MalformedFrame(format!(
                    "expected opcode 0x{:02X}, got 0x{:02X}",
                    OP_NOISE_MSG, op
                ))),
                None => Err(Error::MalformedFrame("empty reply".into())),
            },
        }
    }
}

/// Response variant a well-behaved device answers `request` with.
pub fn expected_response(request: &request::Request) -> &'static str {
    match request {
        request::Request::RandomNumber(_) => "random_number",
        request::Request::DeviceInfo(_) => "device_info",
        request::Request::CheckSdCard(_) => "check_sdcard",
        request::Request::DeviceName(_)
        | request::Request::Reboot(_)
        | request::Request::SetMnemonicPassphraseEnabled(_) => "success",
    }
}

/// Error for a response that does not match what the caller asked for.
pub fn mismatch(expected: &'static str, actual: &response::Response) -> Error {
    Error::ProtocolMismatch {
        expected,
        actual: actual.variant_name(),
    }
}

/// Serialize, encrypt and frame `request`.
pub fn encode_request(
    channel: &mut SecureChannel,
    framing: Framing,
    request: request::Request,
) -> Result<Vec<u8>> {
    let plaintext = Request::from(request).encode_to_vec();
    let ciphertext = channel.encrypt(&plaintext)?;
    Ok(framing.wrap(ciphertext))
}

/// Unframe, decrypt and deserialize a reply frame.
pub fn decode_response(
    channel: &mut SecureChannel,
    framing: Framing,
    frame: &[u8],
) -> Result<Option<response::Response>> {
    let ciphertext = framing.strip(frame)?;
    let plaintext = channel.decrypt(ciphertext)?;
    Ok(Response::decode(plaintext.as_slice())?.response)
}

/// One full round trip.
///
/// The caller must have an established channel. Transport errors are
/// returned unchanged. Any variant other than the one `request` expects,
/// including the device's error response, becomes
/// [`Error::ProtocolMismatch`]; the error's code and message are logged.
#[instrument(level = "debug", skip_all, fields(request = request.variant_name()))]
pub fn dispatch<T: Transport + ?Sized>(
    transport: &T,
    channel: &mut SecureChannel,
    framing: Framing,
    observer: &dyn DeviceObserver,
    request: request::Request,
) -> Result<response::Response> {
    let expected = expected_response(&request);
    let frame = encode_request(channel, framing, request)?;

    observer.on_event(&DeviceEvent::Frame {
        direction: PacketDirection::Tx,
        opcode: frame.first().copied(),
        length: frame.len(),
    });
    let reply = transport.query(&frame)?;
    observer.on_event(&DeviceEvent::Frame {
        direction: PacketDirection::Rx,
        opcode: reply.first().copied(),
        length: reply.len(),
    });

    match decode_response(channel, framing, &reply)? {
        None => Err(Error::ProtocolMismatch {
            expected,
            actual: "none",
        }),
        Some(response::Response::Error(e)) => {
            warn!(code = e.code, message = %e.message, "Device returned error");
            Err(mismatch(expected, &response::Response::Error(e)))
        }
        Some(response) if response.variant_name() != expected => Err(mismatch(expected, &response)),
        Some(response) => Ok(response),
    }
}

/// Encrypt and send `request` without waiting for a reply.
#[instrument(level = "debug", skip_all, fields(request = request.variant_name()))]
pub fn send_without_reply<T: Transport + ?Sized>(
    transport: &T,
    channel: &mut SecureChannel,
    framing: Framing,
    observer: &dyn DeviceObserver,
    request: request::Request,
) -> Result<()> {
    let frame = encode_request(channel, framing, request)?;
    observer.on_event(&DeviceEvent::Frame {
        direction: PacketDirection::Tx,
        opcode: frame.first().copied(),
        length: frame.len(),
    });
    transport.send_frame(&frame)?;
    Ok(())
}
