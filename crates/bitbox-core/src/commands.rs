//! Typed command surface.
//!
//! Each command is one dispatch: build the request variant, validate it
//! locally, and bind the expected response variant.

use tracing::instrument;

use crate::config::ConfigStore;
use crate::device::Device;
use crate::dispatch::mismatch;
use crate::error::{Error, Result};
use crate::events::DeviceObserver;
use crate::protocol::constants::MAX_DEVICE_NAME_LEN;
use crate::protocol::messages::{
    CheckSdCardRequest, DeviceInfoRequest, DeviceInfoResponse, RandomNumberRequest,
    SetDeviceNameRequest, SetMnemonicPassphraseEnabledRequest, request, response,
};
use crate::transport::Transport;

impl<T: Transport, C: ConfigStore, O: DeviceObserver> Device<T, C, O> {
    /// 32 bytes from the device's random number generator.
    #[instrument(skip(self))]
    pub fn random_number(&mut self) -> Result<Vec<u8>> {
        match self.query(request::Request::RandomNumber(RandomNumberRequest {}))? {
            response::Response::RandomNumber(r) => Ok(r.number),
            other => Err(mismatch("random_number", &other)),
        }
    }

    /// Set the name shown on the device. Must be 1 to 64 bytes.
    #[instrument(skip(self))]
    pub fn set_device_name(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("device name must not be empty".into()));
        }
        if name.len() > MAX_DEVICE_NAME_LEN {
            return Err(Error::Validation(format!(
                "device name is {} bytes, maximum is {}",
                name.len(),
                MAX_DEVICE_NAME_LEN
            )));
        }
        match self.query(request::Request::DeviceName(SetDeviceNameRequest {
            name: name.to_string(),
        }))? {
            response::Response::Success(_) => Ok(()),
            other => Err(mismatch("success", &other)),
        }
    }

    #[instrument(skip(self))]
    pub fn device_info(&mut self) -> Result<DeviceInfoResponse> {
        match self.query(request::Request::DeviceInfo(DeviceInfoRequest {}))? {
            response::Response::DeviceInfo(info) => Ok(info),
            other => Err(mismatch("device_info", &other)),
        }
    }

    /// Toggle the optional BIP39 passphrase prompt. The user confirms on
    /// the device.
    #[instrument(skip(self))]
    pub fn set_mnemonic_passphrase_enabled(&mut self, enabled: bool) -> Result<()> {
        match self.query(request::Request::SetMnemonicPassphraseEnabled(
            SetMnemonicPassphraseEnabledRequest { enabled },
        ))? {
            response::Response::Success(_) => Ok(()),
            other => Err(mismatch("success", &other)),
        }
    }

    /// Whether a microSD card is inserted.
    #[instrument(skip(self))]
    pub fn check_sd_card(&mut self) -> Result<bool> {
        match self.query(request::Request::CheckSdCard(CheckSdCardRequest {}))? {
            response::Response::CheckSdCard(r) => Ok(r.inserted),
            other => Err(mismatch("check_sdcard", &other)),
        }
    }
}
