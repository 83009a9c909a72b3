//! Request/response envelopes carried over the encrypted channel.
//!
//! Declared with `prost` derives instead of a `build.rs` step. The oneof
//! tags are this driver's own compact numbering for the commands it speaks;
//! they are not taken from any firmware's `.proto` files.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct RandomNumberRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct RandomNumberResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub number: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetDeviceNameRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfoRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfoResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub initialized: bool,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(bool, tag = "4")]
    pub mnemonic_passphrase_enabled: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct RebootRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct SetMnemonicPassphraseEnabledRequest {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct CheckSdCardRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct CheckSdCardResponse {
    #[prost(bool, tag = "1")]
    pub inserted: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct Success {}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(oneof = "request::Request", tags = "1, 2, 3, 4, 5, 6")]
    pub request: Option<request::Request>,
}

pub mod request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        RandomNumber(super::RandomNumberRequest),
        #[prost(message, tag = "2")]
        DeviceName(super::SetDeviceNameRequest),
        #[prost(message, tag = "3")]
        DeviceInfo(super::DeviceInfoRequest),
        #[prost(message, tag = "4")]
        Reboot(super::RebootRequest),
        #[prost(message, tag = "5")]
        SetMnemonicPassphraseEnabled(super::SetMnemonicPassphraseEnabledRequest),
        #[prost(message, tag = "6")]
        CheckSdCard(super::CheckSdCardRequest),
    }

    impl Request {
        pub fn variant_name(&self) -> &'static str {
            match self {
                Request::RandomNumber(_) => "random_number",
                Request::DeviceName(_) => "device_name",
                Request::DeviceInfo(_) => "device_info",
                Request::Reboot(_) => "reboot",
                Request::SetMnemonicPassphraseEnabled(_) => "set_mnemonic_passphrase_enabled",
                Request::CheckSdCard(_) => "check_sdcard",
            }
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(oneof = "response::Response", tags = "1, 2, 3, 4, 5")]
    pub response: Option<response::Response>,
}

pub mod response {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        Success(super::Success),
        #[prost(message, tag = "2")]
        Error(super::ErrorResponse),
        #[prost(message, tag = "3")]
        RandomNumber(super::RandomNumberResponse),
        #[prost(message, tag = "4")]
        DeviceInfo(super::DeviceInfoResponse),
        #[prost(message, tag = "5")]
        CheckSdCard(super::CheckSdCardResponse),
    }

    impl Response {
        pub fn variant_name(&self) -> &'static str {
            match self {
                Response::Success(_) => "success",
                Response::Error(_) => "error",
                Response::RandomNumber(_) => "random_number",
                Response::DeviceInfo(_) => "device_info",
                Response::CheckSdCard(_) => "check_sdcard",
            }
        }
    }
}

impl From<request::Request> for Request {
    fn from(request: request::Request) -> Self {
        Self {
            request: Some(request),
        }
    }
}

impl From<response::Response> for Response {
    fn from(response: response::Response) -> Self {
        Self {
            response: Some(response),
        }
    }
}
