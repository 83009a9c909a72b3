//! nusb-based USB HID transport implementation.

use std::io::{Read, Write};
use std::sync::Mutex;

use nusb::transfer::{In, Interrupt, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError};
use super::u2fhid::{DEFAULT_CID, FrameAssembler, HWW_CMD, REPORT_SIZE, encode_frame};
use crate::product::Product;
use crate::protocol::constants::{
    BITBOX02_HID_INTERFACE, BITBOX02_PRODUCT_ID, BITBOX02_VENDOR_ID,
};
use crate::version::SemVer;

/// Identity read from the USB descriptors before any protocol traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub product: Product,
    pub version: SemVer,
}

/// nusb-based transport speaking U2FHID framing over interrupt endpoints.
pub struct NusbTransport {
    interface: Mutex<Option<Interface>>,
    in_endpoint: u8,
    out_endpoint: u8,
    descriptor: DeviceDescriptor,
}

impl NusbTransport {
    /// Open the first connected BitBox02.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == BITBOX02_VENDOR_ID && d.product_id() == BITBOX02_PRODUCT_ID
            })
            .ok_or(TransportError::DeviceNotFound {
                vid: BITBOX02_VENDOR_ID,
                pid: BITBOX02_PRODUCT_ID,
            })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let descriptor =
            parse_descriptor(device_info.product_string(), device_info.serial_number())?;

        info!(
            product = %descriptor.product,
            version = %descriptor.version,
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device
            .detach_and_claim_interface(BITBOX02_HID_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: BITBOX02_HID_INTERFACE,
                message: e.to_string(),
            })?;

        // Find INTERRUPT endpoints
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == BITBOX02_HID_INTERFACE {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Interrupt {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "Out".into(),
            });
        }

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface: Mutex::new(Some(interface)),
            in_endpoint,
            out_endpoint,
            descriptor,
        })
    }

    /// Product and firmware version advertised by the device.
    pub fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    fn interface(&self) -> Result<Interface, TransportError> {
        self.interface
            .lock()
            .map_err(|_| TransportError::Disconnected)?
            .clone()
            .ok_or(TransportError::Disconnected)
    }

    fn write_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        let reports = encode_frame(DEFAULT_CID, HWW_CMD, data)
            .map_err(|e| TransportError::Frame(e.to_string()))?;

        let ep = self
            .interface()?
            .endpoint::<Interrupt, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        let mut writer = ep.writer(REPORT_SIZE);

        for report in &reports {
            writer
                .write_all(report)
                .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), reports = reports.len(), "Write complete");
        Ok(())
    }

    fn read_frame(&self) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface()?
            .endpoint::<Interrupt, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        let mut reader = ep.reader(REPORT_SIZE);

        let mut assembler = FrameAssembler::new(DEFAULT_CID, HWW_CMD);
        let mut report = [0u8; REPORT_SIZE];
        loop {
            reader
                .read_exact(&mut report)
                .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
            if let Some(frame) = assembler
                .push(&report)
                .map_err(|e| TransportError::Frame(e.to_string()))?
            {
                debug!(bytes_read = frame.len(), "Read complete");
                return Ok(frame);
            }
        }
    }
}

impl Transport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn send_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        self.write_frame(data)
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn query(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.write_frame(data)?;
        self.read_frame()
    }

    fn close(&self) {
        if let Ok(mut guard) = self.interface.lock()
            && guard.take().is_some()
        {
            info!("Device closed");
        }
    }
}

/// Resolve product and version from the USB product string and serial
/// number (the firmware reports its version there, e.g. `v4.2.1`).
pub fn parse_descriptor(
    product_string: Option<&str>,
    serial_number: Option<&str>,
) -> Result<DeviceDescriptor, TransportError> {
    let product_string = product_string.unwrap_or_default();
    let product = Product::from_usb_product_string(product_string)
        .ok_or_else(|| TransportError::OpenFailed(format!("unknown product {product_string:?}")))?;
    let version = serial_number
        .unwrap_or_default()
        .parse::<SemVer>()
        .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
    Ok(DeviceDescriptor { product, version })
}
