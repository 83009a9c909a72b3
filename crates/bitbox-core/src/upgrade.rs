//! Reboot into the bootloader when the firmware is too old.

use tracing::{info, instrument};

use crate::channel::SecureChannel;
use crate::dispatch::{Framing, send_without_reply};
use crate::error::Result;
use crate::events::DeviceObserver;
use crate::protocol::messages::{RebootRequest, request};
use crate::transport::Transport;

/// Sends the reboot request that hands the device over to its bootloader.
///
/// The device does not answer; it drops off the bus instead. The call
/// succeeds once the frame is out. A transport failure is returned as is so
/// the caller can retry; nothing is retried here.
pub struct UpgradeOrchestrator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    framing: Framing,
}

impl<'a, T: Transport + ?Sized> UpgradeOrchestrator<'a, T> {
    pub fn new(transport: &'a T, framing: Framing) -> Self {
        Self { transport, framing }
    }

    #[instrument(level = "info", skip_all, fields(framing = ?self.framing))]
    pub fn reboot_into_bootloader(
        &self,
        channel: &mut SecureChannel,
        observer: &dyn DeviceObserver,
    ) -> Result<()> {
        send_without_reply(
            self.transport,
            channel,
            self.framing,
            observer,
            request::Request::Reboot(RebootRequest {}),
        )?;
        info!("Reboot into bootloader requested");
        Ok(())
    }
}
