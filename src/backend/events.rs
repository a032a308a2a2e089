//! Inbound side of the driver: the sink drivers report indications to

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::core::{
    message::{DriverEvent, Inbound},
    types::WifiNetwork,
};

/// Handle the driver uses to report status and scan indications
///
/// Calls only copy the payload into an owned event and enqueue it. They never
/// block, never call back into the driver and may be issued from any thread.
#[derive(Debug, Clone)]
pub struct DriverEvents {
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl DriverEvents {
    pub(crate) fn new(inbound: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { inbound }
    }

    /// Report a status change
    pub fn on_status(&self, event: DriverEvent) {
        trace!(?event, "driver status");
        if self.inbound.send(Inbound::Event(event)).is_err() {
            warn!("interface stopped, dropping driver event");
        }
    }

    /// Report one scan indication
    pub fn on_scan_result(&self, network: Option<&WifiNetwork>, is_last: bool) {
        self.on_status(DriverEvent::ScanResult {
            network: network.cloned(),
            is_last,
        });
    }
}
