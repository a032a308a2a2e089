//! Scan coordination
//!
//! A scan either fills a caller-sized list of unique networks or, when the
//! caller asks for no entries, only counts networks with the help of a small
//! BSSID cache that is reset whenever the reported channel changes.

use tracing::{debug, warn};

use crate::{
    backend::{DataPath, DriverControl},
    core::{
        dispatcher::{ControllerState, Dispatcher},
        error::ServiceError,
        message::{Responder, Response},
        timeout::Deadline,
        types::{MacAddress, ScanReport, WifiNetwork},
    },
};

#[derive(Debug)]
enum ScanMode {
    /// Collect up to `capacity` unique networks
    Buffer {
        capacity: usize,
        networks: Vec<WifiNetwork>,
    },
    /// Only count; `seen` remembers BSSIDs on the current channel
    Cache {
        capacity: usize,
        channel: Option<u8>,
        seen: Vec<MacAddress>,
    },
}

/// An in-flight scan
#[derive(Debug)]
pub(crate) struct ScanSession {
    mode: ScanMode,
    found: usize,
    deadline: Deadline,
    responder: Option<Responder>,
}

impl ScanSession {
    fn new(capacity: usize, cache_capacity: usize) -> Self {
        let mode = if capacity > 0 {
            ScanMode::Buffer {
                capacity,
                networks: Vec::new(),
            }
        } else {
            ScanMode::Cache {
                capacity: cache_capacity,
                channel: None,
                seen: Vec::new(),
            }
        };
        Self {
            mode,
            found: 0,
            deadline: Deadline::default(),
            responder: None,
        }
    }

    /// Account for one scan indication
    fn record(&mut self, network: &WifiNetwork) {
        match &mut self.mode {
            ScanMode::Buffer { capacity, networks } => {
                if networks.len() >= *capacity {
                    return;
                }
                if networks.iter().any(|n| n.bssid == network.bssid) {
                    return;
                }
                networks.push(network.clone());
                self.found += 1;
            }
            ScanMode::Cache {
                capacity,
                channel,
                seen,
            } => {
                if *channel != Some(network.channel) {
                    *channel = Some(network.channel);
                    seen.clear();
                }
                if seen.contains(&network.bssid) {
                    return;
                }
                if seen.len() < *capacity {
                    seen.push(network.bssid);
                }
                self.found += 1;
            }
        }
    }

    fn report(self) -> ScanReport {
        match self.mode {
            ScanMode::Buffer { networks, .. } => ScanReport {
                count: networks.len(),
                networks,
            },
            ScanMode::Cache { .. } => ScanReport {
                count: self.found,
                networks: Vec::new(),
            },
        }
    }

    /// Networks accounted for so far
    pub fn found(&self) -> usize {
        self.found
    }
}

impl<D: DriverControl, L: DataPath> Dispatcher<D, L> {
    pub(crate) async fn scan_start(
        &mut self,
        state: &mut ControllerState,
        capacity: usize,
        responder: Responder,
    ) {
        if state.scan.is_some() {
            responder.fail(ServiceError::DeviceBusy);
            return;
        }

        if let Err(e) = self.driver.lock().await.scan().await {
            warn!(%e, "driver rejected scan");
            responder.fail(e.into());
            return;
        }

        let mut session = ScanSession::new(capacity, self.settings.scan_cache_capacity);
        session.deadline.arm(self.settings.scan_timeout());
        session.responder = Some(responder);
        debug!(capacity, "scan started");
        state.scan = Some(session);
    }

    pub(crate) fn scan_result(
        &mut self,
        state: &mut ControllerState,
        network: Option<WifiNetwork>,
        is_last: bool,
    ) {
        let Some(session) = state.scan.as_mut() else {
            debug!("scan result without an active scan, ignoring");
            return;
        };

        if let Some(network) = network {
            session.record(&network);
        }

        if !is_last {
            return;
        }
        if let Some(mut session) = state.scan.take() {
            let responder = session.responder.take();
            let report = session.report();
            debug!(count = report.count, "scan finished");
            if let Some(responder) = responder {
                responder.respond(Ok(Response::Scan(report)));
            }
        }
    }

    pub(crate) fn scan_check_deadline(&mut self, state: &mut ControllerState) {
        let expired = state
            .scan
            .as_mut()
            .is_some_and(|session| session.deadline.take_expired());
        if !expired {
            return;
        }
        if let Some(mut session) = state.scan.take() {
            warn!(found = session.found(), "scan never completed");
            if let Some(responder) = session.responder.take() {
                responder.fail(ServiceError::Timeout);
            }
        }
    }

    /// Abort an active scan, answering its caller with `error`
    pub(crate) fn scan_abort(&mut self, state: &mut ControllerState, error: ServiceError) {
        if let Some(mut session) = state.scan.take() {
            if let Some(responder) = session.responder.take() {
                responder.fail(error);
            }
        }
    }
}
