//! Messages exchanged between the facade, the driver and the dispatcher

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tracing::warn;

use crate::core::{
    error::{ServiceError, ServiceResult},
    types::{
        AccessPointConfig, ConfigKey, DisconnectReason, MacAddress, RequestId, ScanReport,
        StationConfig, WifiNetwork,
    },
};

/// Work submitted by a facade caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect(StationConfig),
    Disconnect,
    /// `capacity == 0` selects counts-only mode
    Scan { capacity: usize },
    ApStart(AccessPointConfig),
    ApStop,
    Stop,
    GetConfig(ConfigKey),
    SetConfig { key: ConfigKey, value: u32 },
}

impl Request {
    /// Short name used in log output
    pub fn name(&self) -> &'static str {
        match self {
            Request::Connect(_) => "connect",
            Request::Disconnect => "disconnect",
            Request::Scan { .. } => "scan",
            Request::ApStart(_) => "ap_start",
            Request::ApStop => "ap_stop",
            Request::Stop => "stop",
            Request::GetConfig(_) => "get_config",
            Request::SetConfig { .. } => "set_config",
        }
    }
}

/// Successful completion of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Done,
    Scan(ScanReport),
    Config(u32),
}

/// Indications delivered by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Started { mac: MacAddress },
    Stopped,
    Error,
    Connecting,
    Connected { bssid: MacAddress, channel: u8 },
    ConnectionFailure { reason: DisconnectReason },
    Disconnected,
    ApUp,
    ApDown,
    ApStationAdded { mac: MacAddress },
    ApStationRemoved { mac: MacAddress },
    /// `network` is `None` for a bare end-of-scan marker
    ScanResult {
        network: Option<WifiNetwork>,
        is_last: bool,
    },
}

/// Everything that travels over the inbound queue
#[derive(Debug)]
pub(crate) enum Inbound {
    Request(Envelope),
    Event(DriverEvent),
}

/// A request together with the means to answer it
#[derive(Debug)]
pub(crate) struct Envelope {
    pub request: Request,
    pub responder: Responder,
}

/// One-shot reply path back to the blocked caller
///
/// Holds the pool permit of its message; answering the request frees it.
#[derive(Debug)]
pub(crate) struct Responder {
    id: RequestId,
    reply: oneshot::Sender<ServiceResult<Response>>,
    _permit: OwnedSemaphorePermit,
}

impl Responder {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn respond(self, result: ServiceResult<Response>) {
        let Responder { id, reply, .. } = self;
        if reply.send(result).is_err() {
            warn!(%id, "caller dropped before response was delivered");
        }
    }

    pub fn done(self) {
        self.respond(Ok(Response::Done));
    }

    pub fn fail(self, error: ServiceError) {
        self.respond(Err(error));
    }
}

/// Bounded allocator for request envelopes
#[derive(Debug, Clone)]
pub struct MessagePool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl MessagePool {
    /// Capacities beyond what a semaphore can hold are clamped
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wrap `request` into an envelope, failing if the pool is exhausted
    pub(crate) fn envelope(
        &self,
        request: Request,
    ) -> ServiceResult<(Envelope, oneshot::Receiver<ServiceResult<Response>>)> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| ServiceError::ResourceExhausted)?;
        let (reply, receiver) = oneshot::channel();
        let envelope = Envelope {
            request,
            responder: Responder {
                id: RequestId::new(),
                reply,
                _permit: permit,
            },
        };
        Ok((envelope, receiver))
    }
}
