//! Worker loop serializing requests and driver events
//!
//! The dispatcher is the only writer of [`ControllerState`]. It drains one
//! inbound queue carrying both caller requests and driver indications, so
//! every state transition happens in arrival order. Requests that arrive
//! before the driver has started are parked in a cache queue and replayed
//! once it reports `Started`.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tokio::{
    sync::{Mutex, RwLock, mpsc},
    time,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{DataPath, DriverControl, DriverOption},
    config::Settings,
    core::{
        ap::ApMachine,
        error::ServiceError,
        message::{DriverEvent, Envelope, Inbound, Request, Responder, Response},
        scanner::ScanSession,
        sta::StaMachine,
        types::{ApState, ConfigKey, InterfaceState, InterfaceStatus, MacAddress, StaState},
    },
};

/// Values reachable through `get_config`/`set_config`
#[derive(Debug, Clone)]
pub(crate) struct ConfigStore {
    values: HashMap<ConfigKey, u32>,
}

impl ConfigStore {
    fn from_settings(settings: &Settings) -> Self {
        let connect_timeout = u32::try_from(settings.connect_timeout_ms).unwrap_or(u32::MAX);
        let values = HashMap::from([
            (ConfigKey::ConnectTimeoutMs, connect_timeout),
            (
                ConfigKey::ApBeaconInterval,
                u32::from(settings.ap_beacon_interval),
            ),
            (ConfigKey::ApMaxStations, settings.ap_max_stations),
            (ConfigKey::PowerSave, 0),
            (ConfigKey::ListenInterval, 1),
            (ConfigKey::TxPower, 20),
        ]);
        Self { values }
    }

    pub fn get(&self, key: ConfigKey) -> u32 {
        self.values.get(&key).copied().unwrap_or_default()
    }

    fn set(&mut self, key: ConfigKey, value: u32) {
        self.values.insert(key, value);
    }
}

/// Driver option behind a config key, if the driver owns it
fn driver_option(key: ConfigKey) -> Option<DriverOption> {
    match key {
        ConfigKey::PowerSave => Some(DriverOption::PowerSave),
        ConfigKey::ListenInterval => Some(DriverOption::ListenInterval),
        ConfigKey::TxPower => Some(DriverOption::TxPower),
        ConfigKey::ConnectTimeoutMs | ConfigKey::ApBeaconInterval | ConfigKey::ApMaxStations => {
            None
        }
    }
}

/// State shared between the dispatcher (writer) and the facade (readers)
#[derive(Debug)]
pub(crate) struct ControllerState {
    pub interface: InterfaceState,
    pub sta: StaMachine,
    pub ap: ApMachine,
    pub scan: Option<ScanSession>,
    pub config: ConfigStore,
    pub mac: Option<MacAddress>,
}

impl ControllerState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            interface: InterfaceState::NotInitialized,
            sta: StaMachine::default(),
            ap: ApMachine::default(),
            scan: None,
            config: ConfigStore::from_settings(settings),
            mac: None,
        }
    }

    pub fn status(&self) -> InterfaceStatus {
        InterfaceStatus {
            interface: self.interface,
            sta: self.sta.state(),
            ap: self.ap.state(),
            mac_address: self.mac,
            bssid: self.sta.bssid(),
            channel: self.sta.channel(),
            ap_stations: self.ap.stations(),
        }
    }

    /// Only one role may be active at a time
    fn roles_exclusive(&self) -> bool {
        self.sta.state() == StaState::Idle || self.ap.state() == ApState::Idle
    }
}

pub(crate) struct Dispatcher<D, L> {
    pub(crate) driver: Arc<Mutex<D>>,
    pub(crate) data_path: L,
    pub(crate) settings: Settings,
    shared: Arc<RwLock<ControllerState>>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    /// Requests received before the driver reported `Started`
    cache: VecDeque<Envelope>,
    /// Caller of an in-progress `Stop`
    stopping: Option<Responder>,
}

impl<D: DriverControl, L: DataPath> Dispatcher<D, L> {
    pub fn new(
        driver: Arc<Mutex<D>>,
        data_path: L,
        settings: Settings,
        shared: Arc<RwLock<ControllerState>>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self {
            driver,
            data_path,
            settings,
            shared,
            inbound,
            cache: VecDeque::new(),
            stopping: None,
        }
    }

    /// Run until the interface is stopped or becomes unusable
    pub async fn run(mut self) {
        self.boot().await;

        let poll_interval = self.settings.poll_interval();
        loop {
            let next = time::timeout(poll_interval, self.inbound.recv()).await;

            let shared = self.shared.clone();
            let mut state = shared.write().await;
            match next {
                Ok(Some(Inbound::Request(envelope))) => self.on_request(&mut state, envelope).await,
                Ok(Some(Inbound::Event(event))) => self.on_event(&mut state, event).await,
                Ok(None) => {
                    info!("all producers gone, dispatcher exiting");
                    break;
                }
                // Idle tick, only deadlines to look at
                Err(_) => {}
            }

            self.check_deadlines(&mut state).await;

            if !state.roles_exclusive() {
                error!(
                    sta = ?state.sta.state(),
                    ap = ?state.ap.state(),
                    "station and access point active at the same time"
                );
                self.fail_closed(
                    &mut state,
                    ServiceError::DeviceError("role conflict".into()),
                )
                .await;
            }

            if state.interface == InterfaceState::Invalid {
                break;
            }
        }

        for envelope in self.cache.drain(..) {
            envelope.responder.fail(ServiceError::InterfaceDown);
        }
        info!("dispatcher stopped");
    }

    async fn boot(&mut self) {
        let mut state = self.shared.write().await;
        match self.driver.lock().await.start().await {
            Ok(()) => {
                state.interface = InterfaceState::WaitingForStart;
                info!("waiting for driver to start");
            }
            Err(e) => {
                error!(%e, "driver refused to start");
                state.interface = InterfaceState::Invalid;
            }
        }
    }

    async fn on_request(&mut self, state: &mut ControllerState, envelope: Envelope) {
        debug!(
            id = %envelope.responder.id(),
            request = envelope.request.name(),
            interface = ?state.interface,
            "request"
        );

        match state.interface {
            InterfaceState::Started => {}
            InterfaceState::NotInitialized | InterfaceState::WaitingForStart => {
                self.cache.push_back(envelope);
                return;
            }
            InterfaceState::WaitingForStop | InterfaceState::Invalid => {
                envelope.responder.fail(ServiceError::InterfaceDown);
                return;
            }
        }

        let Envelope { request, responder } = envelope;
        match request {
            Request::Connect(config) => self.sta_connect(state, config, responder).await,
            Request::Disconnect => self.sta_disconnect(state, responder).await,
            Request::Scan { capacity } => self.scan_start(state, capacity, responder).await,
            Request::ApStart(config) => self.ap_start(state, config, responder).await,
            Request::ApStop => self.ap_stop(state, responder).await,
            Request::Stop => self.stop(state, responder).await,
            Request::GetConfig(key) => responder.respond(Ok(Response::Config(state.config.get(key)))),
            Request::SetConfig { key, value } => {
                self.set_config(state, key, value, responder).await
            }
        }
    }

    async fn on_event(&mut self, state: &mut ControllerState, event: DriverEvent) {
        match event {
            DriverEvent::Started { mac } => {
                state.mac = Some(mac);
                if state.ap.state() == ApState::WaitDriverStart {
                    self.ap_driver_started(state);
                } else if state.interface == InterfaceState::WaitingForStart {
                    state.interface = InterfaceState::Started;
                    info!(%mac, cached = self.cache.len(), "interface started");
                    while let Some(envelope) = self.cache.pop_front() {
                        self.on_request(state, envelope).await;
                    }
                } else {
                    debug!(interface = ?state.interface, "ignoring Started");
                }
            }
            DriverEvent::Stopped => {
                if state.ap.state() == ApState::WaitDriverStop {
                    self.ap_driver_stopped(state).await;
                } else if state.interface == InterfaceState::WaitingForStop {
                    state.interface = InterfaceState::Invalid;
                    info!("interface stopped");
                    if let Some(responder) = self.stopping.take() {
                        responder.done();
                    }
                } else {
                    warn!(interface = ?state.interface, "unexpected Stopped");
                }
            }
            DriverEvent::Error => self.driver_error(state).await,
            DriverEvent::Connecting => debug!("driver connecting"),
            DriverEvent::Connected { bssid, channel } => {
                self.sta_connected(state, bssid, channel).await
            }
            DriverEvent::ConnectionFailure { reason } => self.sta_connection_failure(state, reason),
            DriverEvent::Disconnected => self.sta_disconnected(state).await,
            DriverEvent::ApUp => self.ap_up(state).await,
            DriverEvent::ApDown => self.ap_down(state).await,
            DriverEvent::ApStationAdded { mac } => state.ap.station_added(mac),
            DriverEvent::ApStationRemoved { mac } => state.ap.station_removed(mac),
            DriverEvent::ScanResult { network, is_last } => {
                self.scan_result(state, network, is_last)
            }
        }
    }

    async fn check_deadlines(&mut self, state: &mut ControllerState) {
        self.sta_check_deadline(state).await;
        self.ap_check_deadline(state).await;
        self.scan_check_deadline(state);
    }

    async fn stop(&mut self, state: &mut ControllerState, responder: Responder) {
        let busy = state.sta.state() != StaState::Idle
            || state.ap.state() != ApState::Idle
            || state.scan.is_some();
        if busy {
            responder.fail(ServiceError::UnsupportedOperation);
            return;
        }

        match self.driver.lock().await.stop().await {
            Ok(()) => {
                state.interface = InterfaceState::WaitingForStop;
                self.stopping = Some(responder);
                info!("stopping interface");
            }
            Err(e) => {
                warn!(%e, "driver rejected stop");
                responder.fail(e.into());
            }
        }
    }

    async fn set_config(
        &mut self,
        state: &mut ControllerState,
        key: ConfigKey,
        value: u32,
        responder: Responder,
    ) {
        if let Some(option) = driver_option(key) {
            if let Err(e) = self.driver.lock().await.ioctl(option, value).await {
                warn!(%e, ?key, value, "driver rejected option");
                responder.fail(e.into());
                return;
            }
        }
        debug!(?key, value, "config updated");
        state.config.set(key, value);
        responder.done();
    }

    async fn driver_error(&mut self, state: &mut ControllerState) {
        warn!(interface = ?state.interface, "driver reported an error");
        match state.interface {
            InterfaceState::NotInitialized | InterfaceState::WaitingForStart => {
                state.interface = InterfaceState::Invalid;
                for envelope in self.cache.drain(..) {
                    envelope
                        .responder
                        .fail(ServiceError::DeviceError("driver failed to start".into()));
                }
            }
            InterfaceState::WaitingForStop => {
                state.interface = InterfaceState::Invalid;
                if let Some(responder) = self.stopping.take() {
                    responder.fail(ServiceError::DeviceError("driver failed to stop".into()));
                }
            }
            InterfaceState::Started => {
                self.fail_closed(state, ServiceError::DeviceError("driver error".into()))
                    .await;
            }
            InterfaceState::Invalid => {}
        }
    }

    /// Reset every role to idle, answering all waiting callers with `error`
    async fn fail_closed(&mut self, state: &mut ControllerState, error: ServiceError) {
        self.sta_reset(state, error.clone()).await;
        self.ap_reset(state, error.clone()).await;
        self.scan_abort(state, error);
    }
}
