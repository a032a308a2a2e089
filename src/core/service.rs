//! Caller-facing facade of the WiFi interface controller
//!
//! Every operation validates its arguments locally, takes a message from the
//! pool, queues it to the dispatcher and waits for the matching answer. A
//! call returns only once the dispatcher has reached a definite outcome for
//! it. Several tasks may call concurrently; each request carries its own
//! reply channel.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, RwLock, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    backend::{DataPath, DriverControl, DriverEvents},
    config::Settings,
    core::{
        dispatcher::{ControllerState, Dispatcher},
        error::{ServiceError, ServiceResult},
        message::{Inbound, MessagePool, Request, Response},
        types::{
            AccessPointConfig, ConfigKey, EnterpriseCredentials, InterfaceStatus, MAX_SSID_LEN,
            MacAddress, ScanReport, Security, StaState, StationConfig, is_valid_channel,
        },
    },
};

/// Handle to a running controller
pub struct WifiInterface<D: DriverControl> {
    inbound: mpsc::UnboundedSender<Inbound>,
    pool: MessagePool,
    shared: Arc<RwLock<ControllerState>>,
    driver: Arc<Mutex<D>>,
    worker: JoinHandle<()>,
}

impl<D: DriverControl> WifiInterface<D> {
    /// Bind `driver` to a new dispatcher and start the radio
    ///
    /// Must be called from within a tokio runtime. Requests issued before the
    /// driver reports `Started` are held back and served once it does.
    pub fn start<L: DataPath>(mut driver: D, data_path: L, settings: &Settings) -> Self {
        let (inbound, receiver) = mpsc::unbounded_channel();
        driver.bind(DriverEvents::new(inbound.clone()));

        let driver = Arc::new(Mutex::new(driver));
        let shared = Arc::new(RwLock::new(ControllerState::new(settings)));
        let dispatcher = Dispatcher::new(
            driver.clone(),
            data_path,
            settings.clone(),
            shared.clone(),
            receiver,
        );
        let worker = tokio::spawn(dispatcher.run());
        info!(pool = settings.message_pool_capacity, "wifi interface created");

        Self {
            inbound,
            pool: MessagePool::new(settings.message_pool_capacity),
            shared,
            driver,
            worker,
        }
    }

    async fn call(&self, request: Request) -> ServiceResult<Response> {
        let (envelope, reply) = self.pool.envelope(request)?;
        debug!(id = %envelope.responder.id(), request = envelope.request.name(), "queueing");
        self.inbound
            .send(Inbound::Request(envelope))
            .map_err(|_| ServiceError::InterfaceDown)?;
        reply.await.map_err(|_| ServiceError::InterfaceDown)?
    }

    async fn call_done(&self, request: Request) -> ServiceResult<()> {
        match self.call(request).await? {
            Response::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Join a network using open, WEP or PSK security
    ///
    /// `channel == 0` lets the driver pick the channel.
    pub async fn connect(
        &self,
        ssid: &str,
        passphrase: &str,
        security: Security,
        channel: u8,
    ) -> ServiceResult<()> {
        validate_ssid(ssid)?;
        validate_sta_channel(channel)?;
        match security {
            Security::Open => {}
            Security::Wep => validate_wep_key(passphrase)?,
            Security::WpaPsk | Security::Wpa2Psk | Security::WpaWpa2Psk => {
                validate_psk(passphrase)?
            }
            Security::Wpa2Enterprise => {
                return Err(ServiceError::ParameterError(
                    "enterprise networks need credentials".into(),
                ));
            }
        }

        self.call_done(Request::Connect(StationConfig {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
            security,
            channel,
            enterprise: None,
        }))
        .await
    }

    /// Join a WPA2-Enterprise network
    pub async fn connect_enterprise(
        &self,
        ssid: &str,
        credentials: EnterpriseCredentials,
        channel: u8,
    ) -> ServiceResult<()> {
        validate_ssid(ssid)?;
        validate_sta_channel(channel)?;
        if credentials.cert_handle == 0 {
            return Err(ServiceError::ParameterError(
                "certificate handle required".into(),
            ));
        }
        if credentials.username.is_empty() {
            return Err(ServiceError::ParameterError("username required".into()));
        }

        self.call_done(Request::Connect(StationConfig {
            ssid: ssid.to_string(),
            passphrase: String::new(),
            security: Security::Wpa2Enterprise,
            channel,
            enterprise: Some(credentials),
        }))
        .await
    }

    /// Leave the current network, or abort a connect in progress
    pub async fn disconnect(&self) -> ServiceResult<()> {
        self.call_done(Request::Disconnect).await
    }

    /// Scan for networks
    ///
    /// With `capacity > 0` up to `capacity` unique networks are returned.
    /// With `capacity == 0` only the number of networks seen is reported.
    pub async fn scan(&self, capacity: usize) -> ServiceResult<ScanReport> {
        match self.call(Request::Scan { capacity }).await? {
            Response::Scan(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    /// Host a network
    ///
    /// Beacon interval and station limit come from [`ConfigKey::ApBeaconInterval`]
    /// and [`ConfigKey::ApMaxStations`].
    pub async fn ap_start(
        &self,
        ssid: &str,
        passphrase: &str,
        security: Security,
        channel: u8,
    ) -> ServiceResult<()> {
        validate_ssid(ssid)?;
        if !is_valid_channel(channel) {
            return Err(ServiceError::ParameterError(format!(
                "invalid access point channel {channel}"
            )));
        }
        match security {
            Security::Open => {}
            s if s.is_psk() => validate_psk(passphrase)?,
            _ => return Err(ServiceError::UnsupportedOperation),
        }

        let (beacon_interval, max_stations) = {
            let state = self.shared.read().await;
            (
                state.config.get(ConfigKey::ApBeaconInterval),
                state.config.get(ConfigKey::ApMaxStations),
            )
        };
        let beacon_interval = u16::try_from(beacon_interval).map_err(|_| {
            ServiceError::ParameterError(format!("beacon interval {beacon_interval} out of range"))
        })?;

        self.call_done(Request::ApStart(AccessPointConfig {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
            security,
            channel,
            beacon_interval,
            max_stations,
        }))
        .await
    }

    pub async fn ap_stop(&self) -> ServiceResult<()> {
        self.call_done(Request::ApStop).await
    }

    /// Power down the radio and terminate the dispatcher
    ///
    /// Both roles must be idle.
    pub async fn stop(&self) -> ServiceResult<()> {
        self.call_done(Request::Stop).await
    }

    pub async fn get_config(&self, key: ConfigKey) -> ServiceResult<u32> {
        match self.call(Request::GetConfig(key)).await? {
            Response::Config(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_config(&self, key: ConfigKey, value: u32) -> ServiceResult<()> {
        if !key.accepts(value) {
            return Err(ServiceError::ParameterError(format!(
                "value {value} out of range for {key:?}"
            )));
        }
        self.call_done(Request::SetConfig { key, value }).await
    }

    /// Change the station connect deadline
    pub async fn set_timeout(&self, timeout: Duration) -> ServiceResult<()> {
        let millis = u32::try_from(timeout.as_millis())
            .map_err(|_| ServiceError::ParameterError("timeout too large".into()))?;
        self.set_config(ConfigKey::ConnectTimeoutMs, millis).await
    }

    /// Signal strength of the current association, read straight from the driver
    pub async fn get_rssi(&self) -> ServiceResult<i8> {
        let state = self.shared.read().await;
        if state.sta.state() != StaState::Connected {
            return Err(ServiceError::NoConnection);
        }
        let rssi = self.driver.lock().await.rssi().await?;
        Ok(rssi)
    }

    pub async fn status(&self) -> InterfaceStatus {
        self.shared.read().await.status()
    }

    /// Stations currently associated to the hosted network
    pub async fn ap_station_count(&self) -> u32 {
        self.shared.read().await.ap.stations()
    }

    pub async fn ap_max_stations(&self) -> u32 {
        self.shared.read().await.config.get(ConfigKey::ApMaxStations)
    }

    /// Radio MAC address, known once the driver has started
    pub async fn mac_address(&self) -> Option<MacAddress> {
        self.shared.read().await.mac
    }

    /// Whether the dispatcher is still serving requests
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

impl<D: DriverControl> Drop for WifiInterface<D> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

fn unexpected(response: Response) -> ServiceError {
    ServiceError::DeviceError(format!("unexpected response {response:?}"))
}

fn validate_ssid(ssid: &str) -> ServiceResult<()> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(ServiceError::ParameterError(format!(
            "SSID must be 1 to {MAX_SSID_LEN} bytes"
        )));
    }
    Ok(())
}

fn validate_sta_channel(channel: u8) -> ServiceResult<()> {
    if channel != 0 && !is_valid_channel(channel) {
        return Err(ServiceError::ParameterError(format!(
            "invalid channel {channel}"
        )));
    }
    Ok(())
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// 5 or 13 ASCII characters, or 10 or 26 hex digits
fn validate_wep_key(key: &str) -> ServiceResult<()> {
    let valid = match key.len() {
        5 | 13 => key.is_ascii(),
        10 | 26 => is_hex(key),
        _ => false,
    };
    if !valid {
        return Err(ServiceError::ParameterError("invalid WEP key".into()));
    }
    Ok(())
}

/// 8 to 63 ASCII characters, or a raw 64 hex digit key
fn validate_psk(passphrase: &str) -> ServiceResult<()> {
    let valid = match passphrase.len() {
        8..=63 => passphrase.is_ascii(),
        64 => is_hex(passphrase),
        _ => false,
    };
    if !valid {
        return Err(ServiceError::ParameterError(
            "passphrase must be 8 to 63 characters or 64 hex digits".into(),
        ));
    }
    Ok(())
}
