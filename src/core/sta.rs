//! Station role state machine
//!
//! ```text
//! Idle --connect--> WaitConnect --Connected--> Connected
//!   ^                   |                         |  ^
//!   |               deadline              Disconnected | Connected
//!   |                   v                         v  |
//!   +--Disconnected-- ConnectionFailWaitDisconnect   DisconnectedWaitConnect
//!   |
//!   +--Disconnected-- WaitDisconnect <--disconnect-- (WaitConnect | Connected | DisconnectedWaitConnect)
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    backend::{DataPath, DriverControl},
    core::{
        dispatcher::{ControllerState, Dispatcher},
        error::ServiceError,
        message::Responder,
        timeout::Deadline,
        types::{ApState, ConfigKey, DisconnectReason, MacAddress, Role, StaState, StationConfig},
    },
};

#[derive(Debug)]
pub(crate) struct StaMachine {
    state: StaState,
    bssid: Option<MacAddress>,
    channel: Option<u8>,
    link_up: bool,
    deadline: Deadline,
    /// Most recent failure cause reported while connecting
    last_reason: Option<DisconnectReason>,
    /// Error delivered to the connect caller once the driver confirms teardown
    failure: Option<ServiceError>,
    connect: Option<Responder>,
    disconnect: Option<Responder>,
}

impl Default for StaMachine {
    fn default() -> Self {
        Self {
            state: StaState::Idle,
            bssid: None,
            channel: None,
            link_up: false,
            deadline: Deadline::default(),
            last_reason: None,
            failure: None,
            connect: None,
            disconnect: None,
        }
    }
}

impl StaMachine {
    pub fn state(&self) -> StaState {
        self.state
    }

    pub fn bssid(&self) -> Option<MacAddress> {
        self.bssid
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    fn transition(&mut self, next: StaState) {
        debug!(from = ?self.state, to = ?next, "sta transition");
        self.state = next;
    }

    /// Enter `ConnectionFailWaitDisconnect`, bounded by `grace`
    fn begin_failure(&mut self, failure: ServiceError, grace: Duration) {
        self.failure = Some(failure);
        self.deadline.arm(grace);
        self.transition(StaState::ConnectionFailWaitDisconnect);
    }

    fn clear_association(&mut self) {
        self.bssid = None;
        self.channel = None;
        self.last_reason = None;
        self.deadline.disarm();
    }
}

impl<D: DriverControl, L: DataPath> Dispatcher<D, L> {
    pub(crate) async fn sta_connect(
        &mut self,
        state: &mut ControllerState,
        config: StationConfig,
        responder: Responder,
    ) {
        if state.sta.state != StaState::Idle || state.ap.state() != ApState::Idle {
            debug!(sta = ?state.sta.state, ap = ?state.ap.state(), "connect refused");
            responder.fail(ServiceError::UnsupportedOperation);
            return;
        }

        if let Err(e) = self.driver.lock().await.connect(&config).await {
            warn!(%e, ssid = %config.ssid, "driver rejected connect");
            responder.fail(e.into());
            return;
        }

        let timeout = Duration::from_millis(u64::from(
            state.config.get(ConfigKey::ConnectTimeoutMs),
        ));
        let sta = &mut state.sta;
        sta.clear_association();
        sta.failure = None;
        sta.deadline.arm(timeout);
        sta.connect = Some(responder);
        info!(ssid = %config.ssid, security = ?config.security, ?timeout, "connecting");
        sta.transition(StaState::WaitConnect);
    }

    pub(crate) async fn sta_disconnect(&mut self, state: &mut ControllerState, responder: Responder) {
        match state.sta.state {
            StaState::Idle => responder.fail(ServiceError::NoConnection),
            StaState::WaitConnect | StaState::Connected | StaState::DisconnectedWaitConnect => {
                if let Err(e) = self.driver.lock().await.disconnect().await {
                    warn!(%e, "driver rejected disconnect");
                    responder.fail(e.into());
                    return;
                }
                let sta = &mut state.sta;
                if let Some(connect) = sta.connect.take() {
                    connect.fail(ServiceError::Aborted);
                }
                sta.deadline.arm(self.settings.teardown_grace());
                sta.disconnect = Some(responder);
                sta.transition(StaState::WaitDisconnect);
            }
            StaState::ConnectionFailWaitDisconnect | StaState::WaitDisconnect => {
                responder.fail(ServiceError::UnsupportedOperation)
            }
        }
    }

    pub(crate) async fn sta_connected(
        &mut self,
        state: &mut ControllerState,
        bssid: MacAddress,
        channel: u8,
    ) {
        match state.sta.state {
            StaState::WaitConnect => {
                state.sta.bssid = Some(bssid);
                state.sta.channel = Some(channel);
                state.sta.deadline.disarm();

                match self.data_path.bring_up(Role::Station, state.mac).await {
                    Ok(()) => {
                        let sta = &mut state.sta;
                        sta.link_up = true;
                        sta.transition(StaState::Connected);
                        info!(%bssid, channel, "station connected");
                        if let Some(connect) = sta.connect.take() {
                            connect.done();
                        }
                    }
                    Err(e) => {
                        warn!(%e, "station data path failed, leaving network");
                        if let Err(e) = self.driver.lock().await.disconnect().await {
                            warn!(%e, "driver rejected disconnect");
                        }
                        state
                            .sta
                            .begin_failure(e.into(), self.settings.teardown_grace());
                    }
                }
            }
            StaState::Connected => {
                debug!(%bssid, channel, "station roamed");
                state.sta.bssid = Some(bssid);
                state.sta.channel = Some(channel);
            }
            StaState::DisconnectedWaitConnect => {
                info!(%bssid, channel, "station link restored");
                state.sta.bssid = Some(bssid);
                state.sta.channel = Some(channel);
                state.sta.transition(StaState::Connected);
            }
            other => debug!(state = ?other, "ignoring Connected"),
        }
    }

    pub(crate) fn sta_connection_failure(
        &mut self,
        state: &mut ControllerState,
        reason: DisconnectReason,
    ) {
        if state.sta.state == StaState::WaitConnect {
            // The deadline decides when to give up
            debug!(?reason, "connection attempt failed, driver keeps trying");
            state.sta.last_reason = Some(reason);
        } else {
            debug!(?reason, state = ?state.sta.state, "ignoring ConnectionFailure");
        }
    }

    pub(crate) async fn sta_disconnected(&mut self, state: &mut ControllerState) {
        match state.sta.state {
            StaState::Connected => {
                info!("station link lost, waiting for driver to reconnect");
                state.sta.transition(StaState::DisconnectedWaitConnect);
            }
            StaState::WaitDisconnect | StaState::ConnectionFailWaitDisconnect => {
                self.sta_finish_teardown(state).await;
            }
            other => debug!(state = ?other, "ignoring Disconnected"),
        }
    }

    pub(crate) async fn sta_check_deadline(&mut self, state: &mut ControllerState) {
        if !state.sta.deadline.take_expired() {
            return;
        }

        match state.sta.state {
            StaState::WaitConnect => {
                let failure = state
                    .sta
                    .last_reason
                    .and_then(DisconnectReason::into_error)
                    .unwrap_or(ServiceError::Timeout);
                warn!(%failure, "connect deadline expired");
                if let Err(e) = self.driver.lock().await.disconnect().await {
                    warn!(%e, "driver rejected disconnect");
                }
                state
                    .sta
                    .begin_failure(failure, self.settings.teardown_grace());
            }
            StaState::WaitDisconnect | StaState::ConnectionFailWaitDisconnect => {
                warn!(state = ?state.sta.state, "driver never confirmed disconnect");
                self.sta_finish_teardown(state).await;
            }
            other => debug!(state = ?other, "stale station deadline"),
        }
    }

    /// Complete a teardown: release the link, answer the waiting caller, go idle
    async fn sta_finish_teardown(&mut self, state: &mut ControllerState) {
        self.sta_link_down(state).await;

        let sta = &mut state.sta;
        sta.clear_association();
        let previous = sta.state;
        sta.transition(StaState::Idle);

        match previous {
            StaState::WaitDisconnect => {
                info!("station disconnected");
                if let Some(disconnect) = sta.disconnect.take() {
                    disconnect.done();
                }
            }
            StaState::ConnectionFailWaitDisconnect => {
                let failure = sta.failure.take().unwrap_or(ServiceError::Timeout);
                info!(%failure, "connect failed");
                if let Some(connect) = sta.connect.take() {
                    connect.fail(failure);
                }
            }
            _ => {}
        }
    }

    async fn sta_link_down(&mut self, state: &mut ControllerState) {
        if !state.sta.link_up {
            return;
        }
        if let Err(e) = self.data_path.bring_down(Role::Station).await {
            warn!(%e, "station data path teardown failed");
        }
        state.sta.link_up = false;
    }

    /// Drop back to idle without driver involvement
    pub(crate) async fn sta_reset(&mut self, state: &mut ControllerState, error: ServiceError) {
        if state.sta.state == StaState::Idle {
            return;
        }
        warn!(state = ?state.sta.state, %error, "resetting station role");
        self.sta_link_down(state).await;

        let sta = &mut state.sta;
        sta.clear_association();
        sta.failure = None;
        if let Some(connect) = sta.connect.take() {
            connect.fail(error.clone());
        }
        if let Some(disconnect) = sta.disconnect.take() {
            disconnect.fail(error);
        }
        sta.transition(StaState::Idle);
    }
}
