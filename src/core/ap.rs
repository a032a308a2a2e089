//! Access point role state machine
//!
//! Stopping the access point power-cycles the radio (`WaitDriverStop` then
//! `WaitDriverStart`) so the driver is back in a clean, started state before
//! the station role may be used again.

use tracing::{debug, info, warn};

use crate::{
    backend::{DataPath, DriverControl},
    core::{
        dispatcher::{ControllerState, Dispatcher},
        error::ServiceError,
        message::Responder,
        timeout::Deadline,
        types::{AccessPointConfig, ApState, MacAddress, Role, StaState},
    },
};

#[derive(Debug)]
pub(crate) struct ApMachine {
    state: ApState,
    stations: u32,
    max_stations: u32,
    link_up: bool,
    deadline: Deadline,
    /// Error delivered to the start caller once the driver confirms teardown
    failure: Option<ServiceError>,
    start: Option<Responder>,
    stop: Option<Responder>,
}

impl Default for ApMachine {
    fn default() -> Self {
        Self {
            state: ApState::Idle,
            stations: 0,
            max_stations: 0,
            link_up: false,
            deadline: Deadline::default(),
            failure: None,
            start: None,
            stop: None,
        }
    }
}

impl ApMachine {
    pub fn state(&self) -> ApState {
        self.state
    }

    /// Stations currently associated
    pub fn stations(&self) -> u32 {
        self.stations
    }

    pub fn station_added(&mut self, mac: MacAddress) {
        self.stations = self.stations.saturating_add(1);
        if self.stations > self.max_stations {
            warn!(
                %mac,
                stations = self.stations,
                max = self.max_stations,
                "driver admitted station beyond limit"
            );
        } else {
            info!(%mac, stations = self.stations, "station joined access point");
        }
    }

    pub fn station_removed(&mut self, mac: MacAddress) {
        self.stations = self.stations.saturating_sub(1);
        info!(%mac, stations = self.stations, "station left access point");
    }

    fn transition(&mut self, next: ApState) {
        debug!(from = ?self.state, to = ?next, "ap transition");
        self.state = next;
    }

    fn finish(&mut self) {
        self.deadline.disarm();
        self.stations = 0;
        self.transition(ApState::Idle);
    }
}

impl<D: DriverControl, L: DataPath> Dispatcher<D, L> {
    pub(crate) async fn ap_start(
        &mut self,
        state: &mut ControllerState,
        config: AccessPointConfig,
        responder: Responder,
    ) {
        if state.ap.state != ApState::Idle || state.sta.state() != StaState::Idle {
            debug!(sta = ?state.sta.state(), ap = ?state.ap.state, "ap_start refused");
            responder.fail(ServiceError::UnsupportedOperation);
            return;
        }

        if let Err(e) = self.driver.lock().await.ap_start(&config).await {
            warn!(%e, ssid = %config.ssid, "driver rejected ap_start");
            responder.fail(e.into());
            return;
        }

        let ap = &mut state.ap;
        ap.stations = 0;
        ap.max_stations = config.max_stations;
        ap.failure = None;
        ap.deadline.arm(self.settings.connect_timeout());
        ap.start = Some(responder);
        info!(
            ssid = %config.ssid,
            channel = config.channel,
            max_stations = config.max_stations,
            "starting access point"
        );
        ap.transition(ApState::WaitStart);
    }

    pub(crate) async fn ap_stop(&mut self, state: &mut ControllerState, responder: Responder) {
        if state.ap.state != ApState::Started {
            responder.fail(ServiceError::UnsupportedOperation);
            return;
        }

        if let Err(e) = self.driver.lock().await.ap_stop().await {
            warn!(%e, "driver rejected ap_stop");
            responder.fail(e.into());
            return;
        }

        let ap = &mut state.ap;
        ap.deadline.arm(self.settings.teardown_grace());
        ap.stop = Some(responder);
        ap.transition(ApState::WaitStop);
    }

    pub(crate) async fn ap_up(&mut self, state: &mut ControllerState) {
        if state.ap.state != ApState::WaitStart {
            debug!(state = ?state.ap.state, "ignoring ApUp");
            return;
        }

        match self.data_path.bring_up(Role::AccessPoint, state.mac).await {
            Ok(()) => {
                let ap = &mut state.ap;
                ap.link_up = true;
                ap.deadline.disarm();
                ap.transition(ApState::Started);
                info!("access point started");
                if let Some(start) = ap.start.take() {
                    start.done();
                }
            }
            Err(e) => {
                warn!(%e, "access point data path failed, stopping");
                state.ap.failure = Some(e.into());
                let stopped = self.driver.lock().await.ap_stop().await;
                if let Err(e) = stopped {
                    warn!(%e, "driver rejected ap_stop");
                    self.ap_fail_start(state);
                    return;
                }
                state.ap.deadline.arm(self.settings.teardown_grace());
                state.ap.transition(ApState::FailWaitStop);
            }
        }
    }

    pub(crate) async fn ap_down(&mut self, state: &mut ControllerState) {
        match state.ap.state {
            ApState::WaitStop => {
                self.ap_link_down(state).await;
                if let Err(e) = self.driver.lock().await.stop().await {
                    warn!(%e, "driver rejected stop, access point left without radio restart");
                    state.ap.finish();
                    if let Some(stop) = state.ap.stop.take() {
                        stop.fail(e.into());
                    }
                    return;
                }
                state.ap.deadline.arm(self.settings.teardown_grace());
                state.ap.transition(ApState::WaitDriverStop);
            }
            ApState::FailWaitStop => self.ap_fail_start(state),
            ApState::WaitStart => {
                warn!("driver refused to bring up access point");
                state.ap.failure = Some(ServiceError::DeviceError(
                    "access point did not come up".into(),
                ));
                self.ap_fail_start(state);
            }
            ApState::Started => {
                warn!("access point went down unexpectedly");
                self.ap_link_down(state).await;
                state.ap.finish();
            }
            other => debug!(state = ?other, "ignoring ApDown"),
        }
    }

    pub(crate) async fn ap_driver_stopped(&mut self, state: &mut ControllerState) {
        if let Err(e) = self.driver.lock().await.start().await {
            warn!(%e, "driver rejected restart after access point stop");
            state.ap.finish();
            if let Some(stop) = state.ap.stop.take() {
                stop.fail(e.into());
            }
            return;
        }
        state.ap.deadline.arm(self.settings.teardown_grace());
        state.ap.transition(ApState::WaitDriverStart);
    }

    pub(crate) fn ap_driver_started(&mut self, state: &mut ControllerState) {
        state.ap.finish();
        info!("access point stopped");
        if let Some(stop) = state.ap.stop.take() {
            stop.done();
        }
    }

    pub(crate) async fn ap_check_deadline(&mut self, state: &mut ControllerState) {
        if !state.ap.deadline.take_expired() {
            return;
        }

        match state.ap.state {
            ApState::WaitStart | ApState::FailWaitStop => {
                warn!(state = ?state.ap.state, "access point start never completed");
                if state.ap.failure.is_none() {
                    state.ap.failure = Some(ServiceError::Timeout);
                }
                self.ap_fail_start(state);
            }
            ApState::WaitStop | ApState::WaitDriverStop | ApState::WaitDriverStart => {
                self.ap_reset(state, ServiceError::Timeout).await;
            }
            other => debug!(state = ?other, "stale access point deadline"),
        }
    }

    /// Answer the start caller with the stored failure and go idle
    fn ap_fail_start(&mut self, state: &mut ControllerState) {
        let ap = &mut state.ap;
        let failure = ap
            .failure
            .take()
            .unwrap_or_else(|| ServiceError::DeviceError("access point failed to start".into()));
        ap.finish();
        info!(%failure, "access point start failed");
        if let Some(start) = ap.start.take() {
            start.fail(failure);
        }
    }

    async fn ap_link_down(&mut self, state: &mut ControllerState) {
        if !state.ap.link_up {
            return;
        }
        if let Err(e) = self.data_path.bring_down(Role::AccessPoint).await {
            warn!(%e, "access point data path teardown failed");
        }
        state.ap.link_up = false;
    }

    /// Drop back to idle without driver involvement
    pub(crate) async fn ap_reset(&mut self, state: &mut ControllerState, error: ServiceError) {
        if state.ap.state == ApState::Idle {
            return;
        }
        warn!(state = ?state.ap.state, %error, "resetting access point role");
        self.ap_link_down(state).await;

        let ap = &mut state.ap;
        ap.failure = None;
        ap.finish();
        if let Some(start) = ap.start.take() {
            start.fail(error.clone());
        }
        if let Some(stop) = ap.stop.take() {
            stop.fail(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        backend::{DriverCall, MockDataPath, MockDriver, mock_backend::MOCK_MAC},
        config::Settings,
        core::{message::DriverEvent, service::WifiInterface, types::Security},
    };
    use pretty_assertions::assert_eq;
    use tokio::task::JoinHandle;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        iface: Arc<WifiInterface<MockDriver>>,
        driver: MockDriver,
        link: MockDataPath,
    }

    impl Harness {
        async fn new() -> Self {
            let driver = MockDriver::new();
            let link = MockDataPath::new();
            let iface = Arc::new(WifiInterface::start(
                driver.clone(),
                link.clone(),
                &Settings::default(),
            ));
            settle().await;
            driver.clear_calls();
            Self {
                iface,
                driver,
                link,
            }
        }

        fn ap_start(&self) -> JoinHandle<Result<(), ServiceError>> {
            let iface = self.iface.clone();
            tokio::spawn(async move {
                iface
                    .ap_start("DeviceAP", "apsecret99", Security::Wpa2Psk, 6)
                    .await
            })
        }

        fn ap_stop(&self) -> JoinHandle<Result<(), ServiceError>> {
            let iface = self.iface.clone();
            tokio::spawn(async move { iface.ap_stop().await })
        }

        async fn started(&self) {
            let start = self.ap_start();
            settle().await;
            self.driver.emit(DriverEvent::ApUp);
            assert_ok!(start.await.unwrap());
        }

        async fn ap(&self) -> ApState {
            self.iface.status().await.ap
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ap_start_success() {
        let h = Harness::new().await;
        let start = h.ap_start();
        settle().await;
        assert_eq!(h.ap().await, ApState::WaitStart);

        match &h.driver.calls()[..] {
            [DriverCall::ApStart(config)] => {
                assert_eq!(config.ssid, "DeviceAP");
                assert_eq!(config.channel, 6);
                assert_eq!(config.beacon_interval, 100);
                assert_eq!(config.max_stations, 8);
            }
            other => panic!("unexpected driver calls: {other:?}"),
        }

        h.driver.emit(DriverEvent::ApUp);
        assert_ok!(start.await.unwrap());
        assert_eq!(h.ap().await, ApState::Started);
        assert_eq!(h.link.ups(), vec![Role::AccessPoint]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ap_stop_power_cycles_radio() {
        let h = Harness::new().await;
        h.started().await;
        h.driver.clear_calls();

        let stop = h.ap_stop();
        settle().await;
        assert_eq!(h.driver.calls(), vec![DriverCall::ApStop]);
        assert_eq!(h.ap().await, ApState::WaitStop);

        h.driver.emit(DriverEvent::ApDown);
        settle().await;
        assert_eq!(h.ap().await, ApState::WaitDriverStop);
        assert_eq!(h.link.downs(), vec![Role::AccessPoint]);

        h.driver.emit(DriverEvent::Stopped);
        settle().await;
        assert_eq!(h.ap().await, ApState::WaitDriverStart);
        assert_eq!(
            h.driver.calls(),
            vec![DriverCall::ApStop, DriverCall::Stop, DriverCall::Start]
        );

        h.driver.emit(DriverEvent::Started { mac: MOCK_MAC });
        assert_ok!(stop.await.unwrap());
        assert_eq!(h.ap().await, ApState::Idle);

        // Role exclusion released: the station role is usable again
        let iface = h.iface.clone();
        let connect = tokio::spawn(async move {
            iface
                .connect("MySSID", "password123", Security::Wpa2Psk, 0)
                .await
        });
        settle().await;
        assert!(matches!(
            h.driver.calls().last(),
            Some(DriverCall::Connect(_))
        ));
        h.driver.emit(DriverEvent::Connected {
            bssid: MacAddress([1, 1, 1, 1, 1, 1]),
            channel: 3,
        });
        assert_ok!(connect.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ap_start_refused_while_station_connected() {
        let h = Harness::new().await;
        let iface = h.iface.clone();
        let connect = tokio::spawn(async move {
            iface
                .connect("MySSID", "password123", Security::Wpa2Psk, 0)
                .await
        });
        settle().await;
        h.driver.emit(DriverEvent::Connected {
            bssid: MacAddress([1, 2, 3, 4, 5, 6]),
            channel: 1,
        });
        assert_ok!(connect.await.unwrap());
        h.driver.clear_calls();

        assert_eq!(
            h.ap_start().await.unwrap(),
            Err(ServiceError::UnsupportedOperation)
        );
        assert!(h.driver.calls().is_empty());
        assert_eq!(h.ap().await, ApState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refused_while_ap_active() {
        let h = Harness::new().await;
        h.started().await;

        let result = h
            .iface
            .connect("MySSID", "password123", Security::Wpa2Psk, 0)
            .await;
        assert_eq!(result, Err(ServiceError::UnsupportedOperation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_path_failure_reports_stored_error() {
        let h = Harness::new().await;
        h.link.set_bring_up_failure(true);
        let start = h.ap_start();
        settle().await;

        h.driver.emit(DriverEvent::ApUp);
        settle().await;
        assert_eq!(h.ap().await, ApState::FailWaitStop);
        assert_eq!(h.driver.count(&DriverCall::ApStop), 1);

        h.driver.emit(DriverEvent::ApDown);
        let err = assert_err!(start.await.unwrap());
        assert!(matches!(err, ServiceError::DeviceError(_)));
        assert_eq!(h.ap().await, ApState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_counter() {
        let h = Harness::new().await;
        h.started().await;

        let a = MacAddress([0x0a, 0, 0, 0, 0, 1]);
        let b = MacAddress([0x0a, 0, 0, 0, 0, 2]);
        h.driver.emit(DriverEvent::ApStationAdded { mac: a });
        h.driver.emit(DriverEvent::ApStationAdded { mac: b });
        h.driver.emit(DriverEvent::ApStationRemoved { mac: a });
        settle().await;

        assert_eq!(h.iface.ap_station_count().await, 1);
        assert_eq!(h.ap().await, ApState::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ap_stop_while_idle_refused() {
        let h = Harness::new().await;
        assert_eq!(
            h.iface.ap_stop().await,
            Err(ServiceError::UnsupportedOperation)
        );
        assert!(h.driver.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ap_start_times_out_without_ap_up() {
        let h = Harness::new().await;
        let start = h.ap_start();

        tokio::time::sleep(Duration::from_secs(22)).await;
        assert_eq!(start.await.unwrap(), Err(ServiceError::Timeout));
        assert_eq!(h.ap().await, ApState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_stop_after_data_path_failure() {
        let h = Harness::new().await;
        h.link.set_bring_up_failure(true);
        let start = h.ap_start();
        settle().await;

        h.driver.set_reject_commands(true);
        h.driver.emit(DriverEvent::ApUp);

        let err = assert_err!(start.await.unwrap());
        assert!(matches!(err, ServiceError::DeviceError(_)));
        assert_eq!(h.driver.count(&DriverCall::ApStop), 1);
        assert_eq!(h.ap().await, ApState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ap_down_while_waiting_for_start() {
        let h = Harness::new().await;
        let start = h.ap_start();
        settle().await;

        h.driver.emit(DriverEvent::ApDown);
        let err = assert_err!(start.await.unwrap());
        assert!(matches!(err, ServiceError::DeviceError(_)));
        assert_eq!(h.ap().await, ApState::Idle);
        assert!(h.link.ups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_ap_down_releases_role() {
        let h = Harness::new().await;
        h.started().await;
        h.driver.emit(DriverEvent::ApStationAdded {
            mac: MacAddress([0x0a, 0, 0, 0, 0, 1]),
        });
        h.driver.clear_calls();

        h.driver.emit(DriverEvent::ApDown);
        settle().await;

        assert_eq!(h.ap().await, ApState::Idle);
        assert_eq!(h.link.downs(), vec![Role::AccessPoint]);
        assert_eq!(h.iface.ap_station_count().await, 0);
        assert!(h.driver.calls().is_empty());
    }

    /// Stop the access point, feed `events`, then let the driver go silent
    async fn stalled_stop(events: &[DriverEvent], phase: ApState) -> Harness {
        let h = Harness::new().await;
        h.started().await;

        let stop = h.ap_stop();
        settle().await;
        for event in events {
            h.driver.emit(event.clone());
            settle().await;
        }
        assert_eq!(h.ap().await, phase);

        // Teardown grace plus poll slack
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(stop.await.unwrap(), Err(ServiceError::Timeout));
        assert_eq!(h.ap().await, ApState::Idle);
        h
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_waiting_for_ap_down() {
        let h = stalled_stop(&[], ApState::WaitStop).await;
        assert_eq!(h.link.downs(), vec![Role::AccessPoint]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_waiting_for_driver_stop() {
        let h = stalled_stop(&[DriverEvent::ApDown], ApState::WaitDriverStop).await;
        assert_eq!(h.link.downs(), vec![Role::AccessPoint]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_waiting_for_driver_start() {
        let h = stalled_stop(
            &[DriverEvent::ApDown, DriverEvent::Stopped],
            ApState::WaitDriverStart,
        )
        .await;
        assert_eq!(h.driver.count(&DriverCall::Start), 1);

        // The role is free again
        let start = h.ap_start();
        settle().await;
        h.driver.emit(DriverEvent::ApUp);
        assert_ok!(start.await.unwrap());
    }
}
