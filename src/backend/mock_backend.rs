//! Mock driver and data path for testing

use std::sync::{Arc, Mutex};

use crate::backend::{DataPath, DriverControl, DriverEvents, DriverOption};
use crate::core::error::{WifiError, WifiResult};
use crate::core::message::DriverEvent;
use crate::core::types::{AccessPointConfig, MacAddress, Role, StationConfig, WifiNetwork};

/// MAC the mock reports when it boots
pub const MOCK_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

/// A control-port call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Start,
    Stop,
    Connect(StationConfig),
    Disconnect,
    Scan,
    ApStart(AccessPointConfig),
    ApStop,
    Ioctl(DriverOption, u32),
}

/// Internal state for the mock driver
#[derive(Debug)]
struct MockState {
    calls: Vec<DriverCall>,
    events: Option<DriverEvents>,
    /// Reported on the first `start`, then cleared
    boot_mac: Option<MacAddress>,
    rssi: i8,
    reject_commands: bool,
}

/// Mock WLAN driver
///
/// Records every command and never produces events on its own except for the
/// boot `Started` indication. Tests drive the controller with [`MockDriver::emit`].
#[derive(Debug, Clone)]
pub struct MockDriver {
    inner: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Mock that answers the first `start` with `Started`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                calls: vec![],
                events: None,
                boot_mac: Some(MOCK_MAC),
                rssi: -50,
                reject_commands: false,
            })),
        }
    }

    /// Mock that leaves the interface in `WaitingForStart` until told otherwise
    pub fn without_boot() -> Self {
        let driver = Self::new();
        driver.inner.lock().unwrap().boot_mac = None;
        driver
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &DriverCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Make every subsequent command fail synchronously
    pub fn set_reject_commands(&self, reject: bool) {
        self.inner.lock().unwrap().reject_commands = reject;
    }

    pub fn set_rssi(&self, rssi: i8) {
        self.inner.lock().unwrap().rssi = rssi;
    }

    /// Inject a driver indication
    pub fn emit(&self, event: DriverEvent) {
        let events = self.inner.lock().unwrap().events.clone();
        events.expect("driver not bound").on_status(event);
    }

    pub fn emit_scan(&self, network: Option<&WifiNetwork>, is_last: bool) {
        let events = self.inner.lock().unwrap().events.clone();
        events
            .expect("driver not bound")
            .on_scan_result(network, is_last);
    }

    fn record(&self, call: DriverCall) -> WifiResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(call);
        if state.reject_commands {
            Err(WifiError::Rejected("mock rejection".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverControl for MockDriver {
    fn bind(&mut self, events: DriverEvents) {
        self.inner.lock().unwrap().events = Some(events);
    }

    async fn start(&mut self) -> WifiResult<()> {
        self.record(DriverCall::Start)?;
        let (boot_mac, events) = {
            let mut state = self.inner.lock().unwrap();
            (state.boot_mac.take(), state.events.clone())
        };
        if let (Some(mac), Some(events)) = (boot_mac, events) {
            events.on_status(DriverEvent::Started { mac });
        }
        Ok(())
    }

    async fn stop(&mut self) -> WifiResult<()> {
        self.record(DriverCall::Stop)
    }

    async fn connect(&mut self, config: &StationConfig) -> WifiResult<()> {
        self.record(DriverCall::Connect(config.clone()))
    }

    async fn disconnect(&mut self) -> WifiResult<()> {
        self.record(DriverCall::Disconnect)
    }

    async fn scan(&mut self) -> WifiResult<()> {
        self.record(DriverCall::Scan)
    }

    async fn ap_start(&mut self, config: &AccessPointConfig) -> WifiResult<()> {
        self.record(DriverCall::ApStart(config.clone()))
    }

    async fn ap_stop(&mut self) -> WifiResult<()> {
        self.record(DriverCall::ApStop)
    }

    async fn ioctl(&mut self, option: DriverOption, value: u32) -> WifiResult<()> {
        self.record(DriverCall::Ioctl(option, value))
    }

    async fn rssi(&mut self) -> WifiResult<i8> {
        Ok(self.inner.lock().unwrap().rssi)
    }
}

/// Mock data path recording link transitions
#[derive(Debug, Clone, Default)]
pub struct MockDataPath {
    inner: Arc<Mutex<MockLinkState>>,
}

#[derive(Debug, Default)]
struct MockLinkState {
    up: Vec<Role>,
    down: Vec<Role>,
    fail_bring_up: bool,
}

impl MockDataPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bring_up_failure(&self, fail: bool) {
        self.inner.lock().unwrap().fail_bring_up = fail;
    }

    pub fn ups(&self) -> Vec<Role> {
        self.inner.lock().unwrap().up.clone()
    }

    pub fn downs(&self) -> Vec<Role> {
        self.inner.lock().unwrap().down.clone()
    }
}

impl DataPath for MockDataPath {
    async fn bring_up(&mut self, role: Role, _mac: Option<MacAddress>) -> WifiResult<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_bring_up {
            return Err(WifiError::DataPath("mock bring-up failure".into()));
        }
        state.up.push(role);
        Ok(())
    }

    async fn bring_down(&mut self, role: Role) -> WifiResult<()> {
        self.inner.lock().unwrap().down.push(role);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Inbound;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_mock_driver_records_calls() {
        let mut driver = MockDriver::new();
        driver.disconnect().await.unwrap();
        driver.scan().await.unwrap();

        assert_eq!(driver.calls(), vec![DriverCall::Disconnect, DriverCall::Scan]);
        assert_eq!(driver.count(&DriverCall::Scan), 1);
    }

    #[tokio::test]
    async fn test_mock_driver_boot_started_only_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = MockDriver::new();
        driver.bind(DriverEvents::new(tx));

        driver.start().await.unwrap();
        driver.start().await.unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(Inbound::Event(DriverEvent::Started { mac: MOCK_MAC }))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mock_driver_rejection() {
        let mut driver = MockDriver::new();
        driver.set_reject_commands(true);
        assert!(driver.ap_stop().await.is_err());
        // Rejected calls are still recorded
        assert_eq!(driver.calls(), vec![DriverCall::ApStop]);
    }

    #[tokio::test]
    async fn test_mock_data_path_failure() {
        let mut path = MockDataPath::new();
        path.bring_up(Role::Station, None).await.unwrap();
        path.set_bring_up_failure(true);
        assert!(path.bring_up(Role::AccessPoint, None).await.is_err());
        assert_eq!(path.ups(), vec![Role::Station]);
    }
}
