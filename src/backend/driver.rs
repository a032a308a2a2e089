//! Ports towards the external WLAN driver and network data path

use trait_variant::make;

use crate::{
    backend::events::DriverEvents,
    core::{
        error::WifiResult,
        types::{AccessPointConfig, MacAddress, Role, StationConfig},
    },
};

/// Options the driver accepts through `ioctl`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOption {
    PowerSave,
    ListenInterval,
    TxPower,
}

/// Control side of the WLAN driver
///
/// Every command is fire-and-forget: an `Ok` only means the driver accepted
/// the command. The outcome arrives later through the [`DriverEvents`] sink
/// handed over in [`DriverControl::bind`]. Implementations are not required
/// to be reentrant; the controller serializes all calls behind one lock.
#[make(Send)]
pub trait DriverControl: Send + Sync + 'static {
    /// Register the sink that receives status and scan indications
    fn bind(&mut self, events: DriverEvents);

    /// Power up the radio; answered by `Started`
    async fn start(&mut self) -> WifiResult<()>;

    /// Power down the radio; answered by `Stopped`
    async fn stop(&mut self) -> WifiResult<()>;

    /// Join a network (open, WEP, PSK or enterprise depending on `config`)
    async fn connect(&mut self, config: &StationConfig) -> WifiResult<()>;

    /// Leave the current network; answered by `Disconnected`
    async fn disconnect(&mut self) -> WifiResult<()>;

    /// Start a broadcast scan; answered by a series of `ScanResult`
    async fn scan(&mut self) -> WifiResult<()>;

    /// Host a network; answered by `ApUp`
    async fn ap_start(&mut self, config: &AccessPointConfig) -> WifiResult<()>;

    /// Tear down the hosted network; answered by `ApDown`
    async fn ap_stop(&mut self) -> WifiResult<()>;

    async fn ioctl(&mut self, option: DriverOption, value: u32) -> WifiResult<()>;

    /// Signal strength of the current association
    async fn rssi(&mut self) -> WifiResult<i8>;
}

/// Packet path between the driver and the network stack
#[make(Send)]
pub trait DataPath: Send + Sync + 'static {
    /// Attach the network stack to the radio for `role`
    async fn bring_up(&mut self, role: Role, mac: Option<MacAddress>) -> WifiResult<()>;

    async fn bring_down(&mut self, role: Role) -> WifiResult<()>;
}
