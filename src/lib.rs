//! WiFi Interface Controller
//!
//! Drives a WLAN radio through its station and access point lifecycles:
//! - Station connect/disconnect with a connect deadline
//! - Access point start/stop, mutually exclusive with the station role
//! - Broadcast scans with BSSID de-duplication
//!
//! Callers use the [`WifiInterface`] facade. The radio itself sits behind the
//! [`DriverControl`] and [`DataPath`] ports.

pub mod backend;
pub mod config;
pub mod core;

pub use backend::{DataPath, DriverControl, DriverEvents, SimulatedDataPath, SimulatedDriver};
pub use crate::core::{
    error::{ServiceError, ServiceResult, WifiError, WifiResult},
    message::DriverEvent,
    service::WifiInterface,
    types::{ConfigKey, InterfaceStatus, MacAddress, ScanReport, Security, WifiNetwork},
};
