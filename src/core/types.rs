//! Domain types for the WiFi interface controller

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Maximum SSID length in bytes
pub const MAX_SSID_LEN: usize = 32;

/// IEEE 802.11 MAC address (also used as BSSID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = self.0.iter().map(|b| hex::encode([*b])).collect();
        write!(f, "{}", octets.join(":"))
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.split(':').collect();
        let bytes = hex::decode(&digits).map_err(|e| format!("invalid MAC address {s}: {e}"))?;
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| format!("invalid MAC address {s}: expected 6 octets"))?;
        Ok(MacAddress(octets))
    }
}

/// Authentication scheme of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
}

impl Security {
    /// Whether the scheme is a pre-shared-key mode
    pub fn is_psk(self) -> bool {
        matches!(
            self,
            Security::WpaPsk | Security::Wpa2Psk | Security::WpaWpa2Psk
        )
    }
}

/// Radio channels accepted by the controller (2.4 GHz and 5 GHz)
const VALID_CHANNELS: &[u8] = &[
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 36, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108,
    112, 116, 120, 124, 128, 132, 136, 140, 149, 153, 157, 161, 165,
];

/// Whether `channel` is a concrete, valid radio channel
pub fn is_valid_channel(channel: u8) -> bool {
    VALID_CHANNELS.contains(&channel)
}

/// Represents a network reported by a scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WifiNetwork {
    /// Network SSID
    pub ssid: String,
    /// Access point radio address
    pub bssid: MacAddress,
    /// Channel number
    pub channel: u8,
    /// Advertised security
    pub security: Security,
    /// Signal strength in dBm
    pub rssi: i8,
}

/// Credentials for certificate based (EAP) authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterpriseCredentials {
    /// Opaque handle of a client certificate already provisioned in the driver
    pub cert_handle: u32,
    pub username: String,
    pub user_passphrase: String,
}

/// Everything the driver needs to join a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub ssid: String,
    pub passphrase: String,
    pub security: Security,
    /// `0` lets the driver pick any channel
    pub channel: u8,
    pub enterprise: Option<EnterpriseCredentials>,
}

/// Everything the driver needs to host a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub passphrase: String,
    pub security: Security,
    pub channel: u8,
    /// Beacon interval in time units (1024 µs)
    pub beacon_interval: u16,
    /// Stations the driver admits before refusing associations
    pub max_stations: u32,
}

/// The two roles a radio can operate in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Station,
    AccessPoint,
}

/// Reason attached to a driver connection-failure indication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    NoBssidFound,
    AuthFailure,
    MicFailure,
    AssociationFailed,
    Unknown,
}

/// Top-level interface lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceState {
    NotInitialized,
    WaitingForStart,
    Started,
    WaitingForStop,
    Invalid,
}

/// Station role state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaState {
    Idle,
    WaitConnect,
    Connected,
    DisconnectedWaitConnect,
    ConnectionFailWaitDisconnect,
    WaitDisconnect,
}

/// Access point role state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApState {
    Idle,
    WaitStart,
    Started,
    WaitStop,
    FailWaitStop,
    WaitDriverStop,
    WaitDriverStart,
}

/// Runtime-tunable parameters reachable through `get_config`/`set_config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    /// Station connect deadline in milliseconds
    ConnectTimeoutMs,
    /// Beacon interval used for the next `ap_start`
    ApBeaconInterval,
    /// Number of stations the access point admits
    ApMaxStations,
    /// Driver power-save mode (0 = off)
    PowerSave,
    /// Driver listen interval in beacons
    ListenInterval,
    /// Driver transmit power in dBm
    TxPower,
}

impl ConfigKey {
    /// Range of values the key accepts
    pub fn accepts(self, value: u32) -> bool {
        match self {
            ConfigKey::ConnectTimeoutMs => value > 0,
            ConfigKey::ApBeaconInterval => (20..=1000).contains(&value),
            ConfigKey::ApMaxStations => (1..=8).contains(&value),
            ConfigKey::PowerSave => value <= 2,
            ConfigKey::ListenInterval => (1..=16).contains(&value),
            ConfigKey::TxPower => value <= 20,
        }
    }
}

/// Result of a finished scan
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    /// Number of distinct networks found
    pub count: usize,
    /// Collected networks; empty in counts-only mode
    pub networks: Vec<WifiNetwork>,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceStatus {
    pub interface: InterfaceState,
    pub sta: StaState,
    pub ap: ApState,
    pub mac_address: Option<MacAddress>,
    /// BSSID of the joined network (station role)
    pub bssid: Option<MacAddress>,
    /// Channel of the joined network (station role)
    pub channel: Option<u8>,
    /// Stations associated to the hosted network (access point role)
    pub ap_stations: u32,
}

/// Correlation id attached to every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
