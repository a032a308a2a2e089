//! Scripted in-memory radio
//!
//! Answers every command with the indications a well-behaved driver would
//! produce, based on a fixed list of visible networks.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    backend::{DataPath, DriverControl, DriverEvents, DriverOption},
    core::{
        error::{WifiError, WifiResult},
        message::DriverEvent,
        types::{
            AccessPointConfig, DisconnectReason, MacAddress, Role, Security, StationConfig,
            WifiNetwork,
        },
    },
};

/// A network the simulated radio can see
#[derive(Debug, Clone)]
struct SimulatedNetwork {
    network: WifiNetwork,
    passphrase: Option<String>,
}

/// Driver backed by a scripted radio
#[derive(Debug)]
pub struct SimulatedDriver {
    mac: MacAddress,
    events: Option<DriverEvents>,
    networks: Vec<SimulatedNetwork>,
    joined: Option<WifiNetwork>,
    options: HashMap<DriverOption, u32>,
}

impl SimulatedDriver {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            events: None,
            networks: Vec::new(),
            joined: None,
            options: HashMap::new(),
        }
    }

    /// Make a network visible; `passphrase` is `None` for open networks
    pub fn with_network(mut self, network: WifiNetwork, passphrase: Option<&str>) -> Self {
        self.networks.push(SimulatedNetwork {
            network,
            passphrase: passphrase.map(str::to_string),
        });
        self
    }

    /// Last value written through `ioctl`
    pub fn option(&self, option: DriverOption) -> Option<u32> {
        self.options.get(&option).copied()
    }

    fn events(&self) -> WifiResult<&DriverEvents> {
        self.events.as_ref().ok_or(WifiError::NotBound)
    }

    fn emit(&self, event: DriverEvent) -> WifiResult<()> {
        self.events()?.on_status(event);
        Ok(())
    }

    fn admits(candidate: &SimulatedNetwork, config: &StationConfig) -> bool {
        match (&candidate.passphrase, config.security) {
            (None, Security::Open) => true,
            (Some(expected), security) if security != Security::Open => {
                *expected == config.passphrase
            }
            _ => false,
        }
    }
}

impl DriverControl for SimulatedDriver {
    fn bind(&mut self, events: DriverEvents) {
        self.events = Some(events);
    }

    async fn start(&mut self) -> WifiResult<()> {
        debug!(mac = %self.mac, "simulated radio up");
        self.emit(DriverEvent::Started { mac: self.mac })
    }

    async fn stop(&mut self) -> WifiResult<()> {
        self.joined = None;
        self.emit(DriverEvent::Stopped)
    }

    async fn connect(&mut self, config: &StationConfig) -> WifiResult<()> {
        self.emit(DriverEvent::Connecting)?;

        let candidate = self.networks.iter().find(|n| {
            n.network.ssid == config.ssid
                && (config.channel == 0 || n.network.channel == config.channel)
        });

        let event = match candidate {
            None => DriverEvent::ConnectionFailure {
                reason: DisconnectReason::NoBssidFound,
            },
            Some(candidate) if !Self::admits(candidate, config) => DriverEvent::ConnectionFailure {
                reason: DisconnectReason::AuthFailure,
            },
            Some(candidate) => {
                let network = candidate.network.clone();
                let event = DriverEvent::Connected {
                    bssid: network.bssid,
                    channel: network.channel,
                };
                self.joined = Some(network);
                event
            }
        };
        self.emit(event)
    }

    async fn disconnect(&mut self) -> WifiResult<()> {
        self.joined = None;
        self.emit(DriverEvent::Disconnected)
    }

    async fn scan(&mut self) -> WifiResult<()> {
        let events = self.events()?;
        for candidate in &self.networks {
            events.on_scan_result(Some(&candidate.network), false);
        }
        events.on_scan_result(None, true);
        Ok(())
    }

    async fn ap_start(&mut self, config: &AccessPointConfig) -> WifiResult<()> {
        debug!(
            ssid = %config.ssid,
            channel = config.channel,
            max_stations = config.max_stations,
            "simulated access point"
        );
        self.emit(DriverEvent::ApUp)
    }

    async fn ap_stop(&mut self) -> WifiResult<()> {
        self.emit(DriverEvent::ApDown)
    }

    async fn ioctl(&mut self, option: DriverOption, value: u32) -> WifiResult<()> {
        self.options.insert(option, value);
        Ok(())
    }

    async fn rssi(&mut self) -> WifiResult<i8> {
        self.joined
            .as_ref()
            .map(|n| n.rssi)
            .ok_or_else(|| WifiError::Rejected("not associated".into()))
    }
}

/// Data path that only tracks which role is attached
#[derive(Debug, Default)]
pub struct SimulatedDataPath {
    attached: Option<Role>,
}

impl SimulatedDataPath {
    pub fn attached(&self) -> Option<Role> {
        self.attached
    }
}

impl DataPath for SimulatedDataPath {
    async fn bring_up(&mut self, role: Role, mac: Option<MacAddress>) -> WifiResult<()> {
        if let Some(current) = self.attached {
            return Err(WifiError::DataPath(format!("{current:?} already attached")));
        }
        info!(?role, mac = ?mac.map(|m| m.to_string()), "network stack attached");
        self.attached = Some(role);
        Ok(())
    }

    async fn bring_down(&mut self, role: Role) -> WifiResult<()> {
        info!(?role, "network stack detached");
        self.attached = None;
        Ok(())
    }
}
