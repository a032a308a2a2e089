//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// What the simulator exercises
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Scan and print the visible networks
    Scan,
    /// Join a network, report signal strength, leave it
    Sta,
    /// Host a network, then tear it down
    Ap,
    /// All of the above in sequence
    All,
}

#[derive(Parser, Debug, Clone)]
#[clap(name = "wifi-interface-sim", version, author)]
#[clap(about = "Runs the WiFi interface controller against a simulated radio")]
pub struct CliArgs {
    /// Scenario to run
    #[clap(value_enum, default_value = "all")]
    pub scenario: Scenario,

    /// SSID to join (station) or host (access point)
    #[clap(short, long, default_value = "HomeNetwork")]
    pub ssid: String,

    /// Passphrase for the network
    #[clap(short, long, default_value = "password123")]
    pub passphrase: String,

    /// Channel used for the hosted network
    #[clap(long, default_value_t = 6)]
    pub ap_channel: u8,

    /// JSON settings file; overrides the tuning flags below
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Station connect deadline in milliseconds
    #[clap(long, default_value_t = 20_000)]
    pub connect_timeout_ms: u64,

    /// Dispatcher idle poll interval in milliseconds
    #[clap(long, default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// Requests that may be in flight at once
    #[clap(long, default_value_t = 8)]
    pub message_pool_capacity: usize,
}
