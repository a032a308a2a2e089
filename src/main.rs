//! WiFi Interface Simulator - Main Entry Point

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifi_interface::{
    MacAddress, Security, SimulatedDataPath, SimulatedDriver, WifiInterface, WifiNetwork,
    config::{CliArgs, Scenario, Settings},
};

type Interface = WifiInterface<SimulatedDriver>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wifi_interface=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(?args, "Starting WiFi interface simulator");

    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => {
            let settings = Settings::from(args.clone());
            settings.validate()?;
            settings
        }
    };

    let driver = simulated_radio(&args);
    let iface = WifiInterface::start(driver, SimulatedDataPath::default(), &settings);

    tokio::select! {
        result = run(&iface, &args) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received SIGINT (Ctrl+C), abandoning scenario");
            return Ok(());
        }
    }

    iface.stop().await?;
    info!("Radio stopped");
    Ok(())
}

/// Radio that sees the configured network plus a few neighbours
fn simulated_radio(args: &CliArgs) -> SimulatedDriver {
    let neighbour = |ssid: &str, last: u8, channel: u8, security: Security, rssi: i8| WifiNetwork {
        ssid: ssid.to_string(),
        bssid: MacAddress([0x3c, 0x7a, 0x8a, 0x00, 0x00, last]),
        channel,
        security,
        rssi,
    };

    SimulatedDriver::new(MacAddress([0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]))
        .with_network(
            neighbour(&args.ssid, 1, 6, Security::Wpa2Psk, -52),
            Some(&args.passphrase),
        )
        .with_network(neighbour("CoffeeShop", 2, 1, Security::Open, -71), None)
        .with_network(
            neighbour("Neighbour5G", 3, 36, Security::WpaWpa2Psk, -80),
            Some("hunter2hunter2"),
        )
}

async fn run(iface: &Interface, args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if matches!(args.scenario, Scenario::Scan | Scenario::All) {
        scan(iface).await?;
    }
    if matches!(args.scenario, Scenario::Sta | Scenario::All) {
        station(iface, args).await?;
    }
    if matches!(args.scenario, Scenario::Ap | Scenario::All) {
        access_point(iface, args).await?;
    }
    Ok(())
}

fn print_json(label: &str, value: &impl Serialize) -> Result<(), serde_json::Error> {
    println!("{label}: {}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn scan(iface: &Interface) -> Result<(), Box<dyn std::error::Error>> {
    let report = iface.scan(16).await?;
    print_json("scan", &report)?;

    let counted = iface.scan(0).await?;
    info!(count = counted.count, "counts-only scan finished");
    Ok(())
}

async fn station(iface: &Interface, args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    iface
        .connect(&args.ssid, &args.passphrase, Security::Wpa2Psk, 0)
        .await?;
    let rssi = iface.get_rssi().await?;
    info!(ssid = %args.ssid, rssi, "station connected");
    print_json("status", &iface.status().await)?;

    iface.disconnect().await?;
    info!("station disconnected");
    Ok(())
}

async fn access_point(iface: &Interface, args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    iface
        .ap_start(&args.ssid, &args.passphrase, Security::Wpa2Psk, args.ap_channel)
        .await?;
    info!(
        ssid = %args.ssid,
        max_stations = iface.ap_max_stations().await,
        "access point up"
    );
    print_json("status", &iface.status().await)?;

    iface.ap_stop().await?;
    info!("access point stopped");
    Ok(())
}
