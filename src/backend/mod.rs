//! Ports towards the WLAN driver and their implementations

pub mod driver;
pub mod events;
#[cfg(test)]
pub mod mock_backend;
pub mod sim_backend;

pub use driver::{DataPath, DriverControl, DriverOption};
pub use events::DriverEvents;
pub use sim_backend::{SimulatedDataPath, SimulatedDriver};

#[cfg(test)]
pub use mock_backend::{DriverCall, MockDataPath, MockDriver};
