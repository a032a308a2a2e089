//! Configuration module

pub mod cli;
pub mod settings;

pub use cli::{CliArgs, Scenario};
pub use settings::{Settings, SettingsError};
