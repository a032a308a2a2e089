//! Error types for the WiFi interface controller

use thiserror::Error;

use super::types::DisconnectReason;

/// Result type for driver and data path port operations
pub type WifiResult<T> = Result<T, WifiError>;

/// Result type for facade operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors reported synchronously by the external driver ports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    #[error("Driver rejected command: {0}")]
    Rejected(String),

    #[error("Driver not bound to an event sink")]
    NotBound,

    #[error("Data path error: {0}")]
    DataPath(String),
}

/// Errors returned to facade callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid parameter: {0}")]
    ParameterError(String),

    #[error("Operation not supported in the current state")]
    UnsupportedOperation,

    #[error("No connection")]
    NoConnection,

    #[error("Message pool exhausted")]
    ResourceExhausted,

    #[error("Device busy")]
    DeviceBusy,

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Authentication failure")]
    AuthFailure,

    #[error("No SSID found")]
    NoSsidFound,

    #[error("Connection timeout")]
    Timeout,

    #[error("Connect aborted by disconnect")]
    Aborted,

    #[error("Interface is not running")]
    InterfaceDown,
}

impl From<WifiError> for ServiceError {
    fn from(err: WifiError) -> Self {
        ServiceError::DeviceError(err.to_string())
    }
}

impl DisconnectReason {
    /// Caller-visible error for a failed connect attempt
    ///
    /// `None` when the driver did not give a usable cause, in which case the
    /// attempt is reported as a timeout.
    pub fn into_error(self) -> Option<ServiceError> {
        match self {
            DisconnectReason::NoBssidFound => Some(ServiceError::NoSsidFound),
            DisconnectReason::AuthFailure
            | DisconnectReason::MicFailure
            | DisconnectReason::AssociationFailed => Some(ServiceError::AuthFailure),
            DisconnectReason::Unknown => None,
        }
    }
}
