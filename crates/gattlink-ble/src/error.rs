//! Error types for the btleplug backend

use std::time::Duration;

use gattlink_core::NativeError;
use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug backend
#[derive(Error, Debug)]
pub enum BleBackendError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("BLE adapter {index} not found ({count} available)")]
    AdapterIndexOutOfRange { index: usize, count: usize },

    #[error("Invalid device address '{0}'")]
    InvalidAddress(String),

    #[error("Peer not found: {address}")]
    PeerNotFound { address: String },

    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound { uuid: Uuid },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
}

impl From<BleBackendError> for NativeError {
    fn from(err: BleBackendError) -> Self {
        match err {
            BleBackendError::PeerNotFound { address } => NativeError::DeviceNotFound { address },
            BleBackendError::AdapterNotAvailable
            | BleBackendError::AdapterIndexOutOfRange { .. } => {
                NativeError::Unavailable(err.to_string())
            }
            BleBackendError::Btleplug(btleplug::Error::PermissionDenied) => {
                NativeError::Unavailable(err.to_string())
            }
            other => NativeError::failed(other.to_string()),
        }
    }
}

/// Result type for backend internals
pub type Result<T> = std::result::Result<T, BleBackendError>;
