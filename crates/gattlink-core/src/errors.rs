//! Error types for GATT sessions
//!
//! Errors fall into three groups:
//! - [`ConfigError`] is returned synchronously while building a session
//! - [`NativeError`] is what a native backend reports at the adapter boundary
//! - [`GattError`] is what callers receive through completions, carrying a
//!   human-readable description of the failed operation

use std::fmt;

use uuid::Uuid;

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors raised while validating session construction options
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid gatt option '{key}'")]
    UnknownOption { key: String },

    #[error("required option '{key}' was not set")]
    MissingOption { key: String },

    #[error("invalid value for 'address-type' option: '{value}' is not one of [public, random, unspecified]")]
    InvalidAddressType { value: String },

    #[error("invalid device address '{value}': expected six colon separated hex octets")]
    InvalidAddress { value: String },

    #[error("no async runtime available to dispatch completions")]
    NoRuntime,
}

// ----------------------------------------------------------------------------
// Native Adapter Errors
// ----------------------------------------------------------------------------

/// Failure reported by a native backend primitive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    /// The native operation failed; `status` carries the platform code if any
    #[error("{}", describe_failure(.reason, .status))]
    Failed { reason: String, status: Option<i32> },

    /// The native operation was aborted before it produced a result
    #[error("operation cancelled")]
    Cancelled,

    /// No remote device matched the requested address
    #[error("no device with address {address}")]
    DeviceNotFound { address: String },

    /// The native stack is missing or powered off
    #[error("bluetooth unavailable: {0}")]
    Unavailable(String),
}

impl NativeError {
    /// Shorthand for a failure without a platform status code
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            status: None,
        }
    }

    /// Shorthand for a failure carrying a platform status code
    pub fn with_status(reason: impl Into<String>, status: i32) -> Self {
        Self::Failed {
            reason: reason.into(),
            status: Some(status),
        }
    }
}

fn describe_failure(reason: &str, status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("{} (status = {})", reason, code),
        None => reason.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Operation Errors
// ----------------------------------------------------------------------------

/// The GATT operation a native failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattOperation {
    Connect,
    ServiceDiscovery,
    CharacteristicDiscovery,
    Read,
    Write,
    EditNotifications { enabled: bool },
}

impl fmt::Display for GattOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GattOperation::Connect => write!(f, "connect"),
            GattOperation::ServiceDiscovery => write!(f, "service discovery"),
            GattOperation::CharacteristicDiscovery => write!(f, "characteristic discovery"),
            GattOperation::Read => write!(f, "read"),
            GattOperation::Write => write!(f, "write"),
            GattOperation::EditNotifications { enabled } => {
                write!(f, "edit notifications ({})", notify_label(*enabled))
            }
        }
    }
}

fn notify_label(enabled: bool) -> &'static str {
    if enabled {
        "notify"
    } else {
        "none"
    }
}

/// Errors delivered through operation completions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GattError {
    /// A native link, discovery, read or write failure
    #[error("{0}")]
    Transport(String),

    /// A native operation that was aborted, or an operation whose session was
    /// torn down while it was in flight
    #[error("{0}")]
    Cancelled(String),

    #[error("Connection already in progress")]
    ConnectionInProgress,

    #[error("Session is not connected")]
    NotConnected,

    /// The characteristic was released by a session cleanup
    #[error("Gatt characteristic {uuid} has been released")]
    Released { uuid: Uuid },
}

impl GattError {
    /// Convert a native failure into the descriptive error for `operation`
    pub fn native(operation: GattOperation, err: NativeError) -> Self {
        match (operation, err) {
            (GattOperation::Connect, NativeError::Cancelled) => {
                GattError::Cancelled("Gatt connect cancelled".into())
            }
            (GattOperation::Connect, NativeError::DeviceNotFound { address }) => {
                GattError::Transport(format!(
                    "Failed to discover device (no peripheral with address {})",
                    address
                ))
            }
            (GattOperation::Connect, e) => {
                GattError::Transport(format!("Failed to connect to remote device ({})", e))
            }
            (GattOperation::ServiceDiscovery, NativeError::Cancelled) => {
                GattError::Cancelled("Gatt service discovery cancelled".into())
            }
            (GattOperation::ServiceDiscovery, e) => {
                GattError::Transport(format!("Failed to discover gatt services ({})", e))
            }
            (GattOperation::CharacteristicDiscovery, NativeError::Cancelled) => {
                GattError::Cancelled("Gatt characteristic discovery cancelled".into())
            }
            (GattOperation::CharacteristicDiscovery, e) => {
                GattError::Transport(format!("Failed to discover gatt characteristics ({})", e))
            }
            (GattOperation::Read, NativeError::Cancelled) => {
                GattError::Cancelled("Gatt characteristic read cancelled".into())
            }
            (GattOperation::Read, e) => {
                GattError::Transport(format!("Failed to read gatt characteristic value ({})", e))
            }
            (GattOperation::Write, NativeError::Cancelled) => {
                GattError::Cancelled("Gatt characteristic write cancelled".into())
            }
            (GattOperation::Write, e) => {
                GattError::Transport(format!("Failed to write gatt characteristic value ({})", e))
            }
            (GattOperation::EditNotifications { enabled }, NativeError::Cancelled) => {
                GattError::Cancelled(format!(
                    "Edit characteristic configuration ({}) cancelled",
                    notify_label(enabled)
                ))
            }
            (GattOperation::EditNotifications { enabled }, e) => GattError::Transport(format!(
                "Failed to edit characteristic configuration ({}) ({})",
                notify_label(enabled),
                e
            )),
        }
    }

    /// Error for an operation whose session went away before it finished
    pub fn aborted(operation: GattOperation) -> Self {
        GattError::Cancelled(format!("Gatt {} aborted by disconnect", operation))
    }

    /// Whether this error stems from cancellation or cleanup rather than a
    /// native failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GattError::Cancelled(_) | GattError::Released { .. })
    }
}

/// Result type for GATT operations
pub type GattResult<T> = core::result::Result<T, GattError>;
