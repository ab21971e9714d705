//! btleplug backend configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug backend
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleBackendConfig {
    /// Maximum time to scan for a device that is not yet known to the adapter
    pub scan_timeout: Duration,
    /// Maximum time to wait for the link to come up
    pub connection_timeout: Duration,
    /// Maximum time for a single discovery, read, write or descriptor update
    pub operation_timeout: Duration,
    /// How often the adapter's peripheral list is polled while scanning
    pub scan_poll_interval: Duration,
    /// Which adapter to use when the host has several
    pub adapter_index: usize,
}

impl Default for BleBackendConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(10),
            scan_poll_interval: Duration::from_millis(250),
            adapter_index: 0,
        }
    }
}

impl BleBackendConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set per-operation timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_scan_poll_interval(mut self, interval: Duration) -> Self {
        self.scan_poll_interval = interval;
        self
    }

    /// Select the adapter by its position in the manager's adapter list
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }
}
