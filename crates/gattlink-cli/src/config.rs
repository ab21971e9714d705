//! gattlink CLI configuration
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! [device]
//! mac = "F1:4A:45:90:AC:9D"
//! address-type = "random"
//!
//! [ble]
//! adapter_index = 0
//! ```
//!
//! Device options on the command line take priority over the file, and
//! `-o key=value` options take priority over both.

use std::path::Path;

use gattlink_ble::BleBackendConfig;
use gattlink_core::config::{OPTION_ADDRESS_TYPE, OPTION_MAC};
use serde::{Deserialize, Serialize};

use crate::cli::{parse_option, Cli};
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the gattlink CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Target device
    pub device: DeviceConfig,

    /// Native backend configuration
    pub ble: BleBackendConfig,
}

/// Target device options, passed to the session as key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub mac: Option<String>,

    #[serde(rename = "address-type")]
    pub address_type: Option<String>,
}

impl CliConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Session options from the file, overridden by the command line
    pub fn session_options(&self, cli: &Cli) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();

        let mac = cli.mac.as_ref().or(self.device.mac.as_ref());
        if let Some(mac) = mac {
            pairs.push((OPTION_MAC.to_string(), mac.clone()));
        }
        let address_type = cli
            .address_type
            .as_ref()
            .or(self.device.address_type.as_ref());
        if let Some(address_type) = address_type {
            pairs.push((OPTION_ADDRESS_TYPE.to_string(), address_type.clone()));
        }

        for option in &cli.options {
            let pair = parse_option(option).ok_or_else(|| {
                CliError::Config(format!("expected KEY=VALUE, got '{}'", option))
            })?;
            pairs.push(pair);
        }
        Ok(pairs)
    }
}
