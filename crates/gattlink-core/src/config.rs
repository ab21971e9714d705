//! Session construction options
//!
//! A session is created from a small key/value option set:
//!
//! | key            | value                                   |
//! |----------------|-----------------------------------------|
//! | `mac`          | device address, `AA:BB:CC:DD:EE:FF`     |
//! | `address-type` | `public`, `random` (default), `unspecified` |
//!
//! Unknown keys and a missing `mac` are rejected with a [`ConfigError`].

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::AddressType;

/// Option key for the device address
pub const OPTION_MAC: &str = "mac";

/// Option key for the address type
pub const OPTION_ADDRESS_TYPE: &str = "address-type";

// ----------------------------------------------------------------------------
// Session Options
// ----------------------------------------------------------------------------

/// Validated options identifying the remote device of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GattOptions {
    /// Device address in colon separated hex form
    pub mac: String,
    /// How the remote address should be interpreted by the native stack
    #[serde(rename = "address-type", default)]
    pub address_type: AddressType,
}

impl GattOptions {
    /// Create options for `mac` with the default (random) address type
    pub fn new(mac: impl Into<String>) -> Result<Self, ConfigError> {
        let mac = mac.into();
        validate_mac(&mac)?;
        Ok(Self {
            mac,
            address_type: AddressType::default(),
        })
    }

    /// Set the address type
    pub fn with_address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = address_type;
        self
    }

    /// Parse options from key/value pairs
    ///
    /// Later occurrences of a key override earlier ones.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut mac: Option<String> = None;
        let mut address_type = AddressType::default();

        for (key, value) in pairs {
            match key.as_ref() {
                OPTION_MAC => mac = Some(value.as_ref().to_string()),
                OPTION_ADDRESS_TYPE => address_type = value.as_ref().parse()?,
                other => {
                    return Err(ConfigError::UnknownOption {
                        key: other.to_string(),
                    })
                }
            }
        }

        let mac = mac.ok_or_else(|| ConfigError::MissingOption {
            key: OPTION_MAC.to_string(),
        })?;

        Ok(Self::new(mac)?.with_address_type(address_type))
    }

    /// Device address as six bytes, most significant first
    pub fn address_bytes(&self) -> Result<[u8; 6], ConfigError> {
        parse_mac(&self.mac)
    }
}

fn validate_mac(mac: &str) -> Result<(), ConfigError> {
    parse_mac(mac).map(|_| ())
}

fn parse_mac(mac: &str) -> Result<[u8; 6], ConfigError> {
    let invalid = || ConfigError::InvalidAddress {
        value: mac.to_string(),
    };

    let mut bytes = [0u8; 6];
    let mut parts = mac.split(':');
    for byte in bytes.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(bytes)
}
