//! Value types shared by sessions, characteristics and native backends

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ConfigError;

// ----------------------------------------------------------------------------
// Address Type
// ----------------------------------------------------------------------------

/// How the native stack should interpret a device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Public,
    #[default]
    Random,
    Unspecified,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Public => "public",
            AddressType::Random => "random",
            AddressType::Unspecified => "unspecified",
        }
    }
}

impl FromStr for AddressType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AddressType::Public),
            "random" => Ok(AddressType::Random),
            "unspecified" => Ok(AddressType::Unspecified),
            other => Err(ConfigError::InvalidAddressType {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Session-level connection state
///
/// `Disconnected -> Connecting -> Discovering -> Connected -> Disconnected`.
/// A failure while `Connecting` or `Discovering` returns to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Waiting for the native link
    Connecting,
    /// Link is up, services and characteristics are being enumerated
    Discovering,
    Connected,
}

impl ConnectionState {
    /// Whether a link exists or is being established
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

// ----------------------------------------------------------------------------
// Disconnect Reason
// ----------------------------------------------------------------------------

/// Why a session left the connected state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The caller invoked `disconnect`
    Requested,
    /// The native stack reported the link as lost
    LinkLost { status: Option<i32> },
}

impl DisconnectReason {
    /// Whether the disconnect was initiated by the caller
    pub fn is_requested(&self) -> bool {
        matches!(self, DisconnectReason::Requested)
    }

    /// Numeric status, `0` for caller-initiated disconnects
    pub fn status(&self) -> i32 {
        match self {
            DisconnectReason::Requested => 0,
            DisconnectReason::LinkLost { status } => status.unwrap_or(-1),
        }
    }
}

// ----------------------------------------------------------------------------
// Characteristic Identity
// ----------------------------------------------------------------------------

/// Native write mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}

/// Address of one characteristic within the remote attribute table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicRef {
    /// UUID of the owning service
    pub service: Uuid,
    /// UUID of the characteristic itself
    pub uuid: Uuid,
}

impl CharacteristicRef {
    pub fn new(service: Uuid, uuid: Uuid) -> Self {
        Self { service, uuid }
    }
}

impl fmt::Display for CharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.uuid)
    }
}

/// Expand a 16-bit assigned number into the Bluetooth base UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5F9B_34FB)
}
