//! Error handling for the gattlink CLI

use gattlink_core::Uuid;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid session options: {0}")]
    Options(#[from] gattlink_core::ConfigError),

    #[error("{0}")]
    Gatt(#[from] gattlink_core::GattError),

    #[error("Bluetooth backend error: {0}")]
    Backend(#[from] gattlink_ble::BleBackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
