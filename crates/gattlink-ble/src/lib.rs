//! btleplug backend for gattlink
//!
//! This crate implements the native backend traits from `gattlink-core` on
//! top of btleplug, so GATT sessions can talk to real peripherals through the
//! host Bluetooth stack (BlueZ, CoreBluetooth or WinRT).
//!
//! ## Architecture
//!
//! - [`config`] - scan, connection and operation timeouts, adapter selection
//! - [`error`] - backend errors and their mapping to native errors
//! - [`backend`] - adapter handling and device lookup by address
//! - [`link`] - discovery, I/O and event observation for one peripheral
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gattlink_ble::{BleBackendConfig, BtleplugBackend};
//! use gattlink_core::GattSession;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = BtleplugBackend::new(BleBackendConfig::default()).await?;
//! let session = GattSession::from_pairs(
//!     Arc::new(backend),
//!     [("mac", "F1:4A:45:90:AC:9D"), ("address-type", "random")],
//! )?;
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod link;

// Public API exports
pub use backend::BtleplugBackend;
pub use config::BleBackendConfig;
pub use error::BleBackendError;
pub use link::BtleplugLink;
