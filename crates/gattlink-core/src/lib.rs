//! Gattlink Core
//!
//! A backend-agnostic GATT client. A [`GattSession`] connects to one remote
//! BLE peripheral by address, discovers its services and characteristics and
//! hands out [`Characteristic`] handles for reads, writes and notifications.
//!
//! ## Architecture
//!
//! - [`native`] - the traits a platform Bluetooth stack implements
//! - [`session`] - connection state machine, discovery and disconnect routing
//! - [`characteristic`] - per-characteristic I/O and notification observers
//! - [`completion`] - the single-shot completion contract for callback APIs
//! - [`config`] - construction options (`mac`, `address-type`)
//! - [`errors`] - configuration, native and operation errors
//!
//! Every operation comes in two forms: an `async fn` returning a
//! [`GattResult`], and a callback form (`*_async`) that invokes its
//! completion exactly once on the session's runtime.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gattlink_core::{uuid_from_u16, GattSession, NativeBackend};
//!
//! # async fn example(backend: Arc<dyn NativeBackend>) -> Result<(), Box<dyn std::error::Error>> {
//! let session = GattSession::from_pairs(backend, [("mac", "AA:BB:CC:DD:EE:FF")])?;
//! session.connect().await?;
//!
//! let model = session
//!     .lookup_characteristic(uuid_from_u16(0x180a), uuid_from_u16(0x2a24))
//!     .await?;
//! if let Some(model) = model {
//!     println!("model: {}", String::from_utf8_lossy(&model.read().await?));
//! }
//!
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

mod cache;
pub mod characteristic;
pub mod completion;
pub mod config;
pub mod errors;
pub mod native;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use characteristic::Characteristic;
pub use completion::Completion;
pub use config::GattOptions;
pub use errors::{ConfigError, GattError, GattOperation, GattResult, NativeError};
pub use native::{DisconnectHandler, NativeBackend, NativeLink, ObserverId, ValueHandler};
pub use session::GattSession;
pub use types::{
    uuid_from_u16, AddressType, CharacteristicRef, ConnectionState, DisconnectReason, WriteType,
};

// Re-exported so backends and callers agree on the identifier type
pub use uuid::Uuid;
