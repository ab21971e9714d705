//! Native backend adapter interface
//!
//! A backend binds the session layer to one operating-system Bluetooth stack.
//! It is split in two:
//!
//! - [`NativeBackend`] establishes links by device address
//! - [`NativeLink`] is one established link, exposing discovery, I/O and
//!   event observation for that device
//!
//! Every async primitive reports exactly one of a success payload or a
//! [`NativeError`]. Observers are plain closures; the backend may invoke them
//! from whatever thread its event dispatch uses.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::NativeError;
use crate::types::{AddressType, CharacteristicRef, DisconnectReason, WriteType};

/// Observer for characteristic value changes
pub type ValueHandler = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Observer for device-level disconnect events
pub type DisconnectHandler = Arc<dyn Fn(DisconnectReason) + Send + Sync + 'static>;

/// Token identifying a registered native observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

// ----------------------------------------------------------------------------
// Backend Traits
// ----------------------------------------------------------------------------

/// Entry point of a native Bluetooth stack
#[async_trait]
pub trait NativeBackend: Send + Sync + 'static {
    /// Short name of the backend, used in log output
    fn name(&self) -> &str;

    /// Establish a link to the device at `address`
    async fn connect_by_address(
        &self,
        address: &str,
        address_type: AddressType,
    ) -> Result<Arc<dyn NativeLink>, NativeError>;
}

/// One established link to a remote device
#[async_trait]
pub trait NativeLink: Send + Sync + 'static {
    /// Enumerate the primary services of the device
    async fn list_services(&self) -> Result<Vec<Uuid>, NativeError>;

    /// Enumerate the characteristics of `service`
    async fn list_characteristics(&self, service: Uuid) -> Result<Vec<Uuid>, NativeError>;

    async fn read(&self, characteristic: CharacteristicRef) -> Result<Vec<u8>, NativeError>;

    async fn write(
        &self,
        characteristic: CharacteristicRef,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), NativeError>;

    /// Write the client characteristic configuration descriptor
    async fn set_notification_config(
        &self,
        characteristic: CharacteristicRef,
        enabled: bool,
    ) -> Result<(), NativeError>;

    /// Register `handler` for value changes of `characteristic`
    fn observe_value_changes(
        &self,
        characteristic: CharacteristicRef,
        handler: ValueHandler,
    ) -> ObserverId;

    /// Register `handler` for the link going down out-of-band
    fn observe_disconnect(&self, handler: DisconnectHandler) -> ObserverId;

    /// Unregister an observer; unknown ids are ignored
    fn remove_observer(&self, id: ObserverId);

    /// Tear the link down and release native resources
    async fn release(&self);
}
