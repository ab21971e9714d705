//! Established btleplug links
//!
//! btleplug discovers services and characteristics of a peripheral in one
//! pass and exposes value changes as a single notification stream per
//! peripheral. Both that stream and the adapter event stream are opened by
//! the backend before the link is handed out, so nothing emitted between
//! connect and observer registration is lost. One pump task per stream fans
//! events out to the registered observers.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    CentralEvent, Characteristic, Peripheral as _, Service, ValueNotification,
    WriteType as BleWriteType,
};
use btleplug::platform::{Peripheral, PeripheralId};
use futures::stream::{BoxStream, Stream, StreamExt};
use gattlink_core::{
    CharacteristicRef, DisconnectHandler, DisconnectReason, NativeError, NativeLink, ObserverId,
    ValueHandler, WriteType,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BleBackendError, Result};

// ----------------------------------------------------------------------------
// Observer Registry
// ----------------------------------------------------------------------------

/// Observers registered on a link, shared with its pump tasks
#[derive(Default)]
struct ObserverRegistry {
    values: HashMap<ObserverId, (Uuid, ValueHandler)>,
    disconnects: HashMap<ObserverId, DisconnectHandler>,
    /// Set once the adapter reported this peripheral as disconnected
    lost: bool,
}

impl ObserverRegistry {
    fn value_handlers(&self, uuid: Uuid) -> Vec<ValueHandler> {
        self.values
            .values()
            .filter(|(target, _)| *target == uuid)
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    /// Register a disconnect observer; returns whether the link is already lost
    fn add_disconnect(&mut self, id: ObserverId, handler: DisconnectHandler) -> bool {
        self.disconnects.insert(id, handler);
        self.lost
    }

    /// Record the loss and hand back the observers to notify, at most once
    fn mark_lost(&mut self) -> Vec<DisconnectHandler> {
        if self.lost {
            return Vec::new();
        }
        self.lost = true;
        self.disconnects.values().cloned().collect()
    }

    fn remove(&mut self, id: ObserverId) {
        self.values.remove(&id);
        self.disconnects.remove(&id);
    }
}

type SharedRegistry = Arc<Mutex<ObserverRegistry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, ObserverRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deliver each notification to the observers of its characteristic
async fn pump_notifications<S>(mut notifications: S, registry: SharedRegistry)
where
    S: Stream<Item = ValueNotification> + Unpin,
{
    while let Some(data) = notifications.next().await {
        let handlers = lock(&registry).value_handlers(data.uuid);
        for handler in handlers {
            handler(&data.value);
        }
    }
    debug!("Notification stream ended");
}

/// Watch adapter events until this peripheral disconnects
async fn pump_events(
    mut events: BoxStream<'static, CentralEvent>,
    peripheral_id: PeripheralId,
    registry: SharedRegistry,
) {
    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(id) = event {
            if id == peripheral_id {
                debug!("Peripheral {:?} disconnected", id);
                let handlers = lock(&registry).mark_lost();
                for handler in handlers {
                    handler(DisconnectReason::LinkLost { status: None });
                }
                break;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Link Implementation
// ----------------------------------------------------------------------------

/// One connected btleplug peripheral
pub struct BtleplugLink {
    peripheral: Peripheral,
    operation_timeout: Duration,
    registry: SharedRegistry,
    next_observer: AtomicU64,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl BtleplugLink {
    /// Wrap a connected peripheral and start pumping the pre-opened streams
    pub(crate) fn new(
        peripheral: Peripheral,
        events: BoxStream<'static, CentralEvent>,
        notifications: BoxStream<'static, ValueNotification>,
        runtime: &Handle,
        operation_timeout: Duration,
    ) -> Self {
        let registry = SharedRegistry::default();
        let pumps = vec![
            runtime.spawn(pump_notifications(notifications, registry.clone())),
            runtime.spawn(pump_events(events, peripheral.id(), registry.clone())),
        ];
        Self {
            peripheral,
            operation_timeout,
            registry,
            next_observer: AtomicU64::new(1),
            pumps: Mutex::new(pumps),
        }
    }

    fn next_id(&self) -> ObserverId {
        ObserverId::new(self.next_observer.fetch_add(1, Ordering::Relaxed))
    }

    fn stop_pumps(&self) {
        let pumps: Vec<JoinHandle<()>> = self
            .pumps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for pump in pumps {
            pump.abort();
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, btleplug::Error>>,
    {
        match timeout(self.operation_timeout, fut).await {
            Ok(result) => result.map_err(BleBackendError::from),
            Err(_) => Err(BleBackendError::Timeout {
                operation,
                after: self.operation_timeout,
            }),
        }
    }

    /// Resolve a characteristic, refreshing discovery once if it is unknown
    async fn characteristic(&self, id: CharacteristicRef) -> Result<Characteristic> {
        if let Some(found) = find_characteristic(&self.peripheral.services(), id) {
            return Ok(found);
        }
        self.bounded("service discovery", self.peripheral.discover_services())
            .await?;
        find_characteristic(&self.peripheral.services(), id)
            .ok_or(BleBackendError::CharacteristicNotFound { uuid: id.uuid })
    }
}

/// Find `id` among discovered services
pub(crate) fn find_characteristic(
    services: &BTreeSet<Service>,
    id: CharacteristicRef,
) -> Option<Characteristic> {
    services
        .iter()
        .filter(|service| service.uuid == id.service)
        .flat_map(|service| service.characteristics.iter())
        .find(|characteristic| characteristic.uuid == id.uuid)
        .cloned()
}

fn characteristic_uuids(services: &BTreeSet<Service>, service: Uuid) -> Option<Vec<Uuid>> {
    services
        .iter()
        .find(|s| s.uuid == service)
        .map(|s| s.characteristics.iter().map(|c| c.uuid).collect())
}

#[async_trait]
impl NativeLink for BtleplugLink {
    async fn list_services(&self) -> std::result::Result<Vec<Uuid>, NativeError> {
        self.bounded("service discovery", self.peripheral.discover_services())
            .await?;
        Ok(self
            .peripheral
            .services()
            .iter()
            .filter(|service| service.primary)
            .map(|service| service.uuid)
            .collect())
    }

    async fn list_characteristics(
        &self,
        service: Uuid,
    ) -> std::result::Result<Vec<Uuid>, NativeError> {
        if let Some(uuids) = characteristic_uuids(&self.peripheral.services(), service) {
            return Ok(uuids);
        }
        self.bounded("characteristic discovery", self.peripheral.discover_services())
            .await?;
        Ok(characteristic_uuids(&self.peripheral.services(), service).unwrap_or_default())
    }

    async fn read(&self, id: CharacteristicRef) -> std::result::Result<Vec<u8>, NativeError> {
        let characteristic = self.characteristic(id).await?;
        Ok(self
            .bounded("read", self.peripheral.read(&characteristic))
            .await?)
    }

    async fn write(
        &self,
        id: CharacteristicRef,
        value: &[u8],
        write_type: WriteType,
    ) -> std::result::Result<(), NativeError> {
        let characteristic = self.characteristic(id).await?;
        let write_type = match write_type {
            WriteType::WithResponse => BleWriteType::WithResponse,
            WriteType::WithoutResponse => BleWriteType::WithoutResponse,
        };
        Ok(self
            .bounded(
                "write",
                self.peripheral.write(&characteristic, value, write_type),
            )
            .await?)
    }

    async fn set_notification_config(
        &self,
        id: CharacteristicRef,
        enabled: bool,
    ) -> std::result::Result<(), NativeError> {
        let characteristic = self.characteristic(id).await?;
        if enabled {
            self.bounded("subscribe", self.peripheral.subscribe(&characteristic))
                .await?;
        } else {
            self.bounded("unsubscribe", self.peripheral.unsubscribe(&characteristic))
                .await?;
        }
        Ok(())
    }

    fn observe_value_changes(&self, id: CharacteristicRef, handler: ValueHandler) -> ObserverId {
        let observer = self.next_id();
        lock(&self.registry)
            .values
            .insert(observer, (id.uuid, handler));
        observer
    }

    fn observe_disconnect(&self, handler: DisconnectHandler) -> ObserverId {
        let observer = self.next_id();
        let lost = lock(&self.registry).add_disconnect(observer, handler.clone());
        if lost {
            handler(DisconnectReason::LinkLost { status: None });
        }
        observer
    }

    fn remove_observer(&self, id: ObserverId) {
        lock(&self.registry).remove(id);
    }

    async fn release(&self) {
        self.stop_pumps();
        {
            let mut registry = lock(&self.registry);
            registry.values.clear();
            registry.disconnects.clear();
        }

        match self.peripheral.is_connected().await {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => debug!("Could not query link state: {}", e),
        }
        if let Err(e) = self.bounded("disconnect", self.peripheral.disconnect()).await {
            warn!("Failed to disconnect peripheral: {}", e);
        }
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.stop_pumps();
    }
}
