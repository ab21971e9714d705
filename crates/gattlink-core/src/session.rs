//! GATT session: one connection to one remote device
//!
//! A [`GattSession`] owns the connection state machine, the native link and
//! the discovery cache. Characteristic handles handed out by the session only
//! hold a weak back-reference, so dropping the last session clone releases
//! every native resource even if handles are still around.
//!
//! Shared state is guarded by a short-lived lock that is never held across an
//! await point. Continuations of async operations carry the session epoch
//! they started in; the epoch is bumped on every connect attempt and every
//! cleanup, so a continuation that resumes after a disconnect finds a
//! mismatch and reports a cancellation instead of touching the new state.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::GattCache;
use crate::characteristic::Characteristic;
use crate::completion::{dispatch, Completion};
use crate::config::GattOptions;
use crate::errors::{ConfigError, GattError, GattOperation, GattResult};
use crate::native::{DisconnectHandler, NativeBackend, NativeLink, ObserverId};
use crate::types::{AddressType, CharacteristicRef, ConnectionState, DisconnectReason};

// ----------------------------------------------------------------------------
// Shared Session State
// ----------------------------------------------------------------------------

pub(crate) struct SessionShared {
    options: GattOptions,
    backend: Arc<dyn NativeBackend>,
    runtime: Handle,
    state: RwLock<SessionState>,
    disconnect_handler: Mutex<Option<DisconnectHandler>>,
}

#[derive(Default)]
pub(crate) struct SessionState {
    pub connection: ConnectionState,
    /// Bumped on every connect attempt and every cleanup
    pub epoch: u64,
    pub link: Option<LinkSlot>,
    pub cache: GattCache,
}

pub(crate) struct LinkSlot {
    pub link: Arc<dyn NativeLink>,
    disconnect_observer: ObserverId,
}

/// Native resources detached from the session state, released after the
/// state lock is dropped
struct Teardown {
    link: Option<Arc<dyn NativeLink>>,
    value_observers: Vec<ObserverId>,
    disposed: Option<LinkSlot>,
}

impl SessionState {
    /// Clear both caches and leave the connected state
    ///
    /// With `dispose` the native link is detached as well; without it the
    /// link stays in place because the native side already severed it.
    fn cleanup(&mut self, dispose: bool) -> Teardown {
        let value_observers = self.cache.clear();
        self.epoch += 1;
        self.connection = ConnectionState::Disconnected;

        let link = self.link.as_ref().map(|slot| slot.link.clone());
        let disposed = if dispose { self.link.take() } else { None };

        Teardown {
            link,
            value_observers,
            disposed,
        }
    }
}

impl Teardown {
    fn run(self, runtime: &Handle) {
        if let Some(link) = &self.link {
            for observer in self.value_observers {
                link.remove_observer(observer);
            }
        }

        if let Some(slot) = self.disposed {
            slot.link.remove_observer(slot.disconnect_observer);
            let link = slot.link;
            runtime.spawn(async move {
                link.release().await;
            });
        }
    }
}

impl SessionShared {
    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` only if the session is still in `epoch`
    fn with_epoch<R>(
        &self,
        epoch: u64,
        operation: GattOperation,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> GattResult<R> {
        let mut state = self.write_state();
        if state.epoch != epoch {
            return Err(GattError::aborted(operation));
        }
        Ok(f(&mut state))
    }

    fn link_lost_handler(self: &Arc<Self>, epoch: u64) -> DisconnectHandler {
        let session = Arc::downgrade(self);
        Arc::new(move |reason| {
            if let Some(shared) = session.upgrade() {
                shared.handle_link_lost(epoch, reason);
            }
        })
    }

    /// Route a native link loss for the connect attempt `epoch`
    ///
    /// Applies while connecting and discovering too: the pending connect
    /// then finds a bumped epoch and completes with a cancellation.
    fn handle_link_lost(&self, epoch: u64, reason: DisconnectReason) {
        let teardown = {
            let mut state = self.write_state();
            if state.epoch != epoch || !state.connection.is_active() {
                return;
            }
            state.cleanup(false)
        };
        teardown.run(&self.runtime);

        info!("Link to {} lost ({:?})", self.options.mac, reason);
        self.notify_disconnect(reason);
    }

    fn notify_disconnect(&self, reason: DisconnectReason) {
        let handler = self
            .disconnect_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(reason);
        }
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.link.is_some() || !state.cache.is_empty() {
            debug!("Releasing session for {}", self.options.mac);
            state.cleanup(true).run(&self.runtime);
        }
    }
}

// ----------------------------------------------------------------------------
// Public Session Handle
// ----------------------------------------------------------------------------

/// A GATT client session with one remote device
///
/// Clones share the same session. The session is released when the last
/// clone is dropped; callers should `disconnect` first so that the
/// disconnect observer sees the transition.
#[derive(Clone)]
pub struct GattSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for GattSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattSession")
            .field("mac", &self.shared.options.mac)
            .field("address_type", &self.shared.options.address_type)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl GattSession {
    /// Create a session dispatching completions on the current tokio runtime
    pub fn new(backend: Arc<dyn NativeBackend>, options: GattOptions) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Self::with_runtime(backend, options, runtime)
    }

    /// Create a session from raw key/value options
    pub fn from_pairs<I, K, V>(backend: Arc<dyn NativeBackend>, pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::new(backend, GattOptions::from_pairs(pairs)?)
    }

    /// Create a session dispatching completions on `runtime`
    pub fn with_runtime(
        backend: Arc<dyn NativeBackend>,
        options: GattOptions,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        options.address_bytes()?;
        debug!(
            "Created session for {} ({}) on {} backend",
            options.mac,
            options.address_type,
            backend.name()
        );
        Ok(Self {
            shared: Arc::new(SessionShared {
                options,
                backend,
                runtime,
                state: RwLock::new(SessionState::default()),
                disconnect_handler: Mutex::new(None),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Device address this session targets
    pub fn address(&self) -> &str {
        &self.shared.options.mac
    }

    pub fn address_type(&self) -> AddressType {
        self.shared.options.address_type
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.read_state().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    // ------------------------------------------------------------------------
    // Connection Lifecycle
    // ------------------------------------------------------------------------

    /// Establish the link and discover every service and characteristic
    ///
    /// Succeeds immediately when already connected. Services are enumerated
    /// one at a time; the first failure discards everything discovered so far.
    pub async fn connect(&self) -> GattResult<()> {
        let (epoch, stale) = {
            let mut state = self.shared.write_state();
            match state.connection {
                ConnectionState::Connected => {
                    debug!("Session for {} already connected", self.address());
                    return Ok(());
                }
                ConnectionState::Connecting | ConnectionState::Discovering => {
                    return Err(GattError::ConnectionInProgress);
                }
                ConnectionState::Disconnected => {}
            }
            // A link severed out-of-band is still held; drop it before relinking
            let stale = state.cleanup(true);
            state.connection = ConnectionState::Connecting;
            (state.epoch, stale)
        };
        stale.run(&self.shared.runtime);

        info!(
            "Connecting to {} ({}) via {}",
            self.address(),
            self.address_type(),
            self.shared.backend.name()
        );

        let link = match self
            .shared
            .backend
            .connect_by_address(self.address(), self.address_type())
            .await
        {
            Ok(link) => link,
            Err(e) => {
                return Err(self.fail_connect(epoch, GattError::native(GattOperation::Connect, e)))
            }
        };

        let observer = link.observe_disconnect(self.shared.link_lost_handler(epoch));
        let installed = self.shared.with_epoch(epoch, GattOperation::Connect, |state| {
            state.link = Some(LinkSlot {
                link: link.clone(),
                disconnect_observer: observer,
            });
            state.connection = ConnectionState::Discovering;
        });
        if let Err(e) = installed {
            // Disconnected or lost while the link was being established
            link.remove_observer(observer);
            link.release().await;
            return Err(e);
        }

        if let Err(e) = self.discover_all(&link, epoch).await {
            return Err(self.fail_connect(epoch, e));
        }

        let services = self.shared.with_epoch(epoch, GattOperation::Connect, |state| {
            state.connection = ConnectionState::Connected;
            state.cache.service_uuids().len()
        })?;
        info!("Connected to {} ({} services)", self.address(), services);
        Ok(())
    }

    /// Callback form of [`connect`](Self::connect)
    pub fn connect_async<F>(&self, on_done: F)
    where
        F: FnOnce(GattResult<()>) + Send + 'static,
    {
        let session = self.clone();
        dispatch(
            &self.shared.runtime,
            async move { session.connect().await },
            Completion::new(on_done),
        );
    }

    async fn discover_all(&self, link: &Arc<dyn NativeLink>, epoch: u64) -> GattResult<()> {
        let services = link
            .list_services()
            .await
            .map_err(|e| GattError::native(GattOperation::ServiceDiscovery, e))?;
        debug!("Discovered {} services on {}", services.len(), self.address());

        for service in services {
            self.shared
                .with_epoch(epoch, GattOperation::ServiceDiscovery, |state| {
                    state.cache.insert_service(service)
                })?;

            let characteristics = link
                .list_characteristics(service)
                .await
                .map_err(|e| GattError::native(GattOperation::CharacteristicDiscovery, e))?;
            debug!(
                "Service {} has {} characteristics",
                service,
                characteristics.len()
            );

            self.shared
                .with_epoch(epoch, GattOperation::CharacteristicDiscovery, |state| {
                    state.cache.insert_characteristics(service, &characteristics)
                })?;
        }
        Ok(())
    }

    fn fail_connect(&self, epoch: u64, err: GattError) -> GattError {
        let teardown = {
            let mut state = self.shared.write_state();
            if state.epoch != epoch {
                return GattError::aborted(GattOperation::Connect);
            }
            state.cleanup(true)
        };
        teardown.run(&self.shared.runtime);
        warn!("Connect to {} failed: {}", self.address(), err);
        err
    }

    /// Tear the session down and notify the disconnect observer
    ///
    /// Safe to call in any state and any number of times; the observer only
    /// fires when the session was not already disconnected.
    pub fn disconnect(&self) {
        let (was_active, teardown) = {
            let mut state = self.shared.write_state();
            let was_active = state.connection.is_active();
            (was_active, state.cleanup(true))
        };
        teardown.run(&self.shared.runtime);

        if was_active {
            info!("Disconnected from {}", self.address());
            self.shared.notify_disconnect(DisconnectReason::Requested);
        }
    }

    /// Register the disconnect observer, replacing any previous one
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(DisconnectReason) + Send + Sync + 'static,
    {
        *self
            .shared
            .disconnect_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Look up a discovered characteristic without touching the device
    pub fn find_characteristic(&self, uuid: &Uuid) -> Option<Characteristic> {
        let state = self.shared.read_state();
        state
            .cache
            .characteristic(uuid)
            .map(|entry| self.handle(entry.id, state.epoch))
    }

    /// Find a characteristic, enumerating `service` on demand
    ///
    /// Returns `Ok(None)` when the service is unknown or does not expose the
    /// characteristic; native failures are returned as errors.
    pub async fn lookup_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> GattResult<Option<Characteristic>> {
        let (link, epoch) = {
            let state = self.shared.read_state();
            if let Some(entry) = state.cache.characteristic(&characteristic) {
                return Ok(Some(self.handle(entry.id, state.epoch)));
            }
            if !state.cache.contains_service(&service) {
                return Ok(None);
            }
            match &state.link {
                Some(slot) => (slot.link.clone(), state.epoch),
                None => return Ok(None),
            }
        };

        let uuids = link
            .list_characteristics(service)
            .await
            .map_err(|e| GattError::native(GattOperation::CharacteristicDiscovery, e))?;

        let mut state = self.shared.write_state();
        if state.epoch != epoch {
            return Err(GattError::aborted(GattOperation::CharacteristicDiscovery));
        }
        let added = state.cache.insert_characteristics(service, &uuids);
        if added > 0 {
            debug!("Merged {} characteristics of {}", added, service);
        }
        Ok(state
            .cache
            .characteristic(&characteristic)
            .map(|entry| self.handle(entry.id, epoch)))
    }

    /// Callback form of [`lookup_characteristic`](Self::lookup_characteristic)
    ///
    /// Always resolves asynchronously, even for cached characteristics.
    /// Transport failures resolve with `None`, like a characteristic that
    /// does not exist.
    pub fn find_characteristic_async<F>(&self, service: Uuid, characteristic: Uuid, on_done: F)
    where
        F: FnOnce(Option<Characteristic>) + Send + 'static,
    {
        let session = self.clone();
        let completion = Completion::new(move |result: GattResult<Option<Characteristic>>| {
            match result {
                Ok(found) => on_done(found),
                Err(e) => {
                    warn!("Lookup of {}/{} failed: {}", service, characteristic, e);
                    on_done(None)
                }
            }
        });
        dispatch(
            &self.shared.runtime,
            async move { session.lookup_characteristic(service, characteristic).await },
            completion,
        );
    }

    /// Whether `uuid` was discovered; never triggers discovery
    pub fn service_exists(&self, uuid: &Uuid) -> bool {
        self.shared.read_state().cache.contains_service(uuid)
    }

    /// UUIDs of every discovered service
    pub fn services(&self) -> Vec<Uuid> {
        self.shared.read_state().cache.service_uuids()
    }

    /// Characteristics discovered under `service`, in discovery order
    pub fn service_characteristics(&self, service: &Uuid) -> Vec<Characteristic> {
        let state = self.shared.read_state();
        let Some(handle) = state.cache.service(service) else {
            return Vec::new();
        };
        handle
            .characteristics
            .iter()
            .filter_map(|uuid| state.cache.characteristic(uuid))
            .map(|entry| self.handle(entry.id, state.epoch))
            .collect()
    }

    /// Handles for every discovered characteristic
    pub fn characteristics(&self) -> Vec<Characteristic> {
        let state = self.shared.read_state();
        state
            .cache
            .characteristic_refs()
            .into_iter()
            .map(|id| self.handle(id, state.epoch))
            .collect()
    }

    fn handle(&self, id: CharacteristicRef, epoch: u64) -> Characteristic {
        Characteristic::new(id, epoch, self.downgrade(), self.shared.runtime.clone())
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionShared> {
        Arc::downgrade(&self.shared)
    }
}
