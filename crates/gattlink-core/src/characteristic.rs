//! Characteristic handles
//!
//! A [`Characteristic`] is a lightweight, clonable reference into the cache
//! of the session that discovered it. Operations are valid while that session
//! stays connected; once the session cleans up (or is dropped) every handle
//! from the previous connection reports [`GattError::Released`].
//!
//! In-flight operations keep only the native link alive, never the session,
//! so a session can be destroyed while a read is pending and the read still
//! completes exactly once.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tracing::debug;
use uuid::Uuid;

use crate::completion::{dispatch, Completion};
use crate::errors::{GattError, GattOperation, GattResult};
use crate::native::{NativeLink, ValueHandler};
use crate::session::{GattSession, SessionShared};
use crate::types::{CharacteristicRef, WriteType};

/// Handle to one discovered GATT characteristic
#[derive(Debug, Clone)]
pub struct Characteristic {
    id: CharacteristicRef,
    epoch: u64,
    session: Weak<SessionShared>,
    runtime: Handle,
}

impl Characteristic {
    pub(crate) fn new(
        id: CharacteristicRef,
        epoch: u64,
        session: Weak<SessionShared>,
        runtime: Handle,
    ) -> Self {
        Self {
            id,
            epoch,
            session,
            runtime,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.id.uuid
    }

    /// UUID of the service this characteristic was discovered under
    pub fn service_uuid(&self) -> Uuid {
        self.id.service
    }

    pub fn id(&self) -> CharacteristicRef {
        self.id
    }

    /// The owning session, if it is still alive
    pub fn session(&self) -> Option<GattSession> {
        self.session.upgrade().map(GattSession::from_shared)
    }

    /// Whether the handle still belongs to the current connection
    pub fn is_valid(&self) -> bool {
        self.link().is_ok()
    }

    fn released(&self) -> GattError {
        GattError::Released { uuid: self.id.uuid }
    }

    fn link(&self) -> GattResult<Arc<dyn NativeLink>> {
        let shared = self.session.upgrade().ok_or_else(|| self.released())?;
        let state = shared.read_state();
        if state.epoch != self.epoch || state.cache.characteristic(&self.id.uuid).is_none() {
            return Err(self.released());
        }
        let link = state.link.as_ref().map(|slot| slot.link.clone());
        link.ok_or(GattError::NotConnected)
    }

    // ------------------------------------------------------------------------
    // Value I/O
    // ------------------------------------------------------------------------

    /// Read the current value
    pub async fn read(&self) -> GattResult<Vec<u8>> {
        let link = self.link()?;
        let value = link
            .read(self.id)
            .await
            .map_err(|e| GattError::native(GattOperation::Read, e))?;
        debug!("Read {} bytes from {}", value.len(), self.id.uuid);
        Ok(value)
    }

    /// Write `value` and wait for the acknowledgement
    pub async fn write(&self, value: &[u8]) -> GattResult<()> {
        self.write_with(value, WriteType::WithResponse).await
    }

    /// Write `value` without requesting an acknowledgement
    pub async fn write_without_response(&self, value: &[u8]) -> GattResult<()> {
        self.write_with(value, WriteType::WithoutResponse).await
    }

    async fn write_with(&self, value: &[u8], write_type: WriteType) -> GattResult<()> {
        let link = self.link()?;
        link.write(self.id, value, write_type)
            .await
            .map_err(|e| GattError::native(GattOperation::Write, e))?;
        debug!(
            "Wrote {} bytes to {} ({:?})",
            value.len(),
            self.id.uuid,
            write_type
        );
        Ok(())
    }

    pub async fn enable_notifications(&self) -> GattResult<()> {
        self.set_notifications(true).await
    }

    pub async fn disable_notifications(&self) -> GattResult<()> {
        self.set_notifications(false).await
    }

    async fn set_notifications(&self, enabled: bool) -> GattResult<()> {
        let link = self.link()?;
        link.set_notification_config(self.id, enabled)
            .await
            .map_err(|e| GattError::native(GattOperation::EditNotifications { enabled }, e))?;
        debug!("Notifications for {} set to {}", self.id.uuid, enabled);
        Ok(())
    }

    /// Register the value-change observer, replacing any previous one
    ///
    /// The handler fires once per remote value change while notifications
    /// are enabled. It runs on the backend's event thread.
    pub fn on_notification_received<F>(&self, handler: F) -> GattResult<()>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let link = self.link()?;
        let handler: ValueHandler = Arc::new(handler);

        // The backend may call back into the session while registering
        let observer = link.observe_value_changes(self.id, handler);

        let replaced = self.session.upgrade().and_then(|shared| {
            let mut state = shared.write_state();
            if state.epoch != self.epoch {
                return None;
            }
            let entry = state.cache.characteristic_mut(&self.id.uuid)?;
            Some(entry.value_observer.replace(observer))
        });

        match replaced {
            Some(previous) => {
                if let Some(previous) = previous {
                    link.remove_observer(previous);
                }
                Ok(())
            }
            None => {
                link.remove_observer(observer);
                Err(self.released())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Callback Forms
    // ------------------------------------------------------------------------

    /// Callback form of [`read`](Self::read)
    pub fn read_async<F>(&self, on_done: F)
    where
        F: FnOnce(GattResult<Vec<u8>>) + Send + 'static,
    {
        let this = self.clone();
        dispatch(
            &self.runtime,
            async move { this.read().await },
            Completion::new(on_done),
        );
    }

    /// Callback form of [`write`](Self::write)
    pub fn write_async<F>(&self, value: impl Into<Vec<u8>>, on_done: F)
    where
        F: FnOnce(GattResult<()>) + Send + 'static,
    {
        let this = self.clone();
        let value = value.into();
        dispatch(
            &self.runtime,
            async move { this.write(&value).await },
            Completion::new(on_done),
        );
    }

    /// Callback form of [`write_without_response`](Self::write_without_response)
    pub fn write_without_response_async<F>(&self, value: impl Into<Vec<u8>>, on_done: F)
    where
        F: FnOnce(GattResult<()>) + Send + 'static,
    {
        let this = self.clone();
        let value = value.into();
        dispatch(
            &self.runtime,
            async move { this.write_without_response(&value).await },
            Completion::new(on_done),
        );
    }

    /// Callback form of [`enable_notifications`](Self::enable_notifications)
    pub fn enable_notifications_async<F>(&self, on_done: F)
    where
        F: FnOnce(GattResult<()>) + Send + 'static,
    {
        let this = self.clone();
        dispatch(
            &self.runtime,
            async move { this.enable_notifications().await },
            Completion::new(on_done),
        );
    }

    /// Callback form of [`disable_notifications`](Self::disable_notifications)
    pub fn disable_notifications_async<F>(&self, on_done: F)
    where
        F: FnOnce(GattResult<()>) + Send + 'static,
    {
        let this = self.clone();
        dispatch(
            &self.runtime,
            async move { this.disable_notifications().await },
            Completion::new(on_done),
        );
    }
}
