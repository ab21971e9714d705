//! Discovery cache owned by a session
//!
//! The cache is the arena for every discovered service and characteristic.
//! Handles given to callers refer to entries by UUID only.

use std::collections::HashMap;

use uuid::Uuid;

use crate::native::ObserverId;
use crate::types::CharacteristicRef;

/// A discovered service
#[derive(Debug, Clone)]
pub(crate) struct ServiceHandle {
    /// Characteristics enumerated for this service, in discovery order
    pub characteristics: Vec<Uuid>,
}

/// A discovered characteristic
#[derive(Debug, Clone)]
pub(crate) struct CharacteristicEntry {
    pub id: CharacteristicRef,
    /// Native value-change registration, at most one
    pub value_observer: Option<ObserverId>,
}

#[derive(Debug, Default)]
pub(crate) struct GattCache {
    services: HashMap<Uuid, ServiceHandle>,
    characteristics: HashMap<Uuid, CharacteristicEntry>,
}

impl GattCache {
    /// Record a service; returns false if it was already known
    pub fn insert_service(&mut self, uuid: Uuid) -> bool {
        if self.services.contains_key(&uuid) {
            return false;
        }
        self.services.insert(
            uuid,
            ServiceHandle {
                characteristics: Vec::new(),
            },
        );
        true
    }

    /// Merge the characteristics of `service`
    ///
    /// Existing entries are kept so that their observers survive a repeated
    /// enumeration. Returns the number of newly added characteristics.
    pub fn insert_characteristics(&mut self, service: Uuid, uuids: &[Uuid]) -> usize {
        self.insert_service(service);
        let mut added = 0;
        for uuid in uuids {
            if self.characteristics.contains_key(uuid) {
                continue;
            }
            self.characteristics.insert(
                *uuid,
                CharacteristicEntry {
                    id: CharacteristicRef::new(service, *uuid),
                    value_observer: None,
                },
            );
            if let Some(handle) = self.services.get_mut(&service) {
                handle.characteristics.push(*uuid);
            }
            added += 1;
        }
        added
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicEntry> {
        self.characteristics.get(uuid)
    }

    pub fn characteristic_mut(&mut self, uuid: &Uuid) -> Option<&mut CharacteristicEntry> {
        self.characteristics.get_mut(uuid)
    }

    pub fn contains_service(&self, uuid: &Uuid) -> bool {
        self.services.contains_key(uuid)
    }

    pub fn service(&self, uuid: &Uuid) -> Option<&ServiceHandle> {
        self.services.get(uuid)
    }

    pub fn service_uuids(&self) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = self.services.keys().copied().collect();
        uuids.sort();
        uuids
    }

    pub fn characteristic_refs(&self) -> Vec<CharacteristicRef> {
        let mut refs: Vec<CharacteristicRef> =
            self.characteristics.values().map(|entry| entry.id).collect();
        refs.sort();
        refs
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.characteristics.is_empty()
    }

    /// Release every entry, characteristics first
    ///
    /// Returns the native value-change observers that were still registered
    /// so the caller can unregister them.
    pub fn clear(&mut self) -> Vec<ObserverId> {
        let observers = self
            .characteristics
            .drain()
            .filter_map(|(_, entry)| entry.value_observer)
            .collect();
        self.services.clear();
        observers
    }
}
