//! Process-lifetime registry of peripherals keyed by address.
//!
//! The map lock is only held for lookup and insertion. Everything about a single
//! peripheral lives behind that peripheral's own lock, so unrelated peripherals never
//! contend.

use std::collections::HashMap;
use std::sync::Arc;

use async_channel::Sender;
use async_lock::{Mutex, RwLock};

use crate::connection::{ConnectionState, PeripheralMsg};
use crate::peripheral::Peripheral;
use crate::{AdvertisementReport, PeripheralId};

pub(crate) struct PeripheralEntry {
    /// Shared with the peripheral's actor, which mirrors its connection state here.
    pub data: Arc<Mutex<Peripheral>>,
    /// Inbox of the peripheral's actor, created on the first connect.
    pub actor: Mutex<Option<Sender<PeripheralMsg>>>,
}

impl PeripheralEntry {
    fn new(id: PeripheralId) -> Self {
        Self {
            data: Arc::new(Mutex::new(Peripheral::new(id))),
            actor: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Peripheral {
        self.data.lock_blocking().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.data.lock_blocking().state
    }

    /// The actor inbox, if the actor has been started.
    pub fn inbox(&self) -> Option<Sender<PeripheralMsg>> {
        self.actor.lock_blocking().clone()
    }
}

#[derive(Default)]
pub(crate) struct PeripheralRegistry {
    map: RwLock<HashMap<PeripheralId, Arc<PeripheralEntry>>>,
}

impl PeripheralRegistry {
    pub fn find(&self, id: &PeripheralId) -> Option<Arc<PeripheralEntry>> {
        self.map.read_blocking().get(id).cloned()
    }

    pub fn find_or_insert(&self, id: &PeripheralId) -> Arc<PeripheralEntry> {
        if let Some(entry) = self.find(id) {
            return entry;
        }
        self.map
            .write_blocking()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(PeripheralEntry::new(id.clone())))
            .clone()
    }

    /// Replaces the cached advertisement of the reporting peripheral, creating it if needed.
    pub fn record_advertisement(&self, report: &AdvertisementReport) {
        let entry = self.find_or_insert(&report.id);
        let mut data = entry.data.lock_blocking();
        data.advertisement = Some(report.advertisement.clone());
        data.rssi = Some(report.rssi);
        data.connectable = report.connectable;
    }

    pub fn snapshots(&self) -> Vec<Peripheral> {
        let mut all: Vec<_> = self
            .map
            .read_blocking()
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdvertisementData, BluetoothUuidExt, Uuid};

    fn report(name: Option<&str>, services: Vec<Uuid>) -> AdvertisementReport {
        AdvertisementReport {
            id: "AA:BB".into(),
            rssi: -70,
            connectable: true,
            advertisement: AdvertisementData {
                local_name: name.map(String::from),
                service_uuids: services,
                ..Default::default()
            },
        }
    }

    #[test]
    fn advertisement_snapshot_is_replaced_not_merged() {
        let registry = PeripheralRegistry::default();
        registry.record_advertisement(&report(Some("hrm"), vec![Uuid::from_u16(0x180d)]));
        registry.record_advertisement(&report(None, vec![]));

        let snapshot = registry.find(&"AA:BB".into()).unwrap().snapshot();
        assert_eq!(snapshot.name(), None);
        assert!(snapshot.advertisement().unwrap().service_uuids.is_empty());
        assert_eq!(snapshot.rssi(), Some(-70));
    }

    #[test]
    fn find_or_insert_returns_the_same_entry() {
        let registry = PeripheralRegistry::default();
        let id = PeripheralId::from("AA:BB");
        assert!(registry.find(&id).is_none());
        let a = registry.find_or_insert(&id);
        let b = registry.find_or_insert(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.state(), ConnectionState::Disconnected);
        assert_eq!(registry.snapshots().len(), 1);
    }
}
