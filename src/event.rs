//! Events delivered to the application.

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use log::trace;
use uuid::Uuid;

use crate::adapter::AdapterState;
use crate::btuuid::BluetoothUuidExt;
use crate::characteristic::CharacteristicInfo;
use crate::{AdvertisementReport, PeripheralId};

/// An outbound application event, shaped after the noble client conventions.
///
/// With the `serde` feature enabled, events serialize as
/// `{"event": "<name>", ...camelCase fields}`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum Event {
    StateChange {
        state: AdapterState,
    },
    /// First sighting of a peripheral in the current scan session.
    Discover(Discovery),
    /// Repeated sighting, only surfaced when scanning with duplicates allowed.
    Rediscover(Discovery),
    Connect {
        peripheral_id: PeripheralId,
    },
    Disconnect {
        peripheral_id: PeripheralId,
    },
    ServicesDiscover {
        peripheral_id: PeripheralId,
        service_uuids: Vec<String>,
    },
    CharacteristicsDiscover {
        peripheral_id: PeripheralId,
        service_uuid: String,
        characteristics: Vec<CharacteristicInfo>,
    },
    Write {
        peripheral_id: PeripheralId,
        service_uuid: String,
        characteristic_uuid: String,
    },
    Data {
        peripheral_id: PeripheralId,
        service_uuid: String,
        characteristic_uuid: String,
        data: Vec<u8>,
        is_notification: bool,
    },
    Notify {
        peripheral_id: PeripheralId,
        service_uuid: String,
        characteristic_uuid: String,
        state: bool,
    },
}

impl Event {
    /// The event name used on the application side.
    pub fn name(&self) -> &'static str {
        match self {
            Event::StateChange { .. } => "stateChange",
            Event::Discover(_) => "discover",
            Event::Rediscover(_) => "rediscover",
            Event::Connect { .. } => "connect",
            Event::Disconnect { .. } => "disconnect",
            Event::ServicesDiscover { .. } => "servicesDiscover",
            Event::CharacteristicsDiscover { .. } => "characteristicsDiscover",
            Event::Write { .. } => "write",
            Event::Data { .. } => "data",
            Event::Notify { .. } => "notify",
        }
    }

    /// The peripheral this event concerns, if any.
    pub fn peripheral_id(&self) -> Option<&PeripheralId> {
        match self {
            Event::StateChange { .. } => None,
            Event::Discover(d) | Event::Rediscover(d) => Some(&d.id),
            Event::Connect { peripheral_id }
            | Event::Disconnect { peripheral_id }
            | Event::ServicesDiscover { peripheral_id, .. }
            | Event::CharacteristicsDiscover { peripheral_id, .. }
            | Event::Write { peripheral_id, .. }
            | Event::Data { peripheral_id, .. }
            | Event::Notify { peripheral_id, .. } => Some(peripheral_id),
        }
    }

    pub(crate) fn write(id: &PeripheralId, service: Uuid, characteristic: Uuid) -> Self {
        Event::Write {
            peripheral_id: id.clone(),
            service_uuid: service.to_noble_string(),
            characteristic_uuid: characteristic.to_noble_string(),
        }
    }

    pub(crate) fn data(
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: Vec<u8>,
        is_notification: bool,
    ) -> Self {
        Event::Data {
            peripheral_id: id.clone(),
            service_uuid: service.to_noble_string(),
            characteristic_uuid: characteristic.to_noble_string(),
            data,
            is_notification,
        }
    }

    pub(crate) fn notify(id: &PeripheralId, service: Uuid, characteristic: Uuid, state: bool) -> Self {
        Event::Notify {
            peripheral_id: id.clone(),
            service_uuid: service.to_noble_string(),
            characteristic_uuid: characteristic.to_noble_string(),
            state,
        }
    }
}

/// Payload of `discover` and `rediscover` events.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Discovery {
    pub id: PeripheralId,
    pub address: String,
    pub rssi: i16,
    pub advertisement: AdvertisementInfo,
    pub connectable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AdvertisementInfo {
    pub local_name: Option<String>,
    pub service_uuids: Vec<String>,
    pub service_data: Vec<ServiceDataInfo>,
    pub tx_power_level: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceDataInfo {
    pub uuid: String,
    pub data: Vec<u8>,
}

impl From<&AdvertisementReport> for Discovery {
    fn from(report: &AdvertisementReport) -> Self {
        let adv = &report.advertisement;
        Discovery {
            id: report.id.clone(),
            address: report.id.as_str().to_string(),
            rssi: report.rssi,
            advertisement: AdvertisementInfo {
                local_name: adv.local_name.clone(),
                service_uuids: adv.service_uuids.iter().map(|u| u.to_noble_string()).collect(),
                service_data: adv
                    .service_data
                    .iter()
                    .map(|(uuid, data)| ServiceDataInfo {
                        uuid: uuid.to_noble_string(),
                        data: data.clone(),
                    })
                    .collect(),
                tx_power_level: adv.tx_power_level,
            },
            connectable: report.connectable,
        }
    }
}

/// Stream of [`Event`]s handed out by [`crate::Session::events`].
pub type EventStream = Receiver<Event>;

/// Fire-and-forget event delivery shared by every component of a session.
///
/// Slow receivers lose their oldest events instead of blocking the emitter.
#[derive(Clone)]
pub(crate) struct EventEmitter {
    sender: Sender<Event>,
    #[allow(unused)]
    sender_keeper: InactiveReceiver<Event>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        Self {
            sender,
            sender_keeper: receiver.deactivate(),
        }
    }

    pub fn subscribe(&self) -> EventStream {
        self.sender.new_receiver()
    }

    pub fn emit(&self, event: Event) {
        trace!("emitting {} event", event.name());
        // fails only when there are no active receivers
        let _ = self.sender.try_broadcast(event);
    }
}
