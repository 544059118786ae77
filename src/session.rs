use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use futures_lite::StreamExt;
use log::{debug, error, warn};
use uuid::Uuid;

use crate::adapter::{AdapterMonitor, AdapterState};
use crate::async_util::Pending;
use crate::btuuid::BluetoothUuidExt;
use crate::callback::{RadioCallback, RadioEvent};
use crate::characteristic::CharacteristicInfo;
use crate::connection::{ConnectionState, PeripheralActor, PeripheralMsg};
use crate::error::ErrorKind;
use crate::event::{Discovery, Event, EventEmitter, EventStream};
use crate::gatt_queue::{GattOperation, GattRequest, GattTarget};
use crate::peripheral::Peripheral;
use crate::radio::Radio;
use crate::registry::{PeripheralEntry, PeripheralRegistry};
use crate::scanner::Scanner;
use crate::service::Service;
use crate::{PeripheralId, Result};

/// Session-wide settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a connection attempt may take before failing with
    /// [`ErrorKind::ConnectTimeout`].
    pub connect_timeout: Duration,
    /// How long service discovery may take after the link is established.
    pub discovery_timeout: Duration,
    /// Per-operation GATT timeout, also used to bound link teardown.
    pub operation_timeout: Duration,
    /// Events buffered per subscriber before the oldest ones are dropped.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(15),
            operation_timeout: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// A BLE central session on top of a platform [`Radio`].
///
/// Commands return immediately; their outcome is delivered through the returned [`Pending`]
/// future and, where applicable, as an [`crate::Event`] on [`Session::events`]. The platform
/// reports back through the handle from [`Session::radio_callback`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    radio: Arc<dyn Radio>,
    config: SessionConfig,
    events: EventEmitter,
    adapter: AdapterMonitor,
    scanner: Scanner,
    registry: PeripheralRegistry,
}

impl Session {
    pub fn new(radio: Arc<dyn Radio>, config: SessionConfig) -> Self {
        let events = EventEmitter::new(config.event_capacity);
        let initial = radio
            .adapter_state()
            .map_or(AdapterState::Unsupported, AdapterState::from_raw);
        debug!("session created, adapter is {initial}");
        Self {
            inner: Arc::new(SessionInner {
                radio,
                adapter: AdapterMonitor::new(initial, events.clone()),
                scanner: Scanner::new(events.clone()),
                registry: PeripheralRegistry::default(),
                config,
                events,
            }),
        }
    }

    /// The handle the platform layer uses to report results and state changes.
    pub fn radio_callback(&self) -> RadioCallback {
        RadioCallback {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribes to application events. Only events emitted after this call are received.
    pub fn events(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Sightings reported by the scanner from now on, first sightings and repeated ones alike.
    pub fn discoveries(&self) -> impl Stream<Item = Discovery> + Send {
        self.events().filter_map(|event| match event {
            Event::Discover(found) | Event::Rediscover(found) => Some(found),
            _ => None,
        })
    }

    /// Values notified by one characteristic. Notifications must be enabled separately with
    /// [`Session::set_notify`].
    pub fn notifications(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Stream<Item = Vec<u8>> + Send {
        let id = id.clone();
        let service = service.to_noble_string();
        let characteristic = characteristic.to_noble_string();
        self.events().filter_map(move |event| match event {
            Event::Data {
                peripheral_id,
                service_uuid,
                characteristic_uuid,
                data,
                is_notification: true,
            } if peripheral_id == id && service_uuid == service && characteristic_uuid == characteristic => {
                Some(data)
            }
            _ => None,
        })
    }

    /// The cached adapter state.
    pub fn state(&self) -> AdapterState {
        self.inner.adapter.state()
    }

    /// Emits a `stateChange` event with the current adapter state and returns it.
    pub fn report_state(&self) -> AdapterState {
        self.inner.adapter.report()
    }

    /// Starts (or restarts) discovery. An empty `service_uuids` filter matches every
    /// advertisement.
    pub fn start_scan(&self, service_uuids: &[Uuid], allow_duplicates: bool) -> Result<()> {
        let inner = &self.inner;
        inner.scanner.start(
            inner.radio.as_ref(),
            inner.adapter.state(),
            service_uuids.to_vec(),
            allow_duplicates,
        )
    }

    /// Stops discovery. Calling it while not scanning does nothing.
    pub fn stop_scan(&self) -> Result<()> {
        self.inner.scanner.stop(self.inner.radio.as_ref())
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanner.is_scanning()
    }

    /// Registers a peripheral by address without having seen it advertise, so that it can be
    /// connected to directly.
    pub fn declare_peripheral(&self, id: impl Into<PeripheralId>) -> Peripheral {
        self.inner.registry.find_or_insert(&id.into()).snapshot()
    }

    pub fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        self.inner.registry.find(id).map(|entry| entry.snapshot())
    }

    /// Every peripheral seen or declared so far, sorted by address.
    pub fn peripherals(&self) -> Vec<Peripheral> {
        self.inner.registry.snapshots()
    }

    pub fn connection_state(&self, id: &PeripheralId) -> Option<ConnectionState> {
        self.inner.registry.find(id).map(|entry| entry.state())
    }

    /// Connects and discovers services; resolves once the peripheral is ready for GATT
    /// operations. Connecting to a peripheral that is already connecting or connected is not
    /// an error.
    pub fn connect(&self, id: &PeripheralId) -> Pending<()> {
        let Some(entry) = self.inner.registry.find(id) else {
            return Pending::fail(ErrorKind::UnknownPeripheral);
        };
        let adapter = self.inner.adapter.state();
        if !adapter.is_powered_on() {
            return Pending::ready(Err(crate::Error::new(
                ErrorKind::AdapterNotReady,
                None,
                format!("adapter is {adapter}"),
            )));
        }
        let inbox = match self.inner.actor_inbox(id, &entry) {
            Ok(inbox) => inbox,
            Err(e) => return Pending::ready(Err(e)),
        };
        let (done, pending) = Pending::channel();
        let _ = inbox.try_send(PeripheralMsg::Connect(done));
        pending
    }

    /// Disconnects, failing every queued GATT operation with [`ErrorKind::Disconnected`].
    /// Resolves once the peripheral is disconnected.
    pub fn disconnect(&self, id: &PeripheralId) -> Pending<()> {
        let Some(entry) = self.inner.registry.find(id) else {
            return Pending::fail(ErrorKind::UnknownPeripheral);
        };
        let Some(inbox) = entry.inbox() else {
            return Pending::ready(Ok(()));
        };
        let (done, pending) = Pending::channel();
        let _ = inbox.try_send(PeripheralMsg::Disconnect(done));
        pending
    }

    /// Returns the discovered service UUIDs and re-emits `servicesDiscover`. Discovery itself
    /// runs as part of [`Session::connect`].
    pub fn discover_services(&self, id: &PeripheralId) -> Pending<Vec<Uuid>> {
        self.inner
            .send_to_actor(id, |done| PeripheralMsg::DiscoverServices(done))
    }

    /// Returns the characteristics of a discovered service and emits
    /// `characteristicsDiscover`.
    pub fn discover_characteristics(&self, id: &PeripheralId, service: Uuid) -> Pending<Vec<CharacteristicInfo>> {
        self.inner
            .send_to_actor(id, |done| PeripheralMsg::DiscoverCharacteristics(service, done))
    }

    /// The discovered GATT tree, including which characteristics are notifying.
    pub fn services(&self, id: &PeripheralId) -> Pending<Vec<Service>> {
        self.inner.send_to_actor(id, PeripheralMsg::Services)
    }

    /// Queues `op` on the peripheral's GATT queue. Resolves with the value for reads and an
    /// empty vector otherwise.
    pub fn enqueue(&self, id: &PeripheralId, target: GattTarget, op: GattOperation) -> Pending<Vec<u8>> {
        self.inner.send_to_actor(id, |completion| {
            PeripheralMsg::Gatt(GattRequest {
                target,
                op,
                completion,
            })
        })
    }

    pub fn read(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid) -> Pending<Vec<u8>> {
        let target = GattTarget {
            service,
            characteristic,
        };
        self.enqueue(id, target, GattOperation::Read)
    }

    pub fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
        with_response: bool,
    ) -> Pending<()> {
        let target = GattTarget {
            service,
            characteristic,
        };
        let op = GattOperation::Write {
            payload: value,
            requires_ack: with_response,
        };
        self.enqueue(id, target, op).map(drop)
    }

    pub fn set_notify(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid, enabled: bool) -> Pending<()> {
        let target = GattTarget {
            service,
            characteristic,
        };
        self.enqueue(id, target, GattOperation::SetNotify { enabled })
            .map(drop)
    }
}

impl SessionInner {
    /// Returns the actor inbox of `entry`, starting the actor if it is not running yet.
    fn actor_inbox(
        &self,
        id: &PeripheralId,
        entry: &PeripheralEntry,
    ) -> Result<async_channel::Sender<PeripheralMsg>> {
        let mut actor = entry.actor.lock_blocking();
        if let Some(inbox) = actor.as_ref() {
            return Ok(inbox.clone());
        }
        let inbox = PeripheralActor::spawn(
            id.clone(),
            self.radio.clone(),
            self.events.clone(),
            self.config.clone(),
            entry.data.clone(),
        )
        .map_err(|e| {
            error!("cannot start actor for {id}: {e}");
            crate::Error::new(ErrorKind::Internal, None, format!("cannot start actor: {e}"))
        })?;
        *actor = Some(inbox.clone());
        Ok(inbox)
    }

    /// Sends a request to a running actor. Peripherals that never connected are not ready.
    fn send_to_actor<T: Send + 'static>(
        &self,
        id: &PeripheralId,
        msg: impl FnOnce(crate::async_util::Completion<T>) -> PeripheralMsg,
    ) -> Pending<T> {
        let Some(entry) = self.registry.find(id) else {
            return Pending::fail(ErrorKind::UnknownPeripheral);
        };
        let Some(inbox) = entry.inbox() else {
            return Pending::fail(ErrorKind::NotReady);
        };
        let (done, pending) = Pending::channel();
        let _ = inbox.try_send(msg(done));
        pending
    }

    pub(crate) fn handle_radio_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::AdapterStateChanged(code) => {
                let prev = self.adapter.update_raw(code);
                if prev == Some(AdapterState::PoweredOn) {
                    self.scanner.end_session();
                }
            }
            RadioEvent::Advertisement(report) => {
                self.scanner.on_advertisement(report, &self.registry);
            }
            RadioEvent::Peripheral(id, event) => {
                let inbox = self.registry.find(&id).and_then(|entry| entry.inbox());
                match inbox {
                    Some(inbox) => {
                        if inbox.try_send(PeripheralMsg::Radio(event)).is_err() {
                            warn!("{id}: actor is gone, radio event dropped");
                        }
                    }
                    None => debug!("{id}: radio event for idle peripheral dropped: {event:?}"),
                }
            }
        }
    }
}
