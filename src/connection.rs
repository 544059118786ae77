//! Per-peripheral connection state machine.
//!
//! Every peripheral that is asked to connect gets an actor running on its own thread. The
//! actor owns the connection state, the discovered GATT tree and the GATT queue; application
//! commands and radio callbacks reach it through one inbox, so everything concerning a
//! peripheral is processed (and reported) in arrival order.

use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender};
use async_lock::Mutex;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::async_util::{earliest, recv_until, Completion, Received};
use crate::btuuid::BluetoothUuidExt;
use crate::callback::PeripheralEvent;
use crate::characteristic::CharacteristicInfo;
use crate::error::{ErrorKind, RadioError};
use crate::event::{Event, EventEmitter};
use crate::gatt_queue::{GattQueue, GattRequest, GattTarget, OpResult};
use crate::peripheral::Peripheral;
use crate::radio::Radio;
use crate::service::Service;
use crate::session::SessionConfig;
use crate::PeripheralId;

/// Connection state of one peripheral.
///
/// The variants are ordered along the connect path, so `state >= ServicesDiscovered` means
/// the peripheral is ready for GATT operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    ServicesDiscovered,
    Disconnecting,
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        *self == ConnectionState::ServicesDiscovered
    }
}

/// Inputs of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Connect,
    LinkEstablished,
    /// Leaves the transient `Connected` state as service discovery is started.
    BeginDiscovery,
    ServicesEnumerated,
    DiscoveryFailed,
    Disconnect,
    /// The link went down without being asked to.
    LinkDown,
    TeardownComplete,
    Timeout,
}

impl ConnectionState {
    /// The transition table. `None` means the trigger is ignored in this state.
    pub(crate) fn next(self, trigger: Trigger) -> Option<ConnectionState> {
        use ConnectionState::*;
        use Trigger::*;
        match (self, trigger) {
            (Disconnected, Connect) => Some(Connecting),
            (Connecting, LinkEstablished) => Some(Connected),
            (Connecting, LinkDown | Timeout) => Some(Disconnected),
            (Connected, BeginDiscovery) => Some(DiscoveringServices),
            (DiscoveringServices, ServicesEnumerated) => Some(ServicesDiscovered),
            (Connected | DiscoveringServices, DiscoveryFailed | Timeout) => Some(Disconnecting),
            (Connecting | Connected | DiscoveringServices | ServicesDiscovered, Disconnect) => {
                Some(Disconnecting)
            }
            (Connected | DiscoveringServices | ServicesDiscovered, LinkDown) => Some(Disconnecting),
            (Disconnecting, TeardownComplete | LinkDown | Timeout) => Some(Disconnected),
            _ => None,
        }
    }
}

/// Messages handled by a peripheral actor.
pub(crate) enum PeripheralMsg {
    Connect(Completion<()>),
    Disconnect(Completion<()>),
    DiscoverServices(Completion<Vec<Uuid>>),
    DiscoverCharacteristics(Uuid, Completion<Vec<CharacteristicInfo>>),
    Services(Completion<Vec<Service>>),
    Gatt(GattRequest),
    Radio(PeripheralEvent),
}

pub(crate) struct PeripheralActor {
    id: PeripheralId,
    radio: Arc<dyn Radio>,
    events: EventEmitter,
    config: SessionConfig,
    shared: Arc<Mutex<Peripheral>>,
    inbox: Receiver<PeripheralMsg>,
    state: ConnectionState,
    /// Deadline of the current connect, discovery or teardown step.
    deadline: Option<Instant>,
    connect_waiters: Vec<Completion<()>>,
    disconnect_waiters: Vec<Completion<()>>,
    services: Vec<Service>,
    queue: GattQueue,
}

impl PeripheralActor {
    /// Starts the actor thread and returns its inbox.
    pub fn spawn(
        id: PeripheralId,
        radio: Arc<dyn Radio>,
        events: EventEmitter,
        config: SessionConfig,
        shared: Arc<Mutex<Peripheral>>,
    ) -> std::io::Result<Sender<PeripheralMsg>> {
        let (sender, inbox) = async_channel::unbounded();
        let queue = GattQueue::new(id.clone(), radio.clone(), events.clone(), config.operation_timeout);
        let actor = PeripheralActor {
            id: id.clone(),
            radio,
            events,
            config,
            shared,
            inbox,
            state: ConnectionState::Disconnected,
            deadline: None,
            connect_waiters: Vec::new(),
            disconnect_waiters: Vec::new(),
            services: Vec::new(),
            queue,
        };
        std::thread::Builder::new()
            .name(format!("ble-{id}"))
            .spawn(move || futures_lite::future::block_on(actor.run()))?;
        Ok(sender)
    }

    async fn run(mut self) {
        debug!("{}: actor started", self.id);
        loop {
            let deadline = earliest(self.deadline, self.queue.deadline());
            match recv_until(&self.inbox, deadline).await {
                Received::Message(msg) => self.handle(msg),
                Received::Deadline => self.on_deadline(Instant::now()),
                Received::Closed => break,
            }
        }
        self.shutdown();
        debug!("{}: actor stopped", self.id);
    }

    fn handle(&mut self, msg: PeripheralMsg) {
        match msg {
            PeripheralMsg::Connect(done) => self.connect(done),
            PeripheralMsg::Disconnect(done) => self.disconnect(done),
            PeripheralMsg::DiscoverServices(done) => self.discover_services(done),
            PeripheralMsg::DiscoverCharacteristics(service, done) => {
                self.discover_characteristics(service, done)
            }
            PeripheralMsg::Services(done) => {
                if self.state.is_ready() {
                    done.resolve(Ok(self.services.clone()))
                } else {
                    done.fail(ErrorKind::NotReady)
                }
            }
            PeripheralMsg::Gatt(request) => self.enqueue(request),
            PeripheralMsg::Radio(event) => self.on_radio_event(event),
        }
    }

    /// Applies `trigger` through the transition table and mirrors the result to the registry.
    fn transition(&mut self, trigger: Trigger) -> bool {
        let Some(next) = self.state.next(trigger) else {
            debug!("{}: {trigger:?} ignored in {:?}", self.id, self.state);
            return false;
        };
        debug!("{}: {:?} -> {next:?} on {trigger:?}", self.id, self.state);
        self.state = next;
        self.shared.lock_blocking().state = next;
        match next {
            ConnectionState::Connecting => self.arm(self.config.connect_timeout),
            ConnectionState::DiscoveringServices => self.arm(self.config.discovery_timeout),
            ConnectionState::Disconnecting => self.arm(self.config.operation_timeout),
            ConnectionState::Connected | ConnectionState::ServicesDiscovered => self.deadline = None,
            ConnectionState::Disconnected => self.on_disconnected(),
        }
        true
    }

    fn arm(&mut self, timeout: std::time::Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    fn on_disconnected(&mut self) {
        self.deadline = None;
        self.services.clear();
        self.queue.drain(ErrorKind::Disconnected);
        for done in self.disconnect_waiters.drain(..) {
            done.resolve(Ok(()));
        }
        info!("{}: disconnected", self.id);
        self.events.emit(Event::Disconnect {
            peripheral_id: self.id.clone(),
        });
    }

    fn fail_connect_waiters(&mut self, err: crate::Error) {
        for done in self.connect_waiters.drain(..) {
            done.resolve(Err(err.clone()));
        }
    }

    fn connect(&mut self, done: Completion<()>) {
        match self.state {
            ConnectionState::Disconnected => {
                if let Err(e) = self.radio.connect(&self.id) {
                    warn!("{}: connect rejected: {e}", self.id);
                    done.resolve(Err(connection_failed(e)));
                    return;
                }
                info!("{}: connecting", self.id);
                self.connect_waiters.push(done);
                self.transition(Trigger::Connect);
            }
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::DiscoveringServices => self.connect_waiters.push(done),
            ConnectionState::ServicesDiscovered => done.resolve(Ok(())),
            ConnectionState::Disconnecting => done.resolve(Err(crate::Error::new(
                ErrorKind::ConnectionFailed,
                None,
                "a disconnect is in progress",
            ))),
        }
    }

    fn disconnect(&mut self, done: Completion<()>) {
        match self.state {
            ConnectionState::Disconnected => done.resolve(Ok(())),
            ConnectionState::Disconnecting => self.disconnect_waiters.push(done),
            _ => {
                self.disconnect_waiters.push(done);
                self.fail_connect_waiters(ErrorKind::Disconnected.into());
                self.queue.drain(ErrorKind::Disconnected);
                self.begin_teardown(Trigger::Disconnect);
            }
        }
    }

    /// Moves to `Disconnecting` and asks the radio to drop the link. If the radio refuses,
    /// there is nothing to wait for.
    fn begin_teardown(&mut self, trigger: Trigger) {
        if !self.transition(trigger) {
            return;
        }
        if let Err(e) = self.radio.disconnect(&self.id) {
            warn!("{}: disconnect rejected, dropping link state: {e}", self.id);
            self.transition(Trigger::TeardownComplete);
        }
    }

    /// Asks the radio to drop the link without waiting for the outcome.
    fn drop_link(&self) {
        if let Err(e) = self.radio.disconnect(&self.id) {
            warn!("{}: disconnect rejected: {e}", self.id);
        }
    }

    fn discover_services(&mut self, done: Completion<Vec<Uuid>>) {
        if !self.state.is_ready() {
            done.fail(ErrorKind::NotReady);
            return;
        }
        let uuids: Vec<Uuid> = self.services.iter().map(Service::uuid).collect();
        self.emit_services();
        done.resolve(Ok(uuids));
    }

    fn discover_characteristics(&mut self, service: Uuid, done: Completion<Vec<CharacteristicInfo>>) {
        if !self.state.is_ready() {
            done.fail(ErrorKind::NotReady);
            return;
        }
        let Some(found) = self.services.iter().find(|s| s.uuid() == service) else {
            done.resolve(Err(crate::Error::new(
                ErrorKind::NotFound,
                None,
                format!("service {}", service.to_noble_string()),
            )));
            return;
        };
        let characteristics: Vec<_> = found.characteristics().iter().map(|c| c.describe()).collect();
        self.events.emit(Event::CharacteristicsDiscover {
            peripheral_id: self.id.clone(),
            service_uuid: service.to_noble_string(),
            characteristics: characteristics.clone(),
        });
        done.resolve(Ok(characteristics));
    }

    fn emit_services(&self) {
        self.events.emit(Event::ServicesDiscover {
            peripheral_id: self.id.clone(),
            service_uuids: self.services.iter().map(|s| s.uuid().to_noble_string()).collect(),
        });
    }

    fn enqueue(&mut self, request: GattRequest) {
        if !self.state.is_ready() {
            request.completion.fail(ErrorKind::NotReady);
            return;
        }
        if let Err(e) = GattQueue::validate(&self.services, request.target, &request.op) {
            request.completion.resolve(Err(e));
            return;
        }
        self.queue.submit(request);
    }

    fn on_radio_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::Connected => self.on_link_established(),
            PeripheralEvent::Disconnected { status } => self.on_link_down(status),
            PeripheralEvent::ServicesDiscovered(result) => self.on_services(result),
            PeripheralEvent::Read {
                service,
                characteristic,
                result,
            } => self.complete(service, characteristic, OpResult::Read(result)),
            PeripheralEvent::Written {
                service,
                characteristic,
                result,
            } => self.complete(service, characteristic, OpResult::Written(result)),
            PeripheralEvent::NotifySet {
                service,
                characteristic,
                result,
            } => self.complete(service, characteristic, OpResult::NotifySet(result)),
            PeripheralEvent::Notification {
                service,
                characteristic,
                value,
            } => self.on_notification(service, characteristic, value),
        }
    }

    fn on_link_established(&mut self) {
        if !self.transition(Trigger::LinkEstablished) {
            if self.state == ConnectionState::Disconnected {
                // the link came up after the attempt was abandoned
                self.drop_link();
            }
            return;
        }
        info!("{}: connected", self.id);
        self.events.emit(Event::Connect {
            peripheral_id: self.id.clone(),
        });
        self.transition(Trigger::BeginDiscovery);
        if let Err(e) = self.radio.discover_services(&self.id) {
            warn!("{}: service discovery rejected: {e}", self.id);
            self.fail_connect_waiters(e.into());
            self.begin_teardown(Trigger::DiscoveryFailed);
        }
    }

    fn on_link_down(&mut self, status: i32) {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => {
                warn!("{}: connection attempt failed with status {status}", self.id);
                self.fail_connect_waiters(connection_failed(RadioError::StatusCode(status)));
                self.transition(Trigger::LinkDown);
            }
            ConnectionState::Disconnecting => {
                self.transition(Trigger::TeardownComplete);
            }
            _ => {
                let lost = crate::Error::from(ErrorKind::LinkLost);
                warn!("{}: {lost} (status {status})", self.id);
                self.fail_connect_waiters(lost);
                self.queue.drain(ErrorKind::Disconnected);
                // the link is already gone, so teardown completes at once
                self.transition(Trigger::LinkDown);
                self.transition(Trigger::LinkDown);
            }
        }
    }

    fn on_services(&mut self, result: Result<Vec<crate::ServiceLayout>, RadioError>) {
        if self.state != ConnectionState::DiscoveringServices {
            debug!("{}: unexpected service discovery result", self.id);
            return;
        }
        match result {
            Ok(layouts) => {
                self.services = layouts
                    .iter()
                    .map(|layout| Service::new(self.id.clone(), layout))
                    .collect();
                self.transition(Trigger::ServicesEnumerated);
                info!("{}: {} services discovered", self.id, self.services.len());
                self.emit_services();
                for done in self.connect_waiters.drain(..) {
                    done.resolve(Ok(()));
                }
            }
            Err(e) => {
                warn!("{}: service discovery failed: {e}", self.id);
                self.fail_connect_waiters(e.into());
                self.begin_teardown(Trigger::DiscoveryFailed);
            }
        }
    }

    fn complete(&mut self, service: Uuid, characteristic: Uuid, result: OpResult) {
        let target = GattTarget {
            service,
            characteristic,
        };
        self.queue.complete(target, result, &mut self.services);
    }

    fn on_notification(&mut self, service: Uuid, characteristic: Uuid, value: Vec<u8>) {
        let known = self
            .services
            .iter()
            .find(|s| s.uuid() == service)
            .and_then(|s| s.characteristic(characteristic))
            .is_some();
        if !known {
            debug!("{}: notification from unknown characteristic {characteristic}", self.id);
            return;
        }
        self.events
            .emit(Event::data(&self.id, service, characteristic, value, true));
    }

    fn on_deadline(&mut self, now: Instant) {
        self.queue.expire(now);
        if !self.deadline.is_some_and(|d| d <= now) {
            return;
        }
        self.deadline = None;
        match self.state {
            ConnectionState::Connecting => {
                warn!("{}: connection attempt timed out", self.id);
                self.drop_link();
                self.fail_connect_waiters(ErrorKind::ConnectTimeout.into());
                self.transition(Trigger::Timeout);
            }
            ConnectionState::DiscoveringServices => {
                warn!("{}: service discovery timed out", self.id);
                self.fail_connect_waiters(crate::Error::new(
                    ErrorKind::ConnectTimeout,
                    None,
                    "service discovery timed out",
                ));
                self.begin_teardown(Trigger::Timeout);
            }
            ConnectionState::Disconnecting => {
                warn!("{}: teardown timed out, assuming the link is gone", self.id);
                self.transition(Trigger::Timeout);
            }
            _ => {}
        }
    }

    /// Fails everything still outstanding when the session goes away.
    fn shutdown(&mut self) {
        self.fail_connect_waiters(ErrorKind::Disconnected.into());
        self.queue.drain(ErrorKind::Disconnected);
        for done in self.disconnect_waiters.drain(..) {
            done.resolve(Ok(()));
        }
        if self.state != ConnectionState::Disconnected {
            self.drop_link();
        }
    }
}

fn connection_failed(source: RadioError) -> crate::Error {
    let msg = source.to_string();
    crate::Error::new(ErrorKind::ConnectionFailed, Some(source), msg)
}
