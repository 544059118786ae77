//! Per-peripheral serialized GATT operations.
//!
//! The radio link allows a single outstanding GATT request, so every peripheral owns one
//! queue: requests are dispatched in submission order and the next one is only sent to the
//! radio once the current one completed, failed or timed out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use uuid::Uuid;

use crate::async_util::Completion;
use crate::characteristic::CharacteristicProperties;
use crate::error::{ErrorKind, RadioError};
use crate::event::{Event, EventEmitter};
use crate::radio::Radio;
use crate::service::Service;
use crate::{PeripheralId, Result};

/// An operation against one characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattOperation {
    Read,
    /// With `requires_ack == false` the operation completes as soon as the radio accepts it.
    Write { payload: Vec<u8>, requires_ack: bool },
    SetNotify { enabled: bool },
}

impl GattOperation {
    pub fn is_supported_by(&self, props: CharacteristicProperties) -> bool {
        match self {
            GattOperation::Read => props.read(),
            GattOperation::Write { requires_ack: true, .. } => {
                props.contains(CharacteristicProperties::WRITE)
            }
            GattOperation::Write { requires_ack: false, .. } => {
                props.contains(CharacteristicProperties::WRITE_WITHOUT_RESPONSE)
            }
            GattOperation::SetNotify { .. } => props.notify(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            GattOperation::Read => "read",
            GattOperation::Write { .. } => "write",
            GattOperation::SetNotify { .. } => "set_notify",
        }
    }
}

/// The characteristic a [`GattOperation`] is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattTarget {
    pub service: Uuid,
    pub characteristic: Uuid,
}

pub(crate) struct GattRequest {
    pub target: GattTarget,
    pub op: GattOperation,
    /// Resolves with the value for reads and with an empty vector otherwise.
    pub completion: Completion<Vec<u8>>,
}

/// A result reported by the radio for the in-flight request.
pub(crate) enum OpResult {
    Read(std::result::Result<Vec<u8>, RadioError>),
    Written(std::result::Result<(), RadioError>),
    NotifySet(std::result::Result<(), RadioError>),
}

struct InFlight {
    request: GattRequest,
    deadline: Instant,
}

pub(crate) struct GattQueue {
    id: PeripheralId,
    radio: Arc<dyn Radio>,
    events: EventEmitter,
    timeout: Duration,
    pending: VecDeque<GattRequest>,
    in_flight: Option<InFlight>,
}

impl GattQueue {
    pub fn new(id: PeripheralId, radio: Arc<dyn Radio>, events: EventEmitter, timeout: Duration) -> Self {
        Self {
            id,
            radio,
            events,
            timeout,
            pending: VecDeque::new(),
            in_flight: None,
        }
    }

    /// Checks that the target exists in `services` and supports the operation.
    pub fn validate(services: &[Service], target: GattTarget, op: &GattOperation) -> Result<()> {
        let ch = services
            .iter()
            .find(|s| s.uuid() == target.service)
            .and_then(|s| s.characteristic(target.characteristic))
            .ok_or_else(|| {
                crate::Error::new(
                    ErrorKind::NotFound,
                    None,
                    format!("characteristic {} of service {}", target.characteristic, target.service),
                )
            })?;
        if !op.is_supported_by(ch.properties()) {
            return Err(crate::Error::new(
                ErrorKind::UnsupportedOperation,
                None,
                format!("{} on characteristic with properties {:?}", op.name(), ch.properties().tags()),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    pub fn submit(&mut self, request: GattRequest) {
        self.pending.push_back(request);
        self.pump();
    }

    /// Sends queued requests to the radio until one of them has to wait for a result.
    fn pump(&mut self) {
        while self.in_flight.is_none() {
            let Some(request) = self.pending.pop_front() else {
                break;
            };
            let GattTarget {
                service,
                characteristic,
            } = request.target;
            let submitted = match &request.op {
                GattOperation::Read => self.radio.read(&self.id, service, characteristic),
                GattOperation::Write {
                    payload,
                    requires_ack,
                } => self
                    .radio
                    .write(&self.id, service, characteristic, payload, *requires_ack),
                GattOperation::SetNotify { enabled } => {
                    self.radio
                        .set_notify(&self.id, service, characteristic, *enabled)
                }
            };
            match submitted {
                Err(e) => {
                    warn!("{}: {} rejected by the radio: {e}", self.id, request.op.name());
                    request.completion.resolve(Err(e.into()));
                }
                Ok(()) if matches!(request.op, GattOperation::Write { requires_ack: false, .. }) => {
                    self.events.emit(Event::write(&self.id, service, characteristic));
                    request.completion.resolve(Ok(Vec::new()));
                }
                Ok(()) => {
                    self.in_flight = Some(InFlight {
                        request,
                        deadline: Instant::now() + self.timeout,
                    });
                }
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|f| f.deadline)
    }

    /// Fails the in-flight request if its deadline has passed.
    pub fn expire(&mut self, now: Instant) {
        if self.in_flight.as_ref().is_some_and(|f| f.deadline <= now) {
            if let Some(InFlight { request, .. }) = self.in_flight.take() {
                warn!("{}: {} timed out", self.id, request.op.name());
                request.completion.fail(ErrorKind::OperationTimeout);
            }
            self.pump();
        }
    }

    /// Applies a radio result to the in-flight request. Results that do not belong to it
    /// (e.g. arriving after a timeout) are dropped.
    pub fn complete(&mut self, target: GattTarget, result: OpResult, services: &mut [Service]) {
        let matches = self.in_flight.as_ref().is_some_and(|f| {
            f.request.target == target
                && matches!(
                    (&f.request.op, &result),
                    (GattOperation::Read, OpResult::Read(_))
                        | (GattOperation::Write { .. }, OpResult::Written(_))
                        | (GattOperation::SetNotify { .. }, OpResult::NotifySet(_))
                )
        });
        if !matches {
            debug!("{}: dropped stale result for {}", self.id, target.characteristic);
            return;
        }
        let Some(InFlight { request, .. }) = self.in_flight.take() else {
            return;
        };
        let GattTarget {
            service,
            characteristic,
        } = target;
        let outcome = match (result, &request.op) {
            (OpResult::Read(Ok(value)), _) => {
                self.events
                    .emit(Event::data(&self.id, service, characteristic, value.clone(), false));
                Ok(value)
            }
            (OpResult::Written(Ok(())), _) => {
                self.events.emit(Event::write(&self.id, service, characteristic));
                Ok(Vec::new())
            }
            (OpResult::NotifySet(Ok(())), GattOperation::SetNotify { enabled }) => {
                if let Some(ch) = services
                    .iter_mut()
                    .find(|s| s.uuid() == service)
                    .and_then(|s| s.characteristic_mut(characteristic))
                {
                    ch.notifying = *enabled;
                }
                self.events
                    .emit(Event::notify(&self.id, service, characteristic, *enabled));
                Ok(Vec::new())
            }
            (OpResult::Read(Err(e)) | OpResult::Written(Err(e)) | OpResult::NotifySet(Err(e)), _) => {
                Err(e.into())
            }
            (OpResult::NotifySet(Ok(())), _) => Err(ErrorKind::Internal.into()),
        };
        request.completion.resolve(outcome);
        self.pump();
    }

    /// Fails the in-flight request and everything queued behind it.
    pub fn drain(&mut self, kind: ErrorKind) {
        let in_flight = self.in_flight.take().map(|f| f.request);
        let count = self.len() + usize::from(in_flight.is_some());
        if count > 0 {
            debug!("{}: failing {count} GATT operations with {kind:?}", self.id);
        }
        for request in in_flight.into_iter().chain(self.pending.drain(..)) {
            request.completion.fail(kind);
        }
    }
}
