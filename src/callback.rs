//! Entry points for platform callbacks.

use std::sync::Weak;

use log::debug;
use uuid::Uuid;

use crate::error::RadioError;
use crate::service::ServiceLayout;
use crate::session::SessionInner;
use crate::{AdvertisementReport, PeripheralId};

/// Something the platform radio reports back to the session.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// Raw adapter state code, see [`crate::AdapterState::from_raw`].
    AdapterStateChanged(i32),
    Advertisement(AdvertisementReport),
    Peripheral(PeripheralId, PeripheralEvent),
}

/// Callbacks concerning a single peripheral's link.
#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    /// The link is up.
    Connected,
    /// The link is down, whether requested or not. `status` is the platform status code,
    /// zero for a normal teardown.
    Disconnected { status: i32 },
    ServicesDiscovered(Result<Vec<ServiceLayout>, RadioError>),
    Read {
        service: Uuid,
        characteristic: Uuid,
        result: Result<Vec<u8>, RadioError>,
    },
    Written {
        service: Uuid,
        characteristic: Uuid,
        result: Result<(), RadioError>,
    },
    NotifySet {
        service: Uuid,
        characteristic: Uuid,
        result: Result<(), RadioError>,
    },
    Notification {
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Handle given to the platform layer for reporting [`RadioEvent`]s.
///
/// It does not keep the session alive; events delivered after the session is dropped are
/// discarded. `deliver` never blocks, so it may be called from any platform callback thread.
#[derive(Clone)]
pub struct RadioCallback {
    pub(crate) inner: Weak<SessionInner>,
}

impl RadioCallback {
    pub fn deliver(&self, event: RadioEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_radio_event(event);
        } else {
            debug!("session is gone, dropped {event:?}");
        }
    }
}
