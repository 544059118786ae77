//! Discovery scanning with per-session deduplication.

use std::collections::HashSet;

use async_lock::Mutex;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::AdapterState;
use crate::error::ErrorKind;
use crate::event::{Discovery, Event, EventEmitter};
use crate::radio::Radio;
use crate::registry::PeripheralRegistry;
use crate::{AdvertisementReport, PeripheralId, Result};

/// State of one scan, from `start` to `stop` (or a restart).
struct ScanSession {
    filter: Vec<Uuid>,
    allow_duplicates: bool,
    seen: HashSet<PeripheralId>,
}

pub(crate) struct Scanner {
    session: Mutex<Option<ScanSession>>,
    events: EventEmitter,
}

impl Scanner {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            session: Mutex::new(None),
            events,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.session.lock_blocking().is_some()
    }

    /// Starts a scan session. Starting while already scanning restarts the session with the
    /// new parameters, so previously seen peripherals are reported again.
    pub fn start(
        &self,
        radio: &dyn Radio,
        adapter: AdapterState,
        filter: Vec<Uuid>,
        allow_duplicates: bool,
    ) -> Result<()> {
        if !adapter.is_powered_on() {
            return Err(crate::Error::new(
                ErrorKind::AdapterNotReady,
                None,
                format!("adapter is {adapter}"),
            ));
        }
        let mut guard = self.session.lock_blocking();
        if guard.take().is_some() {
            debug!("restarting scan");
            if let Err(e) = radio.stop_scan() {
                warn!("stop_scan before restart failed: {e}");
            }
        }
        radio.start_scan(&filter, allow_duplicates)?;
        info!("scan started, filter: {filter:?}, duplicates: {allow_duplicates}");
        *guard = Some(ScanSession {
            filter,
            allow_duplicates,
            seen: HashSet::new(),
        });
        Ok(())
    }

    /// Stops the current scan session. Stopping when not scanning does nothing.
    pub fn stop(&self, radio: &dyn Radio) -> Result<()> {
        if self.session.lock_blocking().take().is_none() {
            return Ok(());
        }
        info!("scan stopped");
        radio.stop_scan()?;
        Ok(())
    }

    /// Drops the scan session without touching the radio, used when the adapter powers down.
    pub fn end_session(&self) {
        if self.session.lock_blocking().take().is_some() {
            info!("scan session ended by adapter state change");
        }
    }

    /// Filters, deduplicates and records one advertisement, then emits it.
    pub fn on_advertisement(&self, report: AdvertisementReport, registry: &PeripheralRegistry) {
        let mut guard = self.session.lock_blocking();
        let Some(session) = guard.as_mut() else {
            debug!("advertisement from {} outside of a scan session", report.id);
            return;
        };
        if !report.advertisement.matches_filter(&session.filter) {
            return;
        }
        let first_sighting = session.seen.insert(report.id.clone());
        if !first_sighting && !session.allow_duplicates {
            return;
        }
        drop(guard);

        registry.record_advertisement(&report);
        let discovery = Discovery::from(&report);
        self.events.emit(if first_sighting {
            Event::Discover(discovery)
        } else {
            Event::Rediscover(discovery)
        });
    }
}
