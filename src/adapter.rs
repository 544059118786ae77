//! Adapter power state tracking.

use async_lock::Mutex;
use log::info;

use crate::event::{Event, EventEmitter};

/// Power state of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum AdapterState {
    /// The platform has no usable Bluetooth LE adapter.
    Unsupported,
    PoweredOff,
    TurningOff,
    PoweredOn,
    TurningOn,
    /// The platform reported a state code this crate does not know.
    Unknown,
}

impl AdapterState {
    /// `BluetoothAdapter.STATE_OFF`
    pub const RAW_OFF: i32 = 10;
    /// `BluetoothAdapter.STATE_TURNING_ON`
    pub const RAW_TURNING_ON: i32 = 11;
    /// `BluetoothAdapter.STATE_ON`
    pub const RAW_ON: i32 = 12;
    /// `BluetoothAdapter.STATE_TURNING_OFF`
    pub const RAW_TURNING_OFF: i32 = 13;

    /// Maps a raw platform state code. Unrecognized codes become [`AdapterState::Unknown`].
    pub fn from_raw(code: i32) -> Self {
        match code {
            Self::RAW_OFF => Self::PoweredOff,
            Self::RAW_TURNING_ON => Self::TurningOn,
            Self::RAW_ON => Self::PoweredOn,
            Self::RAW_TURNING_OFF => Self::TurningOff,
            _ => Self::Unknown,
        }
    }

    /// The name reported in `stateChange` events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::PoweredOff => "poweredOff",
            Self::TurningOff => "turningOff",
            Self::PoweredOn => "poweredOn",
            Self::TurningOn => "turningOn",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_powered_on(&self) -> bool {
        *self == Self::PoweredOn
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caches the adapter state and re-emits every change as a `stateChange` event.
pub(crate) struct AdapterMonitor {
    state: Mutex<AdapterState>,
    events: EventEmitter,
}

impl AdapterMonitor {
    pub fn new(initial: AdapterState, events: EventEmitter) -> Self {
        Self {
            state: Mutex::new(initial),
            events,
        }
    }

    pub fn state(&self) -> AdapterState {
        *self.state.lock_blocking()
    }

    /// Stores the new state. Returns the previous state if it changed; repeated
    /// reports of the current state are swallowed.
    pub fn update(&self, new_state: AdapterState) -> Option<AdapterState> {
        let mut guard = self.state.lock_blocking();
        if *guard == new_state {
            return None;
        }
        let prev = std::mem::replace(&mut *guard, new_state);
        drop(guard);
        info!("adapter state changed: {prev} -> {new_state}");
        self.events.emit(Event::StateChange { state: new_state });
        Some(prev)
    }

    pub fn update_raw(&self, code: i32) -> Option<AdapterState> {
        self.update(AdapterState::from_raw(code))
    }

    /// Emits the current state without changing it, used by the `getState` command.
    pub fn report(&self) -> AdapterState {
        let state = self.state();
        self.events.emit(Event::StateChange { state });
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_map_to_states() {
        assert_eq!(AdapterState::from_raw(10), AdapterState::PoweredOff);
        assert_eq!(AdapterState::from_raw(11), AdapterState::TurningOn);
        assert_eq!(AdapterState::from_raw(12), AdapterState::PoweredOn);
        assert_eq!(AdapterState::from_raw(13), AdapterState::TurningOff);
        assert_eq!(AdapterState::from_raw(-1), AdapterState::Unknown);
        assert_eq!(AdapterState::from_raw(14), AdapterState::Unknown);
    }

    #[test]
    fn duplicate_reports_are_collapsed() {
        let events = EventEmitter::new(8);
        let mut rx = events.subscribe();
        let monitor = AdapterMonitor::new(AdapterState::PoweredOff, events);

        assert_eq!(monitor.update_raw(AdapterState::RAW_ON), Some(AdapterState::PoweredOff));
        assert_eq!(monitor.update_raw(AdapterState::RAW_ON), None);
        assert_eq!(monitor.state(), AdapterState::PoweredOn);

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::StateChange {
                state: AdapterState::PoweredOn
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn report_emits_without_changing() {
        let events = EventEmitter::new(8);
        let mut rx = events.subscribe();
        let monitor = AdapterMonitor::new(AdapterState::Unsupported, events);
        assert_eq!(monitor.report(), AdapterState::Unsupported);
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::StateChange {
                state: AdapterState::Unsupported
            }
        );
    }
}
