//! A scripted [`Radio`] for unit tests.

use std::sync::Arc;

use async_lock::Mutex;
use uuid::Uuid;

use crate::btuuid::BluetoothUuidExt;
use crate::error::RadioError;
use crate::radio::Radio;
use crate::PeripheralId;

#[derive(Default)]
struct FakeState {
    adapter_state: Option<i32>,
    calls: Vec<String>,
    reject_next: bool,
    reject_disconnect: bool,
}

/// Records every submission as a short string such as `"read AA:BB 2a38"`. Clones share
/// their state, so a test can keep one handle while the session owns another.
#[derive(Clone)]
pub(crate) struct FakeRadio {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeRadio {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                adapter_state: Some(crate::AdapterState::RAW_ON),
                ..Default::default()
            })),
        }
    }
}

impl FakeRadio {
    pub fn with_adapter_state(code: Option<i32>) -> Self {
        let radio = Self::default();
        radio.state.lock_blocking().adapter_state = code;
        radio
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock_blocking().calls.clone()
    }

    /// Makes the next submission fail with [`RadioError::Rejected`].
    pub fn reject_next(&self) {
        self.state.lock_blocking().reject_next = true;
    }

    /// Makes every `disconnect` submission fail with [`RadioError::Rejected`].
    pub fn reject_disconnects(&self) {
        self.state.lock_blocking().reject_disconnect = true;
    }

    fn record(&self, call: String) -> Result<(), RadioError> {
        let mut state = self.state.lock_blocking();
        if std::mem::take(&mut state.reject_next) {
            return Err(RadioError::Rejected);
        }
        state.calls.push(call);
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Radio for FakeRadio {
    fn adapter_state(&self) -> Option<i32> {
        self.state.lock_blocking().adapter_state
    }

    fn start_scan(&self, _service_uuids: &[Uuid], _allow_duplicates: bool) -> Result<(), RadioError> {
        self.record("start_scan".into())
    }

    fn stop_scan(&self) -> Result<(), RadioError> {
        self.record("stop_scan".into())
    }

    fn connect(&self, id: &PeripheralId) -> Result<(), RadioError> {
        self.record(format!("connect {id}"))
    }

    fn disconnect(&self, id: &PeripheralId) -> Result<(), RadioError> {
        if self.state.lock_blocking().reject_disconnect {
            return Err(RadioError::Rejected);
        }
        self.record(format!("disconnect {id}"))
    }

    fn discover_services(&self, id: &PeripheralId) -> Result<(), RadioError> {
        self.record(format!("discover_services {id}"))
    }

    fn read(&self, id: &PeripheralId, _service: Uuid, characteristic: Uuid) -> Result<(), RadioError> {
        self.record(format!("read {id} {}", characteristic.to_noble_string()))
    }

    fn write(
        &self,
        id: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), RadioError> {
        let mode = if with_response { "ack" } else { "noack" };
        self.record(format!(
            "write {id} {} {} {mode}",
            characteristic.to_noble_string(),
            hex(value)
        ))
    }

    fn set_notify(
        &self,
        id: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), RadioError> {
        let mode = if enabled { "on" } else { "off" };
        self.record(format!("set_notify {id} {} {mode}", characteristic.to_noble_string()))
    }
}
