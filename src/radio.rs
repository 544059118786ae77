//! The platform side of a session.

use uuid::Uuid;

use crate::error::RadioError;
use crate::PeripheralId;

/// Raw central-role primitives of the platform Bluetooth stack.
///
/// Every method only *submits* a request and returns whether the platform accepted it.
/// The outcome is reported later through [`crate::RadioCallback::deliver`], in the same way
/// Android reports GATT results through `BluetoothGattCallback`. Implementations must not
/// block and must not call back into the session from inside these methods.
///
/// The session guarantees that at most one GATT request per peripheral is outstanding.
pub trait Radio: Send + Sync + 'static {
    /// Raw adapter power state (see [`crate::AdapterState::from_raw`]), or `None` if the
    /// platform has no Bluetooth LE adapter.
    fn adapter_state(&self) -> Option<i32>;

    fn start_scan(&self, service_uuids: &[Uuid], allow_duplicates: bool) -> Result<(), RadioError>;

    fn stop_scan(&self) -> Result<(), RadioError>;

    /// Opens a link to the peripheral; reported as `PeripheralEvent::Connected` or
    /// `PeripheralEvent::Disconnected`.
    fn connect(&self, id: &PeripheralId) -> Result<(), RadioError>;

    /// Tears the link down or cancels a pending connection attempt.
    fn disconnect(&self, id: &PeripheralId) -> Result<(), RadioError>;

    fn discover_services(&self, id: &PeripheralId) -> Result<(), RadioError>;

    fn read(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid) -> Result<(), RadioError>;

    fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), RadioError>;

    /// Enables or disables notifications, including the CCCD write.
    fn set_notify(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), RadioError>;
}
