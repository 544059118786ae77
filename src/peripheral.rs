use super::connection::ConnectionState;
use super::{AdvertisementData, PeripheralId};

/// Snapshot of what the session knows about one peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peripheral {
    pub(crate) id: PeripheralId,
    pub(crate) advertisement: Option<AdvertisementData>,
    pub(crate) rssi: Option<i16>,
    pub(crate) connectable: bool,
    pub(crate) state: ConnectionState,
}

impl Peripheral {
    pub(crate) fn new(id: PeripheralId) -> Self {
        Self {
            id,
            advertisement: None,
            rssi: None,
            connectable: true,
            state: ConnectionState::Disconnected,
        }
    }

    /// Returns this peripheral’s unique identifier.
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// The advertised local name, if the last advertisement carried one.
    pub fn name(&self) -> Option<&str> {
        self.advertisement.as_ref()?.local_name.as_deref()
    }

    /// The last advertisement seen while scanning.
    pub fn advertisement(&self) -> Option<&AdvertisementData> {
        self.advertisement.as_ref()
    }

    /// Signal strength of the last advertisement in dBm.
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub fn is_connectable(&self) -> bool {
        self.connectable
    }

    /// The connection state at the time of the snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl std::fmt::Display for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name().unwrap_or("(Unknown name)"))
    }
}
