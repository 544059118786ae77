use uuid::Uuid;

/// A peripheral's stable address, used as its identifier across the session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PeripheralId(pub(crate) String);

impl PeripheralId {
    /// Creates an identifier from a platform address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address this identifier was created from.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeripheralId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Data carried by one advertisement report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
    pub service_data: Vec<(Uuid, Vec<u8>)>,
    pub tx_power_level: Option<i16>,
}

impl AdvertisementData {
    /// Checks if any advertised service is contained in `filter`. An empty filter matches all.
    pub fn matches_filter<'a>(&self, filter: impl IntoIterator<Item = &'a Uuid>) -> bool {
        let mut filter = filter.into_iter().peekable();
        if filter.peek().is_none() {
            return true;
        }
        filter.any(|uuid| self.service_uuids.contains(uuid))
    }
}

/// A single report from the platform scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementReport {
    pub id: PeripheralId,
    pub rssi: i16,
    pub connectable: bool,
    pub advertisement: AdvertisementData,
}
