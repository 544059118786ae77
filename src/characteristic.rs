use uuid::Uuid;

use super::btuuid::BluetoothUuidExt;
use super::PeripheralId;

/// Characteristic property bits, laid out as in Android's
/// `BluetoothGattCharacteristic.PROPERTY_*` constants.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicProperties(u8);

/// Mapping from property bit to the tag reported to the application.
const PROPERTY_TAGS: [(u8, &str); 8] = [
    (CharacteristicProperties::BROADCAST, "broadcast"),
    (CharacteristicProperties::READ, "read"),
    (CharacteristicProperties::WRITE_WITHOUT_RESPONSE, "writeWithoutResponse"),
    (CharacteristicProperties::WRITE, "write"),
    (CharacteristicProperties::NOTIFY, "notify"),
    (CharacteristicProperties::INDICATE, "indicate"),
    (CharacteristicProperties::AUTHENTICATED_SIGNED_WRITES, "authenticatedSignedWrites"),
    (CharacteristicProperties::EXTENDED_PROPERTIES, "extendedProperties"),
];

impl CharacteristicProperties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTHENTICATED_SIGNED_WRITES: u8 = 0x40;
    pub const EXTENDED_PROPERTIES: u8 = 0x80;

    /// Wraps a raw property bitmask.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw property bitmask.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    pub const fn read(self) -> bool {
        self.contains(Self::READ)
    }

    /// True if either acknowledged or unacknowledged writes are allowed.
    pub const fn write(self) -> bool {
        self.0 & (Self::WRITE | Self::WRITE_WITHOUT_RESPONSE) != 0
    }

    /// True if the value can be pushed by the device, as notification or indication.
    pub const fn notify(self) -> bool {
        self.0 & (Self::NOTIFY | Self::INDICATE) != 0
    }

    /// The application-facing tags for every set bit, in bit order.
    pub fn tags(self) -> Vec<&'static str> {
        PROPERTY_TAGS
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, tag)| *tag)
            .collect()
    }
}

/// A Bluetooth GATT characteristic discovered on a connected peripheral.
#[derive(Debug, Clone)]
pub struct Characteristic {
    dev_id: PeripheralId,
    service_id: Uuid,
    char_id: Uuid,
    properties: CharacteristicProperties,
    pub(crate) notifying: bool,
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Self) -> bool {
        self.dev_id == other.dev_id
            && self.service_id == other.service_id
            && self.char_id == other.char_id
    }
}

impl Eq for Characteristic {}

impl std::hash::Hash for Characteristic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.dev_id.hash(state);
        self.service_id.hash(state);
        self.char_id.hash(state);
    }
}

impl Characteristic {
    pub(crate) fn new(
        dev_id: PeripheralId,
        service_id: Uuid,
        char_id: Uuid,
        properties: CharacteristicProperties,
    ) -> Self {
        Self {
            dev_id,
            service_id,
            char_id,
            properties,
            notifying: false,
        }
    }

    /// The [Uuid] identifying the type of this GATT characteristic.
    pub fn uuid(&self) -> Uuid {
        self.char_id
    }

    /// The [Uuid] of the service this characteristic belongs to.
    pub fn service_uuid(&self) -> Uuid {
        self.service_id
    }

    /// The peripheral this characteristic belongs to.
    pub fn peripheral(&self) -> &PeripheralId {
        &self.dev_id
    }

    /// The properties of this GATT characteristic.
    ///
    /// Characteristic properties indicate which operations (e.g. read, write, notify, etc)
    /// may be performed on this characteristic.
    pub fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    /// Is the device currently sending notifications for this characteristic?
    pub fn is_notifying(&self) -> bool {
        self.notifying
    }

    /// Summary handed to the application in `characteristicsDiscover` events.
    pub fn describe(&self) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid: self.char_id.to_noble_string(),
            properties: self.properties.tags().into_iter().map(String::from).collect(),
        }
    }
}

/// Application-facing description of a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicInfo {
    pub uuid: String,
    pub properties: Vec<String>,
}
