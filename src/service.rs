use super::characteristic::{Characteristic, CharacteristicProperties};
use super::PeripheralId;
use crate::Uuid;

/// A Bluetooth GATT service together with its discovered characteristics.
#[derive(Debug, Clone)]
pub struct Service {
    dev_id: PeripheralId,
    service_id: Uuid,
    chars: Vec<Characteristic>,
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.dev_id == other.dev_id && self.service_id == other.service_id
    }
}

impl Eq for Service {}

impl std::hash::Hash for Service {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.dev_id.hash(state);
        self.service_id.hash(state);
    }
}

impl Service {
    pub(crate) fn new(dev_id: PeripheralId, layout: &ServiceLayout) -> Self {
        let chars = layout
            .characteristics
            .iter()
            .map(|&(char_id, props)| {
                Characteristic::new(dev_id.clone(), layout.uuid, char_id, props)
            })
            .collect();
        Self {
            dev_id,
            service_id: layout.uuid,
            chars,
        }
    }

    /// The [Uuid] identifying the type of this GATT service.
    pub fn uuid(&self) -> Uuid {
        self.service_id
    }

    /// Get previously discovered characteristics.
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.chars
    }

    pub(crate) fn characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut Characteristic> {
        self.chars.iter_mut().find(|ch| ch.uuid() == uuid)
    }

    /// Returns the characteristic with the given [Uuid].
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.chars.iter().find(|ch| ch.uuid() == uuid)
    }
}

/// The shape of one service as enumerated by the radio during service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    pub uuid: Uuid,
    pub characteristics: Vec<(Uuid, CharacteristicProperties)>,
}

impl ServiceLayout {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// Adds a characteristic with the raw property bitmask `props`.
    pub fn with_characteristic(mut self, uuid: Uuid, props: u8) -> Self {
        self.characteristics
            .push((uuid, CharacteristicProperties::from_bits(props)));
        self
    }
}
