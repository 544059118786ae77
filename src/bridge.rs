//! String-typed command surface for application bridges.
//!
//! Peripherals are addressed by their address string, UUIDs may be given in any form
//! accepted by [`crate::btuuid::parse`] and payloads travel as standard base64.

use base64::{engine::general_purpose, Engine};
use log::debug;

use crate::adapter::AdapterState;
use crate::async_util::Pending;
use crate::btuuid::{self, BluetoothUuidExt};
use crate::characteristic::CharacteristicInfo;
use crate::error::ErrorKind;
use crate::session::Session;
use crate::{PeripheralId, Result, Uuid};

/// A command received from the application side.
///
/// With the `serde` feature enabled, commands deserialize from
/// `{"command": "<name>", ...camelCase fields}`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum Command {
    /// Reports the adapter state, also emitted as a `stateChange` event.
    GetState,
    StartScan {
        #[cfg_attr(feature = "serde", serde(default))]
        service_uuids: Vec<String>,
        #[cfg_attr(feature = "serde", serde(default))]
        allow_duplicates: bool,
    },
    StopScan,
    Connect {
        peripheral_id: String,
    },
    Disconnect {
        peripheral_id: String,
    },
    DiscoverServices {
        peripheral_id: String,
    },
    DiscoverCharacteristics {
        peripheral_id: String,
        service_uuid: String,
    },
    Read {
        peripheral_id: String,
        service_uuid: String,
        characteristic_uuid: String,
    },
    Write {
        peripheral_id: String,
        service_uuid: String,
        characteristic_uuid: String,
        /// Base64-encoded payload.
        data: String,
        #[cfg_attr(feature = "serde", serde(default))]
        without_response: bool,
    },
    Notify {
        peripheral_id: String,
        service_uuid: String,
        characteristic_uuid: String,
        enable: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetState => "getState",
            Command::StartScan { .. } => "startScan",
            Command::StopScan => "stopScan",
            Command::Connect { .. } => "connect",
            Command::Disconnect { .. } => "disconnect",
            Command::DiscoverServices { .. } => "discoverServices",
            Command::DiscoverCharacteristics { .. } => "discoverCharacteristics",
            Command::Read { .. } => "read",
            Command::Write { .. } => "write",
            Command::Notify { .. } => "notify",
        }
    }
}

/// Result of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Reply {
    State(AdapterState),
    Done,
    Services(Vec<String>),
    Characteristics(Vec<CharacteristicInfo>),
    /// Base64-encoded value of a read.
    Value(String),
}

fn invalid_payload(e: base64::DecodeError) -> crate::Error {
    crate::Error::new(ErrorKind::InvalidParameter, None, format!("invalid base64 payload: {e}"))
}

fn target(service_uuid: &str, characteristic_uuid: &str) -> Result<(Uuid, Uuid)> {
    Ok((btuuid::parse(service_uuid)?, btuuid::parse(characteristic_uuid)?))
}

impl Session {
    /// Runs a bridge command.
    ///
    /// Malformed UUIDs and payloads are reported right away with
    /// [`ErrorKind::InvalidParameter`]; every other outcome is delivered by the returned future.
    pub fn execute(&self, command: Command) -> Result<Pending<Reply>> {
        debug!("executing {}", command.name());
        let pending = match command {
            Command::GetState => Pending::ready(Ok(Reply::State(self.report_state()))),
            Command::StartScan {
                service_uuids,
                allow_duplicates,
            } => {
                let filter = service_uuids
                    .iter()
                    .map(|raw| btuuid::parse(raw))
                    .collect::<Result<Vec<_>>>()?;
                Pending::ready(self.start_scan(&filter, allow_duplicates).map(|()| Reply::Done))
            }
            Command::StopScan => Pending::ready(self.stop_scan().map(|()| Reply::Done)),
            Command::Connect { peripheral_id } => self.connect(&peripheral_id.into()).map(|()| Reply::Done),
            Command::Disconnect { peripheral_id } => {
                self.disconnect(&peripheral_id.into()).map(|()| Reply::Done)
            }
            Command::DiscoverServices { peripheral_id } => {
                self.discover_services(&peripheral_id.into()).map(|uuids| {
                    Reply::Services(uuids.iter().map(BluetoothUuidExt::to_noble_string).collect())
                })
            }
            Command::DiscoverCharacteristics {
                peripheral_id,
                service_uuid,
            } => {
                let service = btuuid::parse(&service_uuid)?;
                self.discover_characteristics(&peripheral_id.into(), service)
                    .map(Reply::Characteristics)
            }
            Command::Read {
                peripheral_id,
                service_uuid,
                characteristic_uuid,
            } => {
                let (service, characteristic) = target(&service_uuid, &characteristic_uuid)?;
                self.read(&PeripheralId::from(peripheral_id), service, characteristic)
                    .map(|value| Reply::Value(general_purpose::STANDARD.encode(value)))
            }
            Command::Write {
                peripheral_id,
                service_uuid,
                characteristic_uuid,
                data,
                without_response,
            } => {
                let (service, characteristic) = target(&service_uuid, &characteristic_uuid)?;
                let value = general_purpose::STANDARD.decode(&data).map_err(invalid_payload)?;
                self.write(&peripheral_id.into(), service, characteristic, value, !without_response)
                    .map(|()| Reply::Done)
            }
            Command::Notify {
                peripheral_id,
                service_uuid,
                characteristic_uuid,
                enable,
            } => {
                let (service, characteristic) = target(&service_uuid, &characteristic_uuid)?;
                self.set_notify(&peripheral_id.into(), service, characteristic, enable)
                    .map(|()| Reply::Done)
            }
        };
        Ok(pending)
    }
}
