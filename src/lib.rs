//! Bluetooth LE central-role session manager.
//!
//! A [`Session`] sits between an application that speaks in noble-style commands and events
//! and a platform Bluetooth stack implementing [`Radio`]. It tracks the adapter power state,
//! deduplicates scan results, drives each peripheral through connect and service discovery,
//! and serializes GATT operations per peripheral.
//!
//! The platform reports results through the [`RadioCallback`] obtained from
//! [`Session::radio_callback`]. Applications observe [`Event`]s from [`Session::events`], or
//! drive the session with string-typed [`Command`]s through [`Session::execute`].
//!
//! The crate is runtime agnostic: every command returns a [`Pending`] future that can be
//! awaited on any executor.

pub use adapter::AdapterState;
pub use async_util::Pending;
pub use bridge::{Command, Reply};
pub use btuuid::BluetoothUuidExt;
pub use callback::{PeripheralEvent, RadioCallback, RadioEvent};
pub use characteristic::{Characteristic, CharacteristicInfo, CharacteristicProperties};
pub use connection::ConnectionState;
pub use error::{AttError, Error, ErrorKind, RadioError};
pub use event::{AdvertisementInfo, Discovery, Event, EventStream, ServiceDataInfo};
pub use gatt_queue::{GattOperation, GattTarget};
pub use peripheral::Peripheral;
pub use radio::Radio;
pub use service::{Service, ServiceLayout};
pub use session::{Session, SessionConfig};

/// Convenience alias for a result with [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use uuid::Uuid;
pub mod btuuid;
pub mod error;
mod types;
pub use types::*;

mod adapter;
mod async_util;
mod bridge;
mod callback;
mod characteristic;
mod connection;
mod event;
mod gatt_queue;
mod peripheral;
mod radio;
mod registry;
mod scanner;
mod service;
mod session;

#[cfg(test)]
mod test_util;
