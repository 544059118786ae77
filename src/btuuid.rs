//! Bluetooth UUID helpers for the noble string convention.
//!
//! UUIDs crossing the application boundary are lowercase hex with whitespace, hyphens
//! and parentheses stripped. UUIDs derived from the Bluetooth base UUID are written in
//! their 16-bit or 32-bit short form, everything else as 32 hex digits.

use uuid::Uuid;

use crate::error::ErrorKind;
use crate::Result;

/// `00000000-0000-1000-8000-00805f9b34fb`
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

const BASE_MASK: u128 = 0x0000_0000_ffff_ffff_ffff_ffff_ffff_ffff;

/// Lowercases `raw` and strips whitespace, hyphens and parentheses.
///
/// This is a pure text transform; it does not check that the result is valid hex.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parses a UUID in any of the accepted forms: 4, 8 or 32 hex digits after normalization.
pub fn parse(raw: &str) -> Result<Uuid> {
    let norm = normalize(raw);
    let invalid = || crate::Error::new(ErrorKind::InvalidParameter, None, format!("malformed UUID {raw:?}"));
    if norm.is_empty() || !norm.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    match norm.len() {
        4 => u16::from_str_radix(&norm, 16)
            .map(Uuid::from_u16)
            .map_err(|_| invalid()),
        8 => u32::from_str_radix(&norm, 16)
            .map(Uuid::from_u32)
            .map_err(|_| invalid()),
        32 => u128::from_str_radix(&norm, 16)
            .map(Uuid::from_u128)
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Extension methods for Bluetooth short-form UUIDs.
pub trait BluetoothUuidExt: Sized {
    /// Builds the full UUID of a 16-bit assigned number.
    fn from_u16(short: u16) -> Self;
    /// Builds the full UUID of a 32-bit assigned number.
    fn from_u32(short: u32) -> Self;
    /// Returns the 32-bit short form if this UUID is derived from the base UUID.
    fn as_u32(&self) -> Option<u32>;
    /// Returns the 16-bit short form if this UUID is derived from the base UUID.
    fn as_u16(&self) -> Option<u16>;
    /// Formats the UUID the way it is sent to the application.
    fn to_noble_string(&self) -> String;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(short: u16) -> Self {
        Self::from_u32(short.into())
    }

    fn from_u32(short: u32) -> Self {
        Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(short) << 96))
    }

    fn as_u32(&self) -> Option<u32> {
        let val = self.as_u128();
        (val & BASE_MASK == BLUETOOTH_BASE_UUID).then_some((val >> 96) as u32)
    }

    fn as_u16(&self) -> Option<u16> {
        self.as_u32().and_then(|v| u16::try_from(v).ok())
    }

    fn to_noble_string(&self) -> String {
        if let Some(short) = self.as_u16() {
            format!("{short:04x}")
        } else if let Some(short) = self.as_u32() {
            format!("{short:08x}")
        } else {
            self.simple().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_separators_and_lowercases() {
        assert_eq!(normalize("1234-5678"), "12345678");
        assert_eq!(normalize(" (180D) "), "180d");
        assert_eq!(
            normalize("0000180D-0000-1000-8000-00805F9B34FB"),
            "0000180d00001000800000805f9b34fb"
        );
    }

    #[test]
    fn short_forms_round_trip_through_base_uuid() {
        let hr = parse("180D").unwrap();
        assert_eq!(hr.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(hr.to_noble_string(), "180d");
        assert_eq!(parse("0000180d-0000-1000-8000-00805f9b34fb").unwrap(), hr);
        assert_eq!(parse("12345678").unwrap().to_noble_string(), "12345678");
    }

    #[test]
    fn vendor_uuids_keep_their_full_form() {
        let nus = parse("6E400001-B5A3-F393-E0A9-E50E24DCCA9E").unwrap();
        assert_eq!(nus.to_noble_string(), "6e400001b5a3f393e0a9e50e24dcca9e");
    }

    #[test]
    fn malformed_uuids_are_rejected() {
        for bad in ["", "18", "180x", "12345", "not-a-uuid"] {
            let err = parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{bad:?}");
        }
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[ -~]{0,40}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn noble_string_parses_back(v in any::<u128>()) {
            let uuid = Uuid::from_u128(v);
            prop_assert_eq!(parse(&uuid.to_noble_string()).unwrap(), uuid);
        }
    }
}
