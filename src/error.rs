//! Defines error types.

use std::fmt::Debug;

/// Errors reported by the platform radio layer, not exposed as an [`ErrorKind`] directly.
#[derive(Clone, PartialEq, Eq)]
pub enum RadioError {
    /// The ATT layer of the remote device rejected the request.
    GattError(AttError),
    /// The platform returned a non-zero status code for a submission.
    StatusCode(i32),
    /// The platform refused to start the request (e.g. a Java call returning `false`).
    Rejected,
}

impl std::error::Error for RadioError {}

impl std::fmt::Debug for RadioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GattError(att_err) => write!(f, "GattError({att_err:?})"),
            Self::StatusCode(code) => write!(f, "StatusCode({code})"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

impl std::fmt::Display for RadioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GattError(att_error) => write!(f, "GATT error: {att_error}"),
            Self::StatusCode(code) => write!(f, "radio returned status code {code}"),
            Self::Rejected => write!(f, "radio rejected the request"),
        }
    }
}

impl From<AttError> for RadioError {
    fn from(att_error: AttError) -> Self {
        Self::GattError(att_error)
    }
}

impl From<AttError> for Error {
    fn from(e: AttError) -> Self {
        RadioError::GattError(e).into()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            source: None,
            message: String::new(),
        }
    }
}

impl From<RadioError> for Error {
    fn from(err: RadioError) -> Self {
        let kind = match &err {
            RadioError::GattError(att_error) => ErrorKind::Protocol(*att_error),
            RadioError::StatusCode(_) | RadioError::Rejected => ErrorKind::Radio,
        };
        let msg = err.to_string();
        Error::new(kind, Some(err), msg)
    }
}

/// The error type for session operations.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<RadioError>,
    message: String,
}

impl Error {
    pub(crate) fn new<S: ToString>(kind: ErrorKind, source: Option<RadioError>, message: S) -> Self {
        Error {
            kind,
            source,
            message: message.to_string(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.message.is_empty(), &self.source) {
            (true, None) => write!(f, "{}", &self.kind),
            (false, None) => write!(f, "{}: {}", &self.kind, &self.message),
            (_, Some(err)) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = x;
            x
        })
    }
}

/// A list of general categories of session errors.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// the Bluetooth adapter is not powered on
    AdapterNotReady,
    /// no peripheral is registered with this address
    UnknownPeripheral,
    /// the peripheral has not finished service discovery
    NotReady,
    /// the characteristic does not support this operation
    UnsupportedOperation,
    /// connection attempt timed out
    ConnectTimeout,
    /// GATT operation timed out
    OperationTimeout,
    /// the radio link was lost
    LinkLost,
    /// the peripheral was disconnected before the operation completed
    Disconnected,
    /// connection failed
    ConnectionFailed,
    /// not found
    NotFound,
    /// invalid parameter
    InvalidParameter,
    /// protocol error: {0}
    Protocol(AttError),
    /// the radio rejected the request
    Radio,
    /// an internal error has occured
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AdapterNotReady => f.write_str("the Bluetooth adapter is not powered on"),
            ErrorKind::UnknownPeripheral => f.write_str("no peripheral is registered with this address"),
            ErrorKind::NotReady => f.write_str("the peripheral has not finished service discovery"),
            ErrorKind::UnsupportedOperation => {
                f.write_str("the characteristic does not support this operation")
            }
            ErrorKind::ConnectTimeout => f.write_str("connection attempt timed out"),
            ErrorKind::OperationTimeout => f.write_str("GATT operation timed out"),
            ErrorKind::LinkLost => f.write_str("the radio link was lost"),
            ErrorKind::Disconnected => {
                f.write_str("the peripheral was disconnected before the operation completed")
            }
            ErrorKind::ConnectionFailed => f.write_str("connection failed"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::InvalidParameter => f.write_str("invalid parameter"),
            ErrorKind::Protocol(err) => write!(f, "protocol error: {err}"),
            ErrorKind::Radio => f.write_str("the radio rejected the request"),
            ErrorKind::Internal => f.write_str("an internal error has occured"),
        }
    }
}

/// Bluetooth Attribute Protocol error. See the Bluetooth Core Specification, Vol 3, Part F, §3.4.1.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttError(u8);

impl AttError {
    /// The operation completed successfully.
    pub const SUCCESS: AttError = AttError(0x00);
    /// The attribute handle given was not valid on this server.
    pub const INVALID_HANDLE: AttError = AttError(0x01);
    /// The attribute cannot be read.
    pub const READ_NOT_PERMITTED: AttError = AttError(0x02);
    /// The attribute cannot be written.
    pub const WRITE_NOT_PERMITTED: AttError = AttError(0x03);
    /// The attribute PDU was invalid.
    pub const INVALID_PDU: AttError = AttError(0x04);
    /// The attribute requires authentication before it can be read or written.
    pub const INSUFFICIENT_AUTHENTICATION: AttError = AttError(0x05);
    /// Attribute server does not support the request received from the client.
    pub const REQUEST_NOT_SUPPORTED: AttError = AttError(0x06);
    /// The attribute requires authorization before it can be read or written.
    pub const INSUFFICIENT_AUTHORIZATION: AttError = AttError(0x08);
    /// The attribute value length is invalid for the operation.
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: AttError = AttError(0x0d);
    /// The attribute request that was requested has encountered an error that was unlikely.
    pub const UNLIKELY_ERROR: AttError = AttError(0x0e);
    /// The attribute requires encryption before it can be read or written.
    pub const INSUFFICIENT_ENCRYPTION: AttError = AttError(0x0f);
    /// Insufficient Resources to complete the request.
    pub const INSUFFICIENT_RESOURCES: AttError = AttError(0x11);
    /// Write Request Rejected
    pub const WRITE_REQUEST_REJECTED: AttError = AttError(0xfc);
    /// Client Characteristic Configuration Descriptor Improperly Configured
    pub const CCCD_IMPROPERLY_CONFIGURED: AttError = AttError(0xfd);
    /// Procedure Already in Progress
    pub const PROCEDURE_ALREADY_IN_PROGRESS: AttError = AttError(0xfe);

    /// Converts a [`u8`] value to an [`AttError`].
    pub const fn from_u8(val: u8) -> Self {
        AttError(val)
    }

    /// Converts an [`AttError`] to a [`u8`] value.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Checks if the error code is in the application error range.
    pub fn is_application(&self) -> bool {
        (0x80..0xa0).contains(&self.0)
    }
}

impl std::fmt::Display for AttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            AttError::SUCCESS => f.write_str("The operation completed successfully."),
            AttError::INVALID_HANDLE => f.write_str("The attribute handle given was not valid on this server."),
            AttError::READ_NOT_PERMITTED => f.write_str("The attribute cannot be read."),
            AttError::WRITE_NOT_PERMITTED => f.write_str("The attribute cannot be written."),
            AttError::INVALID_PDU => f.write_str("The attribute PDU was invalid."),
            AttError::INSUFFICIENT_AUTHENTICATION => f.write_str("The attribute requires authentication before it can be read or written."),
            AttError::REQUEST_NOT_SUPPORTED => f.write_str("Attribute server does not support the request received from the client."),
            AttError::INSUFFICIENT_AUTHORIZATION => f.write_str("The attribute requires authorization before it can be read or written."),
            AttError::INVALID_ATTRIBUTE_VALUE_LENGTH => f.write_str("The attribute value length is invalid for the operation."),
            AttError::UNLIKELY_ERROR => f.write_str("The attribute request encountered an unlikely error."),
            AttError::INSUFFICIENT_ENCRYPTION => f.write_str("The attribute requires encryption before it can be read or written."),
            AttError::INSUFFICIENT_RESOURCES => f.write_str("Insufficient Resources to complete the request."),
            AttError::WRITE_REQUEST_REJECTED => f.write_str("Write Request Rejected"),
            AttError::CCCD_IMPROPERLY_CONFIGURED => f.write_str("Client Characteristic Configuration Descriptor Improperly Configured"),
            AttError::PROCEDURE_ALREADY_IN_PROGRESS => f.write_str("Procedure Already in Progress"),
            _ => f.write_str(&format!("Unknown error 0x{:02x}", self.0)),
        }
    }
}

impl From<u8> for AttError {
    fn from(number: u8) -> Self {
        AttError(number)
    }
}

impl From<AttError> for u8 {
    fn from(val: AttError) -> Self {
        val.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gatt_errors_map_to_protocol_kind() {
        let err: Error = AttError::WRITE_NOT_PERMITTED.into();
        assert_eq!(err.kind(), ErrorKind::Protocol(AttError::WRITE_NOT_PERMITTED));
        assert_eq!(err.to_string(), "GATT error: The attribute cannot be written.");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn status_codes_map_to_radio_kind() {
        let err: Error = RadioError::StatusCode(201).into();
        assert_eq!(err.kind(), ErrorKind::Radio);
        assert_eq!(err.message(), "radio returned status code 201");
    }

    #[test]
    fn bare_kind_displays_its_description() {
        let err: Error = ErrorKind::UnknownPeripheral.into();
        assert_eq!(err.to_string(), "no peripheral is registered with this address");
        let err = Error::new(ErrorKind::NotFound, None, "service 180d");
        assert_eq!(err.to_string(), "not found: service 180d");
    }

    #[test]
    fn unknown_att_code_is_displayed_in_hex() {
        assert_eq!(AttError::from_u8(0x42).to_string(), "Unknown error 0x42");
        assert!(AttError::from(0x85).is_application());
    }
}
