//! Error types for cpb-core.
//!
//! This module defines all error types that can occur while enabling a CPB
//! sensor service over Bluetooth Low Energy.
//!
//! # Which Errors Reach the Caller
//!
//! | Step | Failure | Surfaced as |
//! |------|---------|-------------|
//! | Main characteristic lookup | not found | [`Error::InvalidCharacteristic`] |
//! | Main characteristic lookup | transport error | [`Error::InvalidCharacteristic`] |
//! | Version resolution | anything | never surfaced, version defaults to 1 |
//! | Period lookup | missing or transport error | [`Error::InvalidCharacteristic`] |
//! | Period write | transport error | the transport error, unchanged |
//! | Notify enable | transport error | the transport error, unchanged |
//! | Notify enable | flag did not change | [`Error::EnableNotifyFailed`] |
//!
//! No step is retried. After the handshake completes, notification delivery
//! errors are sent to the measurement sink, not to the enable result.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when talking to a CPB sensor service.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the btleplug transport.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Error reported by a non-btleplug transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Required characteristic could not be located in the service.
    #[error("Invalid characteristic: {characteristic} not found in service {service}")]
    InvalidCharacteristic {
        /// The service that was searched.
        service: Uuid,
        /// The characteristic that was not found.
        characteristic: Uuid,
    },

    /// Subscribe request succeeded but the characteristic is not notifying.
    #[error("Enable notify failed for characteristic {characteristic}")]
    EnableNotifyFailed {
        /// The characteristic that should be notifying.
        characteristic: Uuid,
    },

    /// Version payload is structurally invalid.
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    /// Payload present but not decodable into the expected fixed-width field.
    #[error("Invalid response data: {0}")]
    InvalidResponseData(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Peripheral was dropped while a service operation still referenced it.
    #[error("Peripheral released before the operation completed")]
    PeripheralReleased,

    /// Invalid configuration or argument.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Copyable classification of an [`Error`].
///
/// Carried by [`crate::EnableState::Failed`] so the failure of a handshake can
/// be observed without owning the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::InvalidCharacteristic`].
    InvalidCharacteristic,
    /// See [`Error::EnableNotifyFailed`].
    EnableNotifyFailed,
    /// See [`Error::UnknownVersion`].
    UnknownVersion,
    /// See [`Error::InvalidResponseData`].
    InvalidResponseData,
    /// Transport-level failure (btleplug or other).
    Transport,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::PeripheralReleased`].
    PeripheralReleased,
    /// See [`Error::InvalidConfig`].
    InvalidConfig,
}

impl Error {
    /// Create an invalid characteristic error.
    pub fn invalid_characteristic(service: Uuid, characteristic: Uuid) -> Self {
        Self::InvalidCharacteristic {
            service,
            characteristic,
        }
    }

    /// Create a transport error from any displayable message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Bluetooth(_) | Self::Transport(_) => ErrorKind::Transport,
            Self::InvalidCharacteristic { .. } => ErrorKind::InvalidCharacteristic,
            Self::EnableNotifyFailed { .. } => ErrorKind::EnableNotifyFailed,
            Self::UnknownVersion(_) => ErrorKind::UnknownVersion,
            Self::InvalidResponseData(_) => ErrorKind::InvalidResponseData,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::PeripheralReleased => ErrorKind::PeripheralReleased,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

impl From<cpb_types::ParseError> for Error {
    fn from(err: cpb_types::ParseError) -> Self {
        match err {
            cpb_types::ParseError::InsufficientBytes { expected, actual } => {
                Error::InvalidResponseData(format!("expected {} bytes, got {}", expected, actual))
            }
            cpb_types::ParseError::InvalidValue(msg) => Error::InvalidResponseData(msg),
            cpb_types::ParseError::OutOfRange(msg) => Error::InvalidConfig(msg),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidConfig(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using cpb-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use cpb_types::uuids::{MEASUREMENT_PERIOD, TEMPERATURE_SERVICE};

    #[test]
    fn test_error_display() {
        let err = Error::invalid_characteristic(TEMPERATURE_SERVICE, MEASUREMENT_PERIOD);
        let msg = err.to_string();
        assert!(msg.contains("adaf0001"));
        assert!(msg.contains("adaf0100"));

        let err = Error::EnableNotifyFailed {
            characteristic: MEASUREMENT_PERIOD,
        };
        assert!(err.to_string().starts_with("Enable notify failed"));

        let err = Error::timeout("read characteristic", Duration::from_secs(10));
        assert!(err.to_string().contains("read characteristic"));
        assert!(err.to_string().contains("10s"));

        assert_eq!(
            Error::PeripheralReleased.to_string(),
            "Peripheral released before the operation completed"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::invalid_characteristic(TEMPERATURE_SERVICE, MEASUREMENT_PERIOD).kind(),
            ErrorKind::InvalidCharacteristic
        );
        assert_eq!(Error::transport("link lost").kind(), ErrorKind::Transport);
        assert_eq!(
            Error::InvalidResponseData("short".into()).kind(),
            ErrorKind::InvalidResponseData
        );
        assert_eq!(
            Error::PeripheralReleased.kind(),
            ErrorKind::PeripheralReleased
        );
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = cpb_types::ParseError::InsufficientBytes {
            expected: 4,
            actual: 2,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid response data: expected 4 bytes, got 2"
        );

        let err: Error = cpb_types::ParseError::OutOfRange("too long".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
