//! Error types for payload decoding in cpb-types.

use thiserror::Error;

/// Errors that can occur when decoding or encoding CPB characteristic payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in cpb-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Payload is shorter than the fixed-width field it should hold.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Expected payload size.
        expected: usize,
        /// Actual payload size received.
        actual: usize,
    },

    /// Payload decoded but the value is not acceptable.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Value cannot be represented in the wire encoding.
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

/// Result type alias using cpb-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
