//! Platform-agnostic types for Circuit Playground Bluefruit sensor services.
//!
//! This crate provides the shared data types and fixed-width wire codecs
//! used by the `cpb-core` service handshake.
//!
//! # Features
//!
//! - Sensor service catalogue and characteristic UUIDs
//! - Protocol [`Version`] decoding
//! - Measurement period encoding (`i32` little-endian milliseconds)
//! - [`MeasurementFrame`] delivered per notification
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cpb_types::{SensorService, decode_period, encode_period};
//!
//! let service = SensorService::Temperature;
//! println!("{} -> {}", service, service.main_characteristic());
//!
//! let bytes = encode_period(Duration::from_millis(500)).unwrap();
//! assert_eq!(decode_period(&bytes).unwrap(), Duration::from_millis(500));
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    FIELD_BYTES, MeasurementFrame, SensorService, Version, decode_period, decode_period_ms,
    encode_period, encode_period_ms,
};
pub use uuid as uuids;
