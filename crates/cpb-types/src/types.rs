//! Core types for CPB sensor services.

use core::fmt;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};

/// Size in bytes of the version and period fields.
pub const FIELD_BYTES: usize = 4;

/// Sensor service exposed by a Circuit Playground Bluefruit peripheral.
///
/// Each service carries one main characteristic plus the shared period and
/// version characteristics.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new services
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum SensorService {
    /// Temperature in degrees Celsius.
    Temperature,
    /// Three-axis acceleration.
    Accelerometer,
    /// Ambient light level.
    Light,
    /// Three-axis angular rate.
    Gyroscope,
    /// Three-axis magnetic field.
    Magnetometer,
    /// Buttons and slide switch.
    Buttons,
    /// Relative humidity.
    Humidity,
    /// Barometric pressure.
    BarometricPressure,
}

impl SensorService {
    /// Every known sensor service.
    pub const ALL: [SensorService; 8] = [
        SensorService::Temperature,
        SensorService::Accelerometer,
        SensorService::Light,
        SensorService::Gyroscope,
        SensorService::Magnetometer,
        SensorService::Buttons,
        SensorService::Humidity,
        SensorService::BarometricPressure,
    ];

    /// Returns the GATT service UUID.
    #[must_use]
    pub fn service_uuid(&self) -> Uuid {
        use crate::uuid::*;
        match self {
            SensorService::Temperature => TEMPERATURE_SERVICE,
            SensorService::Accelerometer => ACCELEROMETER_SERVICE,
            SensorService::Light => LIGHT_SERVICE,
            SensorService::Gyroscope => GYROSCOPE_SERVICE,
            SensorService::Magnetometer => MAGNETOMETER_SERVICE,
            SensorService::Buttons => BUTTONS_SERVICE,
            SensorService::Humidity => HUMIDITY_SERVICE,
            SensorService::BarometricPressure => BAROMETRIC_PRESSURE_SERVICE,
        }
    }

    /// Returns the UUID of the characteristic carrying the measurement payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use cpb_types::SensorService;
    /// use cpb_types::uuid;
    ///
    /// assert_eq!(SensorService::Light.main_characteristic(), uuid::LIGHT_LEVEL);
    /// ```
    #[must_use]
    pub fn main_characteristic(&self) -> Uuid {
        use crate::uuid::*;
        match self {
            SensorService::Temperature => TEMPERATURE,
            SensorService::Accelerometer => ACCELERATION,
            SensorService::Light => LIGHT_LEVEL,
            SensorService::Gyroscope => ANGULAR_RATE,
            SensorService::Magnetometer => MAGNETIC_FIELD,
            SensorService::Buttons => BUTTON_STATE,
            SensorService::Humidity => HUMIDITY,
            SensorService::BarometricPressure => BAROMETRIC_PRESSURE,
        }
    }

    /// Look up a sensor service by its GATT service UUID.
    #[must_use]
    pub fn from_service_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.service_uuid() == uuid)
    }
}

impl fmt::Display for SensorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorService::Temperature => write!(f, "Temperature"),
            SensorService::Accelerometer => write!(f, "Accelerometer"),
            SensorService::Light => write!(f, "Light"),
            SensorService::Gyroscope => write!(f, "Gyroscope"),
            SensorService::Magnetometer => write!(f, "Magnetometer"),
            SensorService::Buttons => write!(f, "Buttons"),
            SensorService::Humidity => write!(f, "Humidity"),
            SensorService::BarometricPressure => write!(f, "Barometric Pressure"),
        }
    }
}

/// Protocol version reported by a sensor service.
///
/// Services without a readable version characteristic are treated as
/// [`Version::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Version(pub u32);

impl Version {
    /// Version assumed when the version characteristic cannot be read.
    pub const DEFAULT: Version = Version(1);

    /// Decode a version from a characteristic payload.
    ///
    /// The first four bytes hold an unsigned 32-bit integer; trailing bytes
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` contains fewer than
    /// [`FIELD_BYTES`] bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use cpb_types::Version;
    ///
    /// assert_eq!(Version::from_bytes(&[2, 0, 0, 0]), Ok(Version(2)));
    /// assert!(Version::from_bytes(&[2]).is_err());
    /// ```
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < FIELD_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: FIELD_BYTES,
                actual: data.len(),
            });
        }
        let mut buf = data;
        Ok(Version(buf.get_u32_le()))
    }

    /// Get the raw version number.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Convert a period to the millisecond count sent on the wire.
///
/// The count is `round(seconds * 1000)`.
///
/// # Errors
///
/// Returns [`ParseError::OutOfRange`] if the count does not fit in an `i32`.
pub fn encode_period_ms(period: Duration) -> ParseResult<i32> {
    let millis = (period.as_secs_f64() * 1000.0).round();
    if millis > f64::from(i32::MAX) {
        return Err(ParseError::OutOfRange(format!(
            "period of {:?} exceeds {} ms",
            period,
            i32::MAX
        )));
    }
    Ok(millis as i32)
}

/// Encode a period as the 32-bit little-endian millisecond payload.
///
/// # Errors
///
/// Returns [`ParseError::OutOfRange`] if the period is too long to encode.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cpb_types::encode_period;
///
/// let bytes = encode_period(Duration::from_secs_f64(2.5)).unwrap();
/// assert_eq!(bytes, [0xC4, 0x09, 0x00, 0x00]);
/// ```
pub fn encode_period(period: Duration) -> ParseResult<[u8; FIELD_BYTES]> {
    let millis = encode_period_ms(period)?;
    let mut out = [0u8; FIELD_BYTES];
    let mut buf = &mut out[..];
    buf.put_i32_le(millis);
    Ok(out)
}

/// Decode the raw millisecond count from a period payload.
///
/// # Errors
///
/// Returns [`ParseError::InsufficientBytes`] if `data` contains fewer than
/// [`FIELD_BYTES`] bytes.
pub fn decode_period_ms(data: &[u8]) -> ParseResult<i32> {
    if data.len() < FIELD_BYTES {
        return Err(ParseError::InsufficientBytes {
            expected: FIELD_BYTES,
            actual: data.len(),
        });
    }
    let mut buf = data;
    Ok(buf.get_i32_le())
}

/// Decode a period payload into a duration.
///
/// # Errors
///
/// Returns [`ParseError::InsufficientBytes`] for short payloads and
/// [`ParseError::InvalidValue`] for negative millisecond counts.
pub fn decode_period(data: &[u8]) -> ParseResult<Duration> {
    let millis = decode_period_ms(data)?;
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| ParseError::InvalidValue(format!("negative period: {} ms", millis)))
}

/// One notification payload from a service's main characteristic.
///
/// Frames are delivered exactly once per notification and are never
/// merged or split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementFrame {
    /// Raw characteristic value.
    pub data: Bytes,
    /// Identifier of the peripheral that sent the notification.
    pub peripheral: String,
}

impl MeasurementFrame {
    /// Create a new frame.
    pub fn new(data: impl Into<Bytes>, peripheral: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            peripheral: peripheral.into(),
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
