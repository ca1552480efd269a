//! Bluetooth UUIDs for Circuit Playground Bluefruit sensor services.
//!
//! Every CPB sensor service shares the same base UUID,
//! `ADAFxxxx-C332-42A8-93BD-25E905756CB8`, where `xxxx` selects the service
//! or characteristic.

use uuid::{Uuid, uuid};

// --- Common Characteristic UUIDs ---

/// Measurement period characteristic, present in every sensor service.
///
/// Value: `i32` little-endian, milliseconds between notifications.
pub const MEASUREMENT_PERIOD: Uuid = uuid!("adaf0001-c332-42a8-93bd-25e905756cb8");

/// Service version characteristic, present in every sensor service.
///
/// Value: `u32`. Absent on early firmware, in which case version 1 applies.
pub const MEASUREMENT_VERSION: Uuid = uuid!("adaf0002-c332-42a8-93bd-25e905756cb8");

// --- Sensor Service UUIDs ---

/// Temperature service.
pub const TEMPERATURE_SERVICE: Uuid = uuid!("adaf0100-c332-42a8-93bd-25e905756cb8");

/// Accelerometer service.
pub const ACCELEROMETER_SERVICE: Uuid = uuid!("adaf0200-c332-42a8-93bd-25e905756cb8");

/// Light sensor service.
pub const LIGHT_SERVICE: Uuid = uuid!("adaf0300-c332-42a8-93bd-25e905756cb8");

/// Gyroscope service.
pub const GYROSCOPE_SERVICE: Uuid = uuid!("adaf0400-c332-42a8-93bd-25e905756cb8");

/// Magnetometer service.
pub const MAGNETOMETER_SERVICE: Uuid = uuid!("adaf0500-c332-42a8-93bd-25e905756cb8");

/// Buttons and switch service.
pub const BUTTONS_SERVICE: Uuid = uuid!("adaf0600-c332-42a8-93bd-25e905756cb8");

/// Humidity service.
pub const HUMIDITY_SERVICE: Uuid = uuid!("adaf0700-c332-42a8-93bd-25e905756cb8");

/// Barometric pressure service.
pub const BAROMETRIC_PRESSURE_SERVICE: Uuid = uuid!("adaf0800-c332-42a8-93bd-25e905756cb8");

// --- Main Characteristic UUIDs ---

/// Temperature measurement (`f32`, degrees Celsius).
pub const TEMPERATURE: Uuid = uuid!("adaf0101-c332-42a8-93bd-25e905756cb8");

/// Acceleration measurement (3 x `f32`, m/s²).
pub const ACCELERATION: Uuid = uuid!("adaf0201-c332-42a8-93bd-25e905756cb8");

/// Light level measurement (`f32`, lux).
pub const LIGHT_LEVEL: Uuid = uuid!("adaf0301-c332-42a8-93bd-25e905756cb8");

/// Angular rate measurement (3 x `f32`, rad/s).
pub const ANGULAR_RATE: Uuid = uuid!("adaf0401-c332-42a8-93bd-25e905756cb8");

/// Magnetic field measurement (3 x `f32`, µT).
pub const MAGNETIC_FIELD: Uuid = uuid!("adaf0501-c332-42a8-93bd-25e905756cb8");

/// Button and switch state (`u32` bitmask).
pub const BUTTON_STATE: Uuid = uuid!("adaf0601-c332-42a8-93bd-25e905756cb8");

/// Relative humidity measurement (`f32`, percent).
pub const HUMIDITY: Uuid = uuid!("adaf0701-c332-42a8-93bd-25e905756cb8");

/// Barometric pressure measurement (`f32`, hPa).
pub const BAROMETRIC_PRESSURE: Uuid = uuid!("adaf0801-c332-42a8-93bd-25e905756cb8");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_characteristic_uuids() {
        assert_eq!(
            MEASUREMENT_PERIOD.to_string(),
            "adaf0001-c332-42a8-93bd-25e905756cb8"
        );
        assert_eq!(
            MEASUREMENT_VERSION.to_string(),
            "adaf0002-c332-42a8-93bd-25e905756cb8"
        );
    }

    #[test]
    fn test_uuids_share_cpb_base() {
        let all = [
            MEASUREMENT_PERIOD,
            MEASUREMENT_VERSION,
            TEMPERATURE_SERVICE,
            TEMPERATURE,
            ACCELEROMETER_SERVICE,
            ACCELERATION,
            LIGHT_SERVICE,
            LIGHT_LEVEL,
            GYROSCOPE_SERVICE,
            ANGULAR_RATE,
            MAGNETOMETER_SERVICE,
            MAGNETIC_FIELD,
            BUTTONS_SERVICE,
            BUTTON_STATE,
            HUMIDITY_SERVICE,
            HUMIDITY,
            BAROMETRIC_PRESSURE_SERVICE,
            BAROMETRIC_PRESSURE,
        ];
        for uuid in all {
            let s = uuid.to_string();
            assert!(s.starts_with("adaf"), "{s}");
            assert!(s.ends_with("-c332-42a8-93bd-25e905756cb8"), "{s}");
        }
    }

    #[test]
    fn test_main_characteristic_follows_service() {
        // Main characteristic is service + 1 in the short id
        let pairs = [
            (TEMPERATURE_SERVICE, TEMPERATURE),
            (ACCELEROMETER_SERVICE, ACCELERATION),
            (LIGHT_SERVICE, LIGHT_LEVEL),
            (BUTTONS_SERVICE, BUTTON_STATE),
            (BAROMETRIC_PRESSURE_SERVICE, BAROMETRIC_PRESSURE),
        ];
        for (service, main) in pairs {
            let s = service.as_fields().0;
            let m = main.as_fields().0;
            assert_eq!(s + 1, m);
        }
    }
}
