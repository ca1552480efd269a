//! Service protocol version resolution.
//!
//! The version characteristic is advisory. Any failure to find, read or
//! decode it yields the default version rather than an error.

use tracing::debug;
use uuid::Uuid;

use cpb_types::Version;
use cpb_types::uuids::MEASUREMENT_VERSION;

use crate::error::Result;
use crate::traits::GattTransport;

/// Reads the version characteristic of a service, falling back to a default.
#[derive(Debug)]
pub struct VersionResolver<'a, P: ?Sized> {
    peripheral: &'a P,
    characteristic: Uuid,
    default: Version,
}

impl<'a, P: GattTransport + ?Sized> VersionResolver<'a, P> {
    /// Create a resolver using the standard version characteristic and default.
    pub fn new(peripheral: &'a P) -> Self {
        Self {
            peripheral,
            characteristic: MEASUREMENT_VERSION,
            default: Version::DEFAULT,
        }
    }

    /// Use a different version characteristic UUID.
    #[must_use]
    pub fn characteristic(mut self, uuid: Uuid) -> Self {
        self.characteristic = uuid;
        self
    }

    /// Use a different fallback version.
    #[must_use]
    pub fn default_version(mut self, version: Version) -> Self {
        self.default = version;
        self
    }

    /// Resolve the version of `service`.
    ///
    /// Never fails: lookup, read and decode failures all return the default.
    #[tracing::instrument(level = "debug", skip(self), fields(peripheral = %self.peripheral.identifier()))]
    pub async fn resolve(&self, service: Uuid) -> Version {
        match self.read_version(service).await {
            Ok(version) => {
                debug!(%version, "Service version resolved");
                version
            }
            Err(e) => {
                debug!(error = %e, default = %self.default, "Version unavailable, using default");
                self.default
            }
        }
    }

    async fn read_version(&self, service: Uuid) -> Result<Version> {
        let characteristic = self
            .peripheral
            .characteristic(service, self.characteristic)
            .await?;
        let data = self.peripheral.read(&characteristic).await?;
        Ok(Version::from_bytes(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOp, MockPeripheral};
    use cpb_types::SensorService;

    const SERVICE: SensorService = SensorService::Temperature;

    #[tokio::test]
    async fn test_resolve_reads_version() {
        let peripheral = MockPeripheral::builder()
            .sensor_service(SERVICE)
            .value(SERVICE.service_uuid(), MEASUREMENT_VERSION, vec![3u8, 0, 0, 0])
            .build();

        let version = VersionResolver::new(&peripheral)
            .resolve(SERVICE.service_uuid())
            .await;
        assert_eq!(version, Version(3));
    }

    #[tokio::test]
    async fn test_resolve_missing_characteristic_defaults() {
        let peripheral = MockPeripheral::builder()
            .characteristic(SERVICE.service_uuid(), SERVICE.main_characteristic())
            .build();

        let version = VersionResolver::new(&peripheral)
            .resolve(SERVICE.service_uuid())
            .await;
        assert_eq!(version, Version::DEFAULT);
    }

    #[tokio::test]
    async fn test_resolve_lookup_error_defaults() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .fail_on(MockOp::Lookup, MEASUREMENT_VERSION, "gatt busy")
            .await;

        let version = VersionResolver::new(&peripheral)
            .resolve(SERVICE.service_uuid())
            .await;
        assert_eq!(version, Version(1));
    }

    #[tokio::test]
    async fn test_resolve_read_error_defaults() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .fail_on(MockOp::Read, MEASUREMENT_VERSION, "insufficient authentication")
            .await;

        let version = VersionResolver::new(&peripheral)
            .resolve(SERVICE.service_uuid())
            .await;
        assert_eq!(version, Version(1));
        assert_eq!(peripheral.count(MockOp::Read).await, 1);
    }

    #[tokio::test]
    async fn test_resolve_short_payload_defaults() {
        let peripheral = MockPeripheral::builder()
            .sensor_service(SERVICE)
            .value(SERVICE.service_uuid(), MEASUREMENT_VERSION, vec![5u8])
            .build();

        let version = VersionResolver::new(&peripheral)
            .resolve(SERVICE.service_uuid())
            .await;
        assert_eq!(version, Version(1));
    }

    #[tokio::test]
    async fn test_custom_default_and_characteristic() {
        let custom = Uuid::from_u128(0x1234);
        let peripheral = MockPeripheral::builder()
            .value(SERVICE.service_uuid(), custom, vec![9u8, 0, 0, 0])
            .build();

        let resolver = VersionResolver::new(&peripheral).default_version(Version(7));
        assert_eq!(resolver.resolve(SERVICE.service_uuid()).await, Version(7));

        let resolver = VersionResolver::new(&peripheral).characteristic(custom);
        assert_eq!(resolver.resolve(SERVICE.service_uuid()).await, Version(9));
    }
}
