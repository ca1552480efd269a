//! Measurement period read/write.
//!
//! The period characteristic holds the interval between notifications as an
//! `i32` little-endian millisecond count.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use cpb_types::uuids::MEASUREMENT_PERIOD;
use cpb_types::{decode_period, encode_period};

use crate::error::{Error, Result};
use crate::traits::{GattTransport, WriteType};

/// Reads and writes the measurement period of a service.
#[derive(Debug)]
pub struct PeriodController<'a, P: ?Sized> {
    peripheral: &'a P,
    characteristic: Uuid,
}

impl<'a, P: GattTransport + ?Sized> PeriodController<'a, P> {
    /// Create a controller using the standard period characteristic.
    pub fn new(peripheral: &'a P) -> Self {
        Self {
            peripheral,
            characteristic: MEASUREMENT_PERIOD,
        }
    }

    /// Use a different period characteristic UUID.
    #[must_use]
    pub fn characteristic(mut self, uuid: Uuid) -> Self {
        self.characteristic = uuid;
        self
    }

    /// Get the current measurement period of `service`.
    ///
    /// Returns `None` if the characteristic is absent, the read fails or the
    /// payload cannot be decoded.
    #[tracing::instrument(level = "debug", skip(self), fields(peripheral = %self.peripheral.identifier()))]
    pub async fn get_period(&self, service: Uuid) -> Option<Duration> {
        let characteristic = match self
            .peripheral
            .characteristic(service, self.characteristic)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "Period characteristic unavailable");
                return None;
            }
        };

        let data = match self.peripheral.read(&characteristic).await {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Period read failed");
                return None;
            }
        };

        match decode_period(&data) {
            Ok(period) => Some(period),
            Err(e) => {
                warn!(error = %e, "Undecodable period payload");
                None
            }
        }
    }

    /// Set the measurement period of `service`.
    ///
    /// The period is rounded to whole milliseconds and written with response.
    /// Fails with [`Error::InvalidCharacteristic`] if the service has no period
    /// characteristic, in which case nothing is written.
    #[tracing::instrument(level = "debug", skip(self), fields(peripheral = %self.peripheral.identifier()))]
    pub async fn set_period(&self, period: Duration, service: Uuid) -> Result<()> {
        let characteristic = self
            .peripheral
            .characteristic(service, self.characteristic)
            .await
            .map_err(|e| match e {
                Error::InvalidCharacteristic { .. } => e,
                other => {
                    debug!(error = %other, "Period characteristic lookup failed");
                    Error::invalid_characteristic(service, self.characteristic)
                }
            })?;

        let payload = encode_period(period)?;
        info!("Setting measurement period to {:?}", period);
        if let Err(e) = self
            .peripheral
            .write(&characteristic, &payload, WriteType::WithResponse)
            .await
        {
            warn!(error = %e, "Period write failed");
            return Err(e);
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let readback = self.get_period(service).await;
            debug!(?readback, "Service period after write");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOp, MockPeripheral};
    use cpb_types::SensorService;

    const SERVICE: SensorService = SensorService::Light;

    #[tokio::test]
    async fn test_get_period() {
        let peripheral = MockPeripheral::builder()
            .sensor_service(SERVICE)
            .value(
                SERVICE.service_uuid(),
                MEASUREMENT_PERIOD,
                2500i32.to_le_bytes().to_vec(),
            )
            .build();

        let period = PeriodController::new(&peripheral)
            .get_period(SERVICE.service_uuid())
            .await;
        assert_eq!(period, Some(Duration::from_millis(2500)));
    }

    #[tokio::test]
    async fn test_get_period_absent_or_unreadable() {
        let peripheral = MockPeripheral::builder()
            .characteristic(SERVICE.service_uuid(), SERVICE.main_characteristic())
            .build();
        let controller = PeriodController::new(&peripheral);
        assert_eq!(controller.get_period(SERVICE.service_uuid()).await, None);

        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .fail_on(MockOp::Read, MEASUREMENT_PERIOD, "read not permitted")
            .await;
        let controller = PeriodController::new(&peripheral);
        assert_eq!(controller.get_period(SERVICE.service_uuid()).await, None);
    }

    #[tokio::test]
    async fn test_get_period_negative_payload() {
        let peripheral = MockPeripheral::builder()
            .value(
                SERVICE.service_uuid(),
                MEASUREMENT_PERIOD,
                (-1i32).to_le_bytes().to_vec(),
            )
            .build();
        let controller = PeriodController::new(&peripheral);
        assert_eq!(controller.get_period(SERVICE.service_uuid()).await, None);
    }

    #[tokio::test]
    async fn test_set_period_writes_le_millis_with_response() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        PeriodController::new(&peripheral)
            .set_period(Duration::from_secs_f64(2.5), SERVICE.service_uuid())
            .await
            .unwrap();

        let writes = peripheral.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].characteristic, MEASUREMENT_PERIOD);
        assert_eq!(writes[0].data, vec![0xC4, 0x09, 0x00, 0x00]);
        assert!(matches!(writes[0].write_type, WriteType::WithResponse));

        let period = PeriodController::new(&peripheral)
            .get_period(SERVICE.service_uuid())
            .await;
        assert_eq!(period, Some(Duration::from_millis(2500)));
    }

    #[tokio::test]
    async fn test_set_period_missing_characteristic() {
        let peripheral = MockPeripheral::builder()
            .characteristic(SERVICE.service_uuid(), SERVICE.main_characteristic())
            .build();

        let err = PeriodController::new(&peripheral)
            .set_period(Duration::from_secs(1), SERVICE.service_uuid())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCharacteristic { .. }));
        assert_eq!(peripheral.count(MockOp::Write).await, 0);
    }

    #[tokio::test]
    async fn test_set_period_write_error_propagates() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .fail_on(MockOp::Write, MEASUREMENT_PERIOD, "write rejected")
            .await;

        let err = PeriodController::new(&peripheral)
            .set_period(Duration::from_secs(1), SERVICE.service_uuid())
            .await
            .unwrap_err();
        match err {
            Error::Transport(msg) => assert_eq!(msg, "write rejected"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_set_period_out_of_range_not_written() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        let err = PeriodController::new(&peripheral)
            .set_period(Duration::from_secs(3_000_000), SERVICE.service_uuid())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(peripheral.count(MockOp::Write).await, 0);
    }

    #[tokio::test]
    async fn test_set_period_debug_readback_failure_is_ignored() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .fail_on(MockOp::Read, MEASUREMENT_PERIOD, "read not permitted")
            .await;

        PeriodController::new(&peripheral)
            .set_period(Duration::from_millis(750), SERVICE.service_uuid())
            .await
            .unwrap();

        let ops = peripheral.operations().await;
        assert_eq!(
            &ops[..],
            &[
                (MockOp::Lookup, MEASUREMENT_PERIOD),
                (MockOp::Write, MEASUREMENT_PERIOD),
                (MockOp::Lookup, MEASUREMENT_PERIOD),
                (MockOp::Read, MEASUREMENT_PERIOD),
            ][..]
        );
        assert_eq!(peripheral.writes().await[0].data, 750i32.to_le_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_set_period_skips_readback_without_debug() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        PeriodController::new(&peripheral)
            .set_period(Duration::from_millis(750), SERVICE.service_uuid())
            .await
            .unwrap();

        assert_eq!(peripheral.count(MockOp::Read).await, 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn set_then_get_period(ms in 0i32..=100_000_000) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let (written, period) = rt.block_on(async {
                    let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
                    let controller = PeriodController::new(&peripheral);
                    controller
                        .set_period(Duration::from_millis(ms as u64), SERVICE.service_uuid())
                        .await
                        .unwrap();
                    let written = peripheral.writes().await.pop().map(|w| w.data);
                    (written, controller.get_period(SERVICE.service_uuid()).await)
                });

                prop_assert_eq!(written, Some(ms.to_le_bytes().to_vec()));
                prop_assert_eq!(period, Some(Duration::from_millis(ms as u64)));
            }
        }
    }
}
