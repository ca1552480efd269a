//! Notification subscription management.

use tracing::{debug, warn};

use crate::characteristic::{Characteristic, NotifyHandler};
use crate::error::{Error, Result};
use crate::traits::GattTransport;

/// Enables notifications on a characteristic, or swaps the handler of an
/// existing subscription.
#[derive(Debug)]
pub struct NotificationCoordinator<'a, P: ?Sized> {
    peripheral: &'a P,
}

impl<'a, P: GattTransport + ?Sized> NotificationCoordinator<'a, P> {
    /// Create a coordinator for `peripheral`.
    pub fn new(peripheral: &'a P) -> Self {
        Self { peripheral }
    }

    /// Route notifications of `characteristic` to `handler`.
    ///
    /// If the characteristic is already notifying, only the handler is
    /// replaced and no subscribe request is sent. Otherwise a subscribe
    /// request is issued; transport errors are returned unchanged, and a
    /// subscription that reports success without the characteristic actually
    /// notifying fails with [`Error::EnableNotifyFailed`].
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(peripheral = %self.peripheral.identifier(), characteristic = %characteristic.uuid())
    )]
    pub async fn enable(
        &self,
        characteristic: &Characteristic,
        handler: NotifyHandler,
    ) -> Result<()> {
        if characteristic.is_notifying() {
            debug!("Already notifying, replacing handler");
            self.peripheral.update_notify_handler(characteristic, handler);
            return Ok(());
        }

        self.peripheral.subscribe(characteristic, handler).await?;

        if !characteristic.is_notifying() {
            warn!("Subscribe reported success but characteristic is not notifying");
            return Err(Error::EnableNotifyFailed {
                characteristic: characteristic.uuid(),
            });
        }

        debug!("Notifications enabled");
        Ok(())
    }

    /// Stop notifications on `characteristic` and drop its handler.
    ///
    /// Does nothing if the characteristic is not notifying.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(peripheral = %self.peripheral.identifier(), characteristic = %characteristic.uuid())
    )]
    pub async fn disable(&self, characteristic: &Characteristic) -> Result<()> {
        if !characteristic.is_notifying() {
            characteristic.clear_handler();
            return Ok(());
        }
        self.peripheral.unsubscribe(characteristic).await?;
        debug!("Notifications disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mock::{MockOp, MockPeripheral};
    use cpb_types::SensorService;

    const SERVICE: SensorService = SensorService::Accelerometer;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> NotifyHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_: Result<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn main_characteristic(peripheral: &MockPeripheral) -> Characteristic {
        peripheral
            .characteristic(SERVICE.service_uuid(), SERVICE.main_characteristic())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enable_subscribes() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        let characteristic = main_characteristic(&peripheral).await;
        let hits = Arc::new(AtomicUsize::new(0));

        NotificationCoordinator::new(&peripheral)
            .enable(&characteristic, counting_handler(&hits))
            .await
            .unwrap();

        assert!(characteristic.is_notifying());
        assert_eq!(peripheral.count(MockOp::Subscribe).await, 1);

        peripheral
            .notify(SERVICE.service_uuid(), SERVICE.main_characteristic(), vec![1u8])
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enable_twice_subscribes_once_and_replaces_handler() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        let characteristic = main_characteristic(&peripheral).await;
        let coordinator = NotificationCoordinator::new(&peripheral);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        coordinator
            .enable(&characteristic, counting_handler(&first))
            .await
            .unwrap();
        coordinator
            .enable(&characteristic, counting_handler(&second))
            .await
            .unwrap();

        assert_eq!(peripheral.count(MockOp::Subscribe).await, 1);

        peripheral
            .notify(SERVICE.service_uuid(), SERVICE.main_characteristic(), vec![2u8])
            .await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enable_transport_error_propagates() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .fail_on(MockOp::Subscribe, SERVICE.main_characteristic(), "cccd write failed")
            .await;
        let characteristic = main_characteristic(&peripheral).await;

        let err = NotificationCoordinator::new(&peripheral)
            .enable(&characteristic, Arc::new(|_: Result<()>| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(ref msg) if msg == "cccd write failed"));
        assert!(!characteristic.is_notifying());
    }

    #[tokio::test]
    async fn test_enable_optimistic_success_fails() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        peripheral
            .set_optimistic_subscribe(SERVICE.main_characteristic())
            .await;
        let characteristic = main_characteristic(&peripheral).await;

        let err = NotificationCoordinator::new(&peripheral)
            .enable(&characteristic, Arc::new(|_: Result<()>| {}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EnableNotifyFailed { characteristic: c } if c == SERVICE.main_characteristic()
        ));
    }

    #[tokio::test]
    async fn test_disable() {
        let peripheral = MockPeripheral::builder().sensor_service(SERVICE).build();
        let characteristic = main_characteristic(&peripheral).await;
        let coordinator = NotificationCoordinator::new(&peripheral);
        let hits = Arc::new(AtomicUsize::new(0));

        coordinator
            .enable(&characteristic, counting_handler(&hits))
            .await
            .unwrap();
        coordinator.disable(&characteristic).await.unwrap();

        assert!(!characteristic.is_notifying());
        assert!(!characteristic.has_handler());
        assert_eq!(peripheral.count(MockOp::Unsubscribe).await, 1);

        // Second disable is a no-op
        coordinator.disable(&characteristic).await.unwrap();
        assert_eq!(peripheral.count(MockOp::Unsubscribe).await, 1);
    }
}
