//! Trait abstraction for the GATT client primitives this crate consumes.
//!
//! This module provides the [`GattTransport`] trait that abstracts over
//! real Bluetooth peripherals ([`crate::BlePeripheral`]) and the in-memory
//! [`crate::MockPeripheral`] used in tests.

use async_trait::async_trait;
pub use btleplug::api::WriteType;
use uuid::Uuid;

use crate::characteristic::{Characteristic, NotifyHandler};
use crate::error::Result;

/// Characteristic-level operations on a connected peripheral.
///
/// Connection management is outside this trait: implementations are handed
/// an already connected peripheral and report errors if the link drops.
///
/// Implementations must return the same [`Characteristic`] state for repeated
/// lookups of the same `(service, characteristic)` pair, so that the
/// notifying flag and handler survive across calls.
///
/// # Example
///
/// ```ignore
/// use cpb_core::{GattTransport, Result};
/// use cpb_types::uuids::{TEMPERATURE, TEMPERATURE_SERVICE};
///
/// async fn read_temperature<P: GattTransport>(peripheral: &P) -> Result<Vec<u8>> {
///     let c = peripheral.characteristic(TEMPERATURE_SERVICE, TEMPERATURE).await?;
///     Ok(peripheral.read(&c).await?.to_vec())
/// }
/// ```
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Stable identifier of the peripheral.
    ///
    /// On Linux/Windows this is typically the MAC address.
    /// On macOS this is a UUID since MAC addresses are not exposed.
    fn identifier(&self) -> &str;

    /// Locate a characteristic within a service.
    ///
    /// Returns [`crate::Error::InvalidCharacteristic`] when the service or
    /// characteristic does not exist.
    async fn characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic>;

    /// Read the characteristic value.
    ///
    /// The value is also stored on the characteristic.
    async fn read(&self, characteristic: &Characteristic) -> Result<bytes::Bytes>;

    /// Write a value to the characteristic.
    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        write_type: WriteType,
    ) -> Result<()>;

    /// Request notifications and install `handler` for them.
    ///
    /// On success the transport sets the characteristic's notifying flag once
    /// the peripheral has confirmed the subscription.
    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotifyHandler,
    ) -> Result<()>;

    /// Stop notifications and drop the handler.
    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()>;

    /// Replace the handler of an already notifying characteristic.
    ///
    /// No request is sent to the peripheral.
    fn update_notify_handler(&self, characteristic: &Characteristic, handler: NotifyHandler) {
        characteristic.replace_handler(handler);
    }
}
