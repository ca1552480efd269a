//! Mock peripheral implementation for testing.
//!
//! This module provides an in-memory GATT peripheral that can be used for
//! unit testing without requiring actual BLE hardware.
//!
//! The [`MockPeripheral`] implements the [`GattTransport`] trait, allowing it
//! to be used interchangeably with [`crate::BlePeripheral`] in generic code.
//!
//! # Features
//!
//! - **Failure injection**: fail a given operation on a given characteristic
//! - **Latency simulation**: add artificial delays to simulate slow BLE responses
//! - **Notification injection**: push values or delivery errors to subscribers
//! - **Operation log**: inspect every lookup, read, write and subscription

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use cpb_types::uuids::{MEASUREMENT_PERIOD, MEASUREMENT_VERSION};
use cpb_types::{SensorService, Version, encode_period};

use crate::characteristic::{Characteristic, NotifyHandler};
use crate::error::{Error, Result};
use crate::traits::{GattTransport, WriteType};

/// Operation kinds recorded by the mock and targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// Characteristic lookup.
    Lookup,
    /// Characteristic read.
    Read,
    /// Characteristic write.
    Write,
    /// Notification subscribe.
    Subscribe,
    /// Notification unsubscribe.
    Unsubscribe,
}

/// A write received by the mock.
#[derive(Debug, Clone)]
pub struct MockWrite {
    /// Target characteristic UUID.
    pub characteristic: Uuid,
    /// Bytes written.
    pub data: Vec<u8>,
    /// Requested write type.
    pub write_type: WriteType,
}

/// A mock CPB peripheral for testing.
///
/// # Example
///
/// ```
/// use cpb_core::{GattTransport, MockPeripheral};
/// use cpb_types::SensorService;
///
/// #[tokio::main]
/// async fn main() {
///     let peripheral = MockPeripheral::builder()
///         .sensor_service(SensorService::Temperature)
///         .build();
///
///     let service = SensorService::Temperature;
///     let c = peripheral
///         .characteristic(service.service_uuid(), service.main_characteristic())
///         .await
///         .unwrap();
///     assert!(!c.is_notifying());
/// }
/// ```
pub struct MockPeripheral {
    identifier: String,
    characteristics: HashMap<(Uuid, Uuid), Characteristic>,
    connected: AtomicBool,
    failures: RwLock<HashMap<(MockOp, Uuid), String>>,
    optimistic: RwLock<HashSet<Uuid>>,
    operations: RwLock<Vec<(MockOp, Uuid)>>,
    writes: RwLock<Vec<MockWrite>>,
    /// Simulated latency per operation in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeripheral")
            .field("identifier", &self.identifier)
            .field("characteristics", &self.characteristics.len())
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockPeripheral {
    /// Create a builder.
    pub fn builder() -> MockPeripheralBuilder {
        MockPeripheralBuilder::default()
    }

    /// Whether the mock link is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Drop the link.
    ///
    /// Every characteristic stops notifying and loses its handler, and
    /// subsequent operations fail with a transport error.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        for characteristic in self.characteristics.values() {
            characteristic.set_notifying(false);
            characteristic.clear_handler();
        }
    }

    /// Make `op` on `characteristic` fail with [`Error::Transport`]`(message)`.
    pub async fn fail_on(&self, op: MockOp, characteristic: Uuid, message: &str) {
        self.failures
            .write()
            .await
            .insert((op, characteristic), message.to_string());
    }

    /// Remove every injected failure.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Accept subscribe requests on `characteristic` without ever setting
    /// its notifying flag.
    pub async fn set_optimistic_subscribe(&self, characteristic: Uuid) {
        self.optimistic.write().await.insert(characteristic);
    }

    /// Set simulated latency.
    ///
    /// Each operation will be delayed by this duration.
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Number of recorded operations of the given kind.
    pub async fn count(&self, op: MockOp) -> usize {
        self.operations
            .read()
            .await
            .iter()
            .filter(|(kind, _)| *kind == op)
            .count()
    }

    /// Every operation in the order it was issued.
    pub async fn operations(&self) -> Vec<(MockOp, Uuid)> {
        self.operations.read().await.clone()
    }

    /// Every write in the order it was received.
    pub async fn writes(&self) -> Vec<MockWrite> {
        self.writes.read().await.clone()
    }

    /// Push a notification.
    ///
    /// Returns `false` if the characteristic does not exist or is not
    /// notifying, in which case nothing is delivered.
    pub async fn notify(
        &self,
        service: Uuid,
        characteristic: Uuid,
        data: impl Into<Bytes>,
    ) -> bool {
        match self.notifying(service, characteristic) {
            Some(c) => {
                c.deliver(data);
                true
            }
            None => false,
        }
    }

    /// Push a notification delivery error.
    pub async fn notify_error(&self, service: Uuid, characteristic: Uuid, error: Error) -> bool {
        match self.notifying(service, characteristic) {
            Some(c) => {
                c.deliver_error(error);
                true
            }
            None => false,
        }
    }

    fn notifying(&self, service: Uuid, characteristic: Uuid) -> Option<&Characteristic> {
        self.characteristics
            .get(&(service, characteristic))
            .filter(|c| c.is_notifying())
    }

    async fn begin(&self, op: MockOp, characteristic: Uuid) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.operations.write().await.push((op, characteristic));

        if !self.is_connected() {
            return Err(Error::transport("peripheral disconnected"));
        }
        if let Some(message) = self.failures.read().await.get(&(op, characteristic)) {
            return Err(Error::Transport(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl GattTransport for MockPeripheral {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        self.begin(MockOp::Lookup, characteristic).await?;
        self.characteristics
            .get(&(service, characteristic))
            .cloned()
            .ok_or_else(|| Error::invalid_characteristic(service, characteristic))
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Bytes> {
        self.begin(MockOp::Read, characteristic.uuid()).await?;
        Ok(characteristic.value().unwrap_or_default())
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        write_type: WriteType,
    ) -> Result<()> {
        self.begin(MockOp::Write, characteristic.uuid()).await?;
        self.writes.write().await.push(MockWrite {
            characteristic: characteristic.uuid(),
            data: data.to_vec(),
            write_type,
        });
        characteristic.set_value(data.to_vec());
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotifyHandler,
    ) -> Result<()> {
        self.begin(MockOp::Subscribe, characteristic.uuid()).await?;
        characteristic.replace_handler(handler);
        if !self.optimistic.read().await.contains(&characteristic.uuid()) {
            characteristic.set_notifying(true);
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        self.begin(MockOp::Unsubscribe, characteristic.uuid()).await?;
        characteristic.set_notifying(false);
        characteristic.clear_handler();
        Ok(())
    }
}

/// Builder for creating mock peripherals with a custom GATT table.
#[derive(Debug, Default)]
pub struct MockPeripheralBuilder {
    identifier: Option<String>,
    table: HashMap<(Uuid, Uuid), Option<Bytes>>,
}

impl MockPeripheralBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peripheral identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    /// Add a complete CPB sensor service: main, period and version
    /// characteristics, with a 1 s period and version 1.
    #[must_use]
    pub fn sensor_service(self, service: SensorService) -> Self {
        let uuid = service.service_uuid();
        let period = encode_period(Duration::from_secs(1)).map(|b| b.to_vec()).unwrap_or_default();
        self.characteristic(uuid, service.main_characteristic())
            .value(uuid, MEASUREMENT_PERIOD, period)
            .value(uuid, MEASUREMENT_VERSION, Version::DEFAULT.get().to_le_bytes().to_vec())
    }

    /// Add a characteristic with no value.
    #[must_use]
    pub fn characteristic(mut self, service: Uuid, characteristic: Uuid) -> Self {
        self.table.entry((service, characteristic)).or_insert(None);
        self
    }

    /// Add a characteristic, or replace its value.
    #[must_use]
    pub fn value(mut self, service: Uuid, characteristic: Uuid, value: impl Into<Bytes>) -> Self {
        self.table.insert((service, characteristic), Some(value.into()));
        self
    }

    /// Build the mock peripheral, already connected.
    #[must_use]
    pub fn build(self) -> MockPeripheral {
        let characteristics = self
            .table
            .into_iter()
            .map(|((service, uuid), value)| {
                let c = Characteristic::new(service, uuid);
                if let Some(value) = value {
                    c.set_value(value);
                }
                ((service, uuid), c)
            })
            .collect();

        MockPeripheral {
            identifier: self
                .identifier
                .unwrap_or_else(|| format!("MOCK-{:06X}", rand::random::<u32>() & 0xFFFFFF)),
            characteristics,
            connected: AtomicBool::new(true),
            failures: RwLock::new(HashMap::new()),
            optimistic: RwLock::new(HashSet::new()),
            operations: RwLock::new(Vec::new()),
            writes: RwLock::new(Vec::new()),
            latency_ms: AtomicU64::new(0),
        }
    }
}
