//! btleplug-backed GATT transport.
//!
//! This module adapts a connected [`btleplug`] peripheral to the
//! [`GattTransport`] trait used by the service handshake.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic as GattCharacteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::characteristic::{Characteristic, NotifyHandler};
use crate::error::{Error, Result};
use crate::traits::{GattTransport, WriteType};
use crate::util::{create_identifier, format_peripheral_id};

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for BLE operation timeouts.
///
/// # Example
///
/// ```
/// use cpb_core::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .read_timeout(Duration::from_secs(15))
///     .discovery_timeout(Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for establishing the link in [`BlePeripheral::connect`].
    pub connection_timeout: Duration,
    /// Timeout for characteristic reads.
    pub read_timeout: Duration,
    /// Timeout for characteristic writes and subscription requests.
    pub write_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Longer timeouts for noisy RF environments.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(15),
        }
    }

    /// Shorter timeouts for quicker failure detection.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(5),
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

type Routes = Arc<Mutex<HashMap<Uuid, Characteristic>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connected CPB peripheral driven through btleplug.
///
/// Services are discovered lazily on the first characteristic lookup, and
/// lookups are cached so repeated calls return the same [`Characteristic`].
///
/// One background task reads the peripheral's notification stream and
/// dispatches each value to the subscribed characteristic. When the stream
/// ends (the link dropped), every subscribed characteristic is marked not
/// notifying and loses its handler.
///
/// # Cleanup
///
/// Call [`BlePeripheral::close`] (or [`BlePeripheral::disconnect`]) when done.
/// Dropping the peripheral stops the notification task but does not
/// disconnect the link.
pub struct BlePeripheral {
    peripheral: Peripheral,
    identifier: String,
    config: ConnectionConfig,
    discovered: tokio::sync::Mutex<bool>,
    cache: RwLock<HashMap<(Uuid, Uuid), (GattCharacteristic, Characteristic)>>,
    routes: Routes,
    pump: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for BlePeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlePeripheral")
            .field("identifier", &self.identifier)
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BlePeripheral {
    /// Wrap an already connected peripheral with default timeouts.
    pub async fn from_peripheral(peripheral: Peripheral) -> Result<Self> {
        Self::from_peripheral_with_config(peripheral, ConnectionConfig::default()).await
    }

    /// Wrap an already connected peripheral.
    pub async fn from_peripheral_with_config(
        peripheral: Peripheral,
        config: ConnectionConfig,
    ) -> Result<Self> {
        // On macOS the address is 00:00:00:00:00:00, so fall back to the peripheral ID
        let properties = peripheral.properties().await?;
        let identifier = properties
            .as_ref()
            .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));

        Ok(Self {
            peripheral,
            identifier,
            config,
            discovered: tokio::sync::Mutex::new(false),
            cache: RwLock::new(HashMap::new()),
            routes: Arc::new(Mutex::new(HashMap::new())),
            pump: tokio::sync::Mutex::new(None),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Connect `peripheral` if needed, then wrap it.
    #[tracing::instrument(level = "info", skip_all, fields(connect_timeout = ?config.connection_timeout))]
    pub async fn connect(peripheral: Peripheral, config: ConnectionConfig) -> Result<Self> {
        if !peripheral.is_connected().await? {
            info!("Connecting to peripheral...");
            timeout(config.connection_timeout, peripheral.connect())
                .await
                .map_err(|_| Error::timeout("connect to peripheral", config.connection_timeout))??;
            info!("Connected!");
        }
        Self::from_peripheral_with_config(peripheral, config).await
    }

    /// The underlying btleplug peripheral.
    pub fn inner(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Get the current connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Check if the link is up (queries BLE stack state).
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Number of characteristics looked up so far.
    pub async fn cached_characteristic_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Stop the notification task and release every handler.
    ///
    /// The link itself stays up.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pump = self.pump.lock().await.take();
        stop_notifications(&self.cancel, pump, &self.routes);
        debug!(peripheral = %self.identifier, "Notification task stopped");
    }

    /// Close and disconnect the link.
    #[tracing::instrument(level = "info", skip(self), fields(peripheral = %self.identifier))]
    pub async fn disconnect(&self) -> Result<()> {
        self.close().await;
        info!("Disconnecting from peripheral...");
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn ensure_discovered(&self) -> Result<()> {
        let mut discovered = self.discovered.lock().await;
        if *discovered {
            return Ok(());
        }
        if self.peripheral.services().is_empty() {
            info!("Discovering services...");
            timeout(self.config.discovery_timeout, self.peripheral.discover_services())
                .await
                .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;
        }
        debug!("Found {} services", self.peripheral.services().len());
        *discovered = true;
        Ok(())
    }

    async fn gatt_characteristic(
        &self,
        characteristic: &Characteristic,
    ) -> Result<GattCharacteristic> {
        let key = (characteristic.service_uuid(), characteristic.uuid());
        match self.cache.read().await.get(&key) {
            Some((gatt, _)) => Ok(gatt.clone()),
            None => Err(Error::invalid_characteristic(key.0, key.1)),
        }
    }

    async fn ensure_pump(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::transport("peripheral closed"));
        }
        let mut pump = self.pump.lock().await;
        if pump.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        let stream = self
            .peripheral
            .notifications()
            .await?
            .map(|n| (n.uuid, n.value))
            .boxed();
        *pump = Some(tokio::spawn(run_pump(
            stream,
            Arc::clone(&self.routes),
            self.cancel.child_token(),
            self.identifier.clone(),
        )));
        Ok(())
    }
}

/// Dispatch notifications until cancelled or the stream ends.
async fn run_pump(
    mut stream: BoxStream<'static, (Uuid, Vec<u8>)>,
    routes: Routes,
    cancel: CancellationToken,
    identifier: String,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some((uuid, value)) => {
                    let target = lock(&routes).get(&uuid).cloned();
                    match target {
                        Some(characteristic) => characteristic.deliver(value),
                        None => debug!(
                            peripheral = %identifier,
                            characteristic = %uuid,
                            "Notification for unsubscribed characteristic"
                        ),
                    }
                }
                None => {
                    warn!(peripheral = %identifier, "Notification stream ended");
                    release_routes(&routes);
                    break;
                }
            }
        }
    }
}

fn release_routes(routes: &Routes) {
    let released: Vec<Characteristic> = lock(routes).drain().map(|(_, c)| c).collect();
    for characteristic in released {
        characteristic.set_notifying(false);
        characteristic.clear_handler();
    }
}

/// Cancel the pump, abort its task and release every route.
fn stop_notifications(cancel: &CancellationToken, pump: Option<JoinHandle<()>>, routes: &Routes) {
    cancel.cancel();
    if let Some(handle) = pump {
        handle.abort();
    }
    release_routes(routes);
}

impl Drop for BlePeripheral {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(peripheral = %self.identifier, "BlePeripheral dropped without close()");
        }
        let pump = self.pump.get_mut().take();
        stop_notifications(&self.cancel, pump, &self.routes);
    }
}

#[async_trait]
impl GattTransport for BlePeripheral {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        let key = (service, characteristic);
        if let Some((_, handle)) = self.cache.read().await.get(&key) {
            return Ok(handle.clone());
        }

        self.ensure_discovered().await?;

        let gatt = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .and_then(|s| s.characteristics.into_iter().find(|c| c.uuid == characteristic))
            .ok_or_else(|| Error::invalid_characteristic(service, characteristic))?;

        let mut cache = self.cache.write().await;
        let (_, handle) = cache
            .entry(key)
            .or_insert_with(|| (gatt, Characteristic::new(service, characteristic)));
        Ok(handle.clone())
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Bytes> {
        let gatt = self.gatt_characteristic(characteristic).await?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(&gatt))
            .await
            .map_err(|_| Error::timeout("read characteristic", self.config.read_timeout))??;
        let data = Bytes::from(data);
        characteristic.set_value(data.clone());
        Ok(data)
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        write_type: WriteType,
    ) -> Result<()> {
        let gatt = self.gatt_characteristic(characteristic).await?;
        timeout(
            self.config.write_timeout,
            self.peripheral.write(&gatt, data, write_type),
        )
        .await
        .map_err(|_| Error::timeout("write characteristic", self.config.write_timeout))??;
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotifyHandler,
    ) -> Result<()> {
        let gatt = self.gatt_characteristic(characteristic).await?;
        self.ensure_pump().await?;

        // Route first so no notification arriving right after the CCCD write is lost
        characteristic.replace_handler(handler);
        lock(&self.routes).insert(characteristic.uuid(), characteristic.clone());

        let result = timeout(self.config.write_timeout, self.peripheral.subscribe(&gatt))
            .await
            .map_err(|_| Error::timeout("subscribe", self.config.write_timeout))
            .and_then(|r| r.map_err(Error::from));

        match result {
            Ok(()) => {
                characteristic.set_notifying(true);
                Ok(())
            }
            Err(e) => {
                lock(&self.routes).remove(&characteristic.uuid());
                characteristic.clear_handler();
                Err(e)
            }
        }
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        let gatt = self.gatt_characteristic(characteristic).await?;
        timeout(self.config.write_timeout, self.peripheral.unsubscribe(&gatt))
            .await
            .map_err(|_| Error::timeout("unsubscribe", self.config.write_timeout))??;

        lock(&self.routes).remove(&characteristic.uuid());
        characteristic.set_notifying(false);
        characteristic.clear_handler();
        Ok(())
    }
}
