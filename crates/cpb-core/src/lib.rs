//! Common service handshake for Circuit Playground Bluefruit sensors.
//!
//! Every CPB sensor service (temperature, accelerometer, light, ...) is
//! enabled the same way over Bluetooth Low Energy: locate the service's main
//! characteristic, resolve the protocol version, optionally set the
//! measurement period, and subscribe to notifications. This crate implements
//! that handshake once, over any [`GattTransport`].
//!
//! # Features
//!
//! - **Version resolution**: reads the version characteristic, never fails
//! - **Period control**: read/write the measurement period in milliseconds
//! - **Idempotent notifications**: re-enabling swaps the handler, no resubscribe
//! - **Streaming**: receive measurement frames through a callback or a `Stream`
//! - **Observable progress**: watch the handshake state as it advances
//! - **Transports**: btleplug ([`BlePeripheral`]) and in-memory ([`MockPeripheral`])
//!
//! # Platform Differences
//!
//! Peripheral identifiers vary by platform:
//!
//! - **macOS**: a UUID assigned by CoreBluetooth, stable per host.
//! - **Linux/Windows**: the Bluetooth MAC address (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
//! use btleplug::platform::Manager;
//! use cpb_core::{BlePeripheral, ConnectionConfig, EnableOptions, ServiceEnabler};
//! use cpb_types::SensorService;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = Manager::new().await?;
//!     let adapter = manager.adapters().await?.into_iter().next().ok_or("no adapter")?;
//!     adapter.start_scan(ScanFilter::default()).await?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     let peripheral = adapter.peripherals().await?.into_iter().next().ok_or("no peripheral")?;
//!
//!     let peripheral =
//!         Arc::new(BlePeripheral::connect(peripheral, ConnectionConfig::default()).await?);
//!     let enabler = ServiceEnabler::with_options(
//!         &peripheral,
//!         SensorService::Temperature,
//!         EnableOptions::with_period(Duration::from_millis(500)),
//!     );
//!
//!     let (version, _characteristic, mut frames) = enabler.enable_stream().await?;
//!     println!("Temperature service {}", version);
//!     while let Some(frame) = frames.next().await {
//!         println!("{:?}", frame?.data);
//!     }
//!     Ok(())
//! }
//! ```

pub mod characteristic;
pub mod device;
pub mod error;
pub mod mock;
pub mod notify;
pub mod period;
pub mod service;
pub mod streaming;
pub mod traits;
pub mod util;
pub mod version;

// Core exports
pub use characteristic::{Characteristic, NotifyHandler, WeakCharacteristic};
pub use device::{BlePeripheral, ConnectionConfig};
pub use error::{Error, ErrorKind, Result};
pub use mock::{MockOp, MockPeripheral, MockPeripheralBuilder, MockWrite};
pub use notify::NotificationCoordinator;
pub use period::PeriodController;
pub use service::{EnableOptions, EnableOptionsBuilder, EnableState, ServiceEnabler, ServiceProfile};
pub use streaming::{MeasurementResult, MeasurementSink, MeasurementStream};
pub use traits::{GattTransport, WriteType};
pub use util::{create_identifier, format_peripheral_id};
pub use version::VersionResolver;

/// Type alias for a shared btleplug peripheral.
///
/// [`ServiceEnabler`] holds the peripheral weakly, so callers keep it alive
/// through an `Arc` for as long as measurements should flow.
pub type SharedPeripheral = std::sync::Arc<BlePeripheral>;

// Re-export from cpb-types
pub use cpb_types::uuids;
pub use cpb_types::{MeasurementFrame, SensorService, Version};
