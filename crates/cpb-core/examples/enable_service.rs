//! Example: Enabling a Sensor Service
//!
//! This example connects to a Circuit Playground Bluefruit, enables one of
//! its sensor services with a 500 ms measurement period, and prints the raw
//! measurement frames as they arrive.
//!
//! Run with: `cargo run --example enable_service -- <DEVICE_ADDRESS> [SERVICE]`
//!
//! SERVICE is one of: temperature, accelerometer, light, gyroscope,
//! magnetometer, buttons, humidity, barometric-pressure (default: temperature).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::Manager;
use futures::StreamExt;

use cpb_core::{BlePeripheral, ConnectionConfig, EnableOptions, GattTransport, ServiceEnabler};
use cpb_types::SensorService;

fn parse_service(name: &str) -> Option<SensorService> {
    SensorService::ALL
        .iter()
        .copied()
        .find(|s| s.to_string().eq_ignore_ascii_case(&name.replace('-', " ")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(identifier) = args.get(1) else {
        eprintln!("Usage: {} <DEVICE_ADDRESS> [SERVICE]", args[0]);
        std::process::exit(1);
    };
    let service = match args.get(2) {
        Some(name) => parse_service(name).ok_or_else(|| format!("unknown service '{}'", name))?,
        None => SensorService::Temperature,
    };

    println!("Scanning for {}...", identifier);
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or("no Bluetooth adapter")?;
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    adapter.stop_scan().await?;

    let mut found = None;
    for peripheral in adapter.peripherals().await? {
        let address = peripheral
            .properties()
            .await?
            .map(|p| p.address.to_string());
        if address.as_deref() == Some(identifier.as_str())
            || cpb_core::format_peripheral_id(&peripheral.id()) == *identifier
        {
            found = Some(peripheral);
            break;
        }
    }
    let peripheral = found.ok_or("device not found")?;

    let peripheral =
        Arc::new(BlePeripheral::connect(peripheral, ConnectionConfig::default()).await?);
    println!("Connected to {}", peripheral.identifier());

    let enabler = ServiceEnabler::with_options(
        &peripheral,
        service,
        EnableOptions::with_period(Duration::from_millis(500)),
    );
    let (version, _characteristic, mut frames) = enabler.enable_stream().await?;
    println!("{} service ready ({})", service, version);

    if let Some(period) = enabler.period().await? {
        println!("Measurement period: {:?}", period);
    }

    println!();
    println!("Press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = frames.next() => match frame {
                Some(Ok(frame)) => println!("  {:02X?}", &frame.data[..]),
                Some(Err(e)) => eprintln!("  notification error: {}", e),
                None => {
                    println!("Notification stream ended");
                    break;
                }
            },
        }
    }

    enabler.disable().await?;
    peripheral.disconnect().await?;
    Ok(())
}
