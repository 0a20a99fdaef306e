//! Basic example: Discover nearby gas-sampler rigs
//!
//! Run with: cargo run --example scan_devices

use gas_sampler_ble::{EventKind, Relay, RelayConfig, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gas_sampler_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Starting BLE discovery...");
    println!("Make sure the rig is powered on!\n");

    let config = RelayConfig::default().with_scan_timeout(Duration::from_secs(10));
    let relay = Relay::with_config(config).await?;

    // Show devices as they arrive, before the sweep ends
    let _handle = relay.on_event(|event| {
        if let EventKind::DeviceFound { address, name } = &event.kind {
            println!(
                "[{}] Discovered device: {} ({})",
                event.timestamp.format("%H:%M:%S"),
                name,
                address
            );
        }
    });

    let scan = relay.scan();
    println!("Scanning for {:?}...", relay.config().scan_timeout);
    println!("Press Ctrl+C to exit early.\n");

    let devices = tokio::select! {
        result = scan => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
            relay.devices()
        }
    };

    println!("\n--- Scan Complete ---");
    println!("Total devices found: {}", devices.len());

    for device in &devices {
        println!("  {}", device);
    }

    println!("\nDone!");

    Ok(())
}
