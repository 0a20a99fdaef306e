//! Purge cycle example
//!
//! Connects to a rig, configures the purge parameters and starts a
//! sample-and-purge run, printing rig notifications with the elapsed time.
//!
//! Run with: cargo run --example purge_cycle
//!
//! To connect to a specific rig:
//!   cargo run --example purge_cycle -- --address AA:BB:CC:DD:EE:FF

use gas_sampler_ble::{format_elapsed, Command, Error, Parameter, Relay, Result, Status};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,gas_sampler_ble=debug")
        .init();

    println!("Sample and Purge");
    println!("================\n");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let target_address = args
        .iter()
        .position(|arg| arg == "--address")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.to_uppercase());

    let relay = Relay::new().await?;

    let address = match target_address {
        Some(address) => address,
        None => {
            println!("Looking for any available rig...\n");
            let devices = relay.scan().await?;
            devices
                .first()
                .map(|d| d.address.clone())
                .ok_or_else(|| Error::DeviceNotFound {
                    address: "any".to_string(),
                })?
        }
    };

    println!("Connecting to {}...", address);
    relay.connect(address).await?;
    println!("{}\n", relay.connectivity_status());

    let started = Instant::now();
    let _handle = relay.on_event(move |event| {
        if let Some(Status::Received { text }) = event.status() {
            println!("[{}] {}", format_elapsed(started.elapsed()), text);
        }
    });

    // 30 s fill, 10 s purge fill, 3 cycles
    relay.set_parameter(Parameter::FillingTime, 30.0).await?;
    relay.set_parameter(Parameter::PurgeFillTime, 10.0).await?;
    relay.set_parameter(Parameter::NumPurgeCycles, 3.0).await?;

    relay.send_command(Command::SampleAndPurgeBag).await?;
    println!("Run started. Press Ctrl+C to abort.\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(300)) => {
            println!("\nRun window elapsed after {}", format_elapsed(started.elapsed()));
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nAborting run...");
            relay.send_command(Command::Abort).await?;
            relay.send_command(Command::CloseAllValves).await?;
        }
    }

    relay.shutdown().await?;
    println!("Done!");

    Ok(())
}
