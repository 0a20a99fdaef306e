//! Interactive console example
//!
//! A line-based stand-in for a control panel: scan, connect, toggle valves,
//! set parameters and send free text while rig messages scroll by.
//!
//! Run with: cargo run --example relay_console

use gas_sampler_ble::{Command, Parameter, Relay, Result, Valve, ValveStates};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  scan                   Scan for devices
  connect <n|address>    Connect to device n from the last scan, or an address
  disconnect             Disconnect
  sample | purge | both  Start a bag operation
  abort                  Abort the running operation
  air | vacuum | sampling
                         Toggle a valve
  closeall               Close all valves
  set <key> <value>      Set samplingTime, fillingTime, purgeFillTime (seconds)
                         or numPurgeCycles
  send <text>            Send free text
  status                 Show connectivity
  quit                   Disconnect and exit";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gas_sampler_ble=info".parse().unwrap()),
        )
        .init();

    let relay = Relay::new().await?;
    let mut valves = ValveStates::new();

    let _handle = relay.on_event(|event| {
        println!("[{}] {}", event.timestamp.format("%H:%M:%S"), event.text());
    });

    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        // Failures are already printed through the event callback
        match word {
            "" => {}
            "scan" => {
                if let Ok(devices) = relay.scan().await {
                    for (i, device) in devices.iter().enumerate() {
                        println!("  {}: {}", i, device);
                    }
                }
            }
            "connect" => {
                let address = match rest.parse::<usize>() {
                    Ok(index) => match relay.devices().get(index) {
                        Some(device) => device.address.clone(),
                        None => {
                            println!("No device {}", index);
                            continue;
                        }
                    },
                    Err(_) => rest.to_string(),
                };
                let _ = relay.connect(address).await;
            }
            "disconnect" => {
                let _ = relay.disconnect().await;
            }
            "sample" => {
                let _ = relay.send_command(Command::SampleBag).await;
            }
            "purge" => {
                let _ = relay.send_command(Command::PurgeBag).await;
            }
            "both" => {
                let _ = relay.send_command(Command::SampleAndPurgeBag).await;
            }
            "abort" => {
                let _ = relay.send_command(Command::Abort).await;
            }
            "air" | "vacuum" | "sampling" => {
                let valve = match word {
                    "air" => Valve::Air,
                    "vacuum" => Valve::Vacuum,
                    _ => Valve::Sampling,
                };
                let command = valves.toggle_command(valve);
                if relay.send_command(command.clone()).await.is_ok() {
                    valves.record_sent(&command);
                    println!("  Next: {}", valves.toggle_label(valve));
                }
            }
            "closeall" => {
                if relay.send_command(Command::CloseAllValves).await.is_ok() {
                    valves.record_sent(&Command::CloseAllValves);
                }
            }
            "set" => {
                let mut parts = rest.split_whitespace();
                let parameter = parts.next().and_then(Parameter::from_key);
                let value = parts.next().and_then(|v| v.parse::<f64>().ok());
                match (parameter, value) {
                    (Some(parameter), Some(value)) => {
                        let _ = relay.set_parameter(parameter, value).await;
                    }
                    _ => println!("Usage: set <key> <value>"),
                }
            }
            "send" => {
                let _ = relay.send(rest).await;
            }
            "status" => println!("  {}", relay.connectivity_status()),
            "help" => println!("{}", HELP),
            "quit" | "exit" => break,
            other => println!("Unknown command: {}", other),
        }
    }

    relay.shutdown().await?;

    Ok(())
}
