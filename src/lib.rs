// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # gas-sampler-ble
//!
//! A headless Rust library relaying text commands between a host application
//! and a Bluetooth Low Energy gas-sampling rig.
//!
//! The rig exposes one characteristic. Commands such as `sampleBag` or
//! `openAirValve` are written to it as UTF-8 text and the rig answers with
//! text notifications on the same characteristic.
//!
//! ## Features
//!
//! - **Discovery**: Time-bounded scans reporting named devices as they appear
//! - **Single Session**: One connection at a time, guarded against races
//! - **Command Vocabulary**: Typed bag, valve and parameter commands
//! - **Event Bus**: Timestamped status lines and notifications for a log pane
//! - **Non-blocking**: Every operation runs as a tokio task behind a handle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gas_sampler_ble::{Command, Parameter, Relay, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let relay = Relay::new().await?;
//!
//!     // Print every status line as it arrives
//!     let _log = relay.on_event(|event| println!("{}", event.text()));
//!
//!     let devices = relay.scan().await?;
//!     let Some(device) = devices.first() else {
//!         return Ok(());
//!     };
//!
//!     relay.connect(device.address.clone()).await?;
//!     relay.set_parameter(Parameter::SamplingTime, 2.5).await?;
//!     relay.send_command(Command::SampleBag).await?;
//!
//!     relay.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod events;
pub mod operation;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::RelayConfig;
pub use error::{Error, Result};
pub use events::{CallbackHandle, EventBus, EventKind, RelayEvent, Status};
pub use operation::OperationHandle;
pub use relay::Relay;
pub use session::SessionManager;
pub use utils::format_elapsed;

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionState, PeripheralHandle};
pub use ble::scanner::DeviceScanner;
pub use ble::transport::{Advertisement, BleLink, BleTransport};
pub use ble::uuids::RELAY_CHARACTERISTIC_UUID;
pub use protocol::{Command, CommandFrame, Parameter, Valve, ValvePosition, ValveStates};
