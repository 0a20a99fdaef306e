//! BLE communication module.
//!
//! This module provides the transport boundary and its btleplug
//! implementation, plus the scanner built on top of it.

pub mod adapter;
pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use adapter::BtleplugTransport;
pub use characteristics::BtleplugLink;
pub use connection::{ConnectionState, PeripheralHandle};
pub use scanner::DeviceScanner;
pub use transport::{Advertisement, BleLink, BleTransport};
pub use uuids::*;
