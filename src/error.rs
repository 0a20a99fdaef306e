//! Error types for the gas-sampler-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Discovery could not be started or aborted midway.
    #[error("Error scanning devices: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// A scan is already running.
    #[error("Scan already in progress")]
    ScanInProgress,

    /// No peripheral with the given address is known to the adapter.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Failed to establish a connection to the peripheral.
    #[error("Error connecting to device: {reason}")]
    ConnectFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// A session is already established.
    #[error("Already connected to {address}")]
    AlreadyConnected {
        /// Address of the connected peripheral.
        address: String,
    },

    /// Another connect or disconnect is still in flight.
    #[error("Connection already in progress")]
    ConnectionInProgress,

    /// Tearing down the link failed.
    #[error("Error disconnecting from device: {reason}")]
    DisconnectFailed {
        /// Description of why the disconnect failed.
        reason: String,
    },

    /// Operation requires a connection but no session is established.
    #[error("Not connected")]
    NotConnected,

    /// The peripheral dropped the link.
    #[error("Disconnected from device")]
    UnexpectedDisconnect,

    /// Writing a command to the characteristic failed.
    #[error("Error sending message: {reason}")]
    SendFailed {
        /// Description of why the write failed.
        reason: String,
    },

    /// A notification payload was not valid UTF-8.
    #[error("Error in notification handler: {reason}")]
    DecodeError {
        /// Description of the decoding failure.
        reason: String,
    },

    /// Command exceeds the configured maximum payload length.
    #[error("Command too long: {len} bytes (max {max})")]
    CommandTooLong {
        /// Encoded length of the command.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Command text is not acceptable for transmission.
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap any displayable transport error as a connect failure.
    pub(crate) fn connect_failed(reason: impl std::fmt::Display) -> Self {
        Self::ConnectFailed {
            reason: reason.to_string(),
        }
    }

    /// Wrap any displayable transport error as a disconnect failure.
    pub(crate) fn disconnect_failed(reason: impl std::fmt::Display) -> Self {
        Self::DisconnectFailed {
            reason: reason.to_string(),
        }
    }

    /// Wrap any displayable transport error as a send failure.
    pub(crate) fn send_failed(reason: impl std::fmt::Display) -> Self {
        Self::SendFailed {
            reason: reason.to_string(),
        }
    }

    /// Wrap any displayable transport error as a scan failure.
    pub(crate) fn scan_failed(reason: impl std::fmt::Display) -> Self {
        Self::ScanFailed {
            reason: reason.to_string(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
