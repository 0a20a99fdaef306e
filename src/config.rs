//! Relay configuration.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::uuids::RELAY_CHARACTERISTIC_UUID;
use crate::error::{Error, Result};

/// Default discovery sweep length.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for link establishment and subscription.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default command payload cap: the largest write that fits one packet at a
/// 247-byte ATT MTU.
pub const DEFAULT_MAX_COMMAND_LEN: usize = 244;

/// Largest attribute value a GATT characteristic can hold.
pub const MAX_ATTRIBUTE_LEN: usize = 512;

/// Default number of events buffered for a slow subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tunables for the scanner and session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayConfig {
    /// How long a discovery sweep runs.
    pub scan_timeout: Duration,
    /// How long `connect` may take before failing locally.
    pub connect_timeout: Duration,
    /// Largest command payload accepted by `send`, in bytes.
    pub max_command_len: usize,
    /// Characteristic used for commands and notifications.
    pub characteristic_uuid: Uuid,
    /// Per-subscriber event buffer.
    pub event_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
            characteristic_uuid: RELAY_CHARACTERISTIC_UUID,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Set the discovery sweep length.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the command length cap.
    pub fn with_max_command_len(mut self, len: usize) -> Self {
        self.max_command_len = len;
        self
    }

    /// Use a different characteristic.
    pub fn with_characteristic(mut self, uuid: Uuid) -> Self {
        self.characteristic_uuid = uuid;
        self
    }

    /// Set the per-subscriber event buffer.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.scan_timeout.is_zero() {
            return Err(invalid("scan_timeout", format!("{:?}", self.scan_timeout)));
        }

        if self.connect_timeout.is_zero() {
            return Err(invalid(
                "connect_timeout",
                format!("{:?}", self.connect_timeout),
            ));
        }

        if !(1..=MAX_ATTRIBUTE_LEN).contains(&self.max_command_len) {
            return Err(invalid("max_command_len", self.max_command_len.to_string()));
        }

        // tokio's broadcast channel rejects a zero capacity
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "0".to_string()));
        }

        Ok(())
    }
}

fn invalid(name: &str, value: String) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_timeout, Duration::from_secs(5));
        assert_eq!(config.characteristic_uuid, RELAY_CHARACTERISTIC_UUID);
    }

    #[test]
    fn test_builder_setters() {
        let config = RelayConfig::default()
            .with_scan_timeout(Duration::from_secs(2))
            .with_connect_timeout(Duration::from_secs(3))
            .with_max_command_len(20)
            .with_event_capacity(8);

        assert_eq!(config.scan_timeout, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.max_command_len, 20);
        assert_eq!(config.event_capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_scan = RelayConfig::default().with_scan_timeout(Duration::ZERO);
        assert!(matches!(
            zero_scan.validate(),
            Err(Error::InvalidParameter { ref name, .. }) if name == "scan_timeout"
        ));

        let huge = RelayConfig::default().with_max_command_len(MAX_ATTRIBUTE_LEN + 1);
        assert!(huge.validate().is_err());

        let empty = RelayConfig::default().with_max_command_len(0);
        assert!(empty.validate().is_err());

        let no_buffer = RelayConfig::default().with_event_capacity(0);
        assert!(no_buffer.validate().is_err());
    }
}
