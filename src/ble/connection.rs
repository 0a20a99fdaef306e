//! Connection state and peripheral handles.

/// Connection state for a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected to the peripheral.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Currently tearing the link down.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// A discovered or connected BLE peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralHandle {
    /// Platform BLE identifier, unique per device.
    pub address: String,
    /// Advertised name.
    pub name: Option<String>,
    /// Connection state at the time the handle was produced.
    pub state: ConnectionState,
}

impl PeripheralHandle {
    /// Handle for a device seen during discovery.
    pub fn discovered(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
            state: ConnectionState::Disconnected,
        }
    }

    /// Name if present, otherwise the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl std::fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[test]
    fn test_peripheral_handle_display() {
        let handle = PeripheralHandle::discovered("AA:BB:CC:DD:EE:FF", "GasSampler");
        assert_eq!(handle.to_string(), "GasSampler (AA:BB:CC:DD:EE:FF)");
        assert_eq!(handle.display_name(), "GasSampler");

        let unnamed = PeripheralHandle {
            name: None,
            ..handle
        };
        assert_eq!(unnamed.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(unnamed.display_name(), "AA:BB:CC:DD:EE:FF");
    }
}
