//! Relay between a host application and the gas-sampling rig.
//!
//! [`Relay`] owns the scanner, the session manager and the event bus. Every
//! operation is spawned onto the tokio runtime and handed back as an
//! [`OperationHandle`], so a UI thread never waits on the radio.

use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::adapter::BtleplugTransport;
use crate::ble::connection::{ConnectionState, PeripheralHandle};
use crate::ble::scanner::DeviceScanner;
use crate::ble::transport::BleTransport;
use crate::config::RelayConfig;
use crate::error::Result;
use crate::events::{CallbackHandle, EventBus, RelayEvent, Status};
use crate::operation::OperationHandle;
use crate::protocol::commands::{Command, Parameter};
use crate::session::SessionManager;

/// Headless relay to a single gas-sampler peripheral.
///
/// # Example
///
/// ```no_run
/// use gas_sampler_ble::{Command, Relay};
///
/// # async fn example() -> gas_sampler_ble::Result<()> {
/// let relay = Relay::new().await?;
///
/// let devices = relay.scan().await?;
/// if let Some(device) = devices.first() {
///     relay.connect(device.address.clone()).await?;
///     relay.send_command(Command::SampleBag).await?;
/// }
///
/// relay.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Relay {
    /// Active configuration.
    config: RelayConfig,
    /// Event bus shared with the scanner and session manager.
    events: EventBus,
    /// Device scanner.
    scanner: Arc<DeviceScanner>,
    /// Session manager.
    session: Arc<SessionManager>,
    /// Devices found by the latest scan, in discovery order.
    devices: Arc<RwLock<Vec<PeripheralHandle>>>,
}

impl Relay {
    /// Create a relay on the first Bluetooth adapter with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(RelayConfig::default()).await
    }

    /// Create a relay on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or Bluetooth is not
    /// available.
    pub async fn with_config(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let transport = BtleplugTransport::new().await?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Create a relay on any transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_transport(transport: Arc<dyn BleTransport>, config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let scanner = DeviceScanner::new(transport.clone(), events.clone(), config.scan_timeout);
        let session = SessionManager::new(transport, events.clone(), &config);

        debug!("Relay created with {:?}", config);

        Ok(Self {
            config,
            events,
            scanner: Arc::new(scanner),
            session: Arc::new(session),
            devices: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run a discovery sweep.
    ///
    /// The device list is cleared once the sweep starts and filled as named
    /// devices arrive; each one is also published as a
    /// [`EventKind::DeviceFound`](crate::EventKind::DeviceFound) event. The
    /// handle resolves to every device found when the sweep ends.
    pub fn scan(&self) -> OperationHandle<Vec<PeripheralHandle>> {
        let scanner = self.scanner.clone();
        let devices = self.devices.clone();

        OperationHandle::spawn("scan", async move {
            let mut found_stream = scanner.scan().await?;
            devices.write().clear();

            let mut found = Vec::new();
            while let Some(device) = found_stream.next().await {
                devices.write().push(device.clone());
                found.push(device);
            }

            Ok(found)
        })
    }

    /// Connect to a peripheral by address.
    pub fn connect(&self, address: impl Into<String>) -> OperationHandle<()> {
        let session = self.session.clone();
        let address = address.into();

        OperationHandle::spawn("connect", async move { session.connect(&address).await })
    }

    /// Disconnect from the connected peripheral.
    pub fn disconnect(&self) -> OperationHandle<()> {
        let session = self.session.clone();

        OperationHandle::spawn("disconnect", async move { session.disconnect().await })
    }

    /// Send free text to the rig.
    pub fn send(&self, text: impl Into<String>) -> OperationHandle<()> {
        let session = self.session.clone();
        let text = text.into();

        OperationHandle::spawn("send", async move { session.send(&text).await })
    }

    /// Send a command from the rig vocabulary.
    pub fn send_command(&self, command: Command) -> OperationHandle<()> {
        let session = self.session.clone();

        OperationHandle::spawn("send", async move { session.send_command(&command).await })
    }

    /// Set a rig parameter from a user-entered number.
    ///
    /// Times are given in seconds and sent as milliseconds; counts are sent
    /// as-is. An invalid value is reported without writing anything.
    pub fn set_parameter(&self, parameter: Parameter, value: f64) -> OperationHandle<()> {
        let session = self.session.clone();
        let events = self.events.clone();

        OperationHandle::spawn("set_parameter", async move {
            let command = match Command::set_parameter(parameter, value) {
                Ok(command) => command,
                Err(e) => {
                    warn!("Rejected {} = {}: {}", parameter, value, e);
                    events.status(Status::SendFailed {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            };

            session.send_command(&command).await
        })
    }

    /// Devices found by the latest scan.
    pub fn devices(&self) -> Vec<PeripheralHandle> {
        self.devices.read().clone()
    }

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Check if a sweep is running.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// The connected peripheral, if any.
    pub fn connected_peripheral(&self) -> Option<PeripheralHandle> {
        self.session.peripheral()
    }

    /// One-line connectivity summary for a status bar.
    pub fn connectivity_status(&self) -> String {
        match self.session.peripheral() {
            Some(peripheral) => format!("Connected to: {}", peripheral.display_name()),
            None => "Not connected".to_string(),
        }
    }

    /// Subscribe to relay events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Register a callback invoked for every relay event, in order.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(RelayEvent) + Send + Sync + 'static,
    {
        self.events.on_event(callback)
    }

    /// The device scanner.
    pub fn scanner(&self) -> &DeviceScanner {
        &self.scanner
    }

    /// The session manager.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Disconnect if connected.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down relay");

        if self.session.state() == ConnectionState::Disconnected {
            return Ok(());
        }

        self.session.disconnect().await
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("state", &self.session.state())
            .field("devices", &self.devices.read().len())
            .finish()
    }
}
