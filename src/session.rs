//! Session manager.
//!
//! Owns the single connection to the rig: connecting, subscribing to the
//! command characteristic, relaying notifications, sending commands and
//! tearing everything down again, whether the caller asks for it or the
//! peripheral drops the link.

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::connection::{ConnectionState, PeripheralHandle};
use crate::ble::transport::{BleLink, BleTransport};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, Status};
use crate::protocol::commands::Command;
use crate::protocol::frame::{decode_notification, CommandFrame};

/// The active connection.
struct Session {
    /// Unique per established connection.
    id: Uuid,
    /// The connected peripheral.
    peripheral: PeripheralHandle,
    /// Transport link.
    link: Arc<dyn BleLink>,
    /// Task relaying notifications onto the event bus.
    notification_task: JoinHandle<()>,
    /// Task waiting for the peripheral to drop the link.
    watcher_task: JoinHandle<()>,
}

/// Connection state and the session it guards, changed under one lock.
#[derive(Default)]
struct Slot {
    state: ConnectionState,
    session: Option<Session>,
}

type SharedSlot = Arc<RwLock<Slot>>;

/// Owns a connect attempt until it commits.
///
/// An attempt that fails, times out or is cancelled tears down any link it
/// already opened and falls back to Disconnected.
struct ConnectingGuard {
    slot: SharedSlot,
    /// Link opened by this attempt, not yet handed to a session.
    link: Mutex<Option<Arc<dyn BleLink>>>,
    committed: bool,
}

impl ConnectingGuard {
    fn new(slot: SharedSlot) -> Self {
        Self {
            slot,
            link: Mutex::new(None),
            committed: false,
        }
    }

    /// Record the link as soon as the transport hands it out.
    fn opened(&self, link: Arc<dyn BleLink>) {
        *self.link.lock() = Some(link);
    }

    fn commit(mut self) {
        self.link.get_mut().take();
        self.committed = true;
    }

    /// Tear down the half-open link, then fall back to Disconnected.
    async fn abandon(mut self) {
        self.committed = true;

        let link = self.link.get_mut().take();
        if let Some(link) = link {
            debug!("Dropping half-open link to {}", link.address());
            if let Err(e) = link.disconnect().await {
                warn!("Failed to drop half-open link: {}", e);
            }
        }

        self.reset_state();
    }

    fn reset_state(&self) {
        let mut slot = self.slot.write();
        if slot.state == ConnectionState::Connecting {
            debug!("Connection state changed: Connecting -> Disconnected");
            slot.state = ConnectionState::Disconnected;
        }
    }
}

impl Drop for ConnectingGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // Cancelled mid-attempt; the teardown cannot be awaited here
        if let Some(link) = self.link.get_mut().take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = link.disconnect().await {
                            warn!("Failed to drop half-open link: {}", e);
                        }
                    });
                }
                Err(_) => warn!("No runtime left to drop link to {}", link.address()),
            }
        }

        self.reset_state();
    }
}

/// Manages the one connection the relay may hold.
pub struct SessionManager {
    /// Transport used to open links.
    transport: Arc<dyn BleTransport>,
    /// Where status lines and notifications are published.
    events: EventBus,
    /// Characteristic for commands and notifications.
    characteristic: Uuid,
    /// Time allowed for connect + subscribe.
    connect_timeout: Duration,
    /// Largest accepted command.
    max_command_len: usize,
    /// State and session.
    slot: SharedSlot,
}

impl SessionManager {
    /// Create a session manager.
    pub fn new(transport: Arc<dyn BleTransport>, events: EventBus, config: &RelayConfig) -> Self {
        Self {
            transport,
            events,
            characteristic: config.characteristic_uuid,
            connect_timeout: config.connect_timeout,
            max_command_len: config.max_command_len,
            slot: Arc::new(RwLock::new(Slot::default())),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.slot.read().state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The connected peripheral, if any.
    pub fn peripheral(&self) -> Option<PeripheralHandle> {
        self.slot
            .read()
            .session
            .as_ref()
            .map(|s| s.peripheral.clone())
    }

    /// Id of the current session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.slot.read().session.as_ref().map(|s| s.id)
    }

    /// Connect to a peripheral and subscribe to its command characteristic.
    ///
    /// Only one connection attempt may run at a time and only one session
    /// may exist; both cases are rejected rather than queued.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyConnected`], [`Error::ConnectionInProgress`], or
    /// [`Error::ConnectFailed`] when the transport, the link check or the
    /// subscription fails or the attempt times out.
    pub async fn connect(&self, address: &str) -> Result<()> {
        {
            let mut slot = self.slot.write();
            let state = slot.state;
            match state {
                ConnectionState::Connected => {
                    let connected = slot
                        .session
                        .as_ref()
                        .map(|s| s.peripheral.address.clone())
                        .unwrap_or_default();
                    drop(slot);
                    return Err(self.connect_rejected(Error::AlreadyConnected {
                        address: connected,
                    }));
                }
                ConnectionState::Connecting | ConnectionState::Disconnecting => {
                    drop(slot);
                    return Err(self.connect_rejected(Error::ConnectionInProgress));
                }
                ConnectionState::Disconnected => {
                    debug!("Connection state changed: Disconnected -> Connecting");
                    slot.state = ConnectionState::Connecting;
                }
            }
        }
        let guard = ConnectingGuard::new(self.slot.clone());

        info!("Connecting to {}", address);
        self.events.status(Status::Connecting {
            address: address.to_string(),
        });

        let attempt =
            tokio::time::timeout(self.connect_timeout, self.establish(address, &guard));
        let (link, notifications, lost) = match attempt.await {
            Ok(Ok(established)) => established,
            Ok(Err(e)) => {
                guard.abandon().await;
                return Err(self.connect_failed(e));
            }
            Err(_) => {
                guard.abandon().await;
                return Err(self.connect_failed(Error::connect_failed(format!(
                    "timed out after {:?}",
                    self.connect_timeout
                ))));
            }
        };

        let id = Uuid::new_v4();
        let peripheral = PeripheralHandle {
            address: link.address().to_string(),
            name: link.name(),
            state: ConnectionState::Connected,
        };

        {
            // Held while spawning so a link lost right away still finds its session
            let mut slot = self.slot.write();

            let notification_task =
                tokio::spawn(pump_notifications(notifications, self.events.clone()));
            let watcher_task = tokio::spawn(watch_link(
                lost,
                self.slot.clone(),
                self.events.clone(),
                id,
            ));

            slot.session = Some(Session {
                id,
                peripheral,
                link,
                notification_task,
                watcher_task,
            });
            slot.state = ConnectionState::Connected;
            guard.commit();
        }

        debug!("Connection state changed: Connecting -> Connected");
        info!("Connected to {} (session {})", address, id);
        self.events.status(Status::Connected {
            address: address.to_string(),
        });

        Ok(())
    }

    /// Open the link, watch it for loss, confirm it is up and subscribe.
    ///
    /// The link is registered with `guard` as soon as it exists so every
    /// failed or cancelled attempt can tear it down.
    async fn establish(
        &self,
        address: &str,
        guard: &ConnectingGuard,
    ) -> Result<(
        Arc<dyn BleLink>,
        BoxStream<'static, Vec<u8>>,
        BoxFuture<'static, ()>,
    )> {
        let link = self.transport.connect(address).await?;
        guard.opened(link.clone());

        // Watch before subscribing so a drop during setup is not missed
        let lost = link.disconnected().await?;

        if !link.is_connected().await? {
            return Err(Error::connect_failed("link did not come up"));
        }

        let notifications = link.subscribe(self.characteristic).await?;
        debug!("Subscribed to {}", self.characteristic);

        Ok((link, notifications, lost))
    }

    /// Disconnect from the peripheral.
    ///
    /// A no-op when already disconnected. The state ends Disconnected even
    /// when the transport reports a failure.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionInProgress`] while a connect or disconnect is in
    /// flight, [`Error::DisconnectFailed`] if the transport fails.
    pub async fn disconnect(&self) -> Result<()> {
        let session = {
            let mut slot = self.slot.write();
            let state = slot.state;
            match state {
                ConnectionState::Disconnected => {
                    debug!("Already disconnected");
                    return Ok(());
                }
                ConnectionState::Connecting | ConnectionState::Disconnecting => {
                    drop(slot);
                    let err = Error::ConnectionInProgress;
                    self.events.status(Status::DisconnectFailed {
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
                ConnectionState::Connected => {
                    debug!("Connection state changed: Connected -> Disconnecting");
                    slot.state = ConnectionState::Disconnecting;
                    slot.session.take()
                }
            }
        };

        let Some(session) = session else {
            self.set_state(ConnectionState::Disconnected);
            return Ok(());
        };

        info!("Disconnecting from {}", session.peripheral);
        self.events.status(Status::Disconnecting);

        // Our own teardown must not look like a dropped link
        session.watcher_task.abort();

        if let Err(e) = session.link.unsubscribe(self.characteristic).await {
            warn!("Failed to unsubscribe from {}: {}", self.characteristic, e);
        }
        session.notification_task.abort();

        let result = session.link.disconnect().await;
        self.set_state(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!("Successfully disconnected from {}", session.peripheral);
                self.events.status(Status::Disconnected);
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                let reason = e.to_string();
                self.events.status(Status::DisconnectFailed {
                    reason: reason.clone(),
                });
                Err(Error::disconnect_failed(reason))
            }
        }
    }

    /// Send text to the rig.
    ///
    /// The text is written once, as UTF-8, to the command characteristic.
    /// There is no acknowledgment; any reply arrives as a notification.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] unless connected, [`Error::InvalidCommand`]
    /// for empty text, [`Error::CommandTooLong`] above the configured cap,
    /// [`Error::SendFailed`] if the write fails.
    pub async fn send(&self, text: &str) -> Result<()> {
        let link = {
            let slot = self.slot.read();
            match (&slot.state, &slot.session) {
                (ConnectionState::Connected, Some(session)) => Some(session.link.clone()),
                _ => None,
            }
        };

        let Some(link) = link else {
            warn!("Cannot send {:?}, not connected", text);
            self.events.status(Status::NotConnected);
            return Err(Error::NotConnected);
        };

        let frame = CommandFrame::new(text);
        if let Err(e) = frame.validate(self.max_command_len) {
            warn!("Rejected command {:?}: {}", text, e);
            self.events.status(Status::SendFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }

        debug!("Sending {} bytes: {}", frame.len(), text);

        match link.write(self.characteristic, frame.as_bytes()).await {
            Ok(()) => {
                info!("Sent: {}", text);
                self.events.status(Status::Sent {
                    text: text.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to send {:?}: {}", text, e);
                let reason = match e {
                    Error::SendFailed { reason } => reason,
                    other => other.to_string(),
                };
                self.events.status(Status::SendFailed {
                    reason: reason.clone(),
                });
                Err(Error::send_failed(reason))
            }
        }
    }

    /// Send a command from the rig vocabulary.
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        self.send(&command.to_string()).await
    }

    /// Handle a notification payload pushed by the peripheral.
    ///
    /// The decoded text is published as a [`Status::Received`] line; a
    /// payload that is not UTF-8 is published as [`Status::DecodeError`].
    pub fn on_notification(&self, data: &[u8]) -> Result<String> {
        relay_notification(&self.events, data)
    }

    /// Publish a rejected connect and hand the error back.
    fn connect_rejected(&self, e: Error) -> Error {
        warn!("Connect rejected: {}", e);
        self.events.status(Status::ConnectFailed {
            reason: e.to_string(),
        });
        e
    }

    /// Publish a failed connect, normalised to [`Error::ConnectFailed`].
    fn connect_failed(&self, e: Error) -> Error {
        let reason = match e {
            Error::ConnectFailed { reason } => reason,
            other => other.to_string(),
        };
        error!("Connection failed: {}", reason);
        self.events.status(Status::ConnectFailed {
            reason: reason.clone(),
        });
        Error::connect_failed(reason)
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut self.slot.write().state, new_state);

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }
    }
}

/// Decode one notification and publish the outcome.
fn relay_notification(events: &EventBus, data: &[u8]) -> Result<String> {
    match decode_notification(data) {
        Ok(text) => {
            debug!("Received: {}", text);
            events.status(Status::Received { text: text.clone() });
            Ok(text)
        }
        Err(e) => {
            warn!("Undecodable notification ({} bytes): {}", data.len(), e);
            let reason = match &e {
                Error::DecodeError { reason } => reason.clone(),
                other => other.to_string(),
            };
            events.status(Status::DecodeError { reason });
            Err(e)
        }
    }
}

async fn pump_notifications(mut notifications: BoxStream<'static, Vec<u8>>, events: EventBus) {
    debug!("Notification relay started");
    while let Some(data) = notifications.next().await {
        let _ = relay_notification(&events, &data);
    }
    debug!("Notification relay stopped");
}

async fn watch_link(lost: BoxFuture<'static, ()>, slot: SharedSlot, events: EventBus, id: Uuid) {
    lost.await;

    let session = {
        let mut slot = slot.write();
        if slot.session.as_ref().map(|s| s.id) != Some(id) {
            return;
        }
        debug!("Connection state changed: {} -> Disconnected", slot.state);
        slot.state = ConnectionState::Disconnected;
        slot.session.take()
    };

    if let Some(session) = session {
        session.notification_task.abort();
        warn!("{}: {}", session.peripheral, Error::UnexpectedDisconnect);
        events.status(Status::UnexpectedDisconnect);
    }
}
