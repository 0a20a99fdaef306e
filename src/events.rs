//! Observer boundary.
//!
//! Everything the relay has to tell its host (discovered devices, status
//! text, received notifications, failures) travels through one broadcast
//! channel in arrival order. Events published while nobody is subscribed are
//! dropped; nothing is replayed.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ble::connection::PeripheralHandle;
use crate::error::Error;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Human-readable status reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// A discovery sweep started.
    ScanStarted,
    /// A named device was found.
    DeviceDiscovered {
        /// Device address.
        address: String,
        /// Device name.
        name: String,
    },
    /// The sweep ended without any named device.
    NoDevicesFound,
    /// Discovery could not run.
    ScanFailed {
        /// Failure description.
        reason: String,
    },
    /// A connection attempt started.
    Connecting {
        /// Target address.
        address: String,
    },
    /// The session is established.
    Connected {
        /// Connected address.
        address: String,
    },
    /// The connection attempt failed.
    ConnectFailed {
        /// Failure description.
        reason: String,
    },
    /// A caller-initiated disconnect started.
    Disconnecting,
    /// The caller-initiated disconnect finished.
    Disconnected,
    /// The link could not be torn down cleanly.
    DisconnectFailed {
        /// Failure description.
        reason: String,
    },
    /// The peripheral dropped the link.
    UnexpectedDisconnect,
    /// A command was written.
    Sent {
        /// Command text.
        text: String,
    },
    /// A send was attempted without a session.
    NotConnected,
    /// A command could not be written.
    SendFailed {
        /// Failure description.
        reason: String,
    },
    /// The peripheral pushed a text notification.
    Received {
        /// Decoded text.
        text: String,
    },
    /// A notification was not valid UTF-8.
    DecodeError {
        /// Failure description.
        reason: String,
    },
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScanStarted => write!(f, "Starting scan..."),
            Self::DeviceDiscovered { address, name } => {
                write!(f, "Discovered device: {} ({})", name, address)
            }
            Self::NoDevicesFound => write!(f, "No devices found"),
            Self::ScanFailed { reason } => write!(f, "Error scanning devices: {}", reason),
            Self::Connecting { address } => write!(f, "Connecting to {}...", address),
            Self::Connected { address } => write!(f, "Connected to {}", address),
            Self::ConnectFailed { reason } => write!(f, "Error connecting to device: {}", reason),
            Self::Disconnecting => write!(f, "Disconnecting..."),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::DisconnectFailed { reason } => {
                write!(f, "Error disconnecting from device: {}", reason)
            }
            Self::UnexpectedDisconnect => write!(f, "{}", Error::UnexpectedDisconnect),
            Self::Sent { text } => write!(f, "Sent: {}", text),
            Self::NotConnected => write!(f, "Cannot send, not connected"),
            Self::SendFailed { reason } => write!(f, "Error sending message: {}", reason),
            Self::Received { text } => write!(f, "Received: {}", text),
            Self::DecodeError { reason } => write!(f, "Error in notification handler: {}", reason),
        }
    }
}

impl Status {
    /// Whether this status reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ScanFailed { .. }
                | Self::ConnectFailed { .. }
                | Self::DisconnectFailed { .. }
                | Self::UnexpectedDisconnect
                | Self::NotConnected
                | Self::SendFailed { .. }
                | Self::DecodeError { .. }
        )
    }
}

/// The two kinds of event crossing the observer boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A named device was found during a scan.
    DeviceFound {
        /// Device address.
        address: String,
        /// Device name.
        name: String,
    },
    /// A status line for the host's log.
    Status(Status),
}

/// A timestamped relay event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayEvent {
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

impl RelayEvent {
    /// The status carried by this event, if any.
    pub fn status(&self) -> Option<&Status> {
        match &self.kind {
            EventKind::Status(status) => Some(status),
            EventKind::DeviceFound { .. } => None,
        }
    }

    /// Log line for this event.
    pub fn text(&self) -> String {
        match &self.kind {
            EventKind::DeviceFound { address, name } => format!("{} ({})", name, address),
            EventKind::Status(status) => status.to_string(),
        }
    }
}

/// Broadcast channel shared by the scanner and session manager.
#[derive(Clone)]
pub struct EventBus {
    /// Event channel.
    tx: broadcast::Sender<RelayEvent>,
    /// Callback ID counter.
    callback_counter: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);

        Self {
            tx,
            callback_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to relay events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Register a callback invoked for every event, in order.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(RelayEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event callback {} lagged, {} events lost", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a status line.
    pub(crate) fn status(&self, status: Status) {
        debug!("Status: {}", status);
        self.publish(EventKind::Status(status));
    }

    /// Publish a discovered device, followed by its status line.
    pub(crate) fn device_found(&self, device: &PeripheralHandle) {
        let name = device.display_name().to_string();

        self.publish(EventKind::DeviceFound {
            address: device.address.clone(),
            name: name.clone(),
        });
        self.status(Status::DeviceDiscovered {
            address: device.address.clone(),
            name,
        });
    }

    fn publish(&self, kind: EventKind) {
        let _ = self.tx.send(RelayEvent {
            timestamp: Utc::now(),
            kind,
        });
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_status_text() {
        assert_eq!(Status::ScanStarted.to_string(), "Starting scan...");
        assert_eq!(Status::NoDevicesFound.to_string(), "No devices found");
        assert_eq!(
            Status::DeviceDiscovered {
                address: "AA:BB".into(),
                name: "Rig".into()
            }
            .to_string(),
            "Discovered device: Rig (AA:BB)"
        );
        assert_eq!(
            Status::Sent {
                text: "abort".into()
            }
            .to_string(),
            "Sent: abort"
        );
        assert_eq!(
            Status::Received {
                text: "done".into()
            }
            .to_string(),
            "Received: done"
        );
        assert_eq!(
            Status::UnexpectedDisconnect.to_string(),
            "Disconnected from device"
        );
    }

    #[test]
    fn test_status_is_error() {
        assert!(Status::UnexpectedDisconnect.is_error());
        assert!(Status::NotConnected.is_error());
        assert!(!Status::Disconnected.is_error());
        assert!(!Status::NoDevicesFound.is_error());
    }

    #[test]
    fn test_events_arrive_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.device_found(&PeripheralHandle::discovered("AA:BB", "Rig"));
        bus.status(Status::NoDevicesFound);

        let first = rx.try_recv().unwrap();
        assert_eq!(
            first.kind,
            EventKind::DeviceFound {
                address: "AA:BB".into(),
                name: "Rig".into()
            }
        );
        assert_eq!(first.text(), "Rig (AA:BB)");
        assert!(first.status().is_none());

        let second = rx.try_recv().unwrap();
        assert_eq!(second.text(), "Discovered device: Rig (AA:BB)");

        let third = rx.try_recv().unwrap();
        assert_eq!(third.status(), Some(&Status::NoDevicesFound));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_without_subscribers_are_dropped() {
        let bus = EventBus::new(4);
        bus.status(Status::ScanStarted);

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_on_event_callback() {
        let bus = EventBus::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let handle = bus.on_event(move |event| {
            sink.lock().unwrap().push(event.text());
        });

        bus.status(Status::Disconnecting);
        bus.status(Status::Disconnected);

        for _ in 0..50 {
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Disconnecting...".to_string(), "Disconnected".to_string()]
        );

        handle.unregister();
    }
}
