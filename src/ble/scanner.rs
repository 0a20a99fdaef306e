//! BLE scanning functionality.
//!
//! Provides the scanner for discovering named peripherals nearby.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::ble::connection::PeripheralHandle;
use crate::ble::transport::{Advertisement, BleTransport};
use crate::error::{Error, Result};
use crate::events::{EventBus, Status};

/// Clears the scanning flag when a sweep ends or its stream is dropped.
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State carried through one sweep.
struct Sweep {
    advertisements: BoxStream<'static, Advertisement>,
    reported: HashSet<String>,
    events: EventBus,
    _guard: ScanGuard,
}

/// Time-bounded discovery of named peripherals.
pub struct DeviceScanner {
    /// Transport performing the discovery.
    transport: Arc<dyn BleTransport>,
    /// Where discoveries and status lines are published.
    events: EventBus,
    /// Sweep length.
    timeout: Duration,
    /// Whether a sweep is running.
    is_scanning: Arc<AtomicBool>,
}

impl DeviceScanner {
    /// Create a scanner.
    pub fn new(transport: Arc<dyn BleTransport>, events: EventBus, timeout: Duration) -> Self {
        Self {
            transport,
            events,
            timeout,
            is_scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if a sweep is running.
    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::SeqCst)
    }

    /// Sweep length.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a sweep and stream named devices as they are found.
    ///
    /// Unnamed advertisers are skipped and each address is reported once.
    /// When the sweep ends without a single device, a
    /// [`Status::NoDevicesFound`] line is published; that is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::ScanInProgress`] if another sweep is still running,
    /// [`Error::ScanFailed`] if discovery cannot start.
    pub async fn scan(&self) -> Result<BoxStream<'static, PeripheralHandle>> {
        if self.is_scanning.swap(true, Ordering::SeqCst) {
            debug!("Already scanning, rejecting scan request");
            return Err(Error::ScanInProgress);
        }
        let guard = ScanGuard(self.is_scanning.clone());

        info!("Starting BLE scan for {:?}", self.timeout);
        self.events.status(Status::ScanStarted);

        let advertisements = match self.transport.discover(self.timeout).await {
            Ok(advertisements) => advertisements,
            Err(e) => {
                let reason = match e {
                    Error::ScanFailed { reason } => reason,
                    other => other.to_string(),
                };
                warn!("Scan failed: {}", reason);
                self.events.status(Status::ScanFailed {
                    reason: reason.clone(),
                });
                return Err(Error::ScanFailed { reason });
            }
        };

        let sweep = Sweep {
            advertisements,
            reported: HashSet::new(),
            events: self.events.clone(),
            _guard: guard,
        };

        Ok(stream::unfold(sweep, |mut sweep| async move {
            while let Some(advertisement) = sweep.advertisements.next().await {
                let Some(name) = advertisement.display_name() else {
                    trace!("Skipping unnamed device {}", advertisement.address);
                    continue;
                };

                if !sweep.reported.insert(advertisement.address.clone()) {
                    continue;
                }

                let device = PeripheralHandle::discovered(advertisement.address.clone(), name);
                debug!("Discovered device: {}", device);
                sweep.events.device_found(&device);

                return Some((device, sweep));
            }

            info!("Scan finished, {} devices found", sweep.reported.len());
            if sweep.reported.is_empty() {
                sweep.events.status(Status::NoDevicesFound);
            }

            None
        })
        .boxed())
    }

    /// Run a full sweep and collect every device found.
    pub async fn scan_all(&self) -> Result<Vec<PeripheralHandle>> {
        Ok(self.scan().await?.collect().await)
    }
}
