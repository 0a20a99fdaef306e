//! btleplug-backed transport.
//!
//! Wraps the first Bluetooth adapter reported by the platform manager.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::ble::characteristics::BtleplugLink;
use crate::ble::transport::{with_teardown, Advertisement, BleLink, BleTransport};
use crate::error::{Error, Result};

/// Production [`BleTransport`] built on btleplug.
pub struct BtleplugTransport {
    /// The BLE adapter used for discovery and connections.
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Open the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a transport over a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Turn a central event into an advertisement, if it describes a device.
    async fn advertisement_for(adapter: &Adapter, event: CentralEvent) -> Option<Advertisement> {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => return None,
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        Some(Advertisement {
            address: id.to_string(),
            name: properties.local_name,
            rssi: properties.rssi,
        })
    }

    /// Look up a known peripheral by platform id or MAC address.
    async fn find_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        Ok(peripherals.into_iter().find(|p| {
            p.id().to_string() == address || p.address().to_string().eq_ignore_ascii_case(address)
        }))
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn discover(&self, timeout: Duration) -> Result<BoxStream<'static, Advertisement>> {
        let events = self.adapter.events().await.map_err(Error::scan_failed)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::scan_failed)?;

        debug!("Discovery started for {:?}", timeout);

        let adapter = self.adapter.clone();
        let advertisements = events
            .take_until(tokio::time::sleep(timeout))
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move { BtleplugTransport::advertisement_for(&adapter, event).await }
            })
            .boxed();

        // Stop the platform scan when the window closes or the caller stops early
        let adapter = self.adapter.clone();
        Ok(with_teardown(advertisements, move || {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("No runtime left to stop the scan");
                return;
            };
            runtime.spawn(async move {
                match adapter.stop_scan().await {
                    Ok(()) => debug!("Discovery stopped"),
                    Err(e) => warn!("Failed to stop scan: {}", e),
                }
            });
        }))
    }

    async fn connect(&self, address: &str) -> Result<Arc<dyn BleLink>> {
        let peripheral = self
            .find_peripheral(address)
            .await?
            .ok_or_else(|| Error::DeviceNotFound {
                address: address.to_string(),
            })?;

        // Listen before connecting so a drop during setup is still seen
        let events = self.adapter.events().await.map_err(Error::connect_failed)?;

        // Check if already connected at BLE level
        if peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
        } else {
            peripheral.connect().await.map_err(Error::connect_failed)?;
        }

        peripheral
            .discover_services()
            .await
            .map_err(Error::connect_failed)?;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);

        Ok(Arc::new(BtleplugLink::new(
            self.adapter.clone(),
            peripheral,
            address.to_string(),
            name,
            events,
        )))
    }
}
