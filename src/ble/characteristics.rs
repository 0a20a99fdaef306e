//! GATT characteristic handling.
//!
//! [`BtleplugLink`] is the btleplug side of an established connection:
//! writes, notification subscriptions and link-loss detection.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::ble::transport::BleLink;
use crate::ble::uuids::is_relay_characteristic;
use crate::error::{Error, Result};

/// A connected btleplug peripheral.
pub struct BtleplugLink {
    /// Adapter the peripheral belongs to, used to watch for disconnects.
    adapter: Adapter,
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Address the caller connected with.
    address: String,
    /// Advertised name.
    name: Option<String>,
    /// Cached characteristics by UUID.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
    /// Adapter events opened before the connection was made.
    events: Mutex<Option<BoxStream<'static, CentralEvent>>>,
}

impl BtleplugLink {
    /// Wrap a peripheral whose services have already been discovered.
    pub fn new(
        adapter: Adapter,
        peripheral: Peripheral,
        address: String,
        name: Option<String>,
        events: BoxStream<'static, CentralEvent>,
    ) -> Self {
        let characteristics: HashMap<Uuid, Characteristic> = peripheral
            .characteristics()
            .into_iter()
            .map(|c| {
                trace!("Found characteristic: {} in service {}", c.uuid, c.service_uuid);
                (c.uuid, c)
            })
            .collect();

        debug!("Discovered {} characteristics", characteristics.len());
        if !characteristics.keys().any(is_relay_characteristic) {
            warn!("{} does not expose the relay characteristic", address);
        }

        Self {
            adapter,
            peripheral,
            address,
            name,
            characteristics: RwLock::new(characteristics),
            events: Mutex::new(Some(events)),
        }
    }

    /// Get a characteristic by UUID.
    fn characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    fn address(&self) -> &str {
        &self.address
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn is_connected(&self) -> Result<bool> {
        self.peripheral.is_connected().await.map_err(Error::Bluetooth)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>> {
        let target = self.characteristic(&characteristic)?;

        debug!(
            "Found characteristic {}, properties: {:?}",
            characteristic, target.properties
        );

        // Open the stream first so nothing sent right after subscribing is lost.
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)?;

        self.peripheral
            .subscribe(&target)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Subscribed to notifications from {}", characteristic);

        Ok(notifications
            .filter_map(move |notification| async move {
                (notification.uuid == characteristic).then_some(notification.value)
            })
            .boxed())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        let target = self.characteristic(&characteristic)?;

        self.peripheral
            .unsubscribe(&target)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from notifications from {}", characteristic);

        Ok(())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let target = self.characteristic(&characteristic)?;

        let write_type = if target.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", data.len(), characteristic);

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await.map_err(Error::Bluetooth)
    }

    async fn disconnected(&self) -> Result<BoxFuture<'static, ()>> {
        let early = self.events.lock().take();
        let mut events = match early {
            Some(events) => events,
            None => self.adapter.events().await.map_err(Error::Bluetooth)?,
        };
        let id = self.peripheral.id();

        Ok(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        debug!("Peripheral {:?} dropped the link", id);
                        return;
                    }
                }
            }
            debug!("Adapter event stream ended");
        }
        .boxed())
    }
}
