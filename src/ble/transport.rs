//! Transport boundary between the relay and a BLE stack.
//!
//! The relay only ever talks to these two traits. [`BtleplugTransport`] is the
//! production implementation; tests drive the scanner and session manager
//! through an in-memory fake.
//!
//! [`BtleplugTransport`]: crate::ble::adapter::BtleplugTransport

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// A single advertisement received during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Platform BLE identifier of the advertiser.
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Create an advertisement without signal strength.
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
            rssi: None,
        }
    }

    /// The advertised name, ignoring empty strings.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Central role: discovery and link establishment.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Start a discovery sweep that ends after `timeout`.
    ///
    /// The stream yields advertisements as they arrive and finishes once the
    /// sweep is over. Repeated advertisements of one device are allowed.
    async fn discover(&self, timeout: Duration) -> Result<BoxStream<'static, Advertisement>>;

    /// Connect to the peripheral with the given address.
    async fn connect(&self, address: &str) -> Result<Arc<dyn BleLink>>;
}

/// An established link to one peripheral.
#[async_trait]
pub trait BleLink: Send + Sync {
    /// Address the link was opened to.
    fn address(&self) -> &str;

    /// Name reported by the peripheral, if known.
    fn name(&self) -> Option<String>;

    /// Whether the link is up at the transport level.
    async fn is_connected(&self) -> Result<bool>;

    /// Enable notifications on a characteristic and stream their payloads.
    async fn subscribe(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>>;

    /// Disable notifications on a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Write raw bytes to a characteristic.
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<()>;

    /// A future that resolves once the peripheral drops the link.
    async fn disconnected(&self) -> Result<BoxFuture<'static, ()>>;
}

/// Runs its closure once when dropped.
struct Teardown<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for Teardown<F> {
    fn drop(&mut self) {
        if let Some(teardown) = self.0.take() {
            teardown();
        }
    }
}

/// Wrap `inner` so `teardown` runs exactly once, when the stream ends or is
/// dropped early, whichever comes first.
pub(crate) fn with_teardown<T, F>(
    inner: BoxStream<'static, T>,
    teardown: F,
) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    stream::unfold(
        (inner, Teardown(Some(teardown))),
        |(mut inner, teardown)| async move {
            let item = inner.next().await?;
            Some((item, (inner, teardown)))
        },
    )
    .boxed()
}
