//! In-memory transport used by the unit tests.

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use uuid::Uuid;

use crate::ble::transport::{Advertisement, BleLink, BleTransport};
use crate::error::{Error, Result};

/// Scriptable stand-in for a BLE adapter.
#[derive(Default)]
pub(crate) struct FakeTransport {
    advertisements: Mutex<Vec<Advertisement>>,
    discover_error: Mutex<Option<String>>,
    connect_error: Mutex<Option<String>>,
    link_script: Mutex<LinkScript>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
    links: Mutex<Vec<Arc<FakeLink>>>,
    discover_calls: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_advertisements(advertisements: Vec<Advertisement>) -> Self {
        let transport = Self::new();
        transport.set_advertisements(advertisements);
        transport
    }

    /// Replace what the next sweep will see.
    pub(crate) fn set_advertisements(&self, advertisements: Vec<Advertisement>) {
        *self.advertisements.lock() = advertisements;
    }

    pub(crate) fn fail_discover(&self, reason: &str) {
        *self.discover_error.lock() = Some(reason.to_string());
    }

    pub(crate) fn fail_connect(&self, reason: &str) {
        *self.connect_error.lock() = Some(reason.to_string());
    }

    pub(crate) fn fail_subscribe(&self) {
        self.link_script.lock().fail_subscribe = true;
    }

    /// Links opened from now on never finish subscribing.
    pub(crate) fn hang_subscribe(&self) {
        self.link_script.lock().hang_subscribe = true;
    }

    /// Links opened from now on drop while subscribing.
    pub(crate) fn drop_on_subscribe(&self) {
        self.link_script.lock().drop_on_subscribe = true;
    }

    /// Make `connect` wait until the returned gate is notified.
    pub(crate) fn gate_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock() = Some(gate.clone());
        gate
    }

    pub(crate) fn last_link(&self) -> Option<Arc<FakeLink>> {
        self.links.lock().last().cloned()
    }

    pub(crate) fn link_count(&self) -> usize {
        self.links.lock().len()
    }

    pub(crate) fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    async fn discover(&self, _timeout: Duration) -> Result<BoxStream<'static, Advertisement>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);

        let error = self.discover_error.lock().clone();
        if let Some(reason) = error {
            return Err(Error::scan_failed(reason));
        }

        let advertisements = self.advertisements.lock().clone();
        Ok(stream::iter(advertisements).boxed())
    }

    async fn connect(&self, address: &str) -> Result<Arc<dyn BleLink>> {
        let gate = self.connect_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let error = self.connect_error.lock().clone();
        if let Some(reason) = error {
            return Err(Error::connect_failed(reason));
        }

        let name = self
            .advertisements
            .lock()
            .iter()
            .find(|a| a.address == address)
            .and_then(|a| a.name.clone());

        let script = *self.link_script.lock();
        let link = Arc::new(FakeLink::new(address, name, script));
        self.links.lock().push(link.clone());

        Ok(link)
    }
}

/// How links opened by [`FakeTransport`] misbehave.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LinkScript {
    fail_subscribe: bool,
    hang_subscribe: bool,
    drop_on_subscribe: bool,
}

/// Scriptable stand-in for a connected peripheral.
pub(crate) struct FakeLink {
    address: String,
    name: Option<String>,
    connected: AtomicBool,
    subscribed: AtomicBool,
    script: LinkScript,
    write_error: Mutex<Option<String>>,
    unsubscribe_error: Mutex<Option<String>>,
    disconnect_error: Mutex<Option<String>>,
    calls: Mutex<Vec<&'static str>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    disconnect_calls: AtomicUsize,
    notify_tx: mpsc::UnboundedSender<Vec<u8>>,
    notify_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    lost_tx: Mutex<Option<oneshot::Sender<()>>>,
    lost_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeLink {
    fn new(address: &str, name: Option<String>, script: LinkScript) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (lost_tx, lost_rx) = oneshot::channel();

        Self {
            address: address.to_string(),
            name,
            connected: AtomicBool::new(true),
            subscribed: AtomicBool::new(false),
            script,
            write_error: Mutex::new(None),
            unsubscribe_error: Mutex::new(None),
            disconnect_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            disconnect_calls: AtomicUsize::new(0),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            lost_tx: Mutex::new(Some(lost_tx)),
            lost_rx: Mutex::new(Some(lost_rx)),
        }
    }

    /// Push a notification as the peripheral would.
    pub(crate) fn push_notification(&self, data: &[u8]) {
        let _ = self.notify_tx.send(data.to_vec());
    }

    /// Simulate the peripheral dropping the link.
    pub(crate) fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(tx) = self.lost_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    pub(crate) fn fail_writes(&self, reason: &str) {
        *self.write_error.lock() = Some(reason.to_string());
    }

    pub(crate) fn fail_unsubscribe(&self, reason: &str) {
        *self.unsubscribe_error.lock() = Some(reason.to_string());
    }

    pub(crate) fn fail_disconnect(&self, reason: &str) {
        *self.disconnect_error.lock() = Some(reason.to_string());
    }

    /// Names of the link setup calls made so far, in order.
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub(crate) fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleLink for FakeLink {
    fn address(&self) -> &str {
        &self.address
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>> {
        self.calls.lock().push("subscribe");

        if self.script.hang_subscribe {
            future::pending::<()>().await;
        }
        if self.script.drop_on_subscribe {
            self.drop_link();
        }
        if self.script.fail_subscribe {
            return Err(Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            });
        }

        let rx = self
            .notify_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Internal("already subscribed".to_string()))?;

        self.subscribed.store(true, Ordering::SeqCst);

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|data| (data, rx))
        })
        .boxed())
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<()> {
        let error = self.unsubscribe_error.lock().clone();
        if let Some(reason) = error {
            return Err(Error::Internal(reason));
        }

        self.subscribed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let error = self.write_error.lock().clone();
        if let Some(reason) = error {
            return Err(Error::Internal(reason));
        }

        self.writes.lock().push((characteristic, data.to_vec()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);

        let error = self.disconnect_error.lock().clone();
        if let Some(reason) = error {
            return Err(Error::Internal(reason));
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnected(&self) -> Result<BoxFuture<'static, ()>> {
        self.calls.lock().push("disconnected");
        let rx = self.lost_rx.lock().take();

        Ok(match rx {
            Some(rx) => async move {
                let _ = rx.await;
            }
            .boxed(),
            None => future::pending().boxed(),
        })
    }
}
