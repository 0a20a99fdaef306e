//! Handles for relay operations running in the background.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error};

use crate::error::{Error, Result};

/// An in-flight relay operation.
///
/// Every relay operation runs as its own tokio task so the caller never
/// blocks. Awaiting the handle yields the operation's result; dropping it
/// lets the operation finish unobserved.
///
/// # Example
///
/// ```no_run
/// use gas_sampler_ble::Relay;
///
/// # async fn example() -> gas_sampler_ble::Result<()> {
/// let relay = Relay::new().await?;
///
/// let connecting = relay.connect("AA:BB:CC:DD:EE:FF");
/// if connecting.await.is_err() {
///     println!("{}", relay.connectivity_status());
/// }
/// # Ok(())
/// # }
/// ```
#[must_use = "operations run regardless, but their result is lost unless awaited"]
pub struct OperationHandle<T> {
    /// Operation name, used in logs.
    name: &'static str,
    /// The spawned task.
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> OperationHandle<T> {
    /// Spawn `future` as a named operation.
    pub(crate) fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        debug!("Starting operation: {}", name);
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }
}

impl<T> OperationHandle<T> {
    /// Operation name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check if the operation has completed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the operation.
    ///
    /// Awaiting the handle afterwards yields [`Error::Cancelled`] unless the
    /// operation had already completed.
    pub fn abort(&self) {
        debug!("Aborting operation: {}", self.name);
        self.handle.abort();
    }

    fn join_error(name: &'static str, e: JoinError) -> Error {
        if e.is_cancelled() {
            debug!("Operation {} was cancelled", name);
            Error::Cancelled
        } else {
            error!("Operation {} panicked: {}", name, e);
            Error::Internal(format!("operation {} panicked", name))
        }
    }
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let name = self.name;
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Self::join_error(name, e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
