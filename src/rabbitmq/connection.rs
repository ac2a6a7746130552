// src/rabbitmq/connection.rs

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::amqp_client::{BrokerChannel, BrokerConnection, Connector};
use super::errors::Result;

/// Where published messages end up: `queue` bound to `exchange` with `routing_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// A live connection together with its confirm-mode channel.
///
/// A retired handle closes its connection when the last snapshot of it is
/// dropped.
pub struct BrokerHandle {
    connection: Arc<dyn BrokerConnection>,
    channel: Box<dyn BrokerChannel>,
    retired: AtomicBool,
}

impl BrokerHandle {
    pub fn channel(&self) -> &dyn BrokerChannel {
        self.channel.as_ref()
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        if !self.retired.load(Ordering::Acquire) {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime to close discarded broker connection on");
            return;
        };
        let connection = Arc::clone(&self.connection);
        runtime.spawn(async move {
            match connection.close().await {
                Ok(()) => debug!("Closed discarded broker connection"),
                Err(err) => debug!(error = %err, "Ignoring discarded connection close failure"),
            }
        });
    }
}

/// Owns the single broker handle shared by every concurrent sender task.
///
/// Readers take a lock-free snapshot of the current handle. Only building a
/// new handle is serialized, so at most one connect sequence runs at a time
/// while publishes on an existing handle never wait on each other.
pub struct ConnectionManager {
    uri: String,
    binding: QueueBinding,
    connector: Arc<dyn Connector>,
    handle: ArcSwapOption<BrokerHandle>,
    build_lock: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(uri: &str, binding: QueueBinding, connector: Arc<dyn Connector>) -> Self {
        ConnectionManager {
            uri: uri.to_string(),
            binding,
            connector,
            handle: ArcSwapOption::empty(),
            build_lock: Mutex::new(()),
        }
    }

    pub fn binding(&self) -> &QueueBinding {
        &self.binding
    }

    pub fn is_connected(&self) -> bool {
        self.handle.load().is_some()
    }

    /// Returns the current handle, building it first if none exists.
    ///
    /// A failed build leaves no handle behind, so the next caller starts the
    /// whole sequence again.
    pub async fn ensure_connected(&self) -> Result<Arc<BrokerHandle>> {
        if let Some(handle) = self.handle.load_full() {
            return Ok(handle);
        }

        let _guard = self.build_lock.lock().await;
        if let Some(handle) = self.handle.load_full() {
            return Ok(handle);
        }

        let handle = Arc::new(self.build_handle().await?);
        self.handle.store(Some(Arc::clone(&handle)));
        Ok(handle)
    }

    /// Discards the current handle so the next `ensure_connected` rebuilds it.
    ///
    /// Other tasks may still be publishing on a snapshot of the old handle;
    /// its connection is closed in the background once they let go of it.
    pub fn invalidate(&self) {
        if let Some(stale) = self.handle.swap(None) {
            stale.retire();
            debug!(queue = %self.binding.queue, "Discarded broker handle");
        }
    }

    /// Unbinds the queue and closes channel and connection, ignoring failures.
    ///
    /// The handle is kept in place, so calling this again repeats the
    /// teardown against the already closed handle.
    pub async fn shutdown(&self) {
        let Some(handle) = self.handle.load_full() else {
            debug!("No broker handle to tear down");
            return;
        };

        info!(
            exchange = %self.binding.exchange,
            queue = %self.binding.queue,
            "Tearing down broker connection"
        );

        if let Err(err) = handle
            .channel
            .unbind_queue(
                &self.binding.queue,
                &self.binding.exchange,
                &self.binding.routing_key,
            )
            .await
        {
            debug!(error = %err, "Ignoring queue unbind failure");
        }
        if let Err(err) = handle.channel.close().await {
            debug!(error = %err, "Ignoring channel close failure");
        }
        if let Err(err) = handle.connection.close().await {
            debug!(error = %err, "Ignoring connection close failure");
        }
    }

    async fn build_handle(&self) -> Result<BrokerHandle> {
        info!(
            exchange = %self.binding.exchange,
            queue = %self.binding.queue,
            "Connecting to RabbitMQ"
        );
        let connection = self.connector.connect(&self.uri).await?;

        match self.open_bound_channel(connection.as_ref()).await {
            Ok(channel) => {
                info!(queue = %self.binding.queue, "Broker channel ready");
                Ok(BrokerHandle {
                    connection: Arc::from(connection),
                    channel,
                    retired: AtomicBool::new(false),
                })
            }
            Err(err) => {
                warn!(error = %err, "Channel setup failed, closing connection");
                if let Err(close_err) = connection.close().await {
                    debug!(error = %close_err, "Ignoring connection close failure");
                }
                Err(err)
            }
        }
    }

    async fn open_bound_channel(
        &self,
        connection: &dyn BrokerConnection,
    ) -> Result<Box<dyn BrokerChannel>> {
        let channel = connection.open_channel().await?;
        channel.enable_confirmation().await?;
        channel
            .bind_queue(
                &self.binding.queue,
                &self.binding.exchange,
                &self.binding.routing_key,
            )
            .await?;
        Ok(channel)
    }
}
