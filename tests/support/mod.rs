// In-memory broker whose failures are scripted per test.
#![allow(dead_code)]

use async_trait::async_trait;
use gelf_amqp::rabbitmq::{
    BrokerChannel, BrokerConnection, BrokerError, Connector, PendingConfirmation,
    PublishProperties, Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ALWAYS: usize = usize::MAX;

#[derive(Default)]
pub struct BrokerScript {
    pub connect_delay: Duration,
    pub fail_connects: AtomicUsize,
    pub fail_channel_opens: AtomicUsize,
    pub fail_confirm_selects: AtomicUsize,
    pub fail_binds: AtomicUsize,
    pub fail_publishes: AtomicUsize,
    pub nack_confirms: AtomicUsize,
    pub fail_teardown: AtomicBool,

    pub connects: AtomicUsize,
    pub channels_opened: AtomicUsize,
    pub confirm_selects: AtomicUsize,
    pub binds: AtomicUsize,
    pub publishes: AtomicUsize,
    pub unbinds: AtomicUsize,
    pub channel_closes: AtomicUsize,
    pub connection_closes: AtomicUsize,
    pub published: Mutex<Vec<(String, String, PublishProperties)>>,
}

impl BrokerScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn failing_publishes(self, count: usize) -> Self {
        self.fail_publishes.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_connects(self, count: usize) -> Self {
        self.fail_connects.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_channel_opens(self, count: usize) -> Self {
        self.fail_channel_opens.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_confirm_selects(self, count: usize) -> Self {
        self.fail_confirm_selects.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_binds(self, count: usize) -> Self {
        self.fail_binds.store(count, Ordering::SeqCst);
        self
    }

    pub fn nacking(self, count: usize) -> Self {
        self.nack_confirms.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_teardown(self) -> Self {
        self.fail_teardown.store(true, Ordering::SeqCst);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Waits for background work (closing discarded connections) to bring
    /// `counter` to `expected`, giving up after a second.
    pub async fn settle(counter: &AtomicUsize, expected: usize) -> usize {
        for _ in 0..200 {
            if Self::count(counter) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Self::count(counter)
    }

    /// Total broker calls of any kind.
    pub fn calls(&self) -> usize {
        [
            &self.connects,
            &self.channels_opened,
            &self.confirm_selects,
            &self.binds,
            &self.publishes,
            &self.unbinds,
            &self.channel_closes,
            &self.connection_closes,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, properties)| properties.message_id.clone())
            .collect()
    }

    fn teardown_result(&self, what: &str) -> Result<()> {
        if self.fail_teardown.load(Ordering::SeqCst) {
            Err(format!("{what} failed").into())
        } else {
            Ok(())
        }
    }
}

/// Consumes one scripted failure, if any are left.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub struct ScriptedConnector {
    pub script: Arc<BrokerScript>,
}

impl ScriptedConnector {
    pub fn new(script: BrokerScript) -> (Arc<Self>, Arc<BrokerScript>) {
        let script = Arc::new(script);
        (
            Arc::new(ScriptedConnector {
                script: Arc::clone(&script),
            }),
            script,
        )
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _uri: &str) -> Result<Box<dyn BrokerConnection>> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        if !self.script.connect_delay.is_zero() {
            tokio::time::sleep(self.script.connect_delay).await;
        }
        if take_failure(&self.script.fail_connects) {
            return Err("connection refused".into());
        }
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<BrokerScript>,
}

#[async_trait]
impl BrokerConnection for ScriptedConnection {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        self.script.channels_opened.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.script.fail_channel_opens) {
            return Err("channel limit reached".into());
        }
        Ok(Box::new(ScriptedChannel {
            script: Arc::clone(&self.script),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.script.connection_closes.fetch_add(1, Ordering::SeqCst);
        self.script.teardown_result("connection close")
    }
}

struct ScriptedChannel {
    script: Arc<BrokerScript>,
}

#[async_trait]
impl BrokerChannel for ScriptedChannel {
    async fn enable_confirmation(&self) -> Result<()> {
        self.script.confirm_selects.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.script.fail_confirm_selects) {
            return Err("confirm.select refused".into());
        }
        Ok(())
    }

    async fn bind_queue(&self, _queue: &str, _exchange: &str, _routing_key: &str) -> Result<()> {
        self.script.binds.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.script.fail_binds) {
            return Err("queue not found".into());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        _payload: &[u8],
    ) -> Result<Box<dyn PendingConfirmation>> {
        self.script.publishes.fetch_add(1, Ordering::SeqCst);
        self.script.published.lock().unwrap().push((
            exchange.to_string(),
            routing_key.to_string(),
            properties.clone(),
        ));
        if take_failure(&self.script.fail_publishes) {
            return Err("channel closed".into());
        }
        Ok(Box::new(ScriptedConfirmation {
            nack: take_failure(&self.script.nack_confirms),
        }))
    }

    async fn unbind_queue(&self, _queue: &str, _exchange: &str, _routing_key: &str) -> Result<()> {
        self.script.unbinds.fetch_add(1, Ordering::SeqCst);
        self.script.teardown_result("queue unbind")
    }

    async fn close(&self) -> Result<()> {
        self.script.channel_closes.fetch_add(1, Ordering::SeqCst);
        self.script.teardown_result("channel close")
    }
}

struct ScriptedConfirmation {
    nack: bool,
}

#[async_trait]
impl PendingConfirmation for ScriptedConfirmation {
    async fn wait_for_confirmation(self: Box<Self>) -> Result<()> {
        if self.nack {
            Err(BrokerError::Nacked)
        } else {
            Ok(())
        }
    }
}
