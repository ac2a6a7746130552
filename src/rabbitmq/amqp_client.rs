// src/rabbitmq/amqp_client.rs
//
// The broker surface the sender consumes. `LapinConnector` talks to a real
// RabbitMQ; tests plug in scripted implementations of the same traits.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueBindOptions},
    publisher_confirm::{Confirmation, PublisherConfirm},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::debug;

use super::errors::{BrokerError, Result};

/// Reply code sent with a graceful channel or connection close.
const REPLY_SUCCESS: u16 = 200;

/// AMQP properties attached to every published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishProperties {
    pub content_type: String,
    pub content_encoding: String,
    pub message_id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl From<&PublishProperties> for BasicProperties {
    fn from(properties: &PublishProperties) -> Self {
        BasicProperties::default()
            .with_content_type(properties.content_type.clone().into())
            .with_content_encoding(properties.content_encoding.clone().into())
            .with_message_id(properties.message_id.clone().into())
            .with_timestamp(properties.timestamp)
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Box<dyn BrokerConnection>>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Switches the channel into publisher-confirm mode.
    async fn enable_confirmation(&self) -> Result<()>;

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Publishes `payload` and returns the pending broker confirmation for it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        payload: &[u8],
    ) -> Result<Box<dyn PendingConfirmation>>;

    async fn unbind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PendingConfirmation: Send {
    /// Blocks until the broker acks or nacks the publish. There is no timeout.
    async fn wait_for_confirmation(self: Box<Self>) -> Result<()>;
}

/// Connects to RabbitMQ through lapin.
#[derive(Debug, Default, Clone, Copy)]
pub struct LapinConnector;

#[async_trait]
impl Connector for LapinConnector {
    async fn connect(&self, uri: &str) -> Result<Box<dyn BrokerConnection>> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        debug!("Successfully connected to RabbitMQ");
        Ok(Box::new(LapinConnection(connection)))
    }
}

struct LapinConnection(Connection);

#[async_trait]
impl BrokerConnection for LapinConnection {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        let channel = self.0.create_channel().await?;
        debug!(channel_id = channel.id(), "Created channel");
        Ok(Box::new(LapinChannel(channel)))
    }

    async fn close(&self) -> Result<()> {
        self.0.close(REPLY_SUCCESS, "GELF sender closing").await?;
        Ok(())
    }
}

struct LapinChannel(Channel);

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn enable_confirmation(&self) -> Result<()> {
        self.0.confirm_select(ConfirmSelectOptions::default()).await?;
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.0
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        payload: &[u8],
    ) -> Result<Box<dyn PendingConfirmation>> {
        let confirm = self
            .0
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties.into(),
            )
            .await?;
        Ok(Box::new(LapinConfirmation(confirm)))
    }

    async fn unbind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.0
            .queue_unbind(queue, exchange, routing_key, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.0.close(REPLY_SUCCESS, "GELF sender closing").await?;
        Ok(())
    }
}

struct LapinConfirmation(PublisherConfirm);

#[async_trait]
impl PendingConfirmation for LapinConfirmation {
    async fn wait_for_confirmation(self: Box<Self>) -> Result<()> {
        let LapinConfirmation(confirm) = *self;
        match confirm.await? {
            Confirmation::Nack(_) => Err(BrokerError::Nacked),
            _ => Ok(()),
        }
    }
}
