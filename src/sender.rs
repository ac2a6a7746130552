// src/sender.rs

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SenderConfig;
use crate::errors::SenderError;
use crate::message::{DeliveryId, GelfMessage};
use crate::rabbitmq::{
    ConnectionManager, Connector, LapinConnector, PublishProperties, QueueBinding,
};

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const CONTENT_ENCODING: &str = "gzip";

/// Result of handing one message to a sender.
#[derive(Debug)]
pub enum SendOutcome {
    /// The broker confirmed the message.
    Ok,
    /// Shutdown was in progress or the message was invalid. No attempt was made.
    Rejected,
    /// Every allowed attempt failed; carries `SenderError::ExhaustedRetries`.
    Failed(SenderError),
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SendOutcome::Ok)
    }

    pub fn into_result(self) -> Result<(), SenderError> {
        match self {
            SendOutcome::Ok => Ok(()),
            SendOutcome::Rejected => Err(SenderError::RejectedInput),
            SendOutcome::Failed(err) => Err(err),
        }
    }
}

#[async_trait]
pub trait GelfSender: Send + Sync {
    async fn send_message(&self, message: &GelfMessage) -> SendOutcome;

    async fn close(&self);
}

/// Publishes GELF messages to a single RabbitMQ queue with publisher confirms.
///
/// One instance is meant to be shared (e.g. behind an `Arc`) by every task
/// that logs. The connection is opened on the first send and rebuilt after
/// any failure. Once closed, the sender rejects everything.
///
/// With a negative `max_retries` a send keeps retrying until the broker
/// accepts the message. Neither connect nor the confirmation wait has a
/// timeout, so during a sustained outage such a send never returns.
pub struct GelfAmqpSender {
    connections: ConnectionManager,
    max_retries: i32,
    shutdown: AtomicBool,
}

impl GelfAmqpSender {
    pub fn new(config: SenderConfig) -> Result<Self, SenderError> {
        Self::with_connector(config, Arc::new(LapinConnector))
    }

    pub fn with_connector(
        config: SenderConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SenderError> {
        config
            .uri
            .parse::<lapin::uri::AMQPUri>()
            .map_err(SenderError::InvalidUri)?;

        let binding = QueueBinding {
            queue: config.queue_name().to_string(),
            exchange: config.exchange_name.clone(),
            routing_key: config.routing_key.clone(),
        };
        debug!(
            exchange = %binding.exchange,
            queue = %binding.queue,
            routing_key = %binding.routing_key,
            max_retries = config.max_retries,
            "Creating GELF AMQP sender"
        );

        Ok(GelfAmqpSender {
            connections: ConnectionManager::new(&config.uri, binding, connector),
            max_retries: config.max_retries,
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    pub fn queue_name(&self) -> &str {
        &self.connections.binding().queue
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub async fn send(&self, message: &GelfMessage) -> SendOutcome {
        if self.is_shut_down() || !message.is_valid() {
            return SendOutcome::Rejected;
        }

        let delivery_id = DeliveryId::for_message(message);
        let mut attempts: u64 = 0;

        loop {
            match self.attempt(message, &delivery_id).await {
                Ok(()) => {
                    debug!(message_id = %delivery_id, attempts = attempts + 1, "Message confirmed");
                    return SendOutcome::Ok;
                }
                Err(err) => {
                    self.connections.invalidate();
                    attempts += 1;

                    if !self.may_retry(attempts) {
                        error!(
                            message_id = %delivery_id,
                            attempts,
                            error = %err,
                            "Giving up on message"
                        );
                        return SendOutcome::Failed(SenderError::ExhaustedRetries {
                            attempts,
                            last: Box::new(err),
                        });
                    }

                    warn!(
                        message_id = %delivery_id,
                        attempt = attempts,
                        error = %err,
                        "Delivery attempt failed, reconnecting"
                    );
                }
            }
        }
    }

    /// Stops accepting messages, then tears the broker connection down.
    ///
    /// A send already past its shutdown check keeps running.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        info!(queue = %self.queue_name(), "Closing GELF AMQP sender");
        self.connections.shutdown().await;
    }

    fn may_retry(&self, attempts: u64) -> bool {
        retry_allowed(self.max_retries, attempts)
    }

    async fn attempt(
        &self,
        message: &GelfMessage,
        delivery_id: &DeliveryId,
    ) -> Result<(), SenderError> {
        let handle = self
            .connections
            .ensure_connected()
            .await
            .map_err(SenderError::Connection)?;

        let payload = message.to_amqp_buffer()?;
        let properties = PublishProperties {
            content_type: CONTENT_TYPE.to_string(),
            content_encoding: CONTENT_ENCODING.to_string(),
            message_id: delivery_id.to_string(),
            timestamp: message.amqp_timestamp(),
        };

        handle
            .channel()
            .publish("", self.queue_name(), &properties, &payload)
            .await
            .map_err(SenderError::Delivery)?
            .wait_for_confirmation()
            .await
            .map_err(SenderError::Delivery)
    }
}

#[async_trait]
impl GelfSender for GelfAmqpSender {
    async fn send_message(&self, message: &GelfMessage) -> SendOutcome {
        self.send(message).await
    }

    async fn close(&self) {
        GelfAmqpSender::close(self).await
    }
}

/// Whether another attempt follows `attempts` failed ones. Negative
/// `max_retries` never stops.
fn retry_allowed(max_retries: i32, attempts: u64) -> bool {
    max_retries < 0 || attempts <= max_retries as u64
}
