// src/rabbitmq/mod.rs
// RabbitMQ side of the sender: broker client seam, connection lifecycle, errors

pub mod amqp_client;
pub mod connection;
pub mod errors;

// Re-export specific items to simplify imports elsewhere
pub use amqp_client::{
    BrokerChannel, BrokerConnection, Connector, LapinConnector, PendingConfirmation,
    PublishProperties,
};
pub use connection::{BrokerHandle, ConnectionManager, QueueBinding};
pub use errors::{BrokerError, Result};
