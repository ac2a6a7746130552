//! Reliable GELF publisher for a single RabbitMQ queue.
//!
//! Messages are gzip-compressed GELF JSON published with publisher confirms.
//! The broker connection is opened lazily, shared by all callers, and rebuilt
//! after any failure; each send is retried up to a configured bound.

pub mod config;
pub mod env;
pub mod errors;
pub mod message;
pub mod rabbitmq;
pub mod sender;

pub use config::SenderConfig;
pub use errors::{MessageError, SenderError};
pub use message::{DeliveryId, GelfMessage};
pub use sender::{GelfAmqpSender, GelfSender, SendOutcome};
