// src/rabbitmq/errors.rs

use lapin::Error as LapinError;
use thiserror::Error;

/// Failures reported by the broker client.
///
/// The sender never inspects the variant: every one of them invalidates the
/// current connection and counts as a spent attempt.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] LapinError),

    #[error("publish was negatively acknowledged by the broker")]
    Nacked,

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

// Custom Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

impl From<String> for BrokerError {
    fn from(message: String) -> Self {
        BrokerError::Unavailable(message)
    }
}

impl From<&str> for BrokerError {
    fn from(message: &str) -> Self {
        BrokerError::Unavailable(message.to_string())
    }
}
