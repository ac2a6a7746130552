// src/errors.rs

use std::io;
use thiserror::Error;

use crate::rabbitmq::BrokerError;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message compression error: {0}")]
    Compression(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SenderError {
    /// The sender is shutting down or the message failed validation. Nothing
    /// was sent.
    #[error("message rejected: sender is shutting down or message is not valid")]
    RejectedInput,

    #[error("invalid AMQP URI: {0}")]
    InvalidUri(String),

    #[error("broker connection error: {0}")]
    Connection(#[source] BrokerError),

    #[error("broker delivery error: {0}")]
    Delivery(#[source] BrokerError),

    #[error("message encoding error: {0}")]
    Message(#[from] MessageError),

    #[error("delivery failed after {attempts} attempt(s): {last}")]
    ExhaustedRetries {
        attempts: u64,
        #[source]
        last: Box<SenderError>,
    },
}

impl SenderError {
    /// The error that ended the final attempt, or `self` for single errors.
    pub fn last_cause(&self) -> &SenderError {
        match self {
            SenderError::ExhaustedRetries { last, .. } => last,
            other => other,
        }
    }
}
