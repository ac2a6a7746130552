use anyhow::{Context, Result};
use dotenv::dotenv;
use std::env;

use crate::config::{default_max_retries, SenderConfig};

pub const AMQP_ADDR: &str = "AMQP_ADDR";
pub const GELF_EXCHANGE: &str = "GELF_EXCHANGE";
pub const GELF_QUEUE: &str = "GELF_QUEUE";
pub const GELF_ROUTING_KEY: &str = "GELF_ROUTING_KEY";
pub const GELF_MAX_RETRIES: &str = "GELF_MAX_RETRIES";

impl SenderConfig {
    /// Reads `.env` if present, then the environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let config = SenderConfig {
            uri: env::var(AMQP_ADDR).with_context(|| format!("{AMQP_ADDR} is not set"))?,
            exchange_name: env::var(GELF_EXCHANGE)
                .with_context(|| format!("{GELF_EXCHANGE} is not set"))?,
            queue_name: env::var(GELF_QUEUE).ok(),
            routing_key: env::var(GELF_ROUTING_KEY).unwrap_or_default(),
            max_retries: match env::var(GELF_MAX_RETRIES) {
                Ok(val) => val
                    .parse::<i32>()
                    .with_context(|| format!("{GELF_MAX_RETRIES} must be an integer, got {val:?}"))?,
                Err(_) => default_max_retries(),
            },
        };

        config.validate()?;
        Ok(config)
    }
}
