use anyhow::{Context, Result};
use gelf_amqp::{config, GelfAmqpSender, GelfMessage, GelfSender, SendOutcome, SenderConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let sender_config = match config::load_config() {
        Ok(config) => config,
        Err(err) => {
            info!("No usable config file ({err}), reading the environment");
            SenderConfig::load().context("Failed to load sender configuration")?
        }
    };

    let sender = Arc::new(GelfAmqpSender::new(sender_config)?);

    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let startup = GelfMessage::new(&host, "gelf-amqp", "GELF AMQP sender started")
        .with_level(6)
        .with_field("pid", std::process::id());

    match sender.send_message(&startup).await {
        SendOutcome::Ok => info!("Published startup message"),
        SendOutcome::Rejected => warn!("Startup message rejected"),
        SendOutcome::Failed(err) => error!("Failed to publish startup message: {err}"),
    }

    info!("Sender running. Press Ctrl+C to exit.");
    tokio::signal::ctrl_c().await?;

    sender.close().await;
    Ok(())
}
