//! Example: Using tracing for observability.
//!
//! This example demonstrates how to enable structured logging using
//! the `tracing` ecosystem. All major operations in webhook-sync emit
//! tracing spans and events.
//!
//! # Usage
//!
//! ```bash
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=webhook_sync=debug
//!
//! cargo run --example with_tracing
//! ```

use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use webhook_sync::{ClientConfig, ItemKind, TokenSettings, WaitOptions, WaitResult, WebhookClient};

#[tokio::main]
async fn main() -> webhook_sync::Result<()> {
    // Use RUST_LOG environment variable to control log levels
    // Example: RUST_LOG=webhook_sync=debug,info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("webhook_sync=debug")),
        )
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Starting webhook-sync example");

    let config = ClientConfig::builder()
        .poll_interval(Duration::from_secs(2))
        .max_retries(2)
        .build()?;

    // Emits the WebhookClient::new span
    let client = WebhookClient::new(config)?;

    // Emits api::create_token and Transport::call spans
    let token = client.create_token(&TokenSettings::new()).await?;
    tracing::info!(token = %token.uuid, "Token created, waiting for a POST");

    // Emits waiter and poller spans plus one Transport::call per poll
    let options = WaitOptions::new(Duration::from_secs(20)).kind(ItemKind::Web);
    match client.wait_for_request(&token.uuid, options).await? {
        WaitResult::Matched { item, elapsed } => {
            tracing::info!(item_id = %item.id, elapsed_ms = elapsed.as_millis(), "Request received");
        }
        WaitResult::TimedOut { .. } => tracing::info!("Nothing arrived"),
        WaitResult::TransportError { error, .. } => {
            tracing::warn!(error = %error, "Service unreachable");
        }
    }

    client.delete_token(&token.uuid).await?;

    tracing::info!("Example completed successfully");

    Ok(())
}
