//! Example: Create a token and wait for a request to reach it.
//!
//! # Usage
//!
//! ```bash
//! # Optional: account key for premium features
//! export WEBHOOK_SITE_API_KEY="your-api-key"
//!
//! cargo run --example create_and_wait
//! ```
//!
//! While the example waits, send anything to the printed URL, e.g.
//! `curl -X POST -d 'hello' <url>`.

use std::time::Duration;
use webhook_sync::{TokenSettings, WaitOptions, WaitReport, WebhookClient};

#[tokio::main]
async fn main() -> webhook_sync::Result<()> {
    let client = WebhookClient::from_env()?;

    let token = client
        .create_token(
            &TokenSettings::new()
                .default_status(200)
                .default_content("{\"ok\":true}")
                .default_content_type("application/json"),
        )
        .await?;

    let addresses = client.addresses(&token.uuid, None);
    println!("Token:     {}", token.uuid);
    println!("URL:       {}", addresses.url);
    println!("Subdomain: {}", addresses.subdomain_url);
    println!("Email:     {}", addresses.email);
    println!("DNS:       {}", addresses.dns);
    println!("\nWaiting up to 60 seconds for a request...");

    let options = WaitOptions::new(Duration::from_secs(60)).interval(Duration::from_secs(1));
    let result = client.wait_for_request(&token.uuid, options).await?;

    println!("{}", WaitReport::from_request(&result));

    client.delete_token(&token.uuid).await?;
    Ok(())
}
