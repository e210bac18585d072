//! Example: Wait for an email and print the links in it.
//!
//! Useful for sign-up flows: register with the printed address, then let the
//! example pick up the verification link.
//!
//! # Usage
//!
//! ```bash
//! # Reuse an existing token, or leave unset to create one
//! export WEBHOOK_TOKEN="550e8400-e29b-41d4-a716-446655440000"
//!
//! cargo run --example wait_for_email
//! ```

use std::env;
use webhook_sync::{TokenSettings, WaitResult, WebhookClient};

#[tokio::main]
async fn main() -> webhook_sync::Result<()> {
    let client = WebhookClient::from_env()?;

    let token = match env::var("WEBHOOK_TOKEN") {
        Ok(token) => token,
        Err(_) => client.create_token(&TokenSettings::new()).await?.uuid.to_string(),
    };

    println!("Send an email to {token}@email.webhook.site");

    let options = client.email_wait_options();
    println!("Waiting up to {:?}...", options.timeout());

    match client.wait_for_email(&token, options).await? {
        WaitResult::Matched { item, elapsed } => {
            println!("\nReceived after {elapsed:.1?}");
            println!("Subject: {}", item.subject.as_deref().unwrap_or("(none)"));
            println!("From:    {}", item.from.as_deref().unwrap_or("(none)"));

            if item.links.is_empty() {
                println!("No links found");
            }
            for link in &item.links {
                let marker = if item.auth_links.contains(link) { "*" } else { " " };
                println!(" {marker} {link}");
            }
        }
        WaitResult::TimedOut { elapsed } => println!("No email within {elapsed:.0?}"),
        WaitResult::TransportError { error, .. } => {
            eprintln!("Service unreachable ({}): {error}", error.category());
        }
    }

    Ok(())
}
