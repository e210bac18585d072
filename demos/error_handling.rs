//! Example: Telling the outcomes of a wait apart.
//!
//! Validation errors come back as `Err`. Everything that happens after the
//! first network call (a match, a timeout, an unreachable service) comes back
//! as a `WaitResult`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example error_handling
//! ```

use std::time::Duration;
use webhook_sync::{ClientConfig, Error, ErrorCategory, WaitOptions, WaitResult, WebhookClient};

/// Describes an error the way an operator would want to read it.
fn explain(error: &Error) {
    println!("  Error: {error}");
    println!("  Category: {}", error.category());
    println!("  Retryable: {}", error.is_retryable());

    match error.category() {
        ErrorCategory::Validation => println!("  -> fix the input, retrying will not help"),
        ErrorCategory::Configuration => println!("  -> fix the client configuration"),
        ErrorCategory::Network | ErrorCategory::Timeout => {
            println!("  -> the service could not be reached, try again later");
        }
        ErrorCategory::Http => match error.status() {
            Some(404) => println!("  -> the token does not exist (or expired)"),
            Some(429) => println!("  -> rate limited, slow down polling"),
            Some(status) => println!("  -> service answered {status}"),
            None => {}
        },
        ErrorCategory::Decode | ErrorCategory::Parse => {
            println!("  -> the service sent something unexpected");
        }
    }
}

#[tokio::main]
async fn main() {
    println!("webhook-sync - Error Handling Example\n");
    println!("=====================================\n");

    // Configuration errors are NOT retryable
    println!("Plain http to a public host:");
    if let Err(e) = ClientConfig::builder().base_url("http://webhook.site").build() {
        explain(&e);
    }

    let client = match WebhookClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Validation happens before any network call
    println!("\nMalformed token:");
    if let Err(e) = client
        .wait_for_request("not-a-uuid", WaitOptions::new(Duration::from_secs(5)))
        .await
    {
        explain(&e);
    }

    println!("\nTimeout outside 1s..=600s:");
    if let Err(e) = client
        .wait_for_request(
            "550e8400-e29b-41d4-a716-446655440000",
            WaitOptions::new(Duration::from_secs(3600)),
        )
        .await
    {
        explain(&e);
    }

    // A token nobody created: the service answers 404 on every poll
    println!("\nUnknown token:");
    match client
        .wait_for_request(
            "550e8400-e29b-41d4-a716-446655440000",
            WaitOptions::new(Duration::from_secs(5)),
        )
        .await
    {
        Ok(WaitResult::TransportError { error, elapsed }) => {
            println!("  Gave up after {elapsed:.1?}");
            explain(&error);
        }
        Ok(WaitResult::TimedOut { elapsed }) => println!("  Nothing arrived within {elapsed:.1?}"),
        Ok(WaitResult::Matched { item, .. }) => println!("  Unexpected match: {}", item.id),
        Err(e) => explain(&e),
    }

    println!("\nDone!");
}
