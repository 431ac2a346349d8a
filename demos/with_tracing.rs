//! Example: Using tracing for observability.
//!
//! This example demonstrates how to enable structured logging using
//! the `tracing` ecosystem. All major operations in login-sync emit
//! tracing spans and events: browser lifecycle, form submission, IMAP
//! polling, and orchestrator state transitions.
//!
//! # Usage
//!
//! ```bash
//! export LOGIN_URL="https://example.com/login"
//! export SITE_USERNAME="your-username"
//! export SITE_PASSWORD="your-password"
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=login_sync=debug
//!
//! cargo run --example with_tracing
//! ```

use login_sync::{LoginConfig, LoginOrchestrator, MailboxConfig};
use std::env;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> login_sync::Result<()> {
    // Initialize tracing subscriber with environment filter
    // Use RUST_LOG environment variable to control log levels
    // Example: RUST_LOG=login_sync=debug,info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("login_sync=info")),
        )
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let login_url = env::var("LOGIN_URL").expect("LOGIN_URL environment variable required");
    let username = env::var("SITE_USERNAME").expect("SITE_USERNAME environment variable required");
    let password = env::var("SITE_PASSWORD").expect("SITE_PASSWORD environment variable required");
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let mail_password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    tracing::info!(url = %login_url, email = %email, "Starting login-sync example");

    let mailbox = MailboxConfig::builder()
        .email(&email)
        .password(mail_password)
        .poll_interval(Duration::from_secs(5))
        .build()?;

    let config = LoginConfig::builder()
        .login_url(&login_url)
        .username(username)
        .password(password)
        .mailbox(mailbox)
        .verification_deadline(Duration::from_secs(300))
        .build()?;

    tracing::debug!("Configuration built successfully");

    // Run - this emits spans for browser startup, navigation, form
    // submission, mailbox polling, and every state transition
    let mut orchestrator = LoginOrchestrator::launch(config).await?;
    let outcome = orchestrator.run().await?;

    tracing::info!(%outcome, "Run finished");
    println!("\nLogin finished: {}", outcome);

    Ok(())
}
