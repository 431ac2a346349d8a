//! Basic example: Run a full automated login with email verification.
//!
//! This example demonstrates the most common use case - launching a browser,
//! submitting credentials, and completing the emailed verification code
//! exchange when the site asks for one.
//!
//! # Usage
//!
//! ```bash
//! export LOGIN_URL="https://example.com/login"
//! export SITE_USERNAME="your-username"
//! export SITE_PASSWORD="your-password"
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example basic_login
//! ```
//!
//! For Gmail, you'll need to use an [App Password](https://support.google.com/accounts/answer/185833).

use login_sync::{LoginConfig, LoginOrchestrator, MailboxConfig};
use std::env;

#[tokio::main]
async fn main() -> login_sync::Result<()> {
    // Read credentials from environment
    let login_url = env::var("LOGIN_URL").expect("LOGIN_URL environment variable required");
    let username = env::var("SITE_USERNAME").expect("SITE_USERNAME environment variable required");
    let password = env::var("SITE_PASSWORD").expect("SITE_PASSWORD environment variable required");
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let mail_password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    println!("Configuring login run for {}...", login_url);

    // Build configuration - IMAP host is auto-discovered from email domain
    let mailbox = MailboxConfig::builder()
        .email(&email)
        .password(mail_password)
        .build()?;

    let config = LoginConfig::builder()
        .login_url(&login_url)
        .username(username)
        .password(password)
        .mailbox(mailbox)
        .build()?;

    // Launch the browser and run the login to a terminal outcome
    println!("Launching browser...");
    let mut orchestrator = LoginOrchestrator::launch(config).await?;

    let outcome = orchestrator.run().await?;

    println!("Login finished: {}", outcome);
    if outcome.is_success() {
        println!("Logged in successfully!");
    }

    Ok(())
}
