//! Example: Classifying outcomes and errors from a login run.
//!
//! This example demonstrates how to act on the terminal outcome of a run and
//! how to classify errors by category, retryability, and fatality.
//!
//! # Usage
//!
//! ```bash
//! export LOGIN_URL="https://example.com/login"
//! export SITE_USERNAME="your-username"
//! export SITE_PASSWORD="your-password"
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example error_handling
//! ```

use login_sync::{Error, LoginConfig, LoginOrchestrator, LoginOutcome, MailboxConfig, RetryPolicy};
use std::env;
use std::time::Duration;

/// Map the run's terminal state to a process exit code.
fn exit_code_for(outcome: &LoginOutcome) -> i32 {
    match outcome {
        LoginOutcome::Success => 0,
        // Rate limiting resolves by itself; a scheduler can simply rerun later
        LoginOutcome::RateLimited { .. } => 2,
        LoginOutcome::VerificationTimeout => 3,
        // Rejected credentials need a human - rerunning risks a lockout
        LoginOutcome::CredentialRejected => 4,
        LoginOutcome::TransientFailure => 5,
    }
}

fn explain_error(error: &Error) {
    eprintln!("  Error: {}", error);
    eprintln!("  Category: {}", error.category());
    eprintln!("  Retryable: {}", error.is_retryable());
    eprintln!("  Fatal: {}", error.is_fatal());

    // Walk the source chain for the underlying cause
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

#[tokio::main]
async fn main() {
    let login_url = env::var("LOGIN_URL").expect("LOGIN_URL environment variable required");
    let username = env::var("SITE_USERNAME").expect("SITE_USERNAME environment variable required");
    let password = env::var("SITE_PASSWORD").expect("SITE_PASSWORD environment variable required");
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let mail_password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    println!("Login Sync - Error Handling Example\n");
    println!("====================================\n");

    // Configuration errors are NOT retryable - fix the inputs instead
    let mailbox = match MailboxConfig::builder()
        .email(&email)
        .password(mail_password)
        .build()
    {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Mailbox configuration error:");
            explain_error(&e);
            std::process::exit(1);
        }
    };

    let config = match LoginConfig::builder()
        .login_url(&login_url)
        .username(username)
        .password(password)
        .mailbox(mailbox)
        // Tighten the backoff schedule for this example
        .retry(RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
            jitter: Duration::from_millis(500),
            transient_retries: 1,
        })
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error:");
            explain_error(&e);
            std::process::exit(1);
        }
    };

    let mut orchestrator = match LoginOrchestrator::launch(config).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Browser launch failed:");
            explain_error(&e);
            std::process::exit(1);
        }
    };

    // run() folds terminal errors into the outcome; only cancellation and
    // mailbox auth failures surface as Err
    match orchestrator.run().await {
        Ok(outcome) => {
            println!("Run finished: {}", outcome);
            match outcome {
                LoginOutcome::Success => println!("Logged in successfully!"),
                LoginOutcome::RateLimited { retry_after } => {
                    println!("Rate limited through the whole attempt budget.");
                    if let Some(d) = retry_after {
                        println!("The site asked to retry after {:?}.", d);
                    }
                }
                LoginOutcome::VerificationTimeout => {
                    println!("No verification code arrived - check the mailbox and patterns.");
                }
                LoginOutcome::CredentialRejected => {
                    println!("Credentials rejected - NOT retrying (lockout risk).");
                }
                LoginOutcome::TransientFailure => {
                    println!("Transient failure - rerunning later may succeed.");
                }
            }
            std::process::exit(exit_code_for(&outcome));
        }
        Err(e) => {
            eprintln!("Run did not complete:");
            explain_error(&e);
            std::process::exit(1);
        }
    }
}
