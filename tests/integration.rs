//! Integration tests for login-sync.
//!
//! These tests require a real IMAP server (and for the browser tests a local
//! Chromium install) and are disabled by default. To run them:
//!
//! ```bash
//! # Set environment variables
//! export LOGIN_SYNC_TEST_EMAIL="your@email.com"
//! export LOGIN_SYNC_TEST_PASSWORD="your-app-password"
//!
//! # Optional: proxy configuration
//! export LOGIN_SYNC_TEST_PROXY_HOST="proxy.example.com"
//! export LOGIN_SYNC_TEST_PROXY_PORT="1080"
//!
//! # Run with the integration-tests feature
//! cargo test --features integration-tests -- --ignored
//! ```

use chrono::Utc;
use login_sync::matcher::CodeMatcher;
use login_sync::pacing::{PacingEngine, PacingProfile};
use login_sync::{
    BrowserOptions, BrowserSession, Error, MailboxConfig, MailboxPoller, SiteMarkers,
    Socks5Proxy, VerificationRequest,
};
use std::env;
use std::time::Duration;
use tokio::sync::watch;

// ─────────────────────────────────────────────────────────────────────────────
// Test Configuration Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_credentials() -> Option<(String, String)> {
    dotenvy::dotenv().ok();
    let email = env::var("LOGIN_SYNC_TEST_EMAIL").ok()?;
    let password = env::var("LOGIN_SYNC_TEST_PASSWORD").ok()?;
    Some((email, password))
}

fn get_test_proxy() -> Option<Socks5Proxy> {
    let host = env::var("LOGIN_SYNC_TEST_PROXY_HOST").ok()?;
    let port: u16 = env::var("LOGIN_SYNC_TEST_PROXY_PORT").ok()?.parse().ok()?;

    let proxy = match (
        env::var("LOGIN_SYNC_TEST_PROXY_USER").ok(),
        env::var("LOGIN_SYNC_TEST_PROXY_PASS").ok(),
    ) {
        (Some(user), Some(pass)) => Socks5Proxy::with_auth(&host, port, user, pass),
        _ => Socks5Proxy::new(host, port),
    };

    Some(proxy)
}

fn get_test_mailbox() -> Option<MailboxConfig> {
    let (email, password) = get_test_credentials()?;

    let mut builder = MailboxConfig::builder()
        .email(email)
        .password(password)
        .poll_interval(Duration::from_secs(1));

    if let Some(proxy) = get_test_proxy() {
        builder = builder.proxy(proxy);
    }

    builder.build().ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Mailbox Poller Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_poller_times_out_without_matching_code() {
    let config = get_test_mailbox().expect("Test config from environment variables");
    let poller = MailboxPoller::new(config);

    // No email will ever match this sender, so the short deadline expires
    let request = VerificationRequest::new(Utc::now(), Duration::from_secs(5))
        .sender_pattern("nonexistent-sender-xyz.example");

    let (_cancel_tx, mut cancel_rx) = watch::channel(false);
    let result = poller
        .await_code(&request, &CodeMatcher::six_digit(), &mut cancel_rx)
        .await;

    let err = result.expect_err("deadline should expire");
    assert!(matches!(err, Error::VerificationTimeout { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
#[ignore = "requires real IMAP server and a freshly sent code email"]
async fn test_poller_extracts_live_code() {
    let config = get_test_mailbox().expect("Test config from environment variables");
    let poller = MailboxPoller::new(config);

    // Send yourself an email containing a 6-digit code within the deadline
    let request = VerificationRequest::new(Utc::now(), Duration::from_secs(120));

    let (_cancel_tx, mut cancel_rx) = watch::channel(false);
    let code = poller
        .await_code(&request, &CodeMatcher::six_digit(), &mut cancel_rx)
        .await
        .expect("code email should arrive");

    assert_eq!(code.as_str().len(), 6);
    assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_poller_cancellation() {
    let config = get_test_mailbox().expect("Test config from environment variables");
    let poller = MailboxPoller::new(config);

    let request = VerificationRequest::new(Utc::now(), Duration::from_secs(300))
        .sender_pattern("nonexistent-sender-xyz.example");

    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let _ = cancel_tx.send(true);
    });

    let result = poller
        .await_code(&request, &CodeMatcher::six_digit(), &mut cancel_rx)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Browser Session Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires a local Chromium install"]
async fn test_browser_start_and_close() {
    let pacing = PacingEngine::new(PacingProfile::fast());
    let mut session =
        BrowserSession::start(&BrowserOptions::default(), SiteMarkers::default(), pacing)
            .await
            .expect("browser should launch");

    // A blank page matches none of the markers
    let state = session.classify_page().await.expect("classify should run");
    assert_eq!(state, login_sync::PageState::Unknown);

    session.close().await.expect("close should succeed");
    // Idempotent
    session.close().await.expect("second close is a no-op");
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires intentionally wrong credentials"]
async fn test_invalid_mail_credentials_are_fatal() {
    let config = MailboxConfig::builder()
        .email("test@gmail.com")
        .password("wrong-password")
        .build()
        .expect("valid config structure");

    let poller = MailboxPoller::new(config);
    let request = VerificationRequest::new(Utc::now(), Duration::from_secs(30));

    let (_cancel_tx, mut cancel_rx) = watch::channel(false);
    let result = poller
        .await_code(&request, &CodeMatcher::six_digit(), &mut cancel_rx)
        .await;

    let err = result.expect_err("authentication should fail");
    assert!(matches!(err, Error::MailAuth { .. }));
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_invalid_email_format() {
    let result = MailboxConfig::builder()
        .email("not-an-email")
        .password("password")
        .build();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_required_fields() {
    // Missing email
    let result = MailboxConfig::builder().password("password").build();
    assert!(result.is_err());

    // Missing password
    let result = MailboxConfig::builder().email("test@example.com").build();
    assert!(result.is_err());
}
