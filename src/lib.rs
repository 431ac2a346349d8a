//! # login-sync
//!
//! Automated login for sites that gate sign-in behind an emailed one-time
//! verification code.
//!
//! A login run drives a real Chromium instance through the site's login form,
//! waits for the site to email a verification code, retrieves it from an IMAP
//! mailbox, and enters it, with humanized interaction pacing and browser
//! anti-fingerprinting throughout. This crate provides:
//! - A stealth-instrumented browser session driver (CDP via `chromiumoxide`)
//! - An IMAP mailbox poller that extracts codes using pattern matching
//!   (with optional SOCKS5 proxy support)
//! - A behavioral pacing engine with randomized, human-plausible delays
//! - An orchestrator tying it all together with backoff, retry budgets,
//!   and cooperative cancellation
//!
//! ## Features
//!
//! - **`observability`**: Enables OpenTelemetry integration for distributed tracing.
//!   Without this feature, tracing spans are still emitted but require no OTEL dependencies.
//! - **`integration-tests`**: Enables live tests against a real site and mailbox.
//!
//! ## Quick Start
//!
//! ```no_run
//! use login_sync::{LoginConfig, LoginOrchestrator, MailboxConfig};
//!
//! # async fn example() -> login_sync::Result<()> {
//! // Configure the run
//! let mailbox = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")  // Use app-specific password for Gmail
//!     .build()?;
//!
//! let config = LoginConfig::builder()
//!     .login_url("https://example.com/login")
//!     .username("alice")
//!     .password("hunter2")
//!     .mailbox(mailbox)
//!     .build()?;
//!
//! // Launch the browser and run the login to a terminal outcome
//! let mut orchestrator = LoginOrchestrator::launch(config).await?;
//! let outcome = orchestrator.run().await?;
//! println!("login finished: {outcome}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Using a SOCKS5 Proxy
//!
//! The mailbox connection and the browser take separate proxy settings:
//!
//! ```no_run
//! use login_sync::{LoginConfig, MailboxConfig, Socks5Proxy};
//!
//! # fn example() -> login_sync::Result<()> {
//! let mailbox = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")
//!     .proxy(Socks5Proxy::with_auth("proxy.example.com", 1080, "user", "pass"))
//!     .build()?;
//!
//! let config = LoginConfig::builder()
//!     .login_url("https://example.com/login")
//!     .username("alice")
//!     .password("hunter2")
//!     .mailbox(mailbox)
//!     .browser_proxy("socks5://proxy.example.com:1080")
//!     .build()?;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Code Matching
//!
//! ```
//! use login_sync::matcher::{CodeMatcher, Matcher, RegexMatcher};
//!
//! // The common N-digit numeric codes
//! let otp = CodeMatcher::six_digit();
//! assert_eq!(otp.find_match("Your code is 483920.").as_deref(), Some("483920"));
//!
//! // Anything else via a regex with one capture group
//! let matcher = RegexMatcher::new(r"token=([a-f0-9]{32})").unwrap();
//! ```
//!
//! ## Cancellation
//!
//! A run can be stopped from another task; the browser session is closed on
//! every exit path:
//!
//! ```no_run
//! # async fn example(mut orchestrator: login_sync::LoginOrchestrator<
//! #     login_sync::browser::BrowserSession,
//! #     login_sync::MailboxCodeSource,
//! # >) -> login_sync::Result<()> {
//! let handle = orchestrator.cancel_handle();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     handle.cancel();
//! });
//! let outcome = orchestrator.run().await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use
//! [`Error::is_retryable`] and [`Error::is_fatal`] to classify failures:
//!
//! ```
//! use login_sync::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_fatal() {
//!         println!("Terminal error, do not retry: {}", error);
//!     } else if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. All major operations emit spans with
//! structured fields suitable for distributed tracing.
//!
//! ### Span Naming Convention
//!
//! - `orchestrator::run` - One login run
//! - `browser::start` / `browser::close` - Browser session lifecycle
//! - `browser::submit_credentials` - Credential form submission
//! - `MailboxPoller::await_code` - Waiting for the code email
//! - `mail::session::authenticate` - IMAP authentication
//! - `mail::connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `url` - Login page URL
//! - `email` - Mailbox address
//! - `imap_host` - IMAP server hostname
//! - `proxy_enabled` - Whether proxy is used
//! - `matcher` - Matcher description
//!
//! Enable the `observability` feature for OpenTelemetry integration.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod browser;
pub mod config;
pub mod error;
pub mod known_servers;
pub mod mail;
pub mod matcher;
pub mod orchestrator;
pub mod outcome;
pub mod pacing;
pub mod proxy;

// Internal modules
mod util;

// Re-exports for ergonomic API
pub use browser::{BrowserSession, PageState, SiteMarkers};
pub use config::{
    BrowserOptions, LoginConfig, LoginConfigBuilder, MailboxConfig, MailboxConfigBuilder,
    PollingConfig, RetryPolicy, SiteCredentials, TimeoutConfig, VerificationSettings,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use known_servers::ServerRegistry;
pub use mail::{MailboxPoller, VerificationCode, VerificationRequest};
pub use orchestrator::{CancelHandle, LoginOrchestrator, LoginState, MailboxCodeSource};
pub use outcome::LoginOutcome;
pub use pacing::{PacingEngine, PacingProfile};
pub use proxy::{ProxyAuth, Socks5Proxy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        // Ensure all public types are accessible
        let _ = LoginConfig::builder();
        let _ = MailboxConfig::builder();
        let _ = Socks5Proxy::new("localhost", 1080);
        let _ = matcher::CodeMatcher::six_digit();
        let _ = PacingProfile::default();
        let _ = SiteMarkers::default();
    }
}
