//! The login orchestrator: a state machine tying the browser driver, the
//! mailbox poller, and the retry policy into one run.
//!
//! A run walks `Init -> CredentialsSubmitted -> AwaitingCode -> CodeSubmitted
//! -> Done`, skipping the verification states when the site logs in without a
//! code. Rate limiting rolls the machine back to `Init` for another attempt
//! after a jittered backoff delay; credential rejection terminates the run
//! immediately. The browser session is closed on every exit path.
//!
//! The orchestrator is generic over [`LoginDriver`] and [`CodeSource`] so the
//! control flow can be exercised with in-memory fakes; production runs use
//! [`BrowserSession`] and [`MailboxCodeSource`] via
//! [`LoginOrchestrator::launch`].
//!
//! # Example
//!
//! ```no_run
//! use login_sync::{LoginConfig, LoginOrchestrator, MailboxConfig};
//!
//! # async fn example() -> login_sync::Result<()> {
//! let mailbox = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let config = LoginConfig::builder()
//!     .login_url("https://example.com/login")
//!     .username("alice")
//!     .password("hunter2")
//!     .mailbox(mailbox)
//!     .build()?;
//!
//! let mut orchestrator = LoginOrchestrator::launch(config).await?;
//! let outcome = orchestrator.run().await?;
//! println!("login finished: {outcome}");
//! # Ok(())
//! # }
//! ```

use crate::browser::{BrowserSession, PageState, SiteMarkers};
use crate::config::{LoginConfig, MailboxConfig, SiteCredentials};
use crate::error::{Error, Result};
use crate::mail::{MailboxPoller, VerificationCode, VerificationRequest};
use crate::matcher::CodeMatcher;
use crate::outcome::LoginOutcome;
use crate::pacing::PacingEngine;
use crate::util;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Interval between page re-classifications while waiting for the code email.
const PAGE_WATCH_INTERVAL: Duration = Duration::from_secs(10);

/// The browser-facing operations a login run needs.
///
/// Implemented by [`BrowserSession`]; test fakes implement it to exercise the
/// orchestrator without a browser.
#[async_trait]
pub trait LoginDriver: Send {
    /// Navigates to the login page, beginning a fresh attempt. Any
    /// verification request left outstanding by an abandoned attempt is
    /// discarded.
    async fn open_login_page(&mut self, url: &str) -> Result<()>;
    /// Fills and submits the credential form.
    async fn submit_credentials(&mut self, credentials: &SiteCredentials) -> Result<()>;
    /// Classifies the page after a submission, waiting out the transition.
    async fn detect_post_submit_state(&mut self) -> Result<PageState>;
    /// Classifies the current page without waiting.
    async fn classify_page(&mut self) -> Result<PageState>;
    /// Triggers the code email and returns the request timestamp.
    async fn request_verification_code(
        &mut self,
        mail_address: Option<&str>,
    ) -> Result<DateTime<Utc>>;
    /// Enters and submits a verification code.
    async fn submit_verification_code(&mut self, code: VerificationCode) -> Result<()>;
    /// Tears the session down. Must be idempotent.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl LoginDriver for BrowserSession {
    async fn open_login_page(&mut self, url: &str) -> Result<()> {
        BrowserSession::open_login_page(self, url).await
    }

    async fn submit_credentials(&mut self, credentials: &SiteCredentials) -> Result<()> {
        BrowserSession::submit_credentials(self, credentials).await
    }

    async fn detect_post_submit_state(&mut self) -> Result<PageState> {
        BrowserSession::detect_post_submit_state(self).await
    }

    async fn classify_page(&mut self) -> Result<PageState> {
        BrowserSession::classify_page(self).await
    }

    async fn request_verification_code(
        &mut self,
        mail_address: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        BrowserSession::request_verification_code(self, mail_address).await
    }

    async fn submit_verification_code(&mut self, code: VerificationCode) -> Result<()> {
        BrowserSession::submit_verification_code(self, code).await
    }

    async fn close(&mut self) -> Result<()> {
        BrowserSession::close(self).await
    }
}

/// A source of verification codes for an outstanding request.
#[async_trait]
pub trait CodeSource: Send {
    /// Waits for a code matching the request, honoring its deadline and the
    /// cancellation signal.
    async fn await_code(
        &mut self,
        request: &VerificationRequest,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<VerificationCode>;
}

/// [`CodeSource`] backed by the IMAP mailbox poller.
#[derive(Debug, Clone)]
pub struct MailboxCodeSource {
    poller: MailboxPoller,
    matcher: CodeMatcher,
}

impl MailboxCodeSource {
    /// Creates a source polling the given mailbox for an n-digit code.
    #[must_use]
    pub fn new(config: MailboxConfig, code_digits: usize) -> Self {
        Self {
            poller: MailboxPoller::new(config),
            matcher: CodeMatcher::n_digit(code_digits),
        }
    }

    /// Returns the mailbox address codes are read from.
    #[must_use]
    pub fn email(&self) -> &str {
        self.poller.email()
    }
}

#[async_trait]
impl CodeSource for MailboxCodeSource {
    async fn await_code(
        &mut self,
        request: &VerificationRequest,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<VerificationCode> {
        self.poller.await_code(request, &self.matcher, cancel).await
    }
}

/// The phases of a login run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// No submission has happened in the current attempt.
    Init,
    /// Credentials were submitted; awaiting classification.
    CredentialsSubmitted,
    /// The code email was requested; polling the mailbox.
    AwaitingCode,
    /// The code was entered; awaiting classification.
    CodeSubmitted,
    /// The run reached a terminal state.
    Done,
}

/// Cancels a running login from another task.
///
/// Obtained from [`LoginOrchestrator::cancel_handle`]. Dropping the handle
/// does not cancel the run.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Signals the run to stop at its next checkpoint.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives one login run end to end.
pub struct LoginOrchestrator<D, S> {
    config: LoginConfig,
    driver: D,
    codes: S,
    state: LoginState,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl LoginOrchestrator<BrowserSession, MailboxCodeSource> {
    /// Starts a browser session and builds an orchestrator over it, using the
    /// default site markers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionStart`] if the browser cannot be launched.
    pub async fn launch(config: LoginConfig) -> Result<Self> {
        Self::launch_with_markers(config, SiteMarkers::default()).await
    }

    /// Like [`launch`](Self::launch) with custom site markers.
    pub async fn launch_with_markers(config: LoginConfig, markers: SiteMarkers) -> Result<Self> {
        let pacing = PacingEngine::new(config.pacing.clone());
        let driver = BrowserSession::start(&config.browser, markers, pacing).await?;
        let codes =
            MailboxCodeSource::new(config.mailbox.clone(), config.verification.code_digits);
        Ok(Self::new(config, driver, codes))
    }
}

impl<D: LoginDriver, S: CodeSource> LoginOrchestrator<D, S> {
    /// Builds an orchestrator over an already-constructed driver and code
    /// source.
    #[must_use]
    pub fn new(config: LoginConfig, driver: D, codes: S) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            config,
            driver,
            codes,
            state: LoginState::Init,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// Returns a handle that cancels the run from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Returns the current phase of the run.
    #[must_use]
    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Runs the login to a terminal outcome.
    ///
    /// The browser session is closed before this returns, on success and
    /// failure alike. Terminal errors are folded into the [`LoginOutcome`];
    /// only conditions that need caller action surface as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the run was cancelled via
    /// [`cancel_handle`](Self::cancel_handle), and [`Error::MailAuth`] if the
    /// mailbox rejected its credentials (a configuration problem a rerun
    /// cannot fix).
    #[instrument(name = "orchestrator::run", skip_all, fields(url = %self.config.login_url))]
    pub async fn run(&mut self) -> Result<LoginOutcome> {
        let result = self.run_inner().await;

        if let Err(e) = self.driver.close().await {
            warn!(error = %e, "Browser close failed");
        }

        match result {
            Ok(outcome) => {
                info!(%outcome, "Run finished");
                Ok(outcome)
            }
            Err(Error::Cancelled) => {
                info!("Run cancelled");
                Err(Error::Cancelled)
            }
            Err(e @ Error::MailAuth { .. }) => {
                warn!(error = %e, "Mailbox authentication failed, fix the app password");
                Err(e)
            }
            Err(e) => {
                let outcome = LoginOutcome::from_error(&e);
                warn!(error = %e, category = %e.category(), %outcome, "Run failed");
                Ok(outcome)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private methods
    // ─────────────────────────────────────────────────────────────────────────

    async fn run_inner(&mut self) -> Result<LoginOutcome> {
        // Rate-limited attempts counted against max_attempts; other retryable
        // failures draw from the smaller transient budget.
        let mut rate_limited_attempts = 0u32;
        let mut transient_budget = self.config.retry.transient_retries;

        loop {
            if *self.cancel_rx.borrow() {
                return Err(Error::Cancelled);
            }

            self.transition(LoginState::Init);

            match self.attempt_login().await {
                Ok(outcome) => return Ok(outcome),

                Err(Error::RateLimited { retry_after }) => {
                    rate_limited_attempts += 1;
                    if rate_limited_attempts >= self.config.retry.max_attempts {
                        info!(
                            attempts = rate_limited_attempts,
                            "Attempt budget exhausted while rate limited"
                        );
                        return Err(Error::RateLimited { retry_after });
                    }

                    // The site's own hint wins over the computed schedule.
                    let delay = retry_after.unwrap_or_else(|| {
                        self.config
                            .retry
                            .jittered_delay_for_attempt(rate_limited_attempts)
                    });
                    info!(
                        attempt = rate_limited_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    self.sleep_cancellable(delay).await?;
                }

                Err(e) if e.is_retryable() && transient_budget > 0 => {
                    transient_budget -= 1;
                    warn!(
                        error = %e,
                        remaining = transient_budget,
                        "Transient failure, retrying"
                    );
                    self.sleep_cancellable(self.config.retry.base_delay).await?;
                }

                Err(e) => return Err(e),
            }
        }
    }

    /// One full pass through the login flow.
    async fn attempt_login(&mut self) -> Result<LoginOutcome> {
        let url = self.config.login_url.clone();
        self.driver.open_login_page(&url).await?;

        let credentials = self.config.credentials.clone();
        self.driver.submit_credentials(&credentials).await?;
        self.transition(LoginState::CredentialsSubmitted);

        match self.driver.detect_post_submit_state().await? {
            PageState::LoggedIn => {
                self.transition(LoginState::Done);
                Ok(LoginOutcome::Success)
            }
            PageState::VerificationRequired => self.verification_phase().await,
            PageState::RateLimited => Err(Error::RateLimited { retry_after: None }),
            PageState::CredentialRejected | PageState::LoginFormVisible => {
                Err(Error::CredentialRejected)
            }
            PageState::Unknown => Err(Error::PageStateUndetermined { checks: 1 }),
        }
    }

    /// Requests the code email, polls the mailbox, and submits the code.
    ///
    /// The mailbox wait races against a periodic page watch so a rate-limit
    /// banner or session expiry appearing mid-poll aborts the wait instead of
    /// burning the whole deadline.
    async fn verification_phase(&mut self) -> Result<LoginOutcome> {
        self.transition(LoginState::AwaitingCode);

        let mail_address = self.codes_mail_hint();
        let requested_at = self
            .driver
            .request_verification_code(mail_address.as_deref())
            .await?;

        let verification = &self.config.verification;
        let mut request = VerificationRequest::new(requested_at, verification.deadline);
        if let Some(pattern) = &verification.sender_pattern {
            request = request.sender_pattern(pattern.clone());
        }
        if let Some(pattern) = &verification.subject_pattern {
            request = request.subject_pattern(pattern.clone());
        }

        let mut poll_cancel = self.cancel_rx.clone();
        let code = tokio::select! {
            result = self.codes.await_code(&request, &mut poll_cancel) => result?,
            err = watch_for_fatal_page_state(&mut self.driver) => return Err(err),
        };

        self.driver.submit_verification_code(code).await?;
        self.transition(LoginState::CodeSubmitted);

        match self.driver.detect_post_submit_state().await? {
            PageState::LoggedIn => {
                self.transition(LoginState::Done);
                Ok(LoginOutcome::Success)
            }
            PageState::RateLimited => Err(Error::RateLimited { retry_after: None }),
            PageState::CredentialRejected | PageState::LoginFormVisible => {
                Err(Error::CredentialRejected)
            }
            PageState::VerificationRequired => {
                // The site kept the code form; the code likely went stale
                // between arrival and entry.
                warn!("Verification page still present after code submission");
                Ok(LoginOutcome::TransientFailure)
            }
            PageState::Unknown => Err(Error::PageStateUndetermined { checks: 1 }),
        }
    }

    /// The mail address prefilled on the verification page, when the code
    /// source is mailbox-backed.
    fn codes_mail_hint(&self) -> Option<String> {
        Some(self.config.mailbox.email().to_string())
    }

    fn transition(&mut self, next: LoginState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
        }
    }

    async fn sleep_cancellable(&mut self, delay: Duration) -> Result<()> {
        let mut cancel = self.cancel_rx.clone();
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = util::cancelled(&mut cancel) => Err(Error::Cancelled),
        }
    }
}

/// Re-classifies the page periodically; resolves only when a condition fatal
/// to the code wait appears.
async fn watch_for_fatal_page_state<D: LoginDriver>(driver: &mut D) -> Error {
    loop {
        tokio::time::sleep(PAGE_WATCH_INTERVAL).await;

        match driver.classify_page().await {
            Ok(PageState::RateLimited) => return Error::RateLimited { retry_after: None },
            Ok(PageState::CredentialRejected) => return Error::CredentialRejected,
            Ok(_) => {}
            Err(e) => {
                // A classify glitch must not abort the mailbox wait.
                debug!(error = %e, "Page watch classification failed");
            }
        }
    }
}
