//! State-machine tests for the login orchestrator.
//!
//! These run against in-memory fakes of [`LoginDriver`] and [`CodeSource`],
//! so they exercise the retry, verification, and cancellation control flow
//! without a browser or an IMAP server. Timers run under tokio's paused
//! clock where the schedule matters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use login_sync::browser::PageState;
use login_sync::config::SiteCredentials;
use login_sync::orchestrator::{CodeSource, LoginDriver, LoginOrchestrator, LoginState};
use login_sync::{
    Error, ErrorCategory, LoginConfig, LoginOutcome, MailboxConfig, RetryPolicy,
    VerificationCode, VerificationRequest,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DriverLog {
    /// Post-submit classifications consumed one per credential submission.
    post_submit_states: VecDeque<PageState>,
    /// Classification reported after a verification code is submitted.
    after_code_state: Option<PageState>,
    /// What `classify_page` reports while the orchestrator watches the page
    /// during the code wait. Defaults to the verification page staying up.
    watch_state: Option<PageState>,
    /// Remaining times `open_login_page` fails with a retryable error.
    open_failures: u32,
    /// Mirrors the session contract: a code request stays outstanding until
    /// the code is submitted or a new attempt opens the login page.
    code_request_outstanding: bool,
    opens: u32,
    credential_submissions: u32,
    code_requests: u32,
    submitted_codes: Vec<String>,
    closed: bool,
}

/// Scripted [`LoginDriver`]; the shared log lets tests inspect calls after
/// the orchestrator consumed the driver.
#[derive(Debug, Clone)]
struct FakeDriver {
    log: Arc<Mutex<DriverLog>>,
}

impl FakeDriver {
    fn scripted(post_submit_states: Vec<PageState>) -> Self {
        Self {
            log: Arc::new(Mutex::new(DriverLog {
                post_submit_states: post_submit_states.into(),
                ..DriverLog::default()
            })),
        }
    }

    fn log(&self) -> Arc<Mutex<DriverLog>> {
        Arc::clone(&self.log)
    }

    fn with_after_code_state(self, state: PageState) -> Self {
        self.log.lock().unwrap().after_code_state = Some(state);
        self
    }

    fn with_open_failures(self, count: u32) -> Self {
        self.log.lock().unwrap().open_failures = count;
        self
    }

    fn with_watch_state(self, state: PageState) -> Self {
        self.log.lock().unwrap().watch_state = Some(state);
        self
    }
}

#[async_trait]
impl LoginDriver for FakeDriver {
    async fn open_login_page(&mut self, _url: &str) -> login_sync::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.opens += 1;
        log.code_request_outstanding = false;
        if log.open_failures > 0 {
            log.open_failures -= 1;
            return Err(Error::ElementNotFound {
                role: "username field".into(),
                timeout: Duration::from_secs(10),
            });
        }
        Ok(())
    }

    async fn submit_credentials(
        &mut self,
        _credentials: &SiteCredentials,
    ) -> login_sync::Result<()> {
        self.log.lock().unwrap().credential_submissions += 1;
        Ok(())
    }

    async fn detect_post_submit_state(&mut self) -> login_sync::Result<PageState> {
        let mut log = self.log.lock().unwrap();
        if !log.submitted_codes.is_empty() {
            return Ok(log.after_code_state.unwrap_or(PageState::LoggedIn));
        }
        Ok(log
            .post_submit_states
            .pop_front()
            .unwrap_or(PageState::LoggedIn))
    }

    async fn classify_page(&mut self) -> login_sync::Result<PageState> {
        let log = self.log.lock().unwrap();
        Ok(log.watch_state.unwrap_or(PageState::VerificationRequired))
    }

    async fn request_verification_code(
        &mut self,
        _mail_address: Option<&str>,
    ) -> login_sync::Result<DateTime<Utc>> {
        let mut log = self.log.lock().unwrap();
        if log.code_request_outstanding {
            return Err(Error::VerificationPending);
        }
        log.code_request_outstanding = true;
        log.code_requests += 1;
        Ok(Utc::now())
    }

    async fn submit_verification_code(&mut self, code: VerificationCode) -> login_sync::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.code_request_outstanding = false;
        log.submitted_codes.push(code.into_string());
        Ok(())
    }

    async fn close(&mut self) -> login_sync::Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Scripted [`CodeSource`].
#[derive(Debug, Clone)]
enum FakeCodeSource {
    /// Yields the code after the given wait.
    Arrives(Duration, &'static str),
    /// Waits out the request deadline, then times out.
    NeverArrives,
    /// The mailbox rejects its credentials.
    AuthFails,
}

#[async_trait]
impl CodeSource for FakeCodeSource {
    async fn await_code(
        &mut self,
        request: &VerificationRequest,
        cancel: &mut watch::Receiver<bool>,
    ) -> login_sync::Result<VerificationCode> {
        let (wait, result) = match self {
            Self::Arrives(delay, code) => (*delay, Ok(VerificationCode::new(*code))),
            Self::NeverArrives => (
                request.deadline,
                Err(Error::VerificationTimeout {
                    timeout: request.deadline,
                }),
            ),
            Self::AuthFails => (
                Duration::ZERO,
                Err(Error::MailAuth {
                    email: "codes@gmail.com".into(),
                    source: async_imap::error::Error::Bad("AUTHENTICATIONFAILED".into()),
                }),
            ),
        };

        tokio::select! {
            () = tokio::time::sleep(wait) => result,
            _ = cancel.changed() => Err(Error::Cancelled),
        }
    }
}

fn test_config(retry: RetryPolicy) -> LoginConfig {
    let mailbox = MailboxConfig::builder()
        .email("codes@gmail.com")
        .password("app-password")
        .build()
        .unwrap();

    LoginConfig::builder()
        .login_url("https://example.com/login")
        .username("alice")
        .password("hunter2")
        .mailbox(mailbox)
        .retry(retry)
        .verification_deadline(Duration::from_secs(60))
        .build()
        .unwrap()
}

fn no_jitter_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(60),
        max_attempts: 3,
        jitter: Duration::ZERO,
        transient_retries: 1,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Direct Login
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_success_without_verification() {
    let driver = FakeDriver::scripted(vec![PageState::LoggedIn]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::Success);
    assert_eq!(orchestrator.state(), LoginState::Done);

    let log = log.lock().unwrap();
    assert_eq!(log.credential_submissions, 1);
    assert_eq!(log.code_requests, 0, "no code requested on direct login");
    assert!(log.closed, "browser must be closed after the run");
}

#[tokio::test]
async fn test_credential_rejection_is_not_retried() {
    let driver = FakeDriver::scripted(vec![
        PageState::CredentialRejected,
        // Never reached; a retry here would risk a lockout
        PageState::LoggedIn,
    ]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::CredentialRejected);

    let log = log.lock().unwrap();
    assert_eq!(log.credential_submissions, 1);
    assert!(log.closed);
}

#[tokio::test]
async fn test_persistent_login_form_means_rejection() {
    let driver = FakeDriver::scripted(vec![PageState::LoginFormVisible]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::CredentialRejected);
    assert_eq!(log.lock().unwrap().credential_submissions, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Verification Flow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_verification_flow_submits_the_code() {
    let driver = FakeDriver::scripted(vec![PageState::VerificationRequired])
        .with_after_code_state(PageState::LoggedIn);
    let log = driver.log();
    let code = FakeCodeSource::Arrives(Duration::from_secs(15), "483920");
    let mut orchestrator = LoginOrchestrator::new(test_config(no_jitter_retry()), driver, code);

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::Success);
    assert_eq!(orchestrator.state(), LoginState::Done);

    let log = log.lock().unwrap();
    assert_eq!(log.code_requests, 1);
    assert_eq!(log.submitted_codes, vec!["483920".to_string()]);
    assert!(log.closed);
}

#[tokio::test(start_paused = true)]
async fn test_verification_timeout_becomes_outcome() {
    let driver = FakeDriver::scripted(vec![PageState::VerificationRequired]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::VerificationTimeout);

    let log = log.lock().unwrap();
    assert_eq!(log.code_requests, 1);
    assert!(log.submitted_codes.is_empty());
    assert!(log.closed);
}

#[tokio::test(start_paused = true)]
async fn test_lingering_code_form_is_transient() {
    // The site keeps showing the code form after submission: the code went
    // stale, and the run reports a transient failure rather than success.
    let driver = FakeDriver::scripted(vec![PageState::VerificationRequired])
        .with_after_code_state(PageState::VerificationRequired);
    let log = driver.log();
    let code = FakeCodeSource::Arrives(Duration::from_secs(1), "112233");
    let mut orchestrator = LoginOrchestrator::new(test_config(no_jitter_retry()), driver, code);

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::TransientFailure);
    assert_eq!(log.lock().unwrap().submitted_codes.len(), 1);
}

#[tokio::test]
async fn test_mail_auth_failure_surfaces_as_error() {
    let driver = FakeDriver::scripted(vec![PageState::VerificationRequired]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::AuthFails,
    );

    let result = orchestrator.run().await;

    // Unlike transient failures, a bad app password needs caller action and
    // is not folded into the outcome.
    let err = result.expect_err("mail auth failure should not become an outcome");
    assert!(matches!(err, Error::MailAuth { .. }));
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(log.lock().unwrap().closed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limiting and Backoff
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backs_off_then_succeeds() {
    let driver = FakeDriver::scripted(vec![PageState::RateLimited, PageState::LoggedIn]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let started = tokio::time::Instant::now();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::Success);
    // One backoff of base_delay * 2^0 = 2s before the second attempt
    assert!(started.elapsed() >= Duration::from_secs(2));

    let log = log.lock().unwrap();
    assert_eq!(log.credential_submissions, 2);
    assert!(log.closed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhausts_attempt_budget() {
    let driver = FakeDriver::scripted(vec![
        PageState::RateLimited,
        PageState::RateLimited,
        PageState::RateLimited,
    ]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let started = tokio::time::Instant::now();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::RateLimited { retry_after: None });
    // Exponential schedule: 2s after attempt 1, 4s after attempt 2
    assert!(started.elapsed() >= Duration::from_secs(6));

    let log = log.lock().unwrap();
    assert_eq!(log.credential_submissions, 3, "max_attempts bounds the run");
    assert!(log.closed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_during_code_wait_retries_cleanly() {
    // The page watch sees a rate-limit banner while the code email is still
    // in flight. The retry attempt must start with a clean slate instead of
    // tripping over the abandoned code request.
    let driver = FakeDriver::scripted(vec![PageState::VerificationRequired, PageState::LoggedIn])
        .with_watch_state(PageState::RateLimited);
    let log = driver.log();
    let code = FakeCodeSource::Arrives(Duration::from_secs(60), "555555");
    let mut orchestrator = LoginOrchestrator::new(test_config(no_jitter_retry()), driver, code);

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::Success);

    let log = log.lock().unwrap();
    assert_eq!(log.credential_submissions, 2);
    assert_eq!(log.code_requests, 1);
    assert!(log.submitted_codes.is_empty(), "the code never arrived");
    assert!(log.closed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_during_code_wait_stays_in_rate_limit_path() {
    // Every attempt reaches the code wait and then hits the rate limit; the
    // run must exhaust the attempt budget as rate-limited, with each attempt
    // issuing its own fresh code request.
    let driver = FakeDriver::scripted(vec![
        PageState::VerificationRequired,
        PageState::VerificationRequired,
        PageState::VerificationRequired,
    ])
    .with_watch_state(PageState::RateLimited);
    let log = driver.log();
    let code = FakeCodeSource::Arrives(Duration::from_secs(60), "555555");
    let mut orchestrator = LoginOrchestrator::new(test_config(no_jitter_retry()), driver, code);

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::RateLimited { retry_after: None });

    let log = log.lock().unwrap();
    assert_eq!(log.code_requests, 3, "every attempt issued a fresh request");
    assert!(log.closed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Transient Retries
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_transient_navigation_failure_is_retried() {
    let driver = FakeDriver::scripted(vec![PageState::LoggedIn]).with_open_failures(1);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::Success);

    let log = log.lock().unwrap();
    assert_eq!(log.opens, 2, "one failed navigation, one retry");
    assert_eq!(log.credential_submissions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_budget_exhaustion_is_terminal() {
    // transient_retries = 1, so two consecutive navigation failures end the run
    let driver = FakeDriver::scripted(vec![PageState::LoggedIn]).with_open_failures(2);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome, LoginOutcome::TransientFailure);

    let log = log.lock().unwrap();
    assert_eq!(log.opens, 2);
    assert_eq!(log.credential_submissions, 0);
    assert!(log.closed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancellation_during_code_wait() {
    let driver = FakeDriver::scripted(vec![PageState::VerificationRequired]);
    let log = driver.log();
    let code = FakeCodeSource::Arrives(Duration::from_secs(30), "999999");
    let mut orchestrator = LoginOrchestrator::new(test_config(no_jitter_retry()), driver, code);

    let handle = orchestrator.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(Error::Cancelled)));

    let log = log.lock().unwrap();
    assert!(log.submitted_codes.is_empty());
    assert!(log.closed, "cancellation still closes the browser");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_backoff() {
    let driver = FakeDriver::scripted(vec![PageState::RateLimited, PageState::LoggedIn]);
    let log = driver.log();
    let mut orchestrator = LoginOrchestrator::new(
        test_config(no_jitter_retry()),
        driver,
        FakeCodeSource::NeverArrives,
    );

    // Cancel midway through the 2s backoff sleep after the rate limit
    let handle = orchestrator.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    });

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(log.lock().unwrap().closed);
}
