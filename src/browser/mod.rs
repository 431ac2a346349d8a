//! Browser session driver for the automated login flow.
//!
//! [`BrowserSession`] owns a Chromium instance driven over CDP. It opens the
//! login page, fills and submits the credential form with humanized pacing,
//! classifies what the site responded with, and exchanges the emailed
//! verification code when the site asks for one.
//!
//! Anti-fingerprinting happens at two levels: launch flags strip the obvious
//! automation switches, and a script injected on every new document rewrites
//! the `navigator` surface before site code can inspect it (see the
//! [`stealth`] module).
//!
//! # Example
//!
//! ```no_run
//! use login_sync::browser::{BrowserSession, SiteMarkers};
//! use login_sync::pacing::{PacingEngine, PacingProfile};
//! use login_sync::{BrowserOptions, SiteCredentials};
//!
//! # async fn example() -> login_sync::Result<()> {
//! let pacing = PacingEngine::new(PacingProfile::default());
//! let mut session =
//!     BrowserSession::start(&BrowserOptions::default(), SiteMarkers::default(), pacing).await?;
//!
//! let creds = SiteCredentials::new("alice", "hunter2")?;
//! session.open_login_page("https://example.com/login").await?;
//! session.submit_credentials(&creds).await?;
//! let state = session.detect_post_submit_state().await?;
//! println!("post-submit state: {state:?}");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod markers;
mod stealth;

pub use markers::{FieldRole, SiteMarkers};

use crate::config::{BrowserOptions, SiteCredentials};
use crate::error::{Error, Result};
use crate::mail::VerificationCode;
use crate::pacing::{ActionKind, PacingEngine};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Element, Page};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// How long to wait for a required element before giving up.
const ELEMENT_WAIT: Duration = Duration::from_secs(10);
/// Interval between element lookups while waiting.
const ELEMENT_POLL: Duration = Duration::from_millis(250);
/// Attempts to load the login page before the navigation error propagates.
const NAVIGATION_ATTEMPTS: u32 = 3;
/// Classification re-checks after a submission before the state is declared
/// undetermined.
const POST_SUBMIT_CHECKS: u32 = 5;
/// Interval between post-submit classification checks.
const POST_SUBMIT_INTERVAL: Duration = Duration::from_secs(1);

/// What the site's current page looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Success markers present; the account is logged in.
    LoggedIn,
    /// The site is asking for an emailed verification code.
    VerificationRequired,
    /// The site signalled rate limiting.
    RateLimited,
    /// The site rejected the credentials.
    CredentialRejected,
    /// The login form is (still) visible.
    LoginFormVisible,
    /// None of the known markers matched.
    Unknown,
}

/// Tracks the at-most-one outstanding code request for a session.
///
/// A request stays outstanding from [`BrowserSession::request_verification_code`]
/// until the code is submitted, or until the session starts a fresh attempt by
/// navigating to the login page again. Without the reset-on-navigation, an
/// attempt abandoned mid-poll (rate limit, mail error) would wedge every
/// following attempt on [`Error::VerificationPending`].
#[derive(Debug, Default)]
struct VerificationGate {
    pending: bool,
}

impl VerificationGate {
    /// Rejects a second request while one is outstanding.
    fn ensure_clear(&self) -> Result<()> {
        if self.pending {
            return Err(Error::VerificationPending);
        }
        Ok(())
    }

    fn mark_requested(&mut self) {
        self.pending = true;
    }

    /// The code was entered; the request is resolved.
    fn mark_submitted(&mut self) {
        self.pending = false;
    }

    /// Abandons any outstanding request when a new attempt begins.
    fn reset(&mut self) {
        self.pending = false;
    }

    fn is_pending(&self) -> bool {
        self.pending
    }
}

/// A live browser session against the target site.
///
/// Created with [`BrowserSession::start`]; must be closed with
/// [`close`](Self::close) so the browser process and its CDP handler task are
/// torn down. `close` is idempotent.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    markers: SiteMarkers,
    pacing: PacingEngine,
    verification: VerificationGate,
    closed: bool,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("verification_pending", &self.verification.is_pending())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Launches the browser and prepares a stealth-instrumented blank page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionStart`] if the browser binary cannot be
    /// launched or the initial page cannot be created.
    #[instrument(name = "browser::start", skip_all, fields(headless = options.headless))]
    pub async fn start(
        options: &BrowserOptions,
        markers: SiteMarkers,
        pacing: PacingEngine,
    ) -> Result<Self> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder().window_size(width, height);

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &options.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(ua) = &options.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }
        for arg in stealth::launch_args() {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(|message| Error::SessionStart {
            message,
            source: None,
        })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|source| {
            Error::SessionStart {
                message: "browser launch failed".into(),
                source: Some(source),
            }
        })?;

        // The handler future drives all CDP traffic; it must be polled for
        // the lifetime of the browser.
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(source) => {
                handler_task.abort();
                return Err(Error::SessionStart {
                    message: "failed to open initial page".into(),
                    source: Some(source),
                });
            }
        };

        let script = stealth::stealth_script(options.user_agent.as_deref());
        if let Err(source) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
        {
            handler_task.abort();
            return Err(Error::SessionStart {
                message: "failed to install stealth script".into(),
                source: Some(source),
            });
        }

        debug!("Browser session ready");

        Ok(Self {
            browser,
            page,
            handler_task,
            markers,
            pacing,
            verification: VerificationGate::default(),
            closed: false,
        })
    }

    /// Navigates to the login page, retrying transient load failures.
    ///
    /// Begins a fresh attempt: any verification request left outstanding by
    /// an abandoned attempt is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Navigation`] after all attempts fail.
    #[instrument(name = "browser::open_login_page", skip(self), fields(url = %url))]
    pub async fn open_login_page(&mut self, url: &str) -> Result<()> {
        self.verification.reset();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.page.goto(url).await {
                Ok(_) => {
                    self.pacing.pause_before(ActionKind::PageTransition).await;
                    debug!(attempt, "Login page loaded");
                    return Ok(());
                }
                Err(source) if attempt < NAVIGATION_ATTEMPTS => {
                    warn!(attempt, error = %source, "Login page load failed");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Err(source) => {
                    warn!(attempt, error = %source, "Login page load failed");
                    return Err(Error::Navigation {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }

    /// Fills the credential form with humanized pacing and submits it.
    ///
    /// Fields are focused and typed character by character with randomized
    /// delays; the submit click follows a pre-click pause.
    #[instrument(
        name = "browser::submit_credentials",
        skip_all,
        fields(username = %credentials.username())
    )]
    pub async fn submit_credentials(&mut self, credentials: &SiteCredentials) -> Result<()> {
        self.pointer_attention().await;

        let selector = self.markers.username_field.clone();
        let field = self.wait_for_element(&selector, FieldRole::Username).await?;
        self.pacing.pause_before(ActionKind::FieldFocus).await;
        field.focus().await.map_err(|source| Error::PageCommand {
            action: "focus username",
            source,
        })?;
        self.type_slowly(&field, credentials.username(), "type username")
            .await?;

        let selector = self.markers.password_field.clone();
        let field = self.wait_for_element(&selector, FieldRole::Password).await?;
        self.pacing.pause_before(ActionKind::FieldFocus).await;
        field.focus().await.map_err(|source| Error::PageCommand {
            action: "focus password",
            source,
        })?;
        self.type_slowly(&field, credentials.password(), "type password")
            .await?;

        let selector = self.markers.submit_button.clone();
        let button = self
            .wait_for_element(&selector, FieldRole::SubmitButton)
            .await?;
        self.pacing.pause_before(ActionKind::Click).await;
        button.click().await.map_err(|source| Error::PageCommand {
            action: "click submit",
            source,
        })?;

        info!("Credentials submitted");

        Ok(())
    }

    /// Classifies the current page against the configured markers.
    ///
    /// Checks run in a fixed order: error banners (rate limit, then
    /// rejection), the verification page, success markers, and finally the
    /// login form.
    pub async fn classify_page(&self) -> Result<PageState> {
        let js = self.classification_script();
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|source| Error::PageCommand {
                action: "classify page",
                source,
            })?;

        let value: serde_json::Value = match result.into_value() {
            Ok(v) => v,
            Err(_) => return Ok(PageState::Unknown),
        };

        let tag = value.get("state").and_then(|v| v.as_str()).unwrap_or("");
        let detail = value.get("detail").and_then(|v| v.as_str()).unwrap_or("");
        if !detail.is_empty() {
            debug!(banner = %detail, "Page banner text");
        }

        Ok(match tag {
            "rate_limited" => PageState::RateLimited,
            "credential_rejected" => PageState::CredentialRejected,
            "verification" => PageState::VerificationRequired,
            "logged_in" => PageState::LoggedIn,
            "login_form" => PageState::LoginFormVisible,
            _ => PageState::Unknown,
        })
    }

    /// Waits out the page transition after a submission and classifies the
    /// result, re-checking while the page settles.
    ///
    /// A login form that is still visible after the re-check budget means the
    /// site silently rejected the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PageStateUndetermined`] if every check comes back
    /// unknown.
    #[instrument(name = "browser::detect_post_submit_state", skip(self))]
    pub async fn detect_post_submit_state(&mut self) -> Result<PageState> {
        self.pacing.pause_before(ActionKind::PageTransition).await;

        let mut saw_login_form = false;

        for check in 1..=POST_SUBMIT_CHECKS {
            match self.classify_page().await? {
                PageState::LoginFormVisible => {
                    // The form may linger briefly mid-navigation; only a form
                    // that persists through every check counts as a rejection.
                    saw_login_form = true;
                }
                PageState::Unknown => {}
                state => {
                    debug!(check, ?state, "Post-submit state classified");
                    return Ok(state);
                }
            }

            if check < POST_SUBMIT_CHECKS {
                tokio::time::sleep(POST_SUBMIT_INTERVAL).await;
            }
        }

        if saw_login_form {
            info!("Login form still present after submission");
            return Ok(PageState::CredentialRejected);
        }

        Err(Error::PageStateUndetermined {
            checks: POST_SUBMIT_CHECKS,
        })
    }

    /// Asks the site to send the verification code email.
    ///
    /// Prefills the mail-address field when the site shows one, then clicks
    /// the send-code button. Returns the request timestamp the mailbox poller
    /// filters against. A button the site has disabled means a code was
    /// already sent recently; the request timestamp still anchors the poll.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VerificationPending`] if a request is already
    /// outstanding in the current attempt.
    #[instrument(name = "browser::request_verification_code", skip_all)]
    pub async fn request_verification_code(
        &mut self,
        mail_address: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        self.verification.ensure_clear()?;

        if let Some(address) = mail_address {
            let selector = self.markers.mail_address_field.clone();
            match self.page.find_element(selector.as_str()).await {
                Ok(field) => {
                    self.pacing.pause_before(ActionKind::FieldFocus).await;
                    field.focus().await.map_err(|source| Error::PageCommand {
                        action: "focus mail address",
                        source,
                    })?;
                    self.type_slowly(&field, address, "type mail address").await?;
                }
                Err(_) => debug!("No mail address field on page, skipping prefill"),
            }
        }

        self.pacing.pause_before(ActionKind::Click).await;
        self.click_send_code_button().await?;

        let requested_at = Utc::now();
        self.verification.mark_requested();
        info!(%requested_at, "Verification code requested");

        Ok(requested_at)
    }

    /// Types the verification code and submits it.
    ///
    /// Consumes the code; a code is entered exactly once.
    #[instrument(name = "browser::submit_verification_code", skip_all)]
    pub async fn submit_verification_code(&mut self, code: VerificationCode) -> Result<()> {
        let selector = self.markers.code_field.clone();
        let field = self
            .wait_for_element(&selector, FieldRole::VerificationCode)
            .await?;
        self.pacing.pause_before(ActionKind::FieldFocus).await;
        field.focus().await.map_err(|source| Error::PageCommand {
            action: "focus code field",
            source,
        })?;
        self.type_slowly(&field, code.as_str(), "type verification code")
            .await?;

        let selector = self.markers.submit_button.clone();
        let button = self
            .wait_for_element(&selector, FieldRole::SubmitButton)
            .await?;
        self.pacing.pause_before(ActionKind::Click).await;
        button.click().await.map_err(|source| Error::PageCommand {
            action: "click code submit",
            source,
        })?;

        self.verification.mark_submitted();
        info!("Verification code submitted");

        Ok(())
    }

    /// Returns `true` if a verification request is outstanding.
    #[must_use]
    pub fn verification_pending(&self) -> bool {
        self.verification.is_pending()
    }

    /// Closes the browser and aborts the CDP handler task.
    ///
    /// Idempotent; every exit path of a run ends here.
    #[instrument(name = "browser::close", skip(self))]
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "Browser close reported an error");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "Browser process wait reported an error");
        }
        self.handler_task.abort();
        self.closed = true;

        debug!("Browser session closed");

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Polls for an element until it appears or the wait is exhausted.
    async fn wait_for_element(&self, selector: &str, role: FieldRole) -> Result<Element> {
        let deadline = Instant::now() + ELEMENT_WAIT;

        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(Error::ElementNotFound {
                    role: role.to_string(),
                    timeout: ELEMENT_WAIT,
                });
            }
            tokio::time::sleep(ELEMENT_POLL).await;
        }
    }

    /// Types text one character at a time with randomized inter-key delays.
    async fn type_slowly(&self, element: &Element, text: &str, action: &'static str) -> Result<()> {
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element
                .type_str(ch.encode_utf8(&mut buf))
                .await
                .map_err(|source| Error::PageCommand { action, source })?;
            tokio::time::sleep(self.pacing.per_character_delay()).await;
        }
        Ok(())
    }

    /// Lightweight DOM reads that mimic pointer attention before form work.
    ///
    /// CDP exposes no OS cursor, so this reads elements at randomized
    /// viewport points the way a wandering pointer would hit them.
    async fn pointer_attention(&self) {
        if !self.pacing.profile().simulate_pointer {
            return;
        }

        let points: Vec<(i32, i32)> = {
            let mut rng = rand::rng();
            use rand::Rng;
            (0..rng.random_range(2..=4))
                .map(|_| (rng.random_range(80..900), rng.random_range(80..700)))
                .collect()
        };

        for (x, y) in points {
            let _ = self
                .page
                .evaluate(format!("document.elementFromPoint({x}, {y})?.tagName"))
                .await;
            tokio::time::sleep(Duration::from_millis(80 + (x as u64 % 120))).await;
        }
    }

    /// Finds and clicks the send-code button by its text.
    ///
    /// CSS cannot select on text content, so the lookup runs in the page.
    async fn click_send_code_button(&self) -> Result<()> {
        let needles = serde_json::to_string(&self.markers.send_code_texts)
            .unwrap_or_else(|_| "[]".to_string());
        let js = format!(
            r"(() => {{
                const needles = {needles};
                const buttons = Array.from(document.querySelectorAll('button'));
                for (const b of buttons) {{
                    const t = (b.innerText || '').trim();
                    if (!t) continue;
                    if (needles.some(n => t.includes(n))) {{
                        if (b.disabled) return 'disabled';
                        b.click();
                        return 'clicked';
                    }}
                }}
                return 'missing';
            }})()"
        );

        let deadline = Instant::now() + ELEMENT_WAIT;
        loop {
            let result = self
                .page
                .evaluate(js.clone())
                .await
                .map_err(|source| Error::PageCommand {
                    action: "click send-code",
                    source,
                })?;

            match result.into_value::<String>().as_deref() {
                Ok("clicked") => return Ok(()),
                Ok("disabled") => {
                    info!("Send-code button disabled, code was already requested");
                    return Ok(());
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(Error::ElementNotFound {
                    role: FieldRole::SendCodeButton.to_string(),
                    timeout: ELEMENT_WAIT,
                });
            }
            tokio::time::sleep(ELEMENT_POLL).await;
        }
    }

    /// Builds the page-classification script with the markers embedded.
    fn classification_script(&self) -> String {
        let m = &self.markers;
        let to_json = |v: &Vec<String>| {
            serde_json::to_string(&v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>())
                .unwrap_or_else(|_| "[]".to_string())
        };

        let rate_limit = to_json(&m.rate_limit_texts);
        let rejection = to_json(&m.rejection_texts);
        let success_sels =
            serde_json::to_string(&m.success_selectors).unwrap_or_else(|_| "[]".to_string());
        let success_urls = to_json(&m.success_url_keywords);
        let verify_urls = to_json(&m.verification_url_keywords);
        let verify_placeholders = to_json(&m.verification_placeholder_texts);
        let banner_sel = serde_json::to_string(&m.error_banner).unwrap_or_else(|_| "\"\"".into());
        let user_sel =
            serde_json::to_string(&m.username_field).unwrap_or_else(|_| "\"\"".into());
        let pass_sel =
            serde_json::to_string(&m.password_field).unwrap_or_else(|_| "\"\"".into());

        format!(
            r"(() => {{
                const rateLimitTexts = {rate_limit};
                const rejectionTexts = {rejection};
                const successSelectors = {success_sels};
                const successUrlKeywords = {success_urls};
                const verifyUrlKeywords = {verify_urls};
                const verifyPlaceholders = {verify_placeholders};

                const url = (location.href || '').toLowerCase();
                const bodyText = (document.body?.innerText || '').toLowerCase();

                let banner = '';
                try {{
                    for (const el of document.querySelectorAll({banner_sel})) {{
                        const t = (el.innerText || '').trim();
                        if (t) {{ banner = t; break; }}
                    }}
                }} catch (_) {{}}
                const bannerLc = banner.toLowerCase();

                if (rateLimitTexts.some(t => bannerLc.includes(t) || bodyText.includes(t))) {{
                    return {{ state: 'rate_limited', detail: banner }};
                }}
                if (banner && rejectionTexts.some(t => bannerLc.includes(t))) {{
                    return {{ state: 'credential_rejected', detail: banner }};
                }}

                if (verifyUrlKeywords.some(k => url.includes(k))) {{
                    return {{ state: 'verification', detail: '' }};
                }}
                const inputs = Array.from(document.querySelectorAll('input'));
                if (inputs.some(i => {{
                    const p = (i.getAttribute('placeholder') || '').toLowerCase();
                    return p && verifyPlaceholders.some(k => p.includes(k));
                }})) {{
                    return {{ state: 'verification', detail: '' }};
                }}

                const hasLoginForm =
                    !!document.querySelector({user_sel}) && !!document.querySelector({pass_sel});
                if (!hasLoginForm) {{
                    if (successSelectors.some(s => {{
                        try {{ return !!document.querySelector(s); }} catch (_) {{ return false; }}
                    }})) {{
                        return {{ state: 'logged_in', detail: '' }};
                    }}
                    if (!url.includes('login') && successUrlKeywords.some(k => url.includes(k))) {{
                        return {{ state: 'logged_in', detail: '' }};
                    }}
                }}

                if (hasLoginForm) {{
                    return {{ state: 'login_form', detail: banner }};
                }}
                return {{ state: 'unknown', detail: '' }};
            }})()"
        )
    }
}
