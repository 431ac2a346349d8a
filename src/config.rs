//! Configuration for login runs.
//!
//! Use [`LoginConfigBuilder`] to assemble a validated configuration before any
//! browser or mail resource is acquired:
//!
//! ```
//! use login_sync::{LoginConfig, MailboxConfig};
//!
//! let mailbox = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid mailbox config");
//!
//! let config = LoginConfig::builder()
//!     .login_url("https://example.com/login")
//!     .username("alice")
//!     .password("hunter2")
//!     .mailbox(mailbox)
//!     .build()
//!     .expect("valid config");
//! ```

use crate::error::{Error, Result};
use crate::known_servers::ServerRegistry;
use crate::pacing::PacingProfile;
use crate::proxy::Socks5Proxy;
use email_address::EmailAddress;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;

/// Site login credentials for one run.
///
/// The password is stored as a [`SecretString`] to prevent accidental logging.
/// Immutable for a run; the orchestrator owns them and passes references to
/// collaborators that need them.
#[derive(Clone)]
pub struct SiteCredentials {
    username: String,
    password: SecretString,
}

impl SiteCredentials {
    /// Creates credentials from a username and password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either field is empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() {
            return Err(Error::InvalidConfig {
                message: "site username must not be empty".into(),
            });
        }
        if password.is_empty() {
            return Err(Error::InvalidConfig {
                message: "site password must not be empty".into(),
            });
        }
        Ok(Self {
            username,
            password: SecretString::from(password),
        })
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password as a string slice.
    ///
    /// The password is intentionally not directly accessible to prevent
    /// accidental logging.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Configuration for connecting to the verification mailbox over IMAP.
///
/// Create using [`MailboxConfig::builder()`].
#[derive(Clone)]
pub struct MailboxConfig {
    /// Mailbox address (used for login and IMAP server discovery).
    email: EmailAddress,
    /// App-specific password (protected from accidental logging).
    password: SecretString,
    /// IMAP server hostname (auto-discovered from the mail domain if not set).
    pub imap_host: Option<String>,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Optional SOCKS5 proxy for the IMAP connection.
    pub proxy: Option<Socks5Proxy>,
    /// Timeout configuration for IMAP operations.
    pub timeouts: TimeoutConfig,
    /// Polling configuration for code retrieval.
    pub polling: PollingConfig,
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("proxy", &self.proxy)
            .field("timeouts", &self.timeouts)
            .field("polling", &self.polling)
            .finish()
    }
}

impl MailboxConfig {
    /// Creates a new mailbox configuration builder.
    #[must_use]
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::default()
    }

    /// Returns the mailbox address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the app password as a string slice.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the effective IMAP host, either explicitly configured or
    /// discovered from the mail domain.
    #[must_use]
    pub fn effective_imap_host(&self) -> String {
        if let Some(host) = &self.imap_host {
            host.clone()
        } else {
            crate::known_servers::discover_imap_host(self.email.as_str())
        }
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.effective_imap_host(), self.imap_port)
    }
}

/// Timeout configuration for IMAP operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing the TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a mailbox.
    pub select: Duration,
    /// Timeout for UID searches.
    pub search: Duration,
    /// Timeout for fetching message content.
    pub fetch: Duration,
    /// Timeout for logout.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Polling configuration for the mailbox poller.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval between polling attempts while waiting for the code email.
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
        }
    }
}

/// Builder for [`MailboxConfig`].
#[derive(Debug, Default)]
pub struct MailboxConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    proxy: Option<Socks5Proxy>,
    timeouts: Option<TimeoutConfig>,
    polling: Option<PollingConfig>,
    server_registry: Option<ServerRegistry>,
}

impl MailboxConfigBuilder {
    /// Sets the mailbox address (required).
    ///
    /// The mail domain is used to auto-discover the IMAP server if no explicit
    /// host is set.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the app-specific password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname explicitly.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port. Default is 993 (IMAPS with TLS).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets a custom server registry for IMAP host discovery.
    ///
    /// The registry is consulted during [`build()`](Self::build) when no
    /// explicit [`imap_host`](Self::imap_host) is set.
    #[must_use]
    pub fn server_registry(mut self, registry: ServerRegistry) -> Self {
        self.server_registry = Some(registry);
        self
    }

    /// Sets a SOCKS5 proxy for the IMAP connection.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets timeout configuration for IMAP operations.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the polling interval for code retrieval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Builds the mailbox configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or the mail address is
    /// not valid.
    pub fn build(self) -> Result<MailboxConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "mailbox email is required".into(),
        })?;

        let email = EmailAddress::parse_with_options(&email_raw, email_address::Options::default())
            .map_err(|_| Error::InvalidEmailFormat { email: email_raw })?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "mailbox password is required".into(),
        })?;

        // Resolve IMAP host: explicit > registry > default discovery
        let imap_host = self.imap_host.or_else(|| {
            self.server_registry
                .map(|registry| registry.discover(email.as_str()).into_owned())
        });

        Ok(MailboxConfig {
            email,
            password: SecretString::from(password_raw),
            imap_host,
            imap_port: self.imap_port.unwrap_or(993),
            proxy: self.proxy,
            timeouts: self.timeouts.unwrap_or_default(),
            polling: self.polling.unwrap_or_default(),
        })
    }
}

/// Options for the automated browser instance.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Proxy server passed to the browser (e.g. "socks5://127.0.0.1:1080").
    pub proxy: Option<String>,
    /// User-agent string override.
    pub user_agent: Option<String>,
    /// Explicit path to the browser binary. When unset, the system install is used.
    pub chrome_executable: Option<PathBuf>,
    /// Window size (width, height).
    pub window_size: (u32, u32),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            user_agent: None,
            chrome_executable: None,
            window_size: (1920, 1080),
        }
    }
}

/// Retry policy for rate-limited and transient failures.
///
/// Delays follow an exponential schedule (`base_delay` doubling per attempt,
/// capped at `max_delay`) with random jitter added at sleep time so repeated
/// runs never retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the computed delay (before jitter).
    pub max_delay: Duration,
    /// Maximum number of submission attempts (including the first).
    pub max_attempts: u32,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
    /// How many transient (non-rate-limit) failures may be retried per run.
    pub transient_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: 4,
            jitter: Duration::from_millis(750),
            transient_retries: 2,
        }
    }
}

impl RetryPolicy {
    /// Returns the deterministic (pre-jitter) delay for the given retry.
    ///
    /// `attempt` counts completed attempts, so the delay after the first
    /// failure is `delay_for_attempt(1) == base_delay`. The schedule doubles
    /// per attempt and plateaus at [`max_delay`](Self::max_delay).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Returns the delay for the given retry with random jitter applied.
    #[must_use]
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let jitter_ms = self.jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        if jitter_ms == 0 {
            return base;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        base + Duration::from_millis(extra)
    }
}

/// Settings for the verification-code exchange.
#[derive(Debug, Clone)]
pub struct VerificationSettings {
    /// How long the mailbox poller may wait for the code email.
    pub deadline: Duration,
    /// Substring the sender address must contain (e.g. "m-team.cc").
    pub sender_pattern: Option<String>,
    /// Substring the subject must contain (e.g. "verification").
    pub subject_pattern: Option<String>,
    /// Number of digits in the expected code.
    pub code_digits: usize,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(300),
            sender_pattern: None,
            subject_pattern: None,
            code_digits: 6,
        }
    }
}

/// Top-level configuration for one login run.
///
/// Create using [`LoginConfig::builder()`]. All validation happens in
/// [`build()`](LoginConfigBuilder::build), before any browser or mail
/// resource is acquired.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// URL of the site's login page.
    pub login_url: String,
    /// Site credentials.
    pub credentials: SiteCredentials,
    /// Verification mailbox configuration.
    pub mailbox: MailboxConfig,
    /// Browser instance options.
    pub browser: BrowserOptions,
    /// Pacing profile for humanized interaction timing.
    pub pacing: PacingProfile,
    /// Retry/backoff policy.
    pub retry: RetryPolicy,
    /// Verification-code exchange settings.
    pub verification: VerificationSettings,
}

impl LoginConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LoginConfigBuilder {
        LoginConfigBuilder::default()
    }
}

/// Builder for [`LoginConfig`].
#[derive(Debug, Default)]
pub struct LoginConfigBuilder {
    login_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    mailbox: Option<MailboxConfig>,
    browser: Option<BrowserOptions>,
    pacing: Option<PacingProfile>,
    retry: Option<RetryPolicy>,
    verification: Option<VerificationSettings>,
}

impl LoginConfigBuilder {
    /// Sets the login page URL (required).
    #[must_use]
    pub fn login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    /// Sets the site username (required).
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the site password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the verification mailbox configuration (required).
    #[must_use]
    pub fn mailbox(mut self, mailbox: MailboxConfig) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// Sets browser options.
    #[must_use]
    pub fn browser(mut self, browser: BrowserOptions) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Toggles headless operation.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.browser.get_or_insert_with(BrowserOptions::default).headless = headless;
        self
    }

    /// Sets the browser-level proxy server.
    #[must_use]
    pub fn browser_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.browser.get_or_insert_with(BrowserOptions::default).proxy = Some(proxy.into());
        self
    }

    /// Sets the user-agent override.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.browser
            .get_or_insert_with(BrowserOptions::default)
            .user_agent = Some(user_agent.into());
        self
    }

    /// Sets the pacing profile.
    #[must_use]
    pub fn pacing(mut self, pacing: PacingProfile) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Sets the retry/backoff policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the verification-code exchange settings.
    #[must_use]
    pub fn verification(mut self, verification: VerificationSettings) -> Self {
        self.verification = Some(verification);
        self
    }

    /// Sets the mailbox polling deadline for code retrieval.
    #[must_use]
    pub fn verification_deadline(mut self, deadline: Duration) -> Self {
        self.verification
            .get_or_insert_with(VerificationSettings::default)
            .deadline = deadline;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<LoginConfig> {
        let login_url = self.login_url.ok_or_else(|| Error::InvalidConfig {
            message: "login_url is required".into(),
        })?;
        if !login_url.starts_with("http://") && !login_url.starts_with("https://") {
            return Err(Error::InvalidConfig {
                message: format!("login_url must be an http(s) URL, got '{login_url}'"),
            });
        }

        let username = self.username.ok_or_else(|| Error::InvalidConfig {
            message: "site username is required".into(),
        })?;
        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "site password is required".into(),
        })?;
        let credentials = SiteCredentials::new(username, password)?;

        let mailbox = self.mailbox.ok_or_else(|| Error::InvalidConfig {
            message: "mailbox configuration is required".into(),
        })?;

        let retry = self.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(Error::InvalidConfig {
                message: "retry.max_attempts must be at least 1".into(),
            });
        }

        let verification = self.verification.unwrap_or_default();
        if verification.code_digits == 0 {
            return Err(Error::InvalidConfig {
                message: "verification.code_digits must be at least 1".into(),
            });
        }

        Ok(LoginConfig {
            login_url,
            credentials,
            mailbox,
            browser: self.browser.unwrap_or_default(),
            pacing: self.pacing.unwrap_or_default(),
            retry,
            verification,
        })
    }
}
