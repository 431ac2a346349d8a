//! Error types for the login-sync crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are classified two ways: retryability ([`Error::is_retryable`]) decides whether
//! the orchestrator may try again with backoff, and fatality ([`Error::is_fatal`]) marks
//! conditions that must terminate the run immediately (retrying a rejected credential
//! risks an account lockout).

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a login run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid mailbox address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Browser session errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The browser instance could not be started.
    ///
    /// Covers a missing/incompatible browser binary as well as launch failures.
    /// Retryable within the transient budget (launches can be flaky), but a
    /// missing binary will keep failing with the same message.
    #[error("failed to start browser session: {message}")]
    SessionStart {
        /// What went wrong during startup.
        message: String,
        /// The underlying CDP error, if the launch itself failed.
        #[source]
        source: Option<chromiumoxide::error::CdpError>,
    },

    /// Navigation to a page failed.
    #[error("failed to navigate to {url}")]
    Navigation {
        /// The URL that failed to load.
        url: String,
        /// The underlying CDP error.
        #[source]
        source: chromiumoxide::error::CdpError,
    },

    /// A required page element never appeared within the bounded wait.
    #[error("element '{role}' not found within {timeout:?}")]
    ElementNotFound {
        /// The role of the missing element (e.g. "username field").
        role: String,
        /// The wait that was exhausted.
        timeout: Duration,
    },

    /// A page-level command (click, type, evaluate) failed.
    #[error("page command '{action}' failed")]
    PageCommand {
        /// The command that failed.
        action: &'static str,
        /// The underlying CDP error.
        #[source]
        source: chromiumoxide::error::CdpError,
    },

    /// The post-submit page state could not be classified.
    ///
    /// Raised after the bounded number of re-checks all returned an unknown
    /// state. Retryable as a transient failure.
    #[error("page state undetermined after {checks} checks")]
    PageStateUndetermined {
        /// How many classification attempts were made.
        checks: u32,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Site-signalled conditions
    // ─────────────────────────────────────────────────────────────────────────
    /// The site rejected the credentials (FATAL - never retried).
    #[error("credentials rejected by the site")]
    CredentialRejected,

    /// The site reported rate limiting (retryable with backoff, bounded attempts).
    #[error("rate limited by the site")]
    RateLimited {
        /// Retry-after hint extracted from the page, if any.
        retry_after: Option<Duration>,
    },

    /// A verification request was issued while another is still outstanding.
    ///
    /// At most one verification request may be active per session.
    #[error("a verification request is already outstanding for this session")]
    VerificationPending,

    /// The mailbox never produced a matching code before the deadline (fatal for the run).
    #[error("no verification code arrived within {timeout:?}")]
    VerificationTimeout {
        /// The polling deadline that was exhausted.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Mailbox errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Authentication against the mail server failed (FATAL - configuration issue).
    ///
    /// Typically an invalid or expired app-specific password. Distinct from
    /// [`Error::VerificationTimeout`]: retrying will not help, fix the mailbox
    /// configuration instead.
    #[error("mail server authentication failed for {email}")]
    MailAuth {
        /// The mailbox address used for authentication.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to establish TCP connection to the mail server.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection to the mail server.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect via SOCKS5 proxy.
    #[error("failed to connect via SOCKS5 proxy {proxy_host} to {target}")]
    Socks5Connect {
        /// The SOCKS5 proxy hostname.
        proxy_host: String,
        /// The target address.
        target: String,
        /// The underlying SOCKS5 error.
        #[source]
        source: tokio_socks::Error,
    },

    /// Connection to the mail server timed out.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// An IMAP protocol operation failed (retryable - could be a transient server issue).
    #[error("IMAP {action} failed")]
    MailOp {
        /// The IMAP operation that failed (select, search, fetch, logout, ...).
        action: &'static str,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// An IMAP protocol operation timed out.
    #[error("IMAP {action} timeout after {timeout:?}")]
    MailOpTimeout {
        /// The IMAP operation that timed out.
        action: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Failed to parse an email message.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Run control
    // ─────────────────────────────────────────────────────────────────────────
    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error represents a condition that might succeed on retry.
    ///
    /// Retryable errors are retried locally by the orchestrator with bounded
    /// attempts and backoff; non-retryable errors propagate to the run's
    /// terminal outcome immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // RETRYABLE: rate limiting (with backoff), flaky launches, network,
            // page glitches, transient IMAP failures
            Error::RateLimited { .. }
            | Error::SessionStart { .. }
            | Error::Navigation { .. }
            | Error::ElementNotFound { .. }
            | Error::PageCommand { .. }
            | Error::PageStateUndetermined { .. }
            | Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::Socks5Connect { .. }
            | Error::ConnectTimeout { .. }
            | Error::MailOp { .. }
            | Error::MailOpTimeout { .. } => true,

            // NOT retryable: configuration, fatal site/mail signals, exhausted
            // deadlines, parsing, cancellation
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::CredentialRejected
            | Error::VerificationPending
            | Error::VerificationTimeout { .. }
            | Error::MailAuth { .. }
            | Error::ParseEmail { .. }
            | Error::Cancelled => false,
        }
    }

    /// Returns `true` if this error must terminate the run without any retry.
    ///
    /// Credential rejection is never retried (repeat attempts risk account
    /// lockout); mail auth failure is a configuration issue retrying cannot fix.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CredentialRejected
                | Error::MailAuth { .. }
                | Error::VerificationTimeout { .. }
                | Error::VerificationPending
                | Error::Cancelled
        )
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::MailAuth { .. } => ErrorCategory::Configuration,

            Error::SessionStart { .. }
            | Error::Navigation { .. }
            | Error::ElementNotFound { .. }
            | Error::PageCommand { .. }
            | Error::PageStateUndetermined { .. } => ErrorCategory::Browser,

            Error::CredentialRejected | Error::RateLimited { .. } => ErrorCategory::Site,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } | Error::Socks5Connect { .. } => {
                ErrorCategory::Network
            }

            Error::ConnectTimeout { .. }
            | Error::MailOpTimeout { .. }
            | Error::VerificationTimeout { .. } => ErrorCategory::Timeout,

            Error::MailOp { .. } => ErrorCategory::Mail,

            Error::ParseEmail { .. } => ErrorCategory::Parse,

            Error::VerificationPending | Error::Cancelled => ErrorCategory::Control,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors (including mail auth failures).
    Configuration,
    /// Browser session and page interaction errors.
    Browser,
    /// Conditions signalled by the target site.
    Site,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Mail,
    /// Email parsing errors.
    Parse,
    /// Run-control conditions (cancellation, invariant violations).
    Control,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Browser => write!(f, "browser"),
            ErrorCategory::Site => write!(f, "site"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Mail => write!(f, "mail"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Control => write!(f, "control"),
        }
    }
}
