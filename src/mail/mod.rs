//! Mailbox polling for verification codes.
//!
//! The [`MailboxPoller`] connects to the verification mailbox over IMAP and
//! repeatedly searches for a message satisfying a [`VerificationRequest`]
//! until the code arrives, the request deadline elapses, or the run is
//! cancelled. Messages may arrive out of order or in duplicate; the poller
//! always selects the newest matching message after the request timestamp.
//!
//! # Example
//!
//! ```no_run
//! use login_sync::mail::{MailboxPoller, VerificationRequest};
//! use login_sync::matcher::CodeMatcher;
//! use login_sync::MailboxConfig;
//! use chrono::Utc;
//! use std::time::Duration;
//! use tokio::sync::watch;
//!
//! # async fn example() -> login_sync::Result<()> {
//! let config = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let poller = MailboxPoller::new(config);
//! let request = VerificationRequest::new(Utc::now(), Duration::from_secs(300))
//!     .sender_pattern("site.example");
//!
//! let (_cancel_tx, mut cancel_rx) = watch::channel(false);
//! let code = poller
//!     .await_code(&request, &CodeMatcher::six_digit(), &mut cancel_rx)
//!     .await?;
//! println!("Got code: {}", code.as_str());
//! # Ok(())
//! # }
//! ```

mod connection;
mod parser;
mod session;

use crate::config::MailboxConfig;
use crate::error::{Error, Result};
use crate::matcher::Matcher;
use crate::util;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parser::ParsedMessage;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Allowance for clock skew between this host and the mail server when
/// filtering by the `Date:` header.
const CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Extra margin subtracted from the IMAP SINCE search date. SINCE has day
/// granularity, so this only matters around midnight.
const SEARCH_MARGIN: chrono::Duration = chrono::Duration::minutes(2);

/// Captures one outstanding code request: when it was triggered, what the
/// matching message must look like, and how long to keep polling.
///
/// Created by the orchestrator at the moment the site indicates a code was
/// sent; consumed by the poller once resolved or timed out.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// When the site was asked to send the code.
    pub requested_at: DateTime<Utc>,
    /// Substring the sender address must contain (case-insensitive).
    pub sender_pattern: Option<String>,
    /// Substring the subject must contain (case-insensitive).
    pub subject_pattern: Option<String>,
    /// How long the poller may wait for the code email.
    pub deadline: Duration,
}

impl VerificationRequest {
    /// Creates a request with no sender/subject constraints.
    #[must_use]
    pub fn new(requested_at: DateTime<Utc>, deadline: Duration) -> Self {
        Self {
            requested_at,
            sender_pattern: None,
            subject_pattern: None,
            deadline,
        }
    }

    /// Requires the sender address to contain the given substring.
    #[must_use]
    pub fn sender_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.sender_pattern = Some(pattern.into());
        self
    }

    /// Requires the subject to contain the given substring.
    #[must_use]
    pub fn subject_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.subject_pattern = Some(pattern.into());
        self
    }
}

/// A verification code extracted from a matched email.
///
/// Codes have a site-imposed freshness window and are consumed in a single
/// step: ownership transfers from poller to orchestrator to browser driver,
/// never cached or reused.
pub struct VerificationCode(String);

impl VerificationCode {
    /// Wraps an extracted code string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the code, yielding the inner string for submission.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Codes are short-lived secrets; log the shape, not the value.
        write!(f, "VerificationCode({} chars)", self.0.len())
    }
}

/// A matched message that yielded a parseable code.
#[derive(Debug)]
struct MatchCandidate {
    /// Server UID of the matched message, when the fetch response carried one.
    uid: Option<u32>,
    date: DateTime<Utc>,
    code: String,
}

/// Polls an IMAP mailbox for verification-code emails.
///
/// Create with [`MailboxPoller::new`]; each [`await_code`](Self::await_code)
/// call opens its own connection and logs out when done, so a poller can be
/// reused across runs.
#[derive(Debug, Clone)]
pub struct MailboxPoller {
    config: MailboxConfig,
}

impl MailboxPoller {
    /// Creates a poller over the given mailbox configuration.
    #[must_use]
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    /// Returns the mailbox address this poller reads from.
    #[must_use]
    pub fn email(&self) -> &str {
        self.config.email()
    }

    /// Waits for a verification code matching the request.
    ///
    /// Polls at the configured interval until a matching message yields a
    /// parseable code or `request.deadline` elapses. Never blocks past the
    /// deadline by more than one poll interval. The wait is cancellable via
    /// the watch channel.
    ///
    /// # Errors
    ///
    /// - [`Error::MailAuth`] if mail server authentication fails (fatal,
    ///   fix the app password)
    /// - [`Error::VerificationTimeout`] if no matching code arrives in time
    /// - [`Error::Cancelled`] if the run-level cancellation signal fires
    /// - Connection/protocol errors from the underlying IMAP operations
    #[instrument(
        name = "MailboxPoller::await_code",
        skip_all,
        fields(
            email = %self.config.email(),
            imap_host = %self.config.effective_imap_host(),
            matcher = %matcher.description(),
            deadline_secs = request.deadline.as_secs()
        )
    )]
    pub async fn await_code(
        &self,
        request: &VerificationRequest,
        matcher: &dyn Matcher,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<VerificationCode> {
        let hard_deadline = Instant::now() + request.deadline;
        let mut session = self.open_session().await?;

        let result = self
            .poll_until_deadline(&mut session, request, matcher, cancel, hard_deadline)
            .await;

        // Logout is best-effort; the code (or error) is already decided.
        let logout_timeout = self.config.timeouts.logout;
        if tokio::time::timeout(logout_timeout, session::logout(&mut session))
            .await
            .is_err()
        {
            debug!("Logout timed out, dropping connection");
        }

        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Connects, authenticates, and selects the inbox.
    async fn open_session(&self) -> Result<session::ImapSession> {
        let imap_host = self.config.effective_imap_host();
        let target_addr = self.config.server_address();
        let timeouts = &self.config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls(&imap_host, &target_addr, self.config.proxy.as_ref()),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        let mut session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, self.config.email(), self.config.password()),
        )
        .await
        .map_err(|_| Error::MailOpTimeout {
            action: "login",
            timeout: timeouts.auth,
        })??;

        tokio::time::timeout(
            timeouts.select,
            session::select_mailbox(&mut session, "INBOX"),
        )
        .await
        .map_err(|_| Error::MailOpTimeout {
            action: "select",
            timeout: timeouts.select,
        })??;

        debug!("Mailbox session ready");

        Ok(session)
    }

    async fn poll_until_deadline(
        &self,
        session: &mut session::ImapSession,
        request: &VerificationRequest,
        matcher: &dyn Matcher,
        cancel: &mut watch::Receiver<bool>,
        hard_deadline: Instant,
    ) -> Result<VerificationCode> {
        let poll_interval = self.config.polling.interval;
        let since_date = (request.requested_at - SEARCH_MARGIN).date_naive();
        // UID watermark: messages at or below this have already been examined.
        let mut seen_uid = 0u32;

        loop {
            if Instant::now() >= hard_deadline {
                return Err(Error::VerificationTimeout {
                    timeout: request.deadline,
                });
            }

            if let Some(candidate) = self
                .check_new_messages(session, request, matcher, since_date, &mut seen_uid)
                .await?
            {
                info!(
                    message_date = %candidate.date,
                    "Verification code extracted"
                );
                self.delete_consumed_message(session, candidate.uid).await;
                return Ok(VerificationCode::new(candidate.code));
            }

            // Sleep one interval, trimmed so we never overshoot the deadline,
            // and abort promptly on cancellation.
            let remaining = hard_deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                () = tokio::time::sleep(next_poll_wait(remaining, poll_interval)) => {}
                () = util::cancelled(cancel) => return Err(Error::Cancelled),
            }
        }
    }

    /// Fetches messages above the UID watermark and returns the newest match.
    async fn check_new_messages(
        &self,
        session: &mut session::ImapSession,
        request: &VerificationRequest,
        matcher: &dyn Matcher,
        since_date: chrono::NaiveDate,
        seen_uid: &mut u32,
    ) -> Result<Option<MatchCandidate>> {
        let timeouts = &self.config.timeouts;

        let uids = tokio::time::timeout(timeouts.search, session::search_since(session, since_date))
            .await
            .map_err(|_| Error::MailOpTimeout {
                action: "search",
                timeout: timeouts.search,
            })??;

        let new_uids: Vec<u32> = uids.into_iter().filter(|&uid| uid > *seen_uid).collect();
        let Some(&max_uid) = new_uids.iter().max() else {
            return Ok(None);
        };
        let min_uid = *new_uids.iter().min().unwrap_or(&max_uid);
        let uid_range = format!("{min_uid}:{max_uid}");

        let mut candidates = Vec::new();
        {
            let mut fetch_stream = tokio::time::timeout(
                timeouts.fetch,
                session::fetch_by_uid_range(session, &uid_range),
            )
            .await
            .map_err(|_| Error::MailOpTimeout {
                action: "fetch",
                timeout: timeouts.fetch,
            })??;

            while let Some(message_result) = fetch_stream.next().await {
                let message = message_result.map_err(|source| Error::MailOp {
                    action: "fetch",
                    source,
                })?;

                let Some(parsed) = parser::parse_message(&message) else {
                    continue; // malformed message: skip, keep polling
                };

                if let Some(mut candidate) = evaluate_message(&parsed, request, matcher) {
                    candidate.uid = message.uid;
                    candidates.push(candidate);
                }
            }
        }

        *seen_uid = max_uid;

        Ok(select_newest(candidates))
    }

    /// Removes the consumed code email so a stale code cannot be picked up by
    /// a later run. Best-effort; the code is already extracted.
    async fn delete_consumed_message(
        &self,
        session: &mut session::ImapSession,
        uid: Option<u32>,
    ) {
        let Some(uid) = uid else {
            debug!("Fetch response carried no UID, leaving code email in place");
            return;
        };

        let timeout = self.config.timeouts.fetch;
        match tokio::time::timeout(timeout, session::delete_message(session, uid)).await {
            Ok(Ok(())) => debug!(uid, "Consumed code email deleted"),
            Ok(Err(e)) => debug!(uid, error = %e, "Could not delete code email"),
            Err(_) => debug!(uid, "Code email deletion timed out"),
        }
    }
}

/// Sleep before the next poll: one interval, trimmed to the remaining
/// deadline so the loop never overshoots it by more than a poll.
fn next_poll_wait(remaining: Duration, poll_interval: Duration) -> Duration {
    poll_interval.min(remaining.max(Duration::from_millis(1)))
}

/// Checks a parsed message against the request and extracts its code.
///
/// A message that matches the envelope constraints but yields no parseable
/// code is treated as a non-match.
fn evaluate_message(
    message: &ParsedMessage,
    request: &VerificationRequest,
    matcher: &dyn Matcher,
) -> Option<MatchCandidate> {
    if !matches_request(message, request) {
        return None;
    }

    let code = matcher.find_match(&message.body)?;
    let date = message.date?;

    debug!(
        from = %message.from,
        subject = %message.subject,
        date = %date,
        "Message matched verification request"
    );

    Some(MatchCandidate {
        uid: None,
        date,
        code: code.into_owned(),
    })
}

/// Envelope filter: sender/subject substrings and arrival after the request.
fn matches_request(message: &ParsedMessage, request: &VerificationRequest) -> bool {
    if let Some(pattern) = &request.sender_pattern {
        if !message.from.to_lowercase().contains(&pattern.to_lowercase()) {
            return false;
        }
    }

    if let Some(pattern) = &request.subject_pattern {
        if !message
            .subject
            .to_lowercase()
            .contains(&pattern.to_lowercase())
        {
            return false;
        }
    }

    // Only messages that arrived after the code was requested count; undated
    // messages cannot be ordered and are skipped.
    let skew = chrono::Duration::from_std(CLOCK_SKEW).unwrap_or_else(|_| chrono::Duration::zero());
    match message.date {
        Some(date) => date >= request.requested_at - skew,
        None => false,
    }
}

/// Selects the candidate with the latest `Date:` header.
///
/// Duplicate delivery and out-of-order arrival both resolve to the newest
/// matching message.
fn select_newest(candidates: Vec<MatchCandidate>) -> Option<MatchCandidate> {
    candidates.into_iter().max_by_key(|c| c.date)
}
