//! Terminal outcomes of a login run.

use crate::error::Error;
use std::time::Duration;

/// How a login run ended.
///
/// Every run resolves to exactly one outcome (cancellation excepted, which
/// surfaces as [`Error::Cancelled`]). Retries happen inside the run; the
/// outcome describes the final state after all retry budgets are spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The site shows a logged-in page.
    Success,
    /// Rate limiting persisted through the whole attempt budget.
    RateLimited {
        /// Retry-after hint from the site's last response, if any.
        retry_after: Option<Duration>,
    },
    /// No matching verification code arrived before the deadline.
    VerificationTimeout,
    /// The site rejected the credentials. Never retried.
    CredentialRejected,
    /// A browser, network, or mail failure that exhausted the transient
    /// retry budget. A later run may succeed.
    TransientFailure,
}

impl LoginOutcome {
    /// Returns `true` for [`LoginOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success)
    }

    /// Maps a terminal error to its run outcome.
    ///
    /// Cancellation and mailbox authentication failures never reach this
    /// mapping; the orchestrator surfaces them as errors from `run`.
    pub(crate) fn from_error(error: &Error) -> Self {
        match error {
            Error::RateLimited { retry_after } => LoginOutcome::RateLimited {
                retry_after: *retry_after,
            },
            Error::VerificationTimeout { .. } => LoginOutcome::VerificationTimeout,
            Error::CredentialRejected => LoginOutcome::CredentialRejected,
            _ => LoginOutcome::TransientFailure,
        }
    }
}

impl std::fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginOutcome::Success => write!(f, "success"),
            LoginOutcome::RateLimited { retry_after: None } => write!(f, "rate limited"),
            LoginOutcome::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (retry after {d:?})"),
            LoginOutcome::VerificationTimeout => write!(f, "verification timeout"),
            LoginOutcome::CredentialRejected => write!(f, "credentials rejected"),
            LoginOutcome::TransientFailure => write!(f, "transient failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_mapping() {
        let outcome = LoginOutcome::from_error(&Error::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        });
        assert_eq!(
            outcome,
            LoginOutcome::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );

        let outcome = LoginOutcome::from_error(&Error::VerificationTimeout {
            timeout: Duration::from_secs(300),
        });
        assert_eq!(outcome, LoginOutcome::VerificationTimeout);

        let outcome = LoginOutcome::from_error(&Error::CredentialRejected);
        assert_eq!(outcome, LoginOutcome::CredentialRejected);

        let outcome = LoginOutcome::from_error(&Error::PageStateUndetermined { checks: 5 });
        assert_eq!(outcome, LoginOutcome::TransientFailure);
    }

    #[test]
    fn test_display() {
        assert_eq!(LoginOutcome::Success.to_string(), "success");
        assert!(LoginOutcome::RateLimited {
            retry_after: Some(Duration::from_secs(5))
        }
        .to_string()
        .contains("retry after"));
    }

    #[test]
    fn test_is_success() {
        assert!(LoginOutcome::Success.is_success());
        assert!(!LoginOutcome::TransientFailure.is_success());
    }
}
