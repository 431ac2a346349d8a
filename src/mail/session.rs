//! Internal IMAP session management.
//!
//! Wraps async-imap operations with error mapping. Authentication failures
//! map to the fatal [`Error::MailAuth`]; everything else folds into the
//! retryable [`Error::MailOp`] taxonomy.

use crate::error::{Error, Result};
use crate::mail::connection::TlsStream;
use async_imap::Session;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Type alias for an IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Authenticates to the mail server and returns a session.
///
/// Login failure is surfaced as [`Error::MailAuth`] - a fatal configuration
/// issue (typically an invalid or expired app password), never retried.
#[instrument(name = "mail::session::authenticate", skip_all, fields(email = %email))]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    email: &str,
    password: &str,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to mail server");

    client.login(email, password).await.map_err(|e| Error::MailAuth {
        email: email.to_string(),
        source: e.0,
    })
}

/// Selects a mailbox (typically "INBOX").
#[instrument(name = "mail::session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    session
        .select(mailbox)
        .await
        .map_err(|source| Error::MailOp {
            action: "select",
            source,
        })?;

    Ok(())
}

/// Searches for message UIDs received since the given date.
///
/// IMAP SINCE has day granularity; the caller filters by exact `Date:` header
/// afterwards.
#[instrument(
    name = "mail::session::search_since",
    skip(session),
    fields(since_date = %since_date)
)]
pub(crate) async fn search_since(
    session: &mut ImapSession,
    since_date: NaiveDate,
) -> Result<Vec<u32>> {
    // NOOP first so the server reflects messages delivered since the last command
    session.noop().await.map_err(|source| Error::MailOp {
        action: "noop",
        source,
    })?;

    // IMAP SINCE format: "DD-Mon-YYYY" (e.g., "07-Dec-2025")
    let query = format!("SINCE {}", since_date.format("%d-%b-%Y"));

    let uids = session
        .uid_search(&query)
        .await
        .map_err(|source| Error::MailOp {
            action: "search",
            source,
        })?;

    let mut uids_vec: Vec<u32> = uids.into_iter().collect();
    uids_vec.sort_unstable();

    debug!(uid_count = uids_vec.len(), "Found candidate messages");

    Ok(uids_vec)
}

/// Fetches full messages by UID range as a stream.
pub(crate) async fn fetch_by_uid_range<'a>(
    session: &'a mut ImapSession,
    uid_range: &str,
) -> Result<BoxStream<'a, std::result::Result<async_imap::types::Fetch, async_imap::error::Error>>>
{
    debug!(uid_range = %uid_range, "Fetching messages");

    let stream = session
        .uid_fetch(uid_range, "BODY[]")
        .await
        .map_err(|source| Error::MailOp {
            action: "fetch",
            source,
        })?;

    Ok(stream.boxed())
}

/// Flags a message deleted and expunges it from the mailbox.
#[instrument(name = "mail::session::delete", skip(session), fields(uid = uid))]
pub(crate) async fn delete_message(session: &mut ImapSession, uid: u32) -> Result<()> {
    let sequence = uid.to_string();

    {
        let mut responses = session
            .uid_store(&sequence, "+FLAGS (\\Deleted)")
            .await
            .map_err(|source| Error::MailOp {
                action: "store",
                source,
            })?;
        while let Some(response) = responses.next().await {
            response.map_err(|source| Error::MailOp {
                action: "store",
                source,
            })?;
        }
    }

    let expunged = session.expunge().await.map_err(|source| Error::MailOp {
        action: "expunge",
        source,
    })?;
    let mut expunged = std::pin::pin!(expunged);
    while let Some(sequence) = expunged.next().await {
        sequence.map_err(|source| Error::MailOp {
            action: "expunge",
            source,
        })?;
    }

    Ok(())
}

/// Logs out from the IMAP session.
#[instrument(name = "mail::session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    session.logout().await.map_err(|source| Error::MailOp {
        action: "logout",
        source,
    })?;

    Ok(())
}
