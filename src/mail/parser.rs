//! Internal module for parsing fetched messages.
//!
//! Parsing is resilient: a malformed message is logged and skipped rather
//! than failing the whole poll, so one broken email never blocks code
//! retrieval.

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{parse_mail, MailHeaderMap};
use tracing::{debug, warn};

/// The envelope fields and body text the poller matches against.
#[derive(Debug, Clone)]
pub(crate) struct ParsedMessage {
    /// Raw `From:` header value.
    pub from: String,
    /// Decoded `Subject:` header value.
    pub subject: String,
    /// Parsed `Date:` header, if present and well-formed.
    pub date: Option<DateTime<Utc>>,
    /// Extracted body text (first text part for multipart messages).
    pub body: String,
}

/// Parses an IMAP fetch result into a [`ParsedMessage`].
///
/// Returns `None` if the message has no body or cannot be parsed; the caller
/// continues with the next message.
pub(crate) fn parse_message(message: &async_imap::types::Fetch) -> Option<ParsedMessage> {
    let uid = message.uid;

    let Some(raw) = message.body() else {
        debug!(uid, "Message has no body");
        return None;
    };

    let parsed = match parse_mail(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(uid, error = %e, "Failed to parse email, skipping message");
            return None;
        }
    };

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single());

    let body = match extract_body_text(&parsed) {
        Ok(t) => t,
        Err(e) => {
            warn!(uid, error = %e, "Failed to extract body from email, skipping message");
            return None;
        }
    };

    Some(ParsedMessage {
        from,
        subject,
        date,
        body,
    })
}

/// Extracts text content from a parsed email, handling multipart messages.
fn extract_body_text(
    parsed: &mailparse::ParsedMail<'_>,
) -> Result<String, mailparse::MailParseError> {
    if !parsed.subparts.is_empty() {
        // Prefer text parts
        for part in &parsed.subparts {
            let content_type = part.ctype.mimetype.to_lowercase();
            if content_type == "text/plain" || content_type == "text/html" {
                if let Ok(body) = part.get_body() {
                    return Ok(body);
                }
            }
        }

        if let Some(first_part) = parsed.subparts.first() {
            return extract_body_text(first_part);
        }
    }

    parsed.get_body()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_body_text_simple() {
        let raw = b"From: noreply@site.example\r\nTo: user@example.com\r\n\r\nYour code is 483920.";
        let parsed = parse_mail(raw).unwrap();
        let text = extract_body_text(&parsed).unwrap();
        assert!(text.contains("483920"));
    }

    #[test]
    fn test_header_extraction() {
        let raw = b"From: noreply@site.example\r\nSubject: Verification code\r\nDate: Mon, 10 Aug 2026 12:30:00 +0000\r\n\r\nYour code is 483920.";
        let parsed = parse_mail(raw).unwrap();

        let from = parsed.headers.get_first_value("From").unwrap();
        assert_eq!(from, "noreply@site.example");

        let epoch = mailparse::dateparse(&parsed.headers.get_first_value("Date").unwrap()).unwrap();
        let date = Utc.timestamp_opt(epoch, 0).single().unwrap();
        assert_eq!(date.format("%Y-%m-%d %H:%M").to_string(), "2026-08-10 12:30");
    }

    #[test]
    fn test_multipart_prefers_text_part() {
        let raw = b"From: a@b.c\r\nContent-Type: multipart/alternative; boundary=\"sep\"\r\n\r\n--sep\r\nContent-Type: text/plain\r\n\r\ncode 111222\r\n--sep\r\nContent-Type: text/html\r\n\r\n<p>code 111222</p>\r\n--sep--\r\n";
        let parsed = parse_mail(raw).unwrap();
        let text = extract_body_text(&parsed).unwrap();
        assert!(text.contains("111222"));
    }
}
