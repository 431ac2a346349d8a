//! Verification-code extraction from email bodies.
//!
//! The [`Matcher`] trait is the seam between the mailbox poller and the exact
//! shape of the site's code emails. Built-in implementations cover the common
//! N-digit numeric codes; implement the trait for anything more exotic.
//!
//! # Example
//!
//! ```
//! use login_sync::matcher::{CodeMatcher, Matcher, RegexMatcher};
//!
//! let otp = CodeMatcher::six_digit();
//! assert_eq!(otp.find_match("Your code is 483920.").as_deref(), Some("483920"));
//!
//! let custom = RegexMatcher::new(r"PIN:\s*([A-Z0-9]{4})").unwrap();
//! assert_eq!(custom.find_match("PIN: 7QX2").as_deref(), Some("7QX2"));
//! ```

use regex::Regex;
use std::borrow::Cow;

/// Trait for extracting a verification code from message text.
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract the code from the text.
    ///
    /// Returns `Some(code)` if found, `None` otherwise. Uses `Cow<str>` to
    /// avoid allocations when the match can be borrowed from the input.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// A human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// Regex-based matcher that extracts the first capture group.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Creates a new regex matcher.
    ///
    /// The regex should contain at least one capture group; the first capture
    /// group is extracted as the code.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(Self {
            description: format!("regex pattern: {pattern}"),
            regex,
        })
    }

    /// Creates a new regex matcher with a custom description.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn with_description(
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(Self {
            description: description.into(),
            regex,
        })
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Matcher for the numeric one-time codes most sites email.
///
/// # Example
///
/// ```
/// use login_sync::matcher::{CodeMatcher, Matcher};
///
/// let otp = CodeMatcher::six_digit();
/// assert_eq!(otp.find_match("輸入 123456 完成驗證"), Some("123456".into()));
/// assert_eq!(otp.find_match("Order #12345 shipped"), None); // only 5 digits
/// ```
#[derive(Debug, Clone)]
pub struct CodeMatcher {
    inner: RegexMatcher,
}

impl CodeMatcher {
    /// Creates a matcher for 6-digit codes (the most common format).
    #[must_use]
    pub fn six_digit() -> Self {
        Self::n_digit(6)
    }

    /// Creates a matcher for N-digit codes, delimited by word boundaries so
    /// longer digit runs never match partially.
    ///
    /// # Panics
    ///
    /// Panics if `digits` is 0.
    #[must_use]
    pub fn n_digit(digits: usize) -> Self {
        assert!(digits > 0, "digits must be > 0");
        let pattern = format!(r"\b(\d{{{digits}}})\b");
        Self {
            inner: RegexMatcher::with_description(
                &pattern,
                format!("{digits}-digit verification code"),
            )
            .expect("valid regex"),
        }
    }

    /// Creates a matcher with a custom code pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn custom(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            inner: RegexMatcher::with_description(pattern, "custom code pattern")?,
        })
    }
}

impl Matcher for CodeMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.inner.find_match(text)
    }

    fn description(&self) -> &str {
        self.inner.description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_matcher() {
        let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
        assert_eq!(
            matcher.find_match("Your code: 12345").as_deref(),
            Some("12345")
        );
        assert_eq!(matcher.find_match("No code here"), None);
    }

    #[test]
    fn test_six_digit_code() {
        let otp = CodeMatcher::six_digit();
        assert_eq!(
            otp.find_match("Your code is 483920.").as_deref(),
            Some("483920")
        );
        assert_eq!(otp.find_match("Code: 12345"), None); // 5 digits
        assert_eq!(otp.find_match("Code: 1234567"), None); // 7 digits
    }

    #[test]
    fn test_n_digit_code() {
        let otp = CodeMatcher::n_digit(4);
        assert_eq!(otp.find_match("PIN: 1234").as_deref(), Some("1234"));
        assert_eq!(otp.find_match("PIN: 12345"), None);
    }

    #[test]
    fn test_cjk_context() {
        // Codes embedded in CJK text still match on the digit boundary.
        let otp = CodeMatcher::six_digit();
        assert_eq!(
            otp.find_match("您的驗證碼為 654321，5分鐘內有效").as_deref(),
            Some("654321")
        );
    }

    #[test]
    fn test_regex_matcher_returns_borrowed() {
        let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
        let result = matcher.find_match("Your code: 12345");
        assert!(matches!(result, Some(Cow::Borrowed(_))));
    }
}
