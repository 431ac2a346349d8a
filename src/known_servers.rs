//! IMAP server discovery from mailbox domains.
//!
//! The verification mailbox usually lives at a well-known provider; this
//! module maps mail domains to their IMAP hostnames so configuration only
//! needs the address, with runtime customization for anything unusual.
//!
//! # Example
//!
//! ```
//! use login_sync::known_servers::{ServerRegistry, discover_imap_host};
//!
//! // Built-in discovery
//! assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
//!
//! // Custom registry for self-hosted mail
//! let mut registry = ServerRegistry::with_defaults();
//! registry.register("mycompany.com", "mail.mycompany.com");
//! assert_eq!(registry.discover("user@mycompany.com"), "mail.mycompany.com");
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Map of mail domains to their IMAP server hostnames.
static KNOWN_SERVERS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Google
    m.insert("gmail.com", "imap.gmail.com");

    // Microsoft
    m.insert("hotmail.com", "imap-mail.outlook.com");
    m.insert("outlook.com", "imap-mail.outlook.com");
    m.insert("live.com", "imap-mail.outlook.com");

    // Yahoo
    m.insert("yahoo.com", "imap.mail.yahoo.com");

    // Apple
    m.insert("icloud.com", "imap.mail.me.com");
    m.insert("me.com", "imap.mail.me.com");
    m.insert("mac.com", "imap.mail.me.com");

    // AOL
    m.insert("aol.com", "imap.aol.com");

    // Yandex
    m.insert("yandex.ru", "imap.yandex.ru");
    m.insert("yandex.com", "imap.yandex.ru");

    // German providers
    m.insert("web.de", "imap.web.de");
    m.insert("gmx.de", "imap.gmx.net");
    m.insert("gmx.net", "imap.gmx.net");
    m.insert("gmx.com", "imap.gmx.net");
    m.insert("t-online.de", "secureimap.t-online.de");

    // Mail.ru network
    m.insert("mail.ru", "imap.mail.ru");
    m.insert("bk.ru", "imap.mail.ru");
    m.insert("inbox.ru", "imap.mail.ru");
    m.insert("list.ru", "imap.mail.ru");

    m
});

/// A customizable registry for IMAP server discovery.
///
/// Adds custom domain-to-IMAP-host mappings at runtime, in addition to (or
/// overriding) the built-in defaults.
///
/// # Example
///
/// ```
/// use login_sync::known_servers::ServerRegistry;
///
/// let mut registry = ServerRegistry::with_defaults();
/// registry.register("partner.org", "mail.partner.org");
///
/// assert_eq!(registry.discover("user@partner.org"), "mail.partner.org");
/// assert_eq!(registry.discover("user@gmail.com"), "imap.gmail.com"); // built-in
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    custom: HashMap<String, String>,
    use_defaults: bool,
}

impl ServerRegistry {
    /// Creates an empty registry without built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that includes the built-in default mappings.
    ///
    /// Custom mappings added via [`Self::register`] override defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            custom: HashMap::new(),
            use_defaults: true,
        }
    }

    /// Registers a custom domain-to-IMAP-host mapping.
    ///
    /// Overrides any existing mapping, including built-in defaults.
    pub fn register(&mut self, domain: impl Into<String>, imap_host: impl Into<String>) {
        self.custom
            .insert(domain.into().to_lowercase(), imap_host.into());
    }

    /// Registers multiple domain mappings at once.
    pub fn register_many<I, D, H>(&mut self, mappings: I)
    where
        I: IntoIterator<Item = (D, H)>,
        D: Into<String>,
        H: Into<String>,
    {
        for (domain, host) in mappings {
            self.register(domain, host);
        }
    }

    /// Discovers the IMAP hostname for a mailbox address.
    ///
    /// Resolution order:
    /// 1. Custom mappings (added via [`Self::register`])
    /// 2. Built-in defaults (if [`Self::with_defaults`] was used)
    /// 3. Fallback to `imap.{domain}`
    #[must_use]
    pub fn discover(&self, email: &str) -> Cow<'_, str> {
        let domain = email.split('@').nth(1).unwrap_or(email).to_lowercase();

        if let Some(host) = self.custom.get(&domain) {
            return Cow::Borrowed(host);
        }

        if self.use_defaults {
            if let Some(&host) = KNOWN_SERVERS.get(domain.as_str()) {
                return Cow::Borrowed(host);
            }
        }

        Cow::Owned(format!("imap.{domain}"))
    }

    /// Returns `true` if the domain has a known IMAP server mapping.
    #[must_use]
    pub fn is_known(&self, domain: &str) -> bool {
        let domain_lower = domain.to_lowercase();
        self.custom.contains_key(&domain_lower)
            || (self.use_defaults && KNOWN_SERVERS.contains_key(domain_lower.as_str()))
    }
}

/// Discovers the IMAP hostname for a mailbox address using the built-in table.
///
/// Unknown domains fall back to `imap.{domain}`.
///
/// # Example
///
/// ```
/// use login_sync::known_servers::discover_imap_host;
///
/// assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
/// assert_eq!(discover_imap_host("user@custom.org"), "imap.custom.org");
/// ```
#[must_use]
pub fn discover_imap_host(email: &str) -> String {
    let domain = email.split('@').nth(1).unwrap_or(email).to_lowercase();

    KNOWN_SERVERS
        .get(domain.as_str())
        .map_or_else(|| format!("imap.{domain}"), |&s| s.to_string())
}
