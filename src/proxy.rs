//! SOCKS5 proxy configuration for the IMAP connection.
//!
//! The browser side takes its proxy as a plain `--proxy-server` argument (see
//! [`BrowserOptions::proxy`](crate::BrowserOptions)); this type covers the
//! mailbox poller's connection, which we dial ourselves.
//!
//! # Example
//!
//! ```
//! use login_sync::Socks5Proxy;
//!
//! let proxy = Socks5Proxy::new("proxy.example.com", 1080);
//! let authed = Socks5Proxy::with_auth("proxy.example.com", 1080, "user", "pass");
//! ```

/// SOCKS5 proxy configuration.
#[derive(Debug, Clone)]
pub struct Socks5Proxy {
    /// Proxy server hostname or IP address.
    pub host: String,
    /// Proxy server port.
    pub port: u16,
    /// Optional authentication credentials.
    pub auth: Option<ProxyAuth>,
}

/// Authentication credentials for a SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    /// Username for proxy authentication.
    pub username: String,
    /// Password for proxy authentication.
    pub password: String,
}

impl Socks5Proxy {
    /// Creates a proxy configuration without authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    /// Creates a proxy configuration with authentication.
    #[must_use]
    pub fn with_auth(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            auth: Some(ProxyAuth {
                username: username.into(),
                password: password.into(),
            }),
        }
    }

    /// Returns the proxy address as "host:port".
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns `true` if this proxy requires authentication.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.auth.is_some()
    }
}

impl std::fmt::Display for Socks5Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.auth {
            Some(auth) => write!(
                f,
                "socks5://{}:***@{}:{}",
                auth.username, self.host, self.port
            ),
            None => write!(f, "socks5://{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_without_auth() {
        let proxy = Socks5Proxy::new("192.168.1.1", 1080);
        assert!(!proxy.requires_auth());
        assert_eq!(proxy.address(), "192.168.1.1:1080");
    }

    #[test]
    fn test_proxy_with_auth() {
        let proxy = Socks5Proxy::with_auth("proxy.example.com", 1080, "user", "pass");
        assert!(proxy.requires_auth());
        let auth = proxy.auth.as_ref().unwrap();
        assert_eq!(auth.username, "user");
    }

    #[test]
    fn test_display_masks_password() {
        let proxy = Socks5Proxy::with_auth("proxy.example.com", 1080, "user", "secret");
        let display = proxy.to_string();
        assert!(display.contains("***"));
        assert!(!display.contains("secret"));
    }
}
