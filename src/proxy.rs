//! SOCKS5 proxy configuration for outbound API traffic.
//!
//! # Example
//!
//! ```
//! use webhook_sync::Socks5Proxy;
//!
//! // Without authentication
//! let proxy = Socks5Proxy::new("proxy.example.com", 1080);
//!
//! // With authentication
//! let proxy = Socks5Proxy::with_auth("proxy.example.com", 1080, "username", "password");
//! ```

use crate::error::{Error, Result};

/// SOCKS5 proxy configuration.
///
/// Hostnames are resolved by the proxy (`socks5h`), so DNS lookups for the
/// capture service never leave through the local resolver.
#[derive(Debug, Clone)]
pub struct Socks5Proxy {
    /// Proxy server hostname or IP address.
    pub host: String,
    /// Proxy server port.
    pub port: u16,
    /// Optional authentication credentials.
    pub auth: Option<ProxyAuth>,
}

/// Authentication credentials for SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    /// Username for proxy authentication.
    pub username: String,
    /// Password for proxy authentication.
    pub password: String,
}

impl Socks5Proxy {
    /// Creates a new SOCKS5 proxy configuration without authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    /// Creates a new SOCKS5 proxy configuration with authentication.
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

    /// Proxy URL including percent-encoded credentials. Never log this value.
    fn url(&self) -> Result<reqwest::Url> {
        let invalid = || Error::InvalidConfig {
            message: format!("invalid proxy address {self}"),
        };

        let mut url = reqwest::Url::parse(&format!("socks5h://{}:{}", self.host, self.port))
            .map_err(|_| invalid())?;
        if let Some(auth) = &self.auth {
            url.set_username(&auth.username).map_err(|()| invalid())?;
            url.set_password(Some(&auth.password)).map_err(|()| invalid())?;
        }
        Ok(url)
    }

    /// Converts into a proxy that routes every request through this server.
    pub(crate) fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        reqwest::Proxy::all(self.url()?).map_err(|_| Error::InvalidConfig {
            message: format!("invalid proxy address {self}"),
        })
    }
}

impl std::fmt::Display for Socks5Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.auth {
            Some(auth) => write!(
                f,
                "socks5h://{}:***@{}:{}",
                auth.username, self.host, self.port
            ),
            None => write!(f, "socks5h://{}:{}", self.host, self.port),
        }
    }
}
