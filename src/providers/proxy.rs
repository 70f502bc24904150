//! Residential proxy endpoint with sticky sessions
//!
//! Residential pools select the exit country and keep a sticky exit IP through
//! flags in the proxy username, e.g. `user-country-us-session-s3r1`. Each navigation
//! session maps to its own tag, so rotating an identity also rotates the exit IP.

use crate::config::ProxyConfig;
use crate::providers::{ProviderError, ProviderResult};
use url::Url;

/// Proxy egress configuration
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    endpoint: Option<Url>,
    country: Option<String>,
}

impl ProxyPool {
    /// Creates a pool from an endpoint URL and optional ISO country code
    ///
    /// # Returns
    ///
    /// * `Ok(ProxyPool)` - The pool; disabled when `endpoint` is `None`
    /// * `Err(ProviderError::Config)` - The endpoint is not a valid proxy URL
    pub fn new(endpoint: Option<&str>, country: Option<&str>) -> ProviderResult<Self> {
        let endpoint = match endpoint.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| ProviderError::Config(format!("Invalid proxy URL: {}", e)))?;
                if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
                    return Err(ProviderError::Config(format!(
                        "Unsupported proxy scheme: {}",
                        url.scheme()
                    )));
                }
                Some(url)
            }
            None => None,
        };

        let country = country
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty());

        Ok(Self { endpoint, country })
    }

    pub fn from_config(config: &ProxyConfig) -> ProviderResult<Self> {
        Self::new(config.url.as_deref(), config.country.as_deref())
    }

    /// Direct egress, no proxy
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Proxy URL pinned to one sticky session
    ///
    /// Country and session flags are only added when the endpoint carries a username.
    pub fn session_url(&self, tag: &str) -> Option<Url> {
        let mut url = self.endpoint.clone()?;
        if url.username().is_empty() {
            return Some(url);
        }

        let mut username = url.username().to_string();
        if let Some(country) = &self.country {
            username.push_str(&format!("-country-{}", country));
        }
        username.push_str(&format!("-session-{}", tag));

        // Only fails for cannot-be-a-base URLs, which proxy URLs never are
        if url.set_username(&username).is_err() {
            return self.endpoint.clone();
        }
        Some(url)
    }

    /// reqwest proxy for one sticky session; `None` when the pool is disabled
    pub fn reqwest_proxy(&self, tag: &str) -> ProviderResult<Option<reqwest::Proxy>> {
        match self.session_url(tag) {
            Some(url) => reqwest::Proxy::all(url.as_str())
                .map(Some)
                .map_err(|e| ProviderError::Config(format!("Invalid proxy: {}", e))),
            None => Ok(None),
        }
    }
}
