// MIT License - Copyright (c) 2026 Peter Wright

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::dialect::ApiType;
use crate::error::{ProtexialError, Result};

/// Fixed per-request timeout. Exceeding it is classified retryable; the
/// panel's embedded server regularly needs a few seconds but never longer.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for one panel session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme + host (+ port) of the panel web server; paths come from the
    /// dialect descriptor.
    pub base_url: Url,
    /// Active dialect. `None` until the prober has run.
    pub api_type: Option<ApiType>,
    pub username: String,
    pub password: String,
    /// Challenge-card table captured during onboarding, keyed "A1".."F6".
    pub codes: HashMap<String, String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    api_type: Option<ApiType>,
    username: String,
    password: String,
    codes: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Panel base URL, e.g. "http://192.168.1.147". Any path component is
    /// discarded; the dialect supplies the paths.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = Some(api_type);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn codes(mut self, codes: HashMap<String, String>) -> Self {
        self.codes = codes;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let raw = self
            .base_url
            .ok_or_else(|| ProtexialError::Config("base_url is required".to_string()))?;
        let parsed = Url::parse(&raw)
            .map_err(|e| ProtexialError::Config(format!("invalid base_url {raw}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProtexialError::Config(format!(
                "unsupported base_url scheme: {}",
                parsed.scheme()
            )));
        }
        // Keep only scheme://host:port
        let mut base_url = parsed.clone();
        base_url.set_path("");
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(ClientConfig {
            base_url,
            api_type: self.api_type,
            username: self.username,
            password: self.password,
            codes: self.codes,
            timeout: self.timeout.unwrap_or(HTTP_TIMEOUT),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_minimal() {
        let config = ClientConfig::builder()
            .base_url("http://192.168.1.147")
            .username("u")
            .password("1234")
            .build()
            .unwrap();
        assert_eq!(config.base_url.as_str(), "http://192.168.1.147/");
        assert_eq!(config.timeout, HTTP_TIMEOUT);
        assert!(config.api_type.is_none());
    }

    #[test]
    fn test_path_and_query_discarded() {
        let config = ClientConfig::builder()
            .base_url("http://panel.local:8080/fr/login.htm?x=1#frag")
            .build()
            .unwrap();
        assert_eq!(config.base_url.as_str(), "http://panel.local:8080/");
    }

    #[test]
    fn test_missing_base_url() {
        assert!(matches!(
            ClientConfig::builder().build(),
            Err(ProtexialError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(matches!(
            ClientConfig::builder().base_url("ftp://panel").build(),
            Err(ProtexialError::Config(_))
        ));
    }
}
