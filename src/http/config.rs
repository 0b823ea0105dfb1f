use std::env::{self, VarError};
use std::time::Duration;

use http::Uri;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_CONN_TIMEOUT: Duration = Duration::from_secs(10);

/// Proxy variables looked up, in order, when no proxy is configured explicitly.
const PROXY_ENV_NAMES: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];

#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub(crate) timeout: Duration,
    pub(crate) conn_timeout: Duration,
    pub(crate) proxy: ProxyConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_HTTP_TIMEOUT,
            DEFAULT_HTTP_CONN_TIMEOUT,
            ProxyConfig::default(),
        )
    }
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration, proxy: ProxyConfig) -> Self {
        Self {
            timeout,
            conn_timeout,
            proxy,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("invalid proxy url `{0}`: `{1}`")]
    InvalidUrl(String, String),
}

/// Optional proxy every GitHub request goes through, `<scheme>://[user:password@]host[:port]`.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ProxyConfig {
    url: Option<Uri>,
}

impl ProxyConfig {
    /// An empty url means no proxy.
    pub fn new(proxy_url: &str) -> Result<Self, ProxyError> {
        Ok(Self {
            url: parse_proxy_url(proxy_url)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none()
    }

    pub fn url_as_string(&self) -> String {
        self.url.as_ref().map(Uri::to_string).unwrap_or_default()
    }

    /// Falls back to the standard proxy environment variables when no proxy is set.
    pub fn try_with_url_from_env(self) -> Result<Self, ProxyError> {
        self.with_env_aware_url(env::var)
    }

    fn with_env_aware_url<F>(self, env_var: F) -> Result<Self, ProxyError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        if !self.is_empty() {
            return Ok(self);
        }
        match PROXY_ENV_NAMES.into_iter().find_map(|name| env_var(name).ok()) {
            Some(url) => Self::new(&url),
            None => Ok(self),
        }
    }
}

fn parse_proxy_url(url: &str) -> Result<Option<Uri>, ProxyError> {
    if url.is_empty() {
        return Ok(None);
    }
    let uri = url
        .parse::<Uri>()
        .map_err(|err| ProxyError::InvalidUrl(url.to_string(), err.to_string()))?;
    if uri.host().is_none() {
        return Err(ProxyError::InvalidUrl(
            url.to_string(),
            "missing host".to_string(),
        ));
    }
    Ok(Some(uri))
}
