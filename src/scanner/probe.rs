//! Endpoint header probing.
//!
//! `HeaderProbe` abstracts the network call so endpoint scans stay testable.
//! `HttpHeaderProbe` issues a real HEAD request; `StaticHeaderProbe` returns
//! canned headers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Security headers an endpoint should send, with the advice given when
/// one is missing.
pub const HARDENING_HEADERS: &[(&str, &str)] = &[
    (
        "strict-transport-security",
        "Enable HTTP Strict Transport Security (Strict-Transport-Security)",
    ),
    (
        "content-security-policy",
        "Set a Content-Security-Policy header",
    ),
    (
        "x-content-type-options",
        "Set X-Content-Type-Options: nosniff",
    ),
    (
        "x-frame-options",
        "Set X-Frame-Options to prevent clickjacking",
    ),
];

/// Fetches response headers for a URL. Header names are lower-cased.
#[async_trait]
pub trait HeaderProbe: Send + Sync {
    async fn fetch_headers(&self, url: &str) -> Result<BTreeMap<String, String>>;
}

/// Probe backed by a `reqwest` client.
pub struct HttpHeaderProbe {
    client: reqwest::Client,
}

impl HttpHeaderProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zeptogate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HeaderProbe for HttpHeaderProbe {
    async fn fetch_headers(&self, url: &str) -> Result<BTreeMap<String, String>> {
        let response = self.client.head(url).send().await?;
        Ok(response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect())
    }
}

/// Probe that returns the same headers for every URL.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaderProbe {
    headers: BTreeMap<String, String>,
}

impl StaticHeaderProbe {
    pub fn new<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl HeaderProbe for StaticHeaderProbe {
    async fn fetch_headers(&self, _url: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.headers.clone())
    }
}

/// Hardening advice for every header missing from `headers`.
pub fn missing_header_advice(headers: &BTreeMap<String, String>) -> Vec<String> {
    HARDENING_HEADERS
        .iter()
        .filter(|(name, _)| !headers.contains_key(*name))
        .map(|(_, advice)| advice.to_string())
        .collect()
}
