//! HTTP RPC backend.
//!
//! One POST per envelope; retry and backoff live in the session's RPC
//! driver, so this stays a thin wrapper around reqwest.

use crate::traits::{RpcBackend, RpcError};
use async_trait::async_trait;
use std::time::Duration;
use tether_protocol::{Envelope, RpcResponse};
use tracing::{debug, warn};

/// HTTP implementation of [`RpcBackend`].
pub struct HttpRpc {
    http: reqwest::Client,
    url: String,
}

impl HttpRpc {
    /// Create a backend posting to `<url_prefix>/api`.
    #[must_use]
    pub fn new(url_prefix: &str) -> Self {
        Self::with_client(reqwest::Client::new(), url_prefix)
    }

    /// Create a backend over an existing reqwest client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, url_prefix: &str) -> Self {
        Self {
            http,
            url: format!("{}/api", url_prefix.trim_end_matches('/')),
        }
    }

    /// The endpoint this backend posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcBackend for HttpRpc {
    async fn execute(&self, envelope: &Envelope) -> Result<RpcResponse, RpcError> {
        debug!(url = %self.url, commands = envelope.commands.len(), "RPC POST");

        let response = self
            .http
            .post(&self.url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| RpcError::Network(e.to_string()))?;

        let retry_after = parse_retry_after(response.headers());
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), ?retry_after, "RPC HTTP failure");
            return Err(RpcError::Http {
                status: status.as_u16(),
                retry_after,
            });
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))
    }
}

/// Parse a `Retry-After: <seconds>` header. Date forms are ignored.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_url_construction() {
        let rpc = HttpRpc::new("https://example.com/tether/");
        assert_eq!(rpc.url(), "https://example.com/tether/api");
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("15"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_parse_retry_after_absent_or_date() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
