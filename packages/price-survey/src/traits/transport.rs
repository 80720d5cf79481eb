//! HTTP transport seam.
//!
//! The fetcher only needs "GET this URL, give me status and body". Keeping
//! that behind a trait lets tests script upstream behaviour (rate limits,
//! 5xx, embedded errors) without a network.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{TransportError, TransportResult};

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 with a JSON body.
    pub fn ok_json(body: &serde_json::Value) -> Self {
        Self::new(200, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Rate limited or server-side failure.
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

/// Performs GET requests against the search API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> TransportResult<HttpResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, url: &Url) -> TransportResult<HttpResponse> {
        (**self).get(url).await
    }
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout.
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(Box::new(e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> TransportResult<HttpResponse> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: redact(url),
                }
            } else {
                TransportError::Http(Box::new(e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(Box::new(e)))?;

        Ok(HttpResponse { status, body })
    }
}

/// URL with the credential parameter masked, for logs and errors.
pub fn redact(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_key" { "[REDACTED]".into() } else { v };
            (k.into_owned(), v.into_owned())
        })
        .collect();
    if pairs.is_empty() {
        return masked.to_string();
    }
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(HttpResponse::new(429, "").is_retryable());
        assert!(HttpResponse::new(500, "").is_retryable());
        assert!(HttpResponse::new(503, "").is_retryable());
        assert!(!HttpResponse::new(400, "").is_retryable());
        assert!(!HttpResponse::new(401, "").is_retryable());
        assert!(!HttpResponse::new(404, "").is_retryable());
        assert!(HttpResponse::new(204, "").is_success());
    }

    #[test]
    fn test_redact_masks_key() {
        let url = Url::parse("https://serpapi.com/search.json?q=hoya&api_key=secret123").unwrap();
        let masked = redact(&url);
        assert!(!masked.contains("secret123"));
        assert!(masked.contains("q=hoya"));
    }
}
