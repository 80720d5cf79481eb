//! Caching, retrying fetch engine.
//!
//! One call fetches one page. The caller drives pagination by following
//! [`FetchOutcome::next_page`] with [`SearchRequest::with_continuation`].

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, Result, SurveyError};
use crate::request::SearchRequest;
use crate::traits::store::CacheStore;
use crate::traits::transport::{redact, HttpResponse, Transport};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }

    /// Delay after the given (1-based) failed attempt: `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Cache key for a resolved URL: `namespace:sha256(url)`.
pub fn cache_key(namespace: &str, url: &Url) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    format!("{}:{}", namespace, hex::encode(digest))
}

/// Continuation reference carried by a decoded page, if any.
pub fn next_page(payload: &Value) -> Option<String> {
    payload
        .pointer("/serpapi_pagination/next")
        .or_else(|| payload.pointer("/pagination/next"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Result of one page fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub payload: Value,
    pub from_cache: bool,
    pub next_page: Option<String>,

    /// Network attempts made (0 on a cache hit).
    pub attempts: u32,
}

/// HTTP fetch with a TTL cache in front and retry/backoff behind.
pub struct CachingFetcher<T, C> {
    transport: T,
    cache: C,
    policy: RetryPolicy,
    ttl: Duration,
}

impl<T: Transport, C: CacheStore> CachingFetcher<T, C> {
    pub fn new(transport: T, cache: C, config: &FetchConfig) -> Self {
        Self {
            transport,
            cache,
            policy: RetryPolicy::from_config(config),
            ttl: config.cache_ttl(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch one page.
    ///
    /// A cache hit returns without touching the network. On a miss, the
    /// response is written to the cache only after it decodes cleanly.
    pub async fn fetch(&self, request: &SearchRequest) -> Result<FetchOutcome> {
        let url = request.resolve_url()?;
        let key = cache_key(request.engine.cache_namespace(), &url);

        if let Some(cached) = self.cache.get(&key).await? {
            match serde_json::from_str::<Value>(&cached) {
                Ok(payload) => {
                    debug!(engine = %request.engine, key = %key, "Cache hit");
                    return Ok(FetchOutcome {
                        next_page: next_page(&payload),
                        payload,
                        from_cache: true,
                        attempts: 0,
                    });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                }
            }
        }

        let (response, attempts) = self.fetch_with_retry(&url).await?;

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| {
            SurveyError::MalformedResponse(format!("undecodable body from {}: {}", redact(&url), e))
        })?;

        if let Some(message) = embedded_error(&payload) {
            warn!(url = %redact(&url), error = %message, "API reported an error");
            return Err(FetchError::Permanent {
                status: Some(response.status),
                message,
            }
            .into());
        }

        self.cache.put(&key, &response.body, self.ttl).await?;

        Ok(FetchOutcome {
            next_page: next_page(&payload),
            payload,
            from_cache: false,
            attempts,
        })
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<(HttpResponse, u32)> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.transport.get(url).await {
                Ok(response) if response.is_success() => {
                    if attempt > 1 {
                        info!(url = %redact(url), attempt, "Request succeeded after retry");
                    }
                    return Ok((response, attempt));
                }
                Ok(response) if response.is_retryable() => {
                    format!("status {}", response.status)
                }
                Ok(response) => {
                    let message = serde_json::from_str::<Value>(&response.body)
                        .ok()
                        .as_ref()
                        .and_then(embedded_error)
                        .unwrap_or_else(|| format!("status {}", response.status));
                    warn!(url = %redact(url), status = response.status, "Request rejected");
                    return Err(FetchError::Permanent {
                        status: Some(response.status),
                        message,
                    }
                    .into());
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.policy.max_attempts {
                warn!(url = %redact(url), attempts = attempt, error = %failure, "Giving up");
                return Err(FetchError::Transient {
                    attempts: attempt,
                    message: failure,
                }
                .into());
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                url = %redact(url),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Explicit error reported inside an otherwise decodable body.
fn embedded_error(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurveyConfig;
    use crate::request::RequestBuilder;
    use crate::security::ApiKey;
    use crate::stores::MemoryStore;
    use crate::testing::MockTransport;
    use crate::types::target::SearchTarget;
    use serde_json::json;
    use std::sync::Arc;

    fn fast_config() -> FetchConfig {
        FetchConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            ..FetchConfig::default()
        }
    }

    fn request() -> SearchRequest {
        let key = ApiKey::parse("abcdef0123456789abcdef0123456789").unwrap();
        RequestBuilder::new(&SurveyConfig::default(), key)
            .shopping(&SearchTarget::new("Hoya kerrii", 0, 80).unwrap())
            .unwrap()
    }

    fn fetcher(
        transport: &Arc<MockTransport>,
        cache: &Arc<MemoryStore>,
    ) -> CachingFetcher<Arc<MockTransport>, Arc<MemoryStore>> {
        CachingFetcher::new(transport.clone(), cache.clone(), &fast_config())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_cache_key_is_namespaced() {
        let url = Url::parse("https://serpapi.com/search.json?q=hoya").unwrap();
        let shopping = cache_key("shopping", &url);
        let web = cache_key("web", &url);
        assert_ne!(shopping, web);
        assert!(shopping.starts_with("shopping:"));
        assert_eq!(shopping, cache_key("shopping", &url));
    }

    #[test]
    fn test_next_page_sources() {
        assert_eq!(
            next_page(&json!({"serpapi_pagination": {"next": "https://a/next"}})).as_deref(),
            Some("https://a/next")
        );
        assert_eq!(
            next_page(&json!({"pagination": {"next": "https://b/next"}})).as_deref(),
            Some("https://b/next")
        );
        assert_eq!(next_page(&json!({"shopping_results": []})), None);
    }

    #[tokio::test]
    async fn test_second_identical_request_hits_cache() {
        let transport = Arc::new(MockTransport::new().with_default(HttpResponse::ok_json(
            &json!({"shopping_results": []}),
        )));
        let cache = Arc::new(MemoryStore::new());
        let fetcher = fetcher(&transport, &cache);

        let first = fetcher.fetch(&request()).await.unwrap();
        let second = fetcher.fetch(&request()).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(first.payload, second.payload);
    }

    #[tokio::test]
    async fn test_500_then_success_writes_cache_once() {
        let transport = Arc::new(
            MockTransport::new()
                .push(HttpResponse::new(500, "oops"))
                .push(HttpResponse::ok_json(&json!({"shopping_results": []}))),
        );
        let cache = Arc::new(MemoryStore::new());
        let outcome = fetcher(&transport, &cache).fetch(&request()).await.unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(cache.cache_writes(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        for status in [400, 401, 404] {
            let transport = Arc::new(MockTransport::new().push(HttpResponse::new(status, "{}")));
            let cache = Arc::new(MemoryStore::new());
            let err = fetcher(&transport, &cache).fetch(&request()).await.unwrap_err();

            assert!(matches!(
                err,
                SurveyError::Fetch(FetchError::Permanent { status: Some(s), .. }) if s == status
            ));
            assert_eq!(transport.call_count(), 1);
            assert_eq!(cache.cache_writes(), 0);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_attempts() {
        let transport =
            Arc::new(MockTransport::new().with_default(HttpResponse::new(429, "slow down")));
        let cache = Arc::new(MemoryStore::new());
        let err = fetcher(&transport, &cache).fetch(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            SurveyError::Fetch(FetchError::Transient { attempts: 3, .. })
        ));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_is_retried() {
        let transport = Arc::new(
            MockTransport::new()
                .push_failure("connection reset")
                .push(HttpResponse::ok_json(&json!({"shopping_results": []}))),
        );
        let cache = Arc::new(MemoryStore::new());
        let outcome = fetcher(&transport, &cache).fetch(&request()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_embedded_error_is_permanent_and_uncached() {
        let transport = Arc::new(MockTransport::new().with_default(HttpResponse::ok_json(
            &json!({"error": "Invalid API key."}),
        )));
        let cache = Arc::new(MemoryStore::new());
        let err = fetcher(&transport, &cache).fetch(&request()).await.unwrap_err();

        assert!(matches!(err, SurveyError::Fetch(FetchError::Permanent { .. })));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(cache.cache_writes(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_malformed() {
        let transport =
            Arc::new(MockTransport::new().with_default(HttpResponse::new(200, "<html>")));
        let cache = Arc::new(MemoryStore::new());
        let err = fetcher(&transport, &cache).fetch(&request()).await.unwrap_err();
        assert!(matches!(err, SurveyError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_validation_fails_before_network() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryStore::new());
        let mut bad = request();
        bad.api_key = None;

        let err = fetcher(&transport, &cache).fetch(&bad).await.unwrap_err();
        assert!(matches!(err, SurveyError::Validation { .. }));
        assert_eq!(transport.call_count(), 0);
    }
}
