//! Testing utilities including a scripted transport and payload fixtures.
//!
//! These are useful for testing applications that use the survey library
//! without making real network calls.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use url::Url;

use crate::error::{TransportError, TransportResult};
use crate::traits::transport::{HttpResponse, Transport};

/// One scripted exchange.
#[derive(Debug, Clone)]
pub enum Scripted {
    Response(HttpResponse),
    Failure(String),
}

impl From<HttpResponse> for Scripted {
    fn from(response: HttpResponse) -> Self {
        Scripted::Response(response)
    }
}

/// A mock transport for testing.
///
/// Lookup order for each request:
/// 1. Routes, by substring of the URL (raw or decoded). The last response of
///    a route repeats once its queue is drained.
/// 2. The shared queue, first in first out.
/// 3. The default response.
///
/// Anything else fails like a dropped connection.
#[derive(Default)]
pub struct MockTransport {
    routes: Arc<RwLock<Vec<(String, VecDeque<Scripted>)>>>,
    queue: Arc<RwLock<VecDeque<Scripted>>>,
    default: Arc<RwLock<Option<Scripted>>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response used when nothing else matches.
    pub fn with_default(self, response: HttpResponse) -> Self {
        *self.default.write().unwrap() = Some(response.into());
        self
    }

    /// Queue a response.
    pub fn push(self, response: HttpResponse) -> Self {
        self.queue.write().unwrap().push_back(response.into());
        self
    }

    /// Queue a transport-level failure.
    pub fn push_failure(self, message: impl Into<String>) -> Self {
        self.queue
            .write()
            .unwrap()
            .push_back(Scripted::Failure(message.into()));
        self
    }

    /// Answer URLs containing `pattern`. Repeated calls for the same
    /// pattern queue further responses.
    pub fn route(self, pattern: impl Into<String>, response: impl Into<Scripted>) -> Self {
        let pattern = pattern.into();
        {
            let mut routes = self.routes.write().unwrap();
            match routes.iter_mut().find(|(p, _)| *p == pattern) {
                Some((_, queue)) => queue.push_back(response.into()),
                None => routes.push((pattern, VecDeque::from([response.into()]))),
            }
        }
        self
    }

    /// Every URL requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Requests whose URL contains `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|u| matches_url(u, pattern))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn next_for(&self, url: &str) -> Option<Scripted> {
        {
            let mut routes = self.routes.write().unwrap();
            if let Some((_, queue)) = routes.iter_mut().find(|(p, _)| matches_url(url, p)) {
                return if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
            }
        }

        if let Some(next) = self.queue.write().unwrap().pop_front() {
            return Some(next);
        }

        self.default.read().unwrap().clone()
    }
}

fn matches_url(url: &str, pattern: &str) -> bool {
    if url.contains(pattern) {
        return true;
    }
    Url::parse(url)
        .map(|parsed| {
            parsed
                .query_pairs()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
                .contains(pattern)
        })
        .unwrap_or(false)
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url) -> TransportResult<HttpResponse> {
        let url = url.to_string();
        self.calls.write().unwrap().push(url.clone());

        match self.next_for(&url) {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Failure(message)) => Err(TransportError::Http(message.into())),
            None => Err(TransportError::Http(
                format!("no scripted response for {}", url).into(),
            )),
        }
    }
}

/// JSON payloads shaped like the search API's responses.
pub mod fixtures {
    use serde_json::{json, Value};

    /// Listing page: `(title, formatted price, product id)` per result.
    pub fn shopping_page(items: &[(&str, &str, Option<&str>)], next: Option<&str>) -> Value {
        let results: Vec<Value> = items
            .iter()
            .enumerate()
            .map(|(i, (title, price, product_id))| {
                let mut item = json!({
                    "position": i + 1,
                    "title": title,
                    "link": format!("https://shop.example/{}", i + 1),
                    "source": "Example Nursery",
                    "price": price,
                });
                if let Some(id) = product_id {
                    item["product_id"] = json!(id);
                }
                item
            })
            .collect();

        let mut page = json!({
            "search_metadata": { "status": "Success" },
            "shopping_results": results,
        });
        if let Some(next) = next {
            page["serpapi_pagination"] = json!({ "next": next });
        }
        page
    }

    /// Web page with organic results: `(title, snippet, link)`.
    pub fn web_page(organic: &[(&str, &str, &str)]) -> Value {
        let results: Vec<Value> = organic
            .iter()
            .enumerate()
            .map(|(i, (title, snippet, link))| {
                json!({
                    "position": i + 1,
                    "title": title,
                    "snippet": snippet,
                    "link": link,
                })
            })
            .collect();

        json!({
            "search_metadata": { "status": "Success" },
            "search_parameters": { "engine": "google" },
            "organic_results": results,
        })
    }

    /// Interest-over-time payload, oldest value first.
    pub fn trends_payload(values: &[u32]) -> Value {
        let timeline: Vec<Value> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                json!({
                    "date": format!("week {}", i + 1),
                    "values": [{ "value": v.to_string(), "extracted_value": v }],
                })
            })
            .collect();

        json!({ "interest_over_time": { "timeline_data": timeline } })
    }

    /// Body carrying an explicit API error.
    pub fn error_payload(message: &str) -> Value {
        json!({ "error": message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_routes_take_priority_and_stick() {
        let mock = MockTransport::new()
            .with_default(HttpResponse::new(404, "{}"))
            .route("engine=google_trends", HttpResponse::new(500, "{}"))
            .route("engine=google_trends", HttpResponse::new(200, "{}"));

        let trends = url("https://x/search.json?engine=google_trends");
        assert_eq!(mock.get(&trends).await.unwrap().status, 500);
        assert_eq!(mock.get(&trends).await.unwrap().status, 200);
        assert_eq!(mock.get(&trends).await.unwrap().status, 200);

        let other = url("https://x/search.json?engine=google");
        assert_eq!(mock.get(&other).await.unwrap().status, 404);
        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.calls_matching("google_trends"), 3);
    }

    #[tokio::test]
    async fn test_decoded_query_matching() {
        let mock = MockTransport::new().route("q=hoya kerrii", HttpResponse::new(200, "{}"));
        let hit = url("https://x/search.json?q=hoya+kerrii");
        assert!(mock.get(&hit).await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_then_unscripted_failure() {
        let mock = MockTransport::new()
            .push_failure("reset")
            .push(HttpResponse::new(200, "{}"));
        let u = url("https://x/");
        assert!(mock.get(&u).await.is_err());
        assert!(mock.get(&u).await.is_ok());
        assert!(mock.get(&u).await.is_err());
    }
}
