//! Search API request construction and validation.
//!
//! A [`SearchRequest`] is fully validated before any URL is built, so a bad
//! entity or a missing credential never reaches the network.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::config::{SurveyConfig, SUPPORTED_REGIONS};
use crate::error::{FetchError, Result, SurveyError};
use crate::security::ApiKey;
use crate::types::harvest::Phase;
use crate::types::target::SearchTarget;

/// Name of the credential query parameter.
pub const API_KEY_PARAM: &str = "api_key";

/// Search engines the survey queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Shopping listings
    GoogleShopping,
    /// Organic and paid web results
    Google,
    /// Interest-over-time series
    GoogleTrends,
    /// Seller offers for one product, addressed by identifier
    GoogleProduct,
}

impl Engine {
    pub const ALL: [Engine; 4] = [
        Engine::GoogleShopping,
        Engine::Google,
        Engine::GoogleTrends,
        Engine::GoogleProduct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::GoogleShopping => "google_shopping",
            Engine::Google => "google",
            Engine::GoogleTrends => "google_trends",
            Engine::GoogleProduct => "google_product",
        }
    }

    /// Cache namespace; identical URLs under different variants never collide.
    pub fn cache_namespace(&self) -> &'static str {
        match self {
            Engine::GoogleShopping => "shopping",
            Engine::Google => "web",
            Engine::GoogleTrends => "trends",
            Engine::GoogleProduct => "product",
        }
    }

    /// Engines addressed by an explicit identifier instead of query text.
    pub fn requires_identifier(&self) -> bool {
        matches!(self, Engine::GoogleProduct)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self> {
        Engine::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| SurveyError::validation(format!("unsupported engine '{}'", s)))
    }
}

/// What the request searches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTerm {
    Text(String),
    Identifier(String),
}

impl QueryTerm {
    pub fn as_str(&self) -> &str {
        match self {
            QueryTerm::Text(s) | QueryTerm::Identifier(s) => s,
        }
    }
}

/// A single API request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub engine: Engine,
    pub term: QueryTerm,
    pub base_url: String,
    pub region: String,
    pub api_key: Option<ApiKey>,

    /// Engine-specific parameters, in the order they are sent.
    pub params: Vec<(String, String)>,

    /// Continuation URL handed back by a previous page.
    pub continuation: Option<String>,
}

impl SearchRequest {
    pub fn new(engine: Engine, term: QueryTerm, base_url: impl Into<String>) -> Self {
        Self {
            engine,
            term,
            base_url: base_url.into(),
            region: "us".to_string(),
            api_key: None,
            params: Vec::new(),
            continuation: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// The same request, continued at the page a previous response pointed to.
    pub fn with_continuation(&self, next: impl Into<String>) -> Self {
        let mut continued = self.clone();
        continued.continuation = Some(next.into());
        continued
    }

    /// Query text, when the request has one.
    pub fn query_text(&self) -> Option<&str> {
        match &self.term {
            QueryTerm::Text(q) => Some(q),
            QueryTerm::Identifier(_) => None,
        }
    }

    /// Check everything that can be checked without the network.
    pub fn validate(&self) -> Result<()> {
        match (&self.term, self.engine.requires_identifier()) {
            (QueryTerm::Identifier(_), false) => {
                return Err(SurveyError::validation(format!(
                    "engine {} takes query text, not an identifier",
                    self.engine
                )));
            }
            (QueryTerm::Text(_), true) => {
                return Err(SurveyError::validation(format!(
                    "engine {} requires an explicit identifier",
                    self.engine
                )));
            }
            (term, _) if term.as_str().trim().is_empty() => {
                return Err(SurveyError::validation("empty query"));
            }
            _ => {}
        }

        if self.api_key.is_none() {
            return Err(SurveyError::validation("missing API credential"));
        }

        if !SUPPORTED_REGIONS.contains(&self.region.as_str()) {
            return Err(SurveyError::validation(format!(
                "unsupported region '{}'",
                self.region
            )));
        }

        Ok(())
    }

    /// Fully-qualified URL, credential included.
    pub fn resolve_url(&self) -> Result<Url> {
        self.validate()?;
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| SurveyError::validation("missing API credential"))?;

        if let Some(next) = &self.continuation {
            return attach_credential(&self.base_url, next, key);
        }

        let mut url = Url::parse(&self.base_url).map_err(FetchError::from)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("engine", self.engine.as_str());
            match &self.term {
                QueryTerm::Text(q) => query.append_pair("q", q),
                QueryTerm::Identifier(id) => query.append_pair("product_id", id),
            };
            for (name, value) in &self.params {
                query.append_pair(name, value);
            }
            query.append_pair(API_KEY_PARAM, key.expose());
        }
        Ok(url)
    }
}

/// Resolve a continuation reference and add the credential if it lacks one.
///
/// Every existing parameter is kept verbatim.
pub fn attach_credential(base_url: &str, next: &str, key: &ApiKey) -> Result<Url> {
    let mut url = match Url::parse(next) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base_url)
            .and_then(|base| base.join(next))
            .map_err(FetchError::from)?,
        Err(e) => return Err(FetchError::from(e).into()),
    };

    if !url.query_pairs().any(|(k, _)| k == API_KEY_PARAM) {
        url.query_pairs_mut().append_pair(API_KEY_PARAM, key.expose());
    }
    Ok(url)
}

/// Builds requests for each query variant from one configuration.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
    region: String,
    language: String,
    page_size: u32,
    location: Option<String>,
    domain_term: String,
    web_qualifier: String,
    excluded_domains: Vec<String>,
    api_key: ApiKey,
}

impl RequestBuilder {
    pub fn new(config: &SurveyConfig, api_key: ApiKey) -> Self {
        Self {
            base_url: config.base_url.clone(),
            region: config.region.clone(),
            language: config.language.clone(),
            page_size: config.page_size,
            location: config.location.clone(),
            domain_term: config.domain_term.clone(),
            web_qualifier: config.web_qualifier.clone(),
            excluded_domains: config.excluded_domains.clone(),
            api_key,
        }
    }

    fn request(&self, engine: Engine, term: QueryTerm) -> SearchRequest {
        SearchRequest::new(engine, term, &self.base_url)
            .with_region(&self.region)
            .with_api_key(self.api_key.clone())
    }

    fn localized(&self, request: SearchRequest) -> SearchRequest {
        let request = request
            .with_param("gl", &self.region)
            .with_param("hl", &self.language);
        match &self.location {
            Some(location) => request.with_param("location", location),
            None => request,
        }
    }

    fn keywords(&self, target: &SearchTarget) -> Result<Vec<String>> {
        let keywords = target.keywords();
        if keywords.is_empty() {
            return Err(SurveyError::validation(format!(
                "no usable keywords in '{}'",
                target.name
            )));
        }
        Ok(keywords)
    }

    /// Listing query: domain term followed by the keyword set. A leading
    /// keyword equal to the domain term is dropped so it is not doubled.
    pub fn shopping(&self, target: &SearchTarget) -> Result<SearchRequest> {
        let keywords = self.keywords(target)?;
        let mut words = vec![self.domain_term.as_str()];
        words.extend(
            keywords
                .iter()
                .enumerate()
                .filter(|(i, k)| !(*i == 0 && k.eq_ignore_ascii_case(&self.domain_term)))
                .map(|(_, k)| k.as_str()),
        );

        let request = self
            .localized(self.request(Engine::GoogleShopping, QueryTerm::Text(words.join(" "))))
            .with_param("num", self.page_size.to_string());
        request.validate()?;
        Ok(request)
    }

    /// Web query: quoted keyword set, qualifier, marketplace exclusions.
    pub fn web(&self, target: &SearchTarget) -> Result<SearchRequest> {
        let keywords = self.keywords(target)?;
        let mut query = format!("\"{}\"", keywords.join(" "));
        if !self.web_qualifier.is_empty() {
            query.push(' ');
            query.push_str(&self.web_qualifier);
        }
        for domain in &self.excluded_domains {
            query.push_str(&format!(" -site:{}", domain));
        }

        let request = self
            .localized(self.request(Engine::Google, QueryTerm::Text(query)))
            .with_param("num", self.page_size.to_string());
        request.validate()?;
        Ok(request)
    }

    /// Interest-over-time query for one harvest window.
    pub fn trends(
        &self,
        target: &SearchTarget,
        phase: Phase,
        today: NaiveDate,
    ) -> Result<SearchRequest> {
        let request = self
            .request(Engine::GoogleTrends, QueryTerm::Text(target.name.clone()))
            .with_param("hl", &self.language)
            .with_param("geo", trends_geo(&self.region))
            .with_param("date", phase.date_range(today))
            .with_param("data_type", "TIMESERIES");
        request.validate()?;
        Ok(request)
    }

    /// Seller offers for a product identifier.
    pub fn product_offers(&self, product_id: &str) -> Result<SearchRequest> {
        let request = self
            .localized(self.request(
                Engine::GoogleProduct,
                QueryTerm::Identifier(product_id.trim().to_string()),
            ))
            .with_param("offers", "1");
        request.validate()?;
        Ok(request)
    }
}

/// Trends wants ISO country codes.
fn trends_geo(region: &str) -> String {
    match region {
        "uk" => "GB".to_string(),
        other => other.to_ascii_uppercase(),
    }
}
