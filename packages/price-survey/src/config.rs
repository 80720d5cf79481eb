//! Configuration for the survey run and the trend harvest.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SurveyError};

/// Default search API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://serpapi.com/search.json";

/// Regions the search API is queried for.
pub const SUPPORTED_REGIONS: &[&str] = &[
    "us", "uk", "ca", "au", "nz", "ie", "de", "fr", "nl", "sg", "ph", "th", "my", "id",
];

/// Top-level survey configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// API key as configured (validated later by `security::resolve_api_key`).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Search API endpoint.
    pub base_url: String,

    /// Region code (`gl`). Must be one of [`SUPPORTED_REGIONS`].
    pub region: String,

    /// Interface language (`hl`).
    pub language: String,

    /// Results per page (`num`).
    pub page_size: u32,

    /// Optional human-readable location passed to the API.
    pub location: Option<String>,

    /// Domain marker: prefixed to listing queries and required by the relevance filter.
    pub domain_term: String,

    /// Phrase appended to web queries.
    pub web_qualifier: String,

    /// Marketplace domains excluded from web queries.
    #[serde(default)]
    pub excluded_domains: Vec<String>,

    /// Maximum characters kept from an entity name.
    pub name_limit: usize,

    /// Page cap per entity per query variant.
    pub max_pages: usize,

    /// Product-offer follow-ups per entity (0 disables them).
    pub offer_lookups: usize,

    pub fetch: FetchConfig,

    pub harvest: HarvestConfig,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            region: "us".to_string(),
            language: "en".to_string(),
            page_size: 100,
            location: None,
            domain_term: "hoya".to_string(),
            web_qualifier: "for sale".to_string(),
            excluded_domains: vec![
                "ebay.com".to_string(),
                "etsy.com".to_string(),
                "amazon.com".to_string(),
                "facebook.com".to_string(),
            ],
            name_limit: 80,
            max_pages: 10,
            offer_lookups: 0,
            fetch: FetchConfig::default(),
            harvest: HarvestConfig::default(),
        }
    }
}

impl SurveyConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `SURVEY_*` environment variables.
    ///
    /// Reads `.env` first when present. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let fetch = FetchConfig {
            max_attempts: env_parse("SURVEY_MAX_ATTEMPTS", defaults.fetch.max_attempts)?,
            base_delay_ms: env_parse("SURVEY_BASE_DELAY_MS", defaults.fetch.base_delay_ms)?,
            cache_ttl_secs: env_parse("SURVEY_CACHE_TTL_SECS", defaults.fetch.cache_ttl_secs)?,
            timeout_secs: env_parse("SURVEY_TIMEOUT_SECS", defaults.fetch.timeout_secs)?,
        };
        let harvest = HarvestConfig {
            batch_size: env_parse("SURVEY_BATCH_SIZE", defaults.harvest.batch_size)?,
            politeness_delay_ms: env_parse(
                "SURVEY_POLITENESS_DELAY_MS",
                defaults.harvest.politeness_delay_ms,
            )?,
            retrigger_delay_secs: env_parse(
                "SURVEY_RETRIGGER_DELAY_SECS",
                defaults.harvest.retrigger_delay_secs,
            )?,
        };

        let config = Self {
            api_key: env::var("SURVEY_API_KEY").ok(),
            base_url: env::var("SURVEY_BASE_URL").unwrap_or(defaults.base_url),
            region: env::var("SURVEY_REGION").unwrap_or(defaults.region),
            language: env::var("SURVEY_LANGUAGE").unwrap_or(defaults.language),
            page_size: env_parse("SURVEY_PAGE_SIZE", defaults.page_size)?,
            location: env::var("SURVEY_LOCATION").ok(),
            domain_term: env::var("SURVEY_DOMAIN_TERM").unwrap_or(defaults.domain_term),
            web_qualifier: env::var("SURVEY_WEB_QUALIFIER").unwrap_or(defaults.web_qualifier),
            excluded_domains: env::var("SURVEY_EXCLUDED_DOMAINS")
                .map(|v| {
                    v.split(',')
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.excluded_domains),
            name_limit: env_parse("SURVEY_NAME_LIMIT", defaults.name_limit)?,
            max_pages: env_parse("SURVEY_MAX_PAGES", defaults.max_pages)?,
            offer_lookups: env_parse("SURVEY_OFFER_LOOKUPS", defaults.offer_lookups)?,
            fetch,
            harvest,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can never produce a valid request.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_REGIONS.contains(&self.region.as_str()) {
            return Err(SurveyError::Config(format!(
                "unsupported region '{}'",
                self.region
            )));
        }
        if self.domain_term.trim().is_empty() {
            return Err(SurveyError::Config("domain term must not be empty".into()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(SurveyError::Config("max_attempts must be > 0".into()));
        }
        if self.harvest.batch_size == 0 {
            return Err(SurveyError::Config("batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the search API endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the region code.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the page cap per variant.
    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    /// Enable product-offer follow-ups.
    pub fn with_offer_lookups(mut self, lookups: usize) -> Self {
        self.offer_lookups = lookups;
        self
    }

    /// Replace the fetch settings.
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Replace the harvest settings.
    pub fn with_harvest(mut self, harvest: HarvestConfig) -> Self {
        self.harvest = harvest;
        self
    }
}

/// Retry, cache and timeout settings for the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Attempts per request, including the first.
    pub max_attempts: u32,

    /// First backoff delay; doubles on every retry.
    pub base_delay_ms: u64,

    /// Cache entry lifetime.
    pub cache_ttl_secs: u64,

    /// HTTP timeout per attempt.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            cache_ttl_secs: 6 * 60 * 60,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Batch settings for the trend harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Entities processed per invocation.
    pub batch_size: usize,

    /// Pause after every entity.
    pub politeness_delay_ms: u64,

    /// Delay before the next invocation is triggered.
    pub retrigger_delay_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            politeness_delay_ms: 1_000,
            retrigger_delay_secs: 60,
        }
    }
}

impl HarvestConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn retrigger_delay(&self) -> Duration {
        Duration::from_secs(self.retrigger_delay_secs)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SurveyError::Config(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}
