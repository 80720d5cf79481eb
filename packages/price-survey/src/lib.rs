//! Search-API price survey
//!
//! Queries a search API for a list of named entities under several query
//! variants, turns the heterogeneous result payloads into uniform rows and
//! price observations, removes duplicates, and writes per-entity summary
//! statistics. A second workflow harvests weekly interest series over three
//! growing windows, one bounded batch per invocation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use price_survey::{run_collection, CollectionSinks, MemoryStore, SurveyConfig, SurveyContext};
//! use price_survey::traits::transport::ReqwestTransport;
//!
//! let config = SurveyConfig::from_env()?;
//! let store = MemoryStore::with_entities(&["Hoya kerrii", "Hoya carnosa"]);
//! let transport = ReqwestTransport::new(config.fetch.timeout())?;
//!
//! let ctx = SurveyContext::new(config, transport, std::sync::Arc::new(MemoryStore::new()), &store).await?;
//! let report = run_collection(&ctx, CollectionSinks::single(&store)).await?;
//! ```
//!
//! # Modules
//!
//! - [`request`] - Request construction and validation
//! - [`fetcher`] - Cached, retrying page fetches
//! - [`pipeline`] - Classification, relevance, prices, dedup and statistics
//! - [`harvest`] - Checkpointed multi-phase trend harvest
//! - [`traits`] - Collaborator interfaces (transport, stores, sinks, triggers)
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`security`] - API key handling
//! - [`testing`] - Mock transport and payload fixtures

pub mod config;
pub mod error;
pub mod fetcher;
pub mod harvest;
pub mod pipeline;
pub mod request;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{FetchConfig, HarvestConfig, SurveyConfig};
pub use error::{FetchError, Result, SurveyError, TransportError};
pub use fetcher::{CachingFetcher, FetchOutcome, RetryPolicy};
pub use harvest::{HarvestStores, InvocationOutcome, TrendHarvester, HARVEST_HANDLER};
pub use pipeline::{
    run_collection, CollectionReport, CollectionSinks, RelevanceFilter, ResultClassifier,
    SurveyContext,
};
pub use request::{Engine, QueryTerm, RequestBuilder, SearchRequest};
pub use security::ApiKey;
pub use stores::MemoryStore;
pub use traits::{
    sink::{EntitySource, MetricsSink, RowSink, SeriesSink},
    store::{CacheStore, PropertyStore},
    transport::{HttpResponse, ReqwestTransport, Transport},
    trigger::{PendingTrigger, TriggerScheduler},
};
pub use types::{
    harvest::{BatchCheckpoint, Phase, TrendRow, TrendSeries},
    metrics::{MetricsRow, PriceObservations},
    record::{ResultRecord, SourceType, RECORD_HEADER},
    target::SearchTarget,
};

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
