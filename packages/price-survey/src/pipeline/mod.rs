//! Collection pipeline.
//!
//! Data flow per entity:
//! 1. [`RequestBuilder`](crate::request::RequestBuilder) builds the listing and web requests
//! 2. [`CachingFetcher`](crate::fetcher::CachingFetcher) fetches page after page
//! 3. [`classify`] turns each payload into rows, [`relevance`] keeps the relevant ones
//! 4. [`price`] normalizes prices into observations
//!
//! After the last entity, [`dedup`] cleans the row sink and [`stats`] writes
//! one metrics row per entity.

pub mod classify;
pub mod collect;
pub mod dedup;
pub mod price;
pub mod relevance;
pub mod stats;

pub use classify::{EntityScope, ResultClassifier, SectionKind};
pub use collect::{run_collection, CollectionReport, CollectionSinks, SurveyContext};
pub use relevance::RelevanceFilter;
