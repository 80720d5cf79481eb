//! The collection run: entities in, rows and metrics out.
//!
//! Entities are processed strictly one after another. Each query variant is
//! paginated to exhaustion (or the page cap) before the next one starts. One
//! entity's failure is recorded on its input row and never stops the run.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SurveyConfig;
use crate::error::{Result, SurveyError};
use crate::fetcher::CachingFetcher;
use crate::pipeline::classify::{EntityScope, ResultClassifier};
use crate::pipeline::dedup::dedupe_sink;
use crate::pipeline::relevance::RelevanceFilter;
use crate::pipeline::stats::aggregate;
use crate::request::{RequestBuilder, SearchRequest};
use crate::security::{resolve_api_key, ApiKey};
use crate::traits::sink::{EntitySource, MetricsSink, RowSink};
use crate::traits::store::{CacheStore, PropertyStore};
use crate::traits::transport::Transport;
use crate::types::metrics::PriceObservations;
use crate::types::record::ResultRecord;
use crate::types::target::SearchTarget;

/// Everything a run needs, built once and passed down explicitly.
pub struct SurveyContext<T, C> {
    pub config: SurveyConfig,
    pub builder: RequestBuilder,
    pub fetcher: CachingFetcher<T, C>,
    pub classifier: ResultClassifier,
}

impl<T: Transport, C: CacheStore> SurveyContext<T, C> {
    /// Build a context, resolving the credential through the property store.
    pub async fn new(
        config: SurveyConfig,
        transport: T,
        cache: C,
        properties: &dyn PropertyStore,
    ) -> Result<Self> {
        config.validate()?;
        let api_key = resolve_api_key(config.api_key.as_deref(), properties).await?;
        Ok(Self::with_api_key(config, api_key, transport, cache))
    }

    /// Build a context around an already validated key.
    pub fn with_api_key(config: SurveyConfig, api_key: ApiKey, transport: T, cache: C) -> Self {
        Self {
            builder: RequestBuilder::new(&config, api_key),
            fetcher: CachingFetcher::new(transport, cache, &config.fetch),
            classifier: ResultClassifier::new(RelevanceFilter::new(&config.domain_term)),
            config,
        }
    }
}

/// Where a collection run reads entities and writes results.
#[derive(Clone, Copy)]
pub struct CollectionSinks<'a> {
    pub entities: &'a dyn EntitySource,
    pub rows: &'a dyn RowSink,
    pub metrics: &'a dyn MetricsSink,
}

impl<'a> CollectionSinks<'a> {
    /// All three roles served by one store.
    pub fn single<S>(store: &'a S) -> Self
    where
        S: EntitySource + RowSink + MetricsSink,
    {
        Self {
            entities: store,
            rows: store,
            metrics: store,
        }
    }
}

/// Summary of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionReport {
    pub entities: usize,

    /// `(position, message)` of every entity that failed.
    pub failed: Vec<(usize, String)>,

    pub rows_appended: usize,
    pub duplicates_removed: usize,
    pub metrics_rows: usize,
}

/// Query variants paginated per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Listing,
    Web,
}

/// Run a full collection over every entity.
pub async fn run_collection<T, C>(
    ctx: &SurveyContext<T, C>,
    sinks: CollectionSinks<'_>,
) -> Result<CollectionReport>
where
    T: Transport,
    C: CacheStore,
{
    let targets = sinks.entities.load_targets().await?;
    info!(entities = targets.len(), "Starting collection run");

    let mut observations = PriceObservations::new();
    let mut report = CollectionReport {
        entities: targets.len(),
        ..Default::default()
    };

    for target in &targets {
        observations.ensure(&target.name);

        match collect_entity(ctx, target, sinks.rows, &mut observations).await {
            Ok(appended) => {
                info!(entity = %target.name, rows = appended, "Entity collected");
                report.rows_appended += appended;
            }
            Err(e) => {
                warn!(entity = %target.name, position = target.position, error = %e, "Entity failed");
                let message = e.to_string();
                if let Err(annotate_err) = sinks
                    .entities
                    .annotate_error(target.position, &message)
                    .await
                {
                    warn!(
                        entity = %target.name,
                        error = %annotate_err,
                        "Could not annotate failed entity"
                    );
                }
                report.failed.push((target.position, message));
            }
        }
    }

    report.duplicates_removed = dedupe_sink(sinks.rows).await?;

    for row in aggregate(observations) {
        sinks.metrics.append_metrics(&row).await?;
        report.metrics_rows += 1;
    }

    info!(
        entities = report.entities,
        failed = report.failed.len(),
        rows = report.rows_appended,
        duplicates = report.duplicates_removed,
        "Collection run complete"
    );
    Ok(report)
}

/// Every variant for one entity. Returns the number of rows appended.
async fn collect_entity<T, C>(
    ctx: &SurveyContext<T, C>,
    target: &SearchTarget,
    rows: &dyn RowSink,
    observations: &mut PriceObservations,
) -> Result<usize>
where
    T: Transport,
    C: CacheStore,
{
    let keywords = target.keywords();
    let mut appended = 0;
    let mut listing_rows = Vec::new();

    for variant in [Variant::Listing, Variant::Web] {
        let request = match variant {
            Variant::Listing => ctx.builder.shopping(target)?,
            Variant::Web => ctx.builder.web(target)?,
        };
        let scope = EntityScope {
            entity: &target.name,
            query: request.query_text(),
            keywords: &keywords,
        };

        let records = drain_pages(ctx, &request, scope, |payload| match variant {
            Variant::Listing => ctx.classifier.listing(payload, scope),
            Variant::Web => ctx.classifier.web(payload, scope),
        })
        .await?;

        appended += record_batch(&records, rows, observations).await?;
        if variant == Variant::Listing {
            listing_rows = records;
        }
    }

    if ctx.config.offer_lookups > 0 {
        appended += follow_offers(ctx, target, &keywords, &listing_rows, rows, observations).await?;
    }

    Ok(appended)
}

/// Fetch page after page until no continuation remains or the cap is hit.
///
/// A fetch failure abandons the remaining pages of this variant only; any
/// other error fails the entity.
async fn drain_pages<T, C, F>(
    ctx: &SurveyContext<T, C>,
    first: &SearchRequest,
    scope: EntityScope<'_>,
    classify: F,
) -> Result<Vec<ResultRecord>>
where
    T: Transport,
    C: CacheStore,
    F: Fn(&serde_json::Value) -> Vec<ResultRecord>,
{
    let mut records = Vec::new();
    let mut next = Some(first.clone());
    let mut pages = 0;

    while let Some(request) = next.take() {
        if pages >= ctx.config.max_pages {
            info!(
                entity = scope.entity,
                engine = %request.engine,
                pages,
                "Page cap reached, dropping continuation"
            );
            break;
        }

        match ctx.fetcher.fetch(&request).await {
            Ok(outcome) => {
                pages += 1;
                records.extend(classify(&outcome.payload));
                next = outcome.next_page.map(|url| request.with_continuation(url));
            }
            Err(e @ (SurveyError::Fetch(_) | SurveyError::MalformedResponse(_))) => {
                warn!(
                    entity = scope.entity,
                    engine = %request.engine,
                    page = pages + 1,
                    error = %e,
                    "Abandoning request"
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(records)
}

/// Product-offer follow-ups for listing rows that are sold by several stores.
async fn follow_offers<T, C>(
    ctx: &SurveyContext<T, C>,
    target: &SearchTarget,
    keywords: &[String],
    listing_rows: &[ResultRecord],
    rows: &dyn RowSink,
    observations: &mut PriceObservations,
) -> Result<usize>
where
    T: Transport,
    C: CacheStore,
{
    let mut seen = std::collections::HashSet::new();
    let product_ids: Vec<&str> = listing_rows
        .iter()
        .filter(|r| r.comparison_count.unwrap_or(0) > 1)
        .filter_map(|r| r.product_id.as_deref())
        .filter(|id| seen.insert(*id))
        .take(ctx.config.offer_lookups)
        .collect();

    let mut appended = 0;
    for product_id in product_ids {
        let request = ctx.builder.product_offers(product_id)?;
        let scope = EntityScope {
            entity: &target.name,
            query: None,
            keywords,
        };

        let offers = match ctx.fetcher.fetch(&request).await {
            Ok(outcome) => ctx.classifier.offers(&outcome.payload, product_id, scope),
            Err(e @ (SurveyError::Fetch(_) | SurveyError::MalformedResponse(_))) => {
                warn!(entity = %target.name, product_id, error = %e, "Offer lookup failed");
                continue;
            }
            Err(e) => return Err(e),
        };
        appended += record_batch(&offers, rows, observations).await?;
    }
    Ok(appended)
}

/// Append rows and feed their prices to the observation set.
async fn record_batch(
    records: &[ResultRecord],
    rows: &dyn RowSink,
    observations: &mut PriceObservations,
) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    rows.append(records).await?;
    for record in records {
        if let Some(price) = record.price {
            observations.record(&record.entity, price);
        }
    }
    Ok(records.len())
}

impl CollectionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
