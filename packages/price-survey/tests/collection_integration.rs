//! End-to-end collection runs against scripted search responses.

use price_survey::testing::{fixtures, MockTransport};
use price_survey::{
    run_collection, ApiKey, CollectionSinks, FetchConfig, HttpResponse, MemoryStore,
    MetricsRow, MetricsSink, RowSink, SearchTarget, SourceType, SurveyConfig, SurveyContext,
};
use serde_json::json;
use std::sync::Arc;

const KEY: &str = "abcdef0123456789abcdef0123456789";

fn config() -> SurveyConfig {
    SurveyConfig::default().with_fetch(FetchConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        ..FetchConfig::default()
    })
}

fn context(
    config: SurveyConfig,
    transport: Arc<MockTransport>,
) -> SurveyContext<Arc<MockTransport>, Arc<MemoryStore>> {
    SurveyContext::with_api_key(
        config,
        ApiKey::parse(KEY).unwrap(),
        transport,
        Arc::new(MemoryStore::new()),
    )
}

fn empty_web() -> HttpResponse {
    HttpResponse::ok_json(&fixtures::web_page(&[]))
}

fn metrics_for<'a>(rows: &'a [MetricsRow], entity: &str) -> &'a MetricsRow {
    rows.iter()
        .find(|r| r.entity == entity)
        .unwrap_or_else(|| panic!("no metrics row for {}", entity))
}

#[tokio::test]
async fn test_failed_entity_is_annotated_and_run_continues() {
    let transport = Arc::new(
        MockTransport::new().with_default(empty_web()).route(
            "q=hoya kerrii",
            HttpResponse::ok_json(&fixtures::shopping_page(
                &[("Hoya kerrii heart", "$12.00", None)],
                None,
            )),
        ),
    );
    let ctx = context(config(), transport);
    let store = MemoryStore::with_entities(&["Hoya kerrii", "sp", "Hoya carnosa"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    assert_eq!(report.entities, 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 1);
    assert!(store.annotation(1).unwrap().contains("no usable keywords"));
    assert!(store.annotation(0).is_none());
    assert!(store.annotation(2).is_none());

    // Every entity gets a metrics row, observed or not.
    let metrics = store.read_metrics().await.unwrap();
    assert_eq!(metrics.len(), 3);
    assert_eq!(metrics_for(&metrics, "Hoya kerrii").sample_count, 1);
    assert_eq!(metrics_for(&metrics, "sp"), &MetricsRow::empty("sp"));
    assert_eq!(metrics_for(&metrics, "Hoya carnosa").mean, None);
}

#[tokio::test]
async fn test_irrelevant_listings_are_dropped() {
    let transport = Arc::new(
        MockTransport::new().with_default(empty_web()).route(
            "q=hoya kerrii",
            HttpResponse::ok_json(&fixtures::shopping_page(
                &[
                    ("Hoya kerrii heart plant", "$10.00", None),
                    ("Kerrii heart succulent", "$9.00", None),
                    ("Hoya carnosa tricolor", "$15.00", None),
                    ("", "$5.00", None),
                ],
                None,
            )),
        ),
    );
    let ctx = context(config(), transport);
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    let rows = store.read_all().await.unwrap();
    assert_eq!(report.rows_appended, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title.as_deref(), Some("Hoya kerrii heart plant"));
    assert_eq!(rows[0].source_type, SourceType::Shopping);
    assert_eq!(rows[0].query.as_deref(), Some("hoya kerrii"));
}

#[tokio::test]
async fn test_prices_and_percentiles() {
    let transport = Arc::new(
        MockTransport::new().with_default(empty_web()).route(
            "q=hoya kerrii",
            HttpResponse::ok_json(&fixtures::shopping_page(
                &[
                    ("Hoya kerrii heart", "$10.00", None),
                    ("Hoya kerrii variegata", "$1,020.50", None),
                    ("Hoya kerrii splash", "£30", None),
                    ("Hoya kerrii albomarginata", "$40.00", None),
                    ("Hoya kerrii rooted cutting", "", None),
                ],
                None,
            )),
        ),
    );
    let ctx = context(config(), transport);
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    let rows = store.read_all().await.unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1].price, Some(1020.5));
    assert_eq!(rows[2].price, Some(30.0));

    // Kept without a price, and contributes no observation.
    assert_eq!(rows[4].price, None);
    assert_eq!(rows[4].price_raw, None);

    let metrics = store.read_metrics().await.unwrap();
    let row = metrics_for(&metrics, "Hoya kerrii");
    assert_eq!(row.sample_count, 4);
    assert_eq!(row.mean, Some(275.13));
    assert_eq!(row.percentile(0), Some(10.0));
    assert_eq!(row.percentile(50), Some(30.0));
    assert_eq!(row.percentile(100), Some(1020.5));
}

#[tokio::test]
async fn test_four_prices_nearest_rank() {
    let transport = Arc::new(
        MockTransport::new().with_default(empty_web()).route(
            "q=hoya kerrii",
            HttpResponse::ok_json(&fixtures::shopping_page(
                &[
                    ("Hoya kerrii heart", "$40", None),
                    ("Hoya kerrii splash", "$10", None),
                    ("Hoya kerrii variegata", "$30", None),
                    ("Hoya kerrii reverse", "$20", None),
                ],
                None,
            )),
        ),
    );
    let ctx = context(config(), transport);
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    let metrics = store.read_metrics().await.unwrap();
    let row = metrics_for(&metrics, "Hoya kerrii");
    assert_eq!(row.mean, Some(25.0));
    assert_eq!(row.percentile(0), Some(10.0));
    assert_eq!(row.percentile(25), Some(10.0));
    assert_eq!(row.percentile(50), Some(20.0));
    assert_eq!(row.percentile(75), Some(30.0));
    assert_eq!(row.percentile(100), Some(40.0));
}

#[tokio::test]
async fn test_duplicates_removed_after_run() {
    let transport = Arc::new(
        MockTransport::new().with_default(empty_web()).route(
            "q=hoya kerrii",
            HttpResponse::ok_json(&fixtures::shopping_page(
                &[
                    ("Hoya kerrii heart", "$10.00", Some("p1")),
                    ("Hoya kerrii heart (listed again)", "$10.00", Some("p1")),
                    ("Hoya kerrii splash", "$20.00", None),
                ],
                None,
            )),
        ),
    );
    let ctx = context(config(), transport);
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    assert_eq!(report.rows_appended, 3);
    assert_eq!(report.duplicates_removed, 1);

    let rows = store.read_all().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title.as_deref(), Some("Hoya kerrii heart"));
    assert_eq!(rows[1].title.as_deref(), Some("Hoya kerrii splash"));
}

#[tokio::test]
async fn test_identical_requests_hit_network_once() {
    let transport = Arc::new(MockTransport::new().with_default(HttpResponse::ok_json(
        &fixtures::shopping_page(&[("Hoya kerrii heart", "$10.00", None)], None),
    )));
    let ctx = context(config(), transport.clone());
    let target = SearchTarget::new("Hoya kerrii", 0, 80).unwrap();
    let request = ctx.builder.shopping(&target).unwrap();

    let first = ctx.fetcher.fetch(&request).await.unwrap();
    let second = ctx.fetcher.fetch(&request).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.payload, second.payload);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_retry_after_server_error_caches_once() {
    let transport = Arc::new(
        MockTransport::new()
            .push(HttpResponse::new(500, "upstream unavailable"))
            .push(HttpResponse::ok_json(&fixtures::shopping_page(&[], None))),
    );
    let cache = Arc::new(MemoryStore::new());
    let ctx = SurveyContext::with_api_key(
        config(),
        ApiKey::parse(KEY).unwrap(),
        transport.clone(),
        cache.clone(),
    );
    let target = SearchTarget::new("Hoya kerrii", 0, 80).unwrap();
    let request = ctx.builder.shopping(&target).unwrap();

    let outcome = ctx.fetcher.fetch(&request).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(cache.cache_writes(), 1);
}

#[tokio::test]
async fn test_pagination_reattaches_credential() {
    let transport = Arc::new(
        MockTransport::new()
            .with_default(empty_web())
            .route(
                "start=20",
                HttpResponse::ok_json(&fixtures::shopping_page(
                    &[("Hoya kerrii splash", "$20.00", None)],
                    None,
                )),
            )
            .route(
                "q=hoya kerrii",
                HttpResponse::ok_json(&fixtures::shopping_page(
                    &[("Hoya kerrii heart", "$10.00", None)],
                    Some("/search.json?engine=google_shopping&q=hoya+kerrii&start=20"),
                )),
            ),
    );
    let ctx = context(config(), transport.clone());
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    assert_eq!(report.rows_appended, 2);
    assert_eq!(transport.calls_matching("engine=google_shopping"), 2);

    let continued: Vec<String> = transport
        .calls()
        .into_iter()
        .filter(|u| u.contains("start=20"))
        .collect();
    assert_eq!(continued.len(), 1);
    assert!(continued[0].starts_with("https://serpapi.com/search.json?"));
    assert!(continued[0].contains(&format!("api_key={}", KEY)));
}

#[tokio::test]
async fn test_page_cap_stops_pagination() {
    let transport = Arc::new(
        MockTransport::new().with_default(empty_web()).route(
            "q=hoya kerrii",
            HttpResponse::ok_json(&fixtures::shopping_page(
                &[("Hoya kerrii heart", "$10.00", None)],
                Some("https://serpapi.com/search.json?engine=google_shopping&q=hoya+kerrii&start=20"),
            )),
        ),
    );
    let ctx = context(config().with_max_pages(1), transport.clone());
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.rows_appended, 1);
    assert_eq!(transport.calls_matching("engine=google_shopping"), 1);
}

#[tokio::test]
async fn test_fetch_failure_abandons_variant_only() {
    let transport = Arc::new(
        MockTransport::new()
            .route("q=hoya kerrii", HttpResponse::new(503, "busy"))
            .with_default(HttpResponse::ok_json(&fixtures::web_page(&[(
                "Hoya kerrii for sale",
                "Rooted Hoya kerrii cuttings from $14.99",
                "https://nursery.example/kerrii",
            )]))),
    );
    let ctx = context(config(), transport.clone());
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(transport.calls_matching("engine=google_shopping"), 2);

    let rows = store.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source_type, SourceType::Organic);
    assert_eq!(rows[0].price, Some(14.99));
}

#[tokio::test]
async fn test_offer_follow_ups() {
    let listing = json!({
        "shopping_results": [
            {
                "title": "Hoya kerrii heart",
                "price": "$10.00",
                "product_id": "777",
                "number_of_comparisons": "3+",
                "link": "https://shop.example/1",
            },
            {
                "title": "Hoya kerrii splash",
                "price": "$20.00",
                "product_id": "888",
                "link": "https://shop.example/2",
            },
        ]
    });
    let offers = json!({
        "product_results": { "title": "Hoya kerrii heart" },
        "sellers_results": {
            "online_sellers": [
                { "name": "Green Shop", "base_price": "$11.00", "link": "https://green.example/777" },
                { "name": "Leaf Co", "extracted_price": 9.5, "link": "https://leaf.example/777" },
            ]
        }
    });
    let transport = Arc::new(
        MockTransport::new()
            .with_default(empty_web())
            .route("engine=google_product", HttpResponse::ok_json(&offers))
            .route("q=hoya kerrii", HttpResponse::ok_json(&listing)),
    );
    let ctx = context(config().with_offer_lookups(5), transport.clone());
    let store = MemoryStore::with_entities(&["Hoya kerrii"]);

    let report = run_collection(&ctx, CollectionSinks::single(&store))
        .await
        .unwrap();

    assert_eq!(report.rows_appended, 4);
    assert_eq!(transport.calls_matching("engine=google_product"), 1);
    assert_eq!(transport.calls_matching("product_id=777"), 1);

    let rows = store.read_all().await.unwrap();
    let offer_rows: Vec<_> = rows
        .iter()
        .filter(|r| r.source_type == SourceType::ProductOffer)
        .collect();
    assert_eq!(offer_rows.len(), 2);
    assert_eq!(offer_rows[0].store.as_deref(), Some("Green Shop"));
    assert_eq!(offer_rows[0].price, Some(11.0));
    assert_eq!(offer_rows[1].price, Some(9.5));

    let metrics = store.read_metrics().await.unwrap();
    assert_eq!(metrics_for(&metrics, "Hoya kerrii").sample_count, 4);
}
