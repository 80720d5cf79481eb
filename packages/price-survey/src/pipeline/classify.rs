//! Turns decoded API payloads into [`ResultRecord`]s.
//!
//! Web payloads are a bag of named sections. Each name maps onto a closed set
//! of [`SectionKind`]s; anything else is logged and skipped.

use serde_json::Value;
use tracing::{debug, info};

use crate::pipeline::price::{parse_currency, structured_value, PriceSources};
use crate::pipeline::relevance::RelevanceFilter;
use crate::types::record::{ResultRecord, SourceType};

/// Listing results array.
pub const LISTING_SECTION: &str = "shopping_results";

/// Top-level sections of a web payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    Organic,
    Ads,
    InlineShopping,
    Local,
    KnowledgeGraph,
    RelatedSearches,
    /// Request and pagination bookkeeping
    Metadata,
    Unrecognized(String),
}

impl SectionKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "organic_results" => Self::Organic,
            "ads" => Self::Ads,
            "inline_shopping_results" | "shopping_results" => Self::InlineShopping,
            "local_results" => Self::Local,
            "knowledge_graph" => Self::KnowledgeGraph,
            "related_searches" => Self::RelatedSearches,
            "search_metadata" | "search_parameters" | "search_information"
            | "serpapi_pagination" | "pagination" => Self::Metadata,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// The entity a payload is being classified for.
#[derive(Debug, Clone, Copy)]
pub struct EntityScope<'a> {
    pub entity: &'a str,
    pub query: Option<&'a str>,
    pub keywords: &'a [String],
}

/// Dispatches payload sections to type-specific handlers.
#[derive(Debug, Clone)]
pub struct ResultClassifier {
    filter: RelevanceFilter,
}

impl ResultClassifier {
    pub fn new(filter: RelevanceFilter) -> Self {
        Self { filter }
    }

    /// Records from a listing page. A page without a results array yields none.
    pub fn listing(&self, payload: &Value, scope: EntityScope<'_>) -> Vec<ResultRecord> {
        let Some(items) = payload.get(LISTING_SECTION).and_then(Value::as_array) else {
            info!(entity = scope.entity, "No listing results in response");
            return vec![];
        };

        self.keep_relevant(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| shopping_record(item, i, SourceType::Shopping, scope)),
            scope,
        )
    }

    /// Records from every recognized section of a web page.
    pub fn web(&self, payload: &Value, scope: EntityScope<'_>) -> Vec<ResultRecord> {
        let Some(sections) = payload.as_object() else {
            info!(entity = scope.entity, "Web response is not an object");
            return vec![];
        };

        let mut records = Vec::new();
        for (name, section) in sections {
            let kind = SectionKind::from_name(name);
            let candidates: Vec<ResultRecord> = match &kind {
                SectionKind::Organic => items(section)
                    .enumerate()
                    .map(|(i, item)| organic_record(item, i, scope))
                    .collect(),
                SectionKind::Ads => items(section)
                    .enumerate()
                    .map(|(i, item)| ad_record(item, i, scope))
                    .collect(),
                SectionKind::InlineShopping => items(section)
                    .enumerate()
                    .map(|(i, item)| shopping_record(item, i, SourceType::InlineShopping, scope))
                    .collect(),
                SectionKind::Local => local_items(section)
                    .enumerate()
                    .map(|(i, item)| local_record(item, i, scope))
                    .collect(),
                SectionKind::KnowledgeGraph => vec![knowledge_record(section, scope)],
                SectionKind::RelatedSearches => items(section)
                    .enumerate()
                    .map(|(i, item)| related_record(item, i, scope))
                    .collect(),
                SectionKind::Metadata => continue,
                SectionKind::Unrecognized(name) => {
                    debug!(entity = scope.entity, section = %name, "Ignoring unrecognized section");
                    continue;
                }
            };

            let total = candidates.len();
            let kept = self.keep_relevant(candidates.into_iter(), scope);
            debug!(
                entity = scope.entity,
                section = ?kind,
                total,
                kept = kept.len(),
                "Classified section"
            );
            records.extend(kept);
        }
        records
    }

    /// Seller offers of one product. Offers are addressed by identifier, so
    /// the relevance filter does not apply.
    pub fn offers(
        &self,
        payload: &Value,
        product_id: &str,
        scope: EntityScope<'_>,
    ) -> Vec<ResultRecord> {
        let Some(sellers) = payload
            .pointer("/sellers_results/online_sellers")
            .and_then(Value::as_array)
        else {
            debug!(entity = scope.entity, product_id, "No sellers in product response");
            return vec![];
        };

        let title = payload
            .pointer("/product_results/title")
            .and_then(Value::as_str)
            .unwrap_or(scope.entity);

        sellers
            .iter()
            .enumerate()
            .map(|(i, seller)| {
                let formatted = text(seller, "base_price").or_else(|| text(seller, "total_price"));
                let mut record = base_record(SourceType::ProductOffer, seller, i, scope);
                record.title = Some(title.to_string());
                record.product_id = Some(product_id.to_string());
                record.store = text(seller, "name");
                record.delivery = seller
                    .pointer("/additional_price/shipping")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                record.tag = text(seller, "tag");
                record.price = PriceSources {
                    structured: seller.get("extracted_price"),
                    formatted: formatted.as_deref(),
                    ..Default::default()
                }
                .extract();
                record.price_raw = formatted;
                record
            })
            .collect()
    }

    fn keep_relevant(
        &self,
        candidates: impl Iterator<Item = ResultRecord>,
        scope: EntityScope<'_>,
    ) -> Vec<ResultRecord> {
        candidates
            .filter(|r| {
                self.filter.is_relevant(
                    r.title.as_deref().unwrap_or(""),
                    r.snippet.as_deref().unwrap_or(""),
                    scope.keywords,
                    scope.entity,
                )
            })
            .collect()
    }
}

fn items(section: &Value) -> impl Iterator<Item = &Value> {
    section.as_array().into_iter().flatten()
}

/// Local results come either as an array or wrapped in `places`.
fn local_items(section: &Value) -> impl Iterator<Item = &Value> {
    section
        .as_array()
        .or_else(|| section.get("places").and_then(Value::as_array))
        .into_iter()
        .flatten()
}

fn text(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First present key, objects rendered as compact JSON.
fn text_any(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::Null => None,
        Value::Object(_) | Value::Array(_) => Some(v[*k].to_string()),
        _ => text(v, k),
    })
}

/// Counts like `1,204`, `"3+"` or `12`.
fn count(v: &Value, key: &str) -> Option<u64> {
    match v.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ',')
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn strings(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|e| match e {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn base_record(
    source_type: SourceType,
    item: &Value,
    index: usize,
    scope: EntityScope<'_>,
) -> ResultRecord {
    let mut record = ResultRecord::new(source_type, scope.entity);
    record.query = scope.query.map(str::to_string);
    record.position = count(item, "position")
        .map(|p| p as u32)
        .or(Some(index as u32 + 1));
    record.title = text(item, "title");
    record.link = text(item, "link");
    record.thumbnail = text(item, "thumbnail");
    record
}

fn shopping_record(
    item: &Value,
    index: usize,
    source_type: SourceType,
    scope: EntityScope<'_>,
) -> ResultRecord {
    let mut record = base_record(source_type, item, index, scope);
    record.snippet = text(item, "snippet");
    record.price_raw = text(item, "price");
    record.price = PriceSources {
        structured: item.get("extracted_price"),
        formatted: record.price_raw.as_deref(),
        title: record.title.as_deref(),
        snippet: record.snippet.as_deref(),
    }
    .extract();
    record.old_price_raw = text(item, "old_price");
    record.old_price = item
        .get("extracted_old_price")
        .and_then(structured_value)
        .or_else(|| record.old_price_raw.as_deref().and_then(parse_currency));
    record.product_id = text(item, "product_id");
    record.product_link = text(item, "product_link");
    record.offers_link = text_any(item, &["serpapi_product_api", "offers_link"]);
    record.store = text_any(item, &["source", "seller"]);
    record.store_rating = item
        .get("store_rating")
        .or_else(|| item.get("rating"))
        .and_then(Value::as_f64);
    record.store_reviews = count(item, "store_reviews").or_else(|| count(item, "reviews"));
    record.delivery = text(item, "delivery");
    record.discount = text(item, "discount");
    record.tag = text(item, "tag");
    record.comparison_count = count(item, "number_of_comparisons").map(|c| c as u32);
    record.comparison_link = text(item, "comparison_link");
    record.extensions = strings(item, "extensions");
    record.image = text_any(item, &["image", "serpapi_thumbnail"]);
    record.additional_options = text_any(
        item,
        &["additional_options", "alternative_price", "second_hand_condition"],
    );
    record
}

fn organic_record(item: &Value, index: usize, scope: EntityScope<'_>) -> ResultRecord {
    let mut record = base_record(SourceType::Organic, item, index, scope);
    record.displayed_link = text(item, "displayed_link");
    record.snippet = text(item, "snippet");

    let top = item.pointer("/rich_snippet/top");
    let structured = top.and_then(|t| t.pointer("/detected_extensions/price"));
    record.price_raw = structured.map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    record.extensions = top.map(|t| strings(t, "extensions")).unwrap_or_default();
    record.price = PriceSources {
        structured,
        formatted: None,
        title: record.title.as_deref(),
        snippet: record.snippet.as_deref(),
    }
    .extract();
    record
}

fn ad_record(item: &Value, index: usize, scope: EntityScope<'_>) -> ResultRecord {
    let mut record = base_record(SourceType::Ad, item, index, scope);
    record.displayed_link = text(item, "displayed_link");
    record.snippet = text_any(item, &["description", "snippet"]);
    record.store = text(item, "source");
    record.price_raw = text(item, "price");
    record.extensions = strings(item, "extensions");
    record.price = PriceSources {
        structured: item.get("extracted_price"),
        formatted: record.price_raw.as_deref(),
        title: record.title.as_deref(),
        snippet: record.snippet.as_deref(),
    }
    .extract();
    record
}

fn local_record(item: &Value, index: usize, scope: EntityScope<'_>) -> ResultRecord {
    let mut record = base_record(SourceType::Local, item, index, scope);
    record.snippet = text_any(item, &["description", "address"]);
    record.link = record.link.or_else(|| {
        item.pointer("/links/website")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| text(item, "website"))
    });
    record.store_rating = item.get("rating").and_then(Value::as_f64);
    record.store_reviews = count(item, "reviews");
    record.price_raw = text(item, "price");
    record.price = PriceSources {
        formatted: record.price_raw.as_deref(),
        title: record.title.as_deref(),
        snippet: record.snippet.as_deref(),
        ..Default::default()
    }
    .extract();
    record
}

fn knowledge_record(panel: &Value, scope: EntityScope<'_>) -> ResultRecord {
    let mut record = base_record(SourceType::KnowledgeGraph, panel, 0, scope);
    record.snippet = text(panel, "description");
    record.link = text(panel, "website").or_else(|| {
        panel
            .pointer("/source/link")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    record.image = panel
        .pointer("/header_images/0/image")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| text(panel, "image"));
    record.price = PriceSources {
        title: record.title.as_deref(),
        snippet: record.snippet.as_deref(),
        ..Default::default()
    }
    .extract();
    record
}

fn related_record(item: &Value, index: usize, scope: EntityScope<'_>) -> ResultRecord {
    let mut record = base_record(SourceType::RelatedSearch, item, index, scope);
    record.title = text(item, "query");
    record
}
