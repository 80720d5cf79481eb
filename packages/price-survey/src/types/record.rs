//! Flattened result rows written to the row sink.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Shopping,
    Organic,
    Ad,
    InlineShopping,
    Local,
    KnowledgeGraph,
    RelatedSearch,
    ProductOffer,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::Organic => "organic",
            Self::Ad => "ad",
            Self::InlineShopping => "inline_shopping",
            Self::Local => "local",
            Self::KnowledgeGraph => "knowledge_graph",
            Self::RelatedSearch => "related_search",
            Self::ProductOffer => "product_offer",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column header of the row sink.
pub const RECORD_HEADER: [&str; 27] = [
    "source_type",
    "entity",
    "query",
    "position",
    "title",
    "price_raw",
    "price",
    "old_price_raw",
    "old_price",
    "link",
    "displayed_link",
    "product_id",
    "product_link",
    "offers_link",
    "store",
    "store_rating",
    "store_reviews",
    "delivery",
    "discount",
    "tag",
    "comparison_count",
    "comparison_link",
    "snippet",
    "extensions",
    "thumbnail",
    "image",
    "additional_options",
];

/// One extracted listing, ad or result.
///
/// Rows are immutable once appended; the deduplicator only drops whole rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub source_type: SourceType,
    pub entity: String,
    pub query: Option<String>,
    pub position: Option<u32>,
    pub title: Option<String>,
    pub price_raw: Option<String>,
    pub price: Option<f64>,
    pub old_price_raw: Option<String>,
    pub old_price: Option<f64>,
    pub link: Option<String>,
    pub displayed_link: Option<String>,
    pub product_id: Option<String>,
    pub product_link: Option<String>,
    pub offers_link: Option<String>,
    pub store: Option<String>,
    pub store_rating: Option<f64>,
    pub store_reviews: Option<u64>,
    pub delivery: Option<String>,
    pub discount: Option<String>,
    pub tag: Option<String>,
    pub comparison_count: Option<u32>,
    pub comparison_link: Option<String>,
    pub snippet: Option<String>,
    pub extensions: Vec<String>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub additional_options: Option<String>,
}

impl ResultRecord {
    /// Empty row for an entity.
    pub fn new(source_type: SourceType, entity: impl Into<String>) -> Self {
        Self {
            source_type,
            entity: entity.into(),
            query: None,
            position: None,
            title: None,
            price_raw: None,
            price: None,
            old_price_raw: None,
            old_price: None,
            link: None,
            displayed_link: None,
            product_id: None,
            product_link: None,
            offers_link: None,
            store: None,
            store_rating: None,
            store_reviews: None,
            delivery: None,
            discount: None,
            tag: None,
            comparison_count: None,
            comparison_link: None,
            snippet: None,
            extensions: vec![],
            thumbnail: None,
            image: None,
            additional_options: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_product_id(mut self, id: impl Into<String>) -> Self {
        self.product_id = Some(id.into());
        self
    }

    pub fn with_price(mut self, price: Option<f64>) -> Self {
        self.price = price;
        self
    }

    /// Render the row in [`RECORD_HEADER`] order. Absent values are empty strings.
    pub fn to_row(&self) -> Vec<String> {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        fn num<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|n| n.to_string()).unwrap_or_default()
        }

        vec![
            self.source_type.to_string(),
            self.entity.clone(),
            text(&self.query),
            num(&self.position),
            text(&self.title),
            text(&self.price_raw),
            num(&self.price),
            text(&self.old_price_raw),
            num(&self.old_price),
            text(&self.link),
            text(&self.displayed_link),
            text(&self.product_id),
            text(&self.product_link),
            text(&self.offers_link),
            text(&self.store),
            num(&self.store_rating),
            num(&self.store_reviews),
            text(&self.delivery),
            text(&self.discount),
            text(&self.tag),
            num(&self.comparison_count),
            text(&self.comparison_link),
            text(&self.snippet),
            self.extensions.join("; "),
            text(&self.thumbnail),
            text(&self.image),
            text(&self.additional_options),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_matches_header_width() {
        let record = ResultRecord::new(SourceType::Shopping, "Hoya kerrii")
            .with_title("Hoya kerrii heart leaf")
            .with_price(Some(12.5));
        let row = record.to_row();
        assert_eq!(row.len(), RECORD_HEADER.len());
        assert_eq!(row[0], "shopping");
        assert_eq!(row[6], "12.5");
        // Empty price renders as an empty cell, not zero
        let empty = ResultRecord::new(SourceType::Organic, "Hoya kerrii").to_row();
        assert_eq!(empty[6], "");
    }
}
