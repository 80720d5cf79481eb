//! Post-run deduplication of the row sink.

use std::collections::HashSet;
use tracing::info;

use crate::error::Result;
use crate::traits::sink::RowSink;
use crate::types::record::ResultRecord;

/// Identity of a row: product identifier when present, else link and title.
pub fn identity_key(record: &ResultRecord) -> String {
    match record.product_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => format!("pid:{}", id),
        None => format!(
            "lt:{}|{}",
            record.link.as_deref().unwrap_or(""),
            record.title.as_deref().unwrap_or("")
        ),
    }
}

/// Keep the first row of every identity. Returns the rows kept and the count dropped.
pub fn dedupe(records: Vec<ResultRecord>) -> (Vec<ResultRecord>, usize) {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<ResultRecord> = records
        .into_iter()
        .filter(|r| seen.insert(identity_key(r)))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Rewrite the sink without duplicates. The sink is left untouched when
/// nothing was dropped.
pub async fn dedupe_sink(sink: &dyn RowSink) -> Result<usize> {
    let (kept, removed) = dedupe(sink.read_all().await?);
    if removed > 0 {
        sink.rewrite(&kept).await?;
        info!(removed, kept = kept.len(), "Removed duplicate rows");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::record::SourceType;

    fn row(title: &str, link: &str) -> ResultRecord {
        ResultRecord::new(SourceType::Shopping, "Hoya kerrii")
            .with_title(title)
            .with_link(link)
    }

    #[test]
    fn test_same_product_id_collapses_first_kept() {
        let first = row("A", "https://a").with_product_id("123");
        let second = row("B", "https://b").with_product_id("123");
        let (kept, removed) = dedupe(vec![first.clone(), second]);
        assert_eq!(kept, vec![first]);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_same_link_and_title_collapses() {
        let (kept, removed) = dedupe(vec![row("A", "https://a"), row("A", "https://a")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_distinct_titles_retained() {
        let (kept, removed) = dedupe(vec![row("A", "https://a"), row("B", "https://a")]);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_id_and_link_keys_never_collide() {
        let with_id = row("", "").with_product_id("x");
        let mut lookalike = row("", "");
        lookalike.link = Some("pid:x".into());
        assert_ne!(identity_key(&with_id), identity_key(&lookalike));
    }

    #[tokio::test]
    async fn test_dedupe_sink_rewrites() {
        let store = MemoryStore::new();
        store
            .append(&[row("A", "https://a"), row("A", "https://a"), row("B", "https://b")])
            .await
            .unwrap();

        assert_eq!(dedupe_sink(&store).await.unwrap(), 1);
        assert_eq!(store.row_count(), 2);
        assert_eq!(dedupe_sink(&store).await.unwrap(), 0);
    }
}
