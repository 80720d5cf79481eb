//! Heuristic relevance filter for search results.
//!
//! Precision over recall: a result is kept only when it names the domain,
//! matches at least two keywords and carries the entity name in its title.
//! No fuzzy matching.

/// Keyword matches required for a result to be accepted.
pub const MIN_KEYWORD_MATCHES: usize = 2;

/// Accepts or rejects candidate results for an entity.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    domain_marker: String,
}

impl RelevanceFilter {
    pub fn new(domain_marker: impl AsRef<str>) -> Self {
        Self {
            domain_marker: domain_marker.as_ref().trim().to_lowercase(),
        }
    }

    /// Whether a result with this title and snippet belongs to the entity.
    pub fn is_relevant(
        &self,
        title: &str,
        snippet: &str,
        keywords: &[String],
        entity_name: &str,
    ) -> bool {
        let title = title.to_lowercase();
        let snippet = snippet.to_lowercase();

        if self.domain_marker.is_empty()
            || !(title.contains(&self.domain_marker) || snippet.contains(&self.domain_marker))
        {
            return false;
        }

        if keyword_matches(&title, &snippet, keywords) < MIN_KEYWORD_MATCHES {
            return false;
        }

        name_matches(&title, entity_name)
    }
}

/// Keywords present in title or snippet, each counted once.
fn keyword_matches(title: &str, snippet: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .filter(|k| title.contains(k.as_str()) || snippet.contains(k.as_str()))
        .count()
}

/// Full name in the title, or the name without its last token, or the last
/// token alone. `title` must already be lowercase.
fn name_matches(title: &str, entity_name: &str) -> bool {
    let name = entity_name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    if title.contains(&name) {
        return true;
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    // A single-token name was already checked in full.
    if tokens.len() < 2 {
        return false;
    }

    let (last, head) = match tokens.split_last() {
        Some(split) => split,
        None => return false,
    };
    title.contains(&head.join(" ")) || title.contains(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn filter() -> RelevanceFilter {
        RelevanceFilter::new("Hoya")
    }

    #[test]
    fn test_rejects_without_domain_marker() {
        assert!(!filter().is_relevant(
            "Rare Tropical Plant For Sale",
            "",
            &kw(&["lacunosa"]),
            "Hoya lacunosa"
        ));
        // Keywords and name present, marker missing.
        assert!(!RelevanceFilter::new("wax plant").is_relevant(
            "Hoya lacunosa cutting",
            "",
            &kw(&["Hoya", "lacunosa"]),
            "Hoya lacunosa"
        ));
    }

    #[test]
    fn test_single_keyword_is_never_enough() {
        assert!(!filter().is_relevant(
            "Hoya lacunosa variegated for sale",
            "",
            &kw(&["lacunosa"]),
            "Hoya lacunosa"
        ));
    }

    #[test]
    fn test_accepts_full_match() {
        assert!(filter().is_relevant(
            "HOYA LACUNOSA variegated for sale",
            "",
            &kw(&["Hoya", "lacunosa"]),
            "Hoya lacunosa"
        ));
    }

    #[test]
    fn test_keyword_counted_once_across_title_and_snippet() {
        // "lacunosa" in both fields still counts once; "royal" missing.
        assert!(!filter().is_relevant(
            "lacunosa",
            "hoya lacunosa",
            &kw(&["lacunosa", "royal"]),
            "lacunosa"
        ));
        // Snippet-only keyword still counts.
        assert!(filter().is_relevant(
            "Hoya lacunosa",
            "a royal flush cultivar",
            &kw(&["lacunosa", "royal"]),
            "Hoya lacunosa"
        ));
    }

    #[test]
    fn test_name_fallbacks() {
        let keywords = kw(&["Hoya", "carnosa", "Krimson"]);

        // Name minus last token.
        assert!(filter().is_relevant(
            "Hoya carnosa Krimson Princess cutting",
            "",
            &keywords,
            "Hoya carnosa Krimson Queen"
        ));
        // Last token alone.
        assert!(filter().is_relevant(
            "Queen hoya, carnosa",
            "",
            &keywords,
            "Hoya carnosa Krimson Queen"
        ));
        // Name only in the snippet does not count.
        assert!(!filter().is_relevant(
            "Plant cutting",
            "hoya carnosa krimson queen",
            &keywords,
            "Hoya carnosa Krimson Queen"
        ));
    }

    #[test]
    fn test_single_token_name_needs_full_match() {
        assert!(!filter().is_relevant(
            "hoya plant pot",
            "kerrii heart",
            &kw(&["hoya", "kerrii"]),
            "kerrii"
        ));
        assert!(filter().is_relevant(
            "hoya kerrii heart",
            "",
            &kw(&["hoya", "kerrii"]),
            "kerrii"
        ));
    }
}
