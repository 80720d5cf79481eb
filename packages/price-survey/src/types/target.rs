//! Search targets: the sanitized entities a run iterates over.

use serde::{Deserialize, Serialize};

/// Tokens that stand in for an unknown species and never make useful keywords.
pub const PLACEHOLDER_TOKENS: &[&str] = &["sp", "sp."];

/// Keywords taken from an entity name.
pub const MAX_KEYWORDS: usize = 3;

/// One entity to survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTarget {
    /// Sanitized entity name.
    pub name: String,

    /// Zero-based position in the source entity list.
    pub position: usize,

    /// External identifier carried into trend rows.
    pub identifier: Option<String>,
}

impl SearchTarget {
    /// Build a target from raw input.
    ///
    /// Returns `None` when nothing survives sanitizing.
    pub fn new(raw_name: &str, position: usize, name_limit: usize) -> Option<Self> {
        let name = sanitize_name(raw_name, name_limit);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            position,
            identifier: None,
        })
    }

    /// Attach an external identifier.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        self.identifier = (!identifier.trim().is_empty()).then(|| identifier.trim().to_string());
        self
    }

    /// Keyword set used for listing queries and relevance filtering.
    pub fn keywords(&self) -> Vec<String> {
        listing_keywords(&self.name)
    }
}

/// Strip everything but alphanumerics and spaces, collapse whitespace and cap length.
pub fn sanitize_name(raw: &str, limit: usize) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(limit).collect::<String>().trim().to_string()
}

/// First three words of a name, placeholder tokens excluded.
pub fn listing_keywords(name: &str) -> Vec<String> {
    name.split_whitespace()
        .filter(|token| {
            !PLACEHOLDER_TOKENS
                .iter()
                .any(|p| token.eq_ignore_ascii_case(p))
        })
        .take(MAX_KEYWORDS)
        .map(|token| token.to_string())
        .collect()
}
