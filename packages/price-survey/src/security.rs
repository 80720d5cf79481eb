//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate so the API key never shows up in logs, debug
//! output or error messages.

use regex::Regex;
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Result, SurveyError};
use crate::traits::store::PropertyStore;

/// Property-store key of the cached API key.
pub const API_KEY_PROPERTY: &str = "survey.api_key";

static API_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{20,}$").expect("static pattern"));

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value. Only call this when building a request.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A validated search API key.
#[derive(Clone, Debug)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Validate a raw key: at least 20 ASCII alphanumerics, nothing else.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if !API_KEY_PATTERN.is_match(trimmed) {
            return Err(SurveyError::Credential(
                "API key must be at least 20 alphanumeric characters".into(),
            ));
        }
        Ok(Self(SecretString::new(trimmed)))
    }

    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

/// Resolve the API key for a run.
///
/// A configured key is validated and cached in the property store; without
/// one, the cached key is used.
pub async fn resolve_api_key(
    configured: Option<&str>,
    properties: &dyn PropertyStore,
) -> Result<ApiKey> {
    if let Some(raw) = configured.filter(|k| !k.trim().is_empty()) {
        let key = ApiKey::parse(raw)?;
        properties
            .set_property(API_KEY_PROPERTY, key.expose())
            .await?;
        return Ok(key);
    }

    match properties.get_property(API_KEY_PROPERTY).await? {
        Some(cached) => {
            tracing::debug!("Using cached API key");
            ApiKey::parse(&cached)
        }
        None => Err(SurveyError::Credential(
            "no API key configured (set SURVEY_API_KEY)".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    const KEY: &str = "abcdef0123456789abcdef0123456789";

    #[test]
    fn test_secret_not_in_debug() {
        let key = ApiKey::parse(KEY).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains("abcdef"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_rejects_short_or_symbolic_keys() {
        assert!(ApiKey::parse("short1").is_err());
        assert!(ApiKey::parse("abcdef0123456789-abcdef0123").is_err());
        assert!(ApiKey::parse("").is_err());
    }

    #[tokio::test]
    async fn test_configured_key_is_cached() {
        let store = MemoryStore::new();
        let key = resolve_api_key(Some(KEY), &store).await.unwrap();
        assert_eq!(key.expose(), KEY);

        let cached = resolve_api_key(None, &store).await.unwrap();
        assert_eq!(cached.expose(), KEY);
    }

    #[tokio::test]
    async fn test_missing_key_is_credential_error() {
        let store = MemoryStore::new();
        let err = resolve_api_key(None, &store).await.unwrap_err();
        assert!(matches!(err, SurveyError::Credential(_)));
    }

    #[tokio::test]
    async fn test_invalid_configured_key_not_cached() {
        let store = MemoryStore::new();
        assert!(resolve_api_key(Some("bad key!"), &store).await.is_err());
        assert_eq!(store.get_property(API_KEY_PROPERTY).await.unwrap(), None);
    }
}
