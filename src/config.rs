//! Environment configuration for the two Gemini endpoints.

use url::Url;

use crate::gemini::client::{API_BASE, ApiKey, DEFAULT_MODEL, GeminiSettings};

pub const SEARCH_KEY_VAR: &str = "GEMINI_API_KEY";
pub const EXTRACT_KEY_VAR: &str = "GEMINI_EXTRACT_API_KEY";
pub const MODEL_VAR: &str = "GEMINI_MODEL";
pub const EXTRACT_MODEL_VAR: &str = "GEMINI_EXTRACT_MODEL";
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingKey(&'static str),

    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("base URL must use http or https, got '{0}'")]
    UnsupportedScheme(String),
}

/// Settings for query generation/search and, when its key is present, fact extraction.
#[derive(Debug, Clone)]
pub struct Config {
    pub search: GeminiSettings,
    pub extract: Option<GeminiSettings>,
}

impl Config {
    /// Read the process environment, honouring a `.env` file when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `GEMINI_BASE_URL` is carried unvalidated; see [`validate_base_url`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let search_key = var(SEARCH_KEY_VAR).ok_or(ConfigError::MissingKey(SEARCH_KEY_VAR))?;
        let model = var(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = var(BASE_URL_VAR).unwrap_or_else(|| API_BASE.to_string());

        let extract = var(EXTRACT_KEY_VAR).map(|key| GeminiSettings {
            api_key: ApiKey::new(&key),
            model: var(EXTRACT_MODEL_VAR).unwrap_or_else(|| model.clone()),
            base_url: base_url.clone(),
        });

        Ok(Self {
            search: GeminiSettings {
                api_key: ApiKey::new(&search_key),
                model,
                base_url,
            },
            extract,
        })
    }
}

/// Parse `raw` as an absolute http(s) URL, returned without a trailing slash.
pub fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn search_key_is_required() {
        let err = Config::from_lookup(lookup(&[(EXTRACT_KEY_VAR, "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(SEARCH_KEY_VAR)));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[(SEARCH_KEY_VAR, "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));
    }

    #[test]
    fn extraction_is_optional_and_inherits_model() {
        let config = Config::from_lookup(lookup(&[
            (SEARCH_KEY_VAR, "k1"),
            (MODEL_VAR, "gemini-2.0-flash"),
        ]))
        .unwrap();
        assert!(config.extract.is_none());
        assert_eq!(config.search.model, "gemini-2.0-flash");
        assert_eq!(config.search.base_url, API_BASE);

        let config = Config::from_lookup(lookup(&[
            (SEARCH_KEY_VAR, "k1"),
            (EXTRACT_KEY_VAR, "k2"),
            (MODEL_VAR, "gemini-2.0-flash"),
        ]))
        .unwrap();
        assert_eq!(config.extract.unwrap().model, "gemini-2.0-flash");
    }

    #[test]
    fn extraction_model_can_differ() {
        let config = Config::from_lookup(lookup(&[
            (SEARCH_KEY_VAR, "k1"),
            (EXTRACT_KEY_VAR, "k2"),
            (EXTRACT_MODEL_VAR, "gemini-2.5-pro"),
        ]))
        .unwrap();
        assert_eq!(config.search.model, DEFAULT_MODEL);
        assert_eq!(config.extract.unwrap().model, "gemini-2.5-pro");
    }

    #[test]
    fn keys_are_redacted_in_debug() {
        let config = Config::from_lookup(lookup(&[(SEARCH_KEY_VAR, "secret-key")])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn base_url_validation() {
        assert_eq!(
            validate_base_url("http://127.0.0.1:8080/v1beta/models/").unwrap(),
            "http://127.0.0.1:8080/v1beta/models"
        );
        assert!(validate_base_url(API_BASE).is_ok());
        assert!(matches!(
            validate_base_url("not a url"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            validate_base_url("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }
}
