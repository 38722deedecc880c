use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One REST-backed entity: a `(kind, name)` pair mapped to its collection
/// path and primary key field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub kind: String,
    pub name: String,
    /// Collection path relative to the API base, e.g. `/v2/posts`.
    pub base_path: String,
    /// Primary key field name in record bodies.
    #[serde(default = "default_key")]
    pub key: String,
}

fn default_key() -> String {
    "id".to_string()
}

impl EntityConfig {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            base_path: base_path.into(),
            key: default_key(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

/// HTTP API client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout_secs: 30,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("HENTE_API_BASE_URL").ok_or(ConfigError::Missing("HENTE_API_BASE_URL"))?;

        let token = lookup("HENTE_API_TOKEN").filter(|t| !t.is_empty());

        let timeout_secs = match lookup("HENTE_API_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid("HENTE_API_TIMEOUT_SECS", "must be a valid u64")
            })?,
            None => 30,
        };

        Ok(Self {
            base_url,
            token,
            timeout_secs,
        })
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |var| vars.get(var).map(|v| v.to_string())
    }

    #[test]
    fn test_config_requires_base_url() {
        let vars = HashMap::new();
        let err = ApiConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("HENTE_API_BASE_URL"));
    }

    #[test]
    fn test_config_defaults() {
        let vars = HashMap::from([("HENTE_API_BASE_URL", "http://localhost:8080")]);
        let config = ApiConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.token, None);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_config_rejects_bad_timeout() {
        let vars = HashMap::from([
            ("HENTE_API_BASE_URL", "http://localhost:8080"),
            ("HENTE_API_TIMEOUT_SECS", "soon"),
        ]);
        let err = ApiConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("HENTE_API_TIMEOUT_SECS", _)));
    }

    #[test]
    fn test_entity_config_default_key() {
        let config = EntityConfig::new("postType", "post", "/v2/posts");
        assert_eq!(config.key, "id");

        let config = config.with_key("slug");
        assert_eq!(config.key, "slug");
    }
}
