//! Process configuration from environment variables (a `.env` file is honoured by callers
//! through dotenvy before loading).

use crate::error::ConfigError;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_API_PREFIX: &str = "/api/v1";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_LOG_FILTER: &str = "rest_scaffold=info,tower_http=info";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// Mount point of every controller, e.g. `/api/v1`.
    pub api_prefix: String,
    /// `None` selects the in-memory provider.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub body_limit: usize,
    /// Create missing tables for the registered models at startup.
    pub sync_schema: bool,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: DEFAULT_PORT,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            body_limit: DEFAULT_BODY_LIMIT,
            sync_schema: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through `lookup`; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = AppConfig::default();
        if let Some(v) = get("PORT") {
            config.port = parse("PORT", &v)?;
        }
        if let Some(v) = get("API_PREFIX") {
            config.api_prefix = normalize_prefix(&v);
        }
        config.database_url = get("DATABASE_URL");
        if let Some(v) = get("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = parse("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("BODY_LIMIT_BYTES") {
            config.body_limit = parse("BODY_LIMIT_BYTES", &v)?;
        }
        if let Some(v) = get("DATABASE_SYNC") {
            config.sync_schema = match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid("DATABASE_SYNC", &v)),
            };
        }
        if let Some(v) = get("RUST_LOG") {
            config.log_filter = v;
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

/// Leading slash, no trailing slash; `/` alone means no prefix.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.port, 4000);
        assert_eq!(config.api_prefix, "/api/v1");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("API_PREFIX", "api/v2/"),
            ("DATABASE_URL", "postgres://localhost/app"),
            ("DATABASE_SYNC", "true"),
            ("BODY_LIMIT_BYTES", " "),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_prefix, "/api/v2");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert!(config.sync_schema);
        assert_eq!(config.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = load(&[("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        assert!(load(&[("DATABASE_SYNC", "maybe")]).is_err());
    }
}
