//! Configuration.
//!
//! Loaded from a TOML file, or from `COOPSTORE_*` environment variables:
//!
//! - `COOPSTORE_STORE_URL`: `memory://` or `redis://host[:port][/db]`
//! - `COOPSTORE_NOTIFICATION_PREFIX`: key prefix subscribed for change notifications
//! - `COOPSTORE_CACHE_ENABLED`: identity cache on/off (default: true)
//! - `COOPSTORE_TRASH_KEY`: sorted set holding the deferred-deletion queue
//! - `COOPSTORE_TRASH_RETENTION_MS`: delay before a trashed key is purged
//! - `COOPSTORE_RATE_LIMIT_PREFIX`: key prefix for rate-limit counters
//! - `COOPSTORE_LOG_LEVEL`, `COOPSTORE_LOG_JSON`

use crate::error::{Result, StoreError};
use crate::store::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    /// Only keys under this prefix produce change notifications.
    pub notification_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            url: "memory://".to_string(),
            notification_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    pub key: String,
    pub retention_ms: u64,
}

impl Default for TrashConfig {
    fn default() -> Self {
        TrashConfig {
            key: "trash".to_string(),
            retention_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

impl TrashConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            prefix: "rate:".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub trash: TrashConfig,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
}

fn env_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

impl Config {
    /// In-memory store with a short retention, for tests.
    pub fn test() -> Self {
        Config {
            trash: TrashConfig {
                retention_ms: 200,
                ..TrashConfig::default()
            },
            ..Config::default()
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| StoreError::InvalidArgument(format!("bad config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidArgument(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StoreError::InvalidArgument(format!("cannot serialize config: {}", e)))
    }

    /// Defaults overridden by `COOPSTORE_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(url) = var("COOPSTORE_STORE_URL") {
            config.store.url = url;
        }
        if let Some(prefix) = var("COOPSTORE_NOTIFICATION_PREFIX") {
            config.store.notification_prefix = prefix;
        }
        if let Some(enabled) = var("COOPSTORE_CACHE_ENABLED") {
            config.cache.enabled = env_flag(&enabled);
        }
        if let Some(key) = var("COOPSTORE_TRASH_KEY") {
            config.trash.key = key;
        }
        if let Some(ms) = var("COOPSTORE_TRASH_RETENTION_MS") {
            config.trash.retention_ms = ms.parse().map_err(|_| {
                StoreError::InvalidArgument(format!("COOPSTORE_TRASH_RETENTION_MS: {:?}", ms))
            })?;
        }
        if let Some(prefix) = var("COOPSTORE_RATE_LIMIT_PREFIX") {
            config.rate_limit.prefix = prefix;
        }
        if let Some(level) = var("COOPSTORE_LOG_LEVEL") {
            config.log.level = level;
        }
        if let Some(json) = var("COOPSTORE_LOG_JSON") {
            config.log.json = env_flag(&json);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Endpoint::parse(&self.store.url)?;
        if self.trash.key.is_empty() {
            return Err(StoreError::InvalidArgument("trash.key is empty".to_string()));
        }
        if self.trash.retention_ms == 0 {
            return Err(StoreError::InvalidArgument(
                "trash.retention_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.store.url, "memory://");
        Config::test().validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
[store]
url = "redis://cache:6380/3"

[trash]
retention_ms = 1500
"#,
        )
        .unwrap();
        assert_eq!(config.store.url, "redis://cache:6380/3");
        assert_eq!(config.trash.retention(), Duration::from_millis(1500));
        assert_eq!(config.trash.key, "trash");
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(Config::from_toml("[trash]\nretention_ms = 0").is_err());
        assert!(Config::from_toml("[store]\nurl = \"ftp://x\"").is_err());
        assert!(Config::from_toml("store = 3").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coopstore.toml");
        let mut config = Config::default();
        config.cache.enabled = false;
        config.log.json = true;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: AHashMap<&str, &str> = [
            ("COOPSTORE_STORE_URL", "redis://localhost"),
            ("COOPSTORE_CACHE_ENABLED", "0"),
            ("COOPSTORE_TRASH_RETENTION_MS", "250"),
            ("COOPSTORE_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_vars(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.store.url, "redis://localhost");
        assert!(!config.cache.enabled);
        assert_eq!(config.trash.retention_ms, 250);
        assert!(config.log.json);
        assert_eq!(config.rate_limit.prefix, "rate:");

        let bad: AHashMap<&str, &str> = [("COOPSTORE_TRASH_RETENTION_MS", "soon")].into_iter().collect();
        assert!(Config::from_vars(|name| bad.get(name).map(|v| v.to_string())).is_err());
    }
}
