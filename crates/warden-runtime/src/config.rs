//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Every section has defaults, so a file only needs
//! the routing chain:
//!
//! ```yaml
//! routing:
//!   primary: { providerId: openai, modelId: gpt-4o-mini, timeout: 20s }
//!   fallbacks:
//!     - { providerId: anthropic, modelId: claude-haiku }
//!   retryPolicy: { maxRetries: 1 }
//! retry_backoff: { min_delay: 50ms, max_delay: 2s, jitter: true }
//! cache: { enabled: true, max_entries: 1000, ttl: 10m }
//! circuit_breaker: { enabled: true, failure_threshold: 3, recovery_timeout: 30s }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use warden_core::contract::RetryPolicy;

use crate::resilience::{BackoffConfig, CircuitBreakerConfig};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default per-attempt provider timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// One provider/model pair in the routing chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRoute {
    pub provider_id: String,

    pub model_id: String,

    /// Provider-specific options passed to its factory
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub options: JsonValue,

    /// Bound on a single attempt
    #[serde(default = "default_provider_timeout", with = "duration_human")]
    pub timeout: Duration,
}

fn default_provider_timeout() -> Duration {
    DEFAULT_PROVIDER_TIMEOUT
}

impl ProviderRoute {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            options: JsonValue::Null,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: JsonValue) -> Self {
        self.options = options;
        self
    }
}

/// Ordered provider chain with its same-provider retry budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    pub primary: ProviderRoute,

    #[serde(default)]
    pub fallbacks: Vec<ProviderRoute>,

    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary: ProviderRoute::new("", ""),
            fallbacks: Vec::new(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl RoutingConfig {
    pub fn new(primary: ProviderRoute) -> Self {
        Self {
            primary,
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, route: ProviderRoute) -> Self {
        self.fallbacks.push(route);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy = RetryPolicy { max_retries };
        self
    }

    /// Routes in attempt order: primary first.
    pub fn routes(&self) -> impl Iterator<Item = &ProviderRoute> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, route) in self.routes().enumerate() {
            let label = if index == 0 {
                "routing.primary".to_string()
            } else {
                format!("routing.fallbacks[{}]", index - 1)
            };
            if route.provider_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{}.providerId is empty", label)));
            }
            if route.model_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{}.modelId is empty", label)));
            }
            if route.timeout.is_zero() {
                return Err(ConfigError::Invalid(format!("{}.timeout must be > 0", label)));
            }
        }
        Ok(())
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub max_entries: usize,

    #[serde(with = "duration_human")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(600),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub routing: RoutingConfig,

    pub retry_backoff: BackoffConfig,

    pub cache: CacheConfig,

    pub circuit_breaker: CircuitBreakerConfig,
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.routing.validate()?;

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be >= 1".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid("cache.ttl must be > 0".to_string()));
        }
        if self.retry_backoff.min_delay > self.retry_backoff.max_delay {
            return Err(ConfigError::Invalid(format!(
                "retry_backoff.min_delay ({}) exceeds max_delay ({})",
                humantime::format_duration(self.retry_backoff.min_delay),
                humantime::format_duration(self.retry_backoff.max_delay),
            )));
        }
        if self.circuit_breaker.enabled && self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Human-readable durations (`"250ms"`, `"30s"`, `"1h 30m"`).
pub(crate) mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration '{}': {}", s, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
routing:
  primary:
    providerId: openai
    modelId: gpt-4o-mini
    timeout: 20s
    options:
      temperature: 0
  fallbacks:
    - providerId: anthropic
      modelId: claude-haiku
  retryPolicy:
    maxRetries: 2
retry_backoff:
  min_delay: 10ms
  max_delay: 1s
  jitter: true
cache:
  max_entries: 50
  ttl: 5m
circuit_breaker:
  enabled: true
  failure_threshold: 4
  recovery_timeout: 45s
"#;

    #[test]
    fn test_parse_yaml() {
        let config = RuntimeConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.routing.primary.provider_id, "openai");
        assert_eq!(config.routing.primary.timeout, Duration::from_secs(20));
        assert_eq!(config.routing.primary.options["temperature"], 0);
        assert_eq!(config.routing.fallbacks[0].timeout, DEFAULT_PROVIDER_TIMEOUT);
        assert_eq!(config.routing.retry_policy.max_retries, 2);
        assert_eq!(config.retry_backoff.min_delay, Duration::from_millis(10));
        assert!(config.retry_backoff.jitter);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert!(config.circuit_breaker.enabled);
        assert_eq!(config.circuit_breaker.failure_threshold, 4);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_parse_json_with_defaults() {
        let json = r#"{ "routing": { "primary": { "providerId": "p", "modelId": "m" } } }"#;
        let config = RuntimeConfig::from_json(json).unwrap();
        assert!(config.routing.fallbacks.is_empty());
        assert_eq!(config.routing.retry_policy.max_retries, 0);
        assert_eq!(config.cache, CacheConfig::default());
        assert!(!config.circuit_breaker.enabled);
    }

    #[test]
    fn test_empty_primary_rejected() {
        let err = RuntimeConfig::from_yaml("cache: { max_entries: 5 }").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("providerId")));
    }

    #[test]
    fn test_zero_max_entries_rejected() {
        let mut config = RuntimeConfig::default();
        config.routing = RoutingConfig::new(ProviderRoute::new("p", "m"));
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_delay_above_max_rejected() {
        let mut config = RuntimeConfig::default();
        config.routing = RoutingConfig::new(ProviderRoute::new("p", "m"));
        config.retry_backoff.min_delay = Duration::from_secs(5);
        config.retry_backoff.max_delay = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_duration_is_a_parse_error() {
        let yaml = r#"
routing:
  primary: { providerId: p, modelId: m, timeout: soon }
"#;
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let config = RuntimeConfig::from_yaml(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_yaml(&yaml).unwrap(), config);
    }
}
