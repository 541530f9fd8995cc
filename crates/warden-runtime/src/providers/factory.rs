//! Provider factory pattern for dynamic provider registration.
//!
//! Providers register factories keyed by `providerId`. A routing config then
//! names providers by id and the registry builds one adapter per route.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = ProviderRegistry::new();
//! registry.register(Arc::new(OpenAiFactory::new(client)));
//!
//! let adapter = registry.create(&config.routing.primary)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use super::{ProviderAdapter, ProviderError};
use crate::config::ProviderRoute;

/// Errors from building adapters out of routing config.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown provider '{provider_id}'. Available: {available:?}")]
    UnknownProvider {
        provider_id: String,
        available: Vec<String>,
    },

    #[error("Provider '{provider_id}' rejected its configuration: {source}")]
    InvalidOptions {
        provider_id: String,
        #[source]
        source: ProviderError,
    },
}

/// Factory for creating provider adapters from a route.
///
/// Each factory is responsible for:
/// 1. Validating its options format
/// 2. Creating adapters bound to a model id
/// 3. Providing a unique provider id
pub trait ProviderFactory: Send + Sync {
    /// Provider id this factory serves, e.g. "openai".
    fn provider_id(&self) -> &str;

    /// Create an adapter for `model_id` with provider-specific options.
    fn create(
        &self,
        model_id: &str,
        options: &JsonValue,
    ) -> Result<Arc<dyn ProviderAdapter>, ProviderError>;

    /// Validate options without creating an adapter.
    fn validate_options(&self, _options: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Human-readable description of this provider.
    fn description(&self) -> &str {
        "Model provider"
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory with the same id already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_id().to_string(), factory);
    }

    /// Build the adapter for a route.
    pub fn create(&self, route: &ProviderRoute) -> Result<Arc<dyn ProviderAdapter>, RegistryError> {
        let factory = self.factory(&route.provider_id)?;
        factory
            .validate_options(&route.options)
            .and_then(|_| factory.create(&route.model_id, &route.options))
            .map_err(|source| RegistryError::InvalidOptions {
                provider_id: route.provider_id.clone(),
                source,
            })
    }

    /// Validate a route without creating an adapter.
    pub fn validate(&self, route: &ProviderRoute) -> Result<(), RegistryError> {
        self.factory(&route.provider_id)?
            .validate_options(&route.options)
            .map_err(|source| RegistryError::InvalidOptions {
                provider_id: route.provider_id.clone(),
                source,
            })
    }

    fn factory(&self, provider_id: &str) -> Result<&Arc<dyn ProviderFactory>, RegistryError> {
        self.factories
            .get(provider_id)
            .ok_or_else(|| RegistryError::UnknownProvider {
                provider_id: provider_id.to_string(),
                available: self.available_ids().into_iter().map(String::from).collect(),
            })
    }

    /// List registered provider ids.
    pub fn available_ids(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a provider id is registered.
    pub fn has_provider(&self, provider_id: &str) -> bool {
        self.factories.contains_key(provider_id)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_ids())
            .finish()
    }
}
