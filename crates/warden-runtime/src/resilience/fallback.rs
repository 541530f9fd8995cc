//! Ordered provider chain: primary first, then fallbacks.

use std::sync::Arc;

use crate::config::ProviderRoute;
use crate::providers::ProviderAdapter;

/// A route bound to the adapter that serves it.
#[derive(Clone)]
pub struct FallbackTarget {
    pub route: ProviderRoute,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl FallbackTarget {
    pub fn provider_id(&self) -> &str {
        &self.route.provider_id
    }
}

impl std::fmt::Debug for FallbackTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackTarget")
            .field("provider_id", &self.route.provider_id)
            .field("model_id", &self.route.model_id)
            .finish()
    }
}

/// Fallback chain - tried in order.
#[derive(Debug, Clone, Default)]
pub struct FallbackChain {
    targets: Vec<FallbackTarget>,
}

impl FallbackChain {
    /// Create a new fallback chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a target to the chain.
    pub fn add(mut self, route: ProviderRoute, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.targets.push(FallbackTarget { route, adapter });
        self
    }

    /// Get targets in attempt order.
    pub fn targets(&self) -> &[FallbackTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.targets.iter().map(FallbackTarget::provider_id).collect()
    }
}
